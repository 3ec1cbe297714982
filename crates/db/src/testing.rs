//! In-memory scripted driver for tests.
//!
//! [`ScriptedDatabase`] implements [`Database`] without any SQL engine.
//! Queries are answered from row sets registered with
//! [`ScriptedDatabase::respond`], matched by a fragment of their SQL text.
//! Writes inside a transaction are staged and only reach the committed log
//! on commit; rollback discards them. Failures and cancellation can be
//! injected on chosen statements, and every driver call is recorded as an
//! [`Event`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::connection::{Connection, Database, Statement};
use crate::error::RepositoryError;
use crate::row::Row;

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquire,
    Begin,
    Execute(String),
    Query(String),
    Commit,
    Rollback,
    Close,
}

/// An injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Behaves like a unique or foreign-key violation.
    Conflict,
    /// Behaves like a dropped connection.
    Unavailable,
}

impl Failure {
    fn to_error(self, sql: &str) -> RepositoryError {
        match self {
            Self::Conflict => RepositoryError::Conflict(format!("scripted conflict on `{sql}`")),
            Self::Unavailable => {
                RepositoryError::Unavailable(format!("scripted failure on `{sql}`"))
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    committed: Vec<Statement>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, Failure)>,
    affected: Vec<(String, u64)>,
    cancels: Vec<(String, CancelSignal)>,
    acquire_failure: Option<Failure>,
    commit_failure: Option<Failure>,
}

impl State {
    fn failure_for(&self, sql: &str) -> Option<Failure> {
        self.failures
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, failure)| *failure)
    }

    fn fire_cancels(&self, sql: &str) {
        for (fragment, signal) in &self.cancels {
            if sql.contains(fragment.as_str()) {
                signal.cancel();
            }
        }
    }
}

/// A scripted, in-memory [`Database`].
///
/// Clones share state, so a test can keep a handle for assertions while a
/// repository borrows another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDatabase {
    state: Arc<Mutex<State>>,
}

impl ScriptedDatabase {
    /// Create an empty database with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer queries whose SQL contains `fragment` with `rows`.
    ///
    /// The earliest registered matching fragment wins. Unmatched queries
    /// return no rows.
    pub fn respond(&self, fragment: &str, rows: Vec<Row>) {
        self.lock().responses.push((fragment.to_owned(), rows));
    }

    /// Fail statements whose SQL contains `fragment`.
    pub fn fail_on(&self, fragment: &str, failure: Failure) {
        self.lock().failures.push((fragment.to_owned(), failure));
    }

    /// Report `rows` affected for writes whose SQL contains `fragment`
    /// (the default is one).
    pub fn affect(&self, fragment: &str, rows: u64) {
        self.lock().affected.push((fragment.to_owned(), rows));
    }

    /// Fire `signal` right after a statement containing `fragment` runs.
    pub fn cancel_after(&self, fragment: &str, signal: CancelSignal) {
        self.lock().cancels.push((fragment.to_owned(), signal));
    }

    /// Make every `acquire` fail.
    pub fn fail_acquire(&self, failure: Failure) {
        self.lock().acquire_failure = Some(failure);
    }

    /// Make every `commit` fail.
    pub fn fail_commit(&self, failure: Failure) {
        self.lock().commit_failure = Some(failure);
    }

    /// Every driver call so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Writes that are durable: autocommitted or part of a committed
    /// transaction, in the order they became durable.
    #[must_use]
    pub fn committed(&self) -> Vec<Statement> {
        self.lock().committed.clone()
    }

    /// Durable writes whose SQL contains `fragment`.
    #[must_use]
    pub fn committed_matching(&self, fragment: &str) -> Vec<Statement> {
        self.lock()
            .committed
            .iter()
            .filter(|stmt| stmt.sql().contains(fragment))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    type Conn = ScriptedConnection;

    async fn acquire(&self) -> Result<Self::Conn, RepositoryError> {
        let mut state = self.lock();
        if let Some(failure) = state.acquire_failure {
            return Err(failure.to_error("acquire"));
        }
        state.events.push(Event::Acquire);
        Ok(ScriptedConnection {
            db: self.clone(),
            staged: None,
        })
    }
}

/// Connection handed out by [`ScriptedDatabase`].
#[derive(Debug)]
pub struct ScriptedConnection {
    db: ScriptedDatabase,
    staged: Option<Vec<Statement>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn begin(&mut self) -> Result<(), RepositoryError> {
        if self.staged.is_some() {
            return Err(RepositoryError::Unavailable(
                "transaction already open".to_owned(),
            ));
        }
        self.db.lock().events.push(Event::Begin);
        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, RepositoryError> {
        let sql = statement.sql().trim().to_owned();
        let mut state = self.db.lock();
        state.events.push(Event::Execute(sql.clone()));
        if let Some(failure) = state.failure_for(&sql) {
            return Err(failure.to_error(&sql));
        }

        let affected = state
            .affected
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map_or(1, |(_, rows)| *rows);

        match self.staged.as_mut() {
            Some(staged) => staged.push(statement.clone()),
            None => state.committed.push(statement.clone()),
        }
        state.fire_cancels(&sql);
        Ok(affected)
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, RepositoryError> {
        let sql = statement.sql().trim().to_owned();
        let mut state = self.db.lock();
        state.events.push(Event::Query(sql.clone()));
        if let Some(failure) = state.failure_for(&sql) {
            return Err(failure.to_error(&sql));
        }
        state.fire_cancels(&sql);
        Ok(state
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| RepositoryError::Unavailable("no open transaction".to_owned()))?;
        let mut state = self.db.lock();
        if let Some(failure) = state.commit_failure {
            // The transaction stays open so the caller can roll it back.
            self.staged = Some(staged);
            return Err(failure.to_error("COMMIT"));
        }
        state.events.push(Event::Commit);
        state.committed.extend(staged);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.staged = None;
        self.db.lock().events.push(Event::Rollback);
        Ok(())
    }

    async fn close(self) -> Result<(), RepositoryError> {
        self.db.lock().events.push(Event::Close);
        Ok(())
    }
}
