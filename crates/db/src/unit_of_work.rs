//! Atomic composite writes.
//!
//! A [`UnitOfWork`] is an ordered list of statements that must all apply or
//! none apply: an address and the junction row linking it to its user, an
//! order header and its lines, a status and its paired timestamp. It runs on
//! one connection inside one transaction; statements run strictly in the order
//! they were pushed.
//!
//! [`ScopedTransaction`] is the one place that decides between commit and
//! rollback. Every exit path that is not a successful commit (a failing
//! statement, an unmet row-count expectation, cancellation between
//! statements) goes through [`ScopedTransaction::finish`] and rolls back
//! before the error propagates.

use tracing::{debug, error, instrument, warn};

use crate::cancel::CancelSignal;
use crate::connection::{Connection, Database, Statement};
use crate::error::RepositoryError;
use crate::row::Row;

/// How many rows a step must affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
    /// Any count is fine.
    #[default]
    Any,
    /// Exactly this many rows.
    Exactly(u64),
    /// At least one row; zero means the target does not exist.
    AtLeastOne,
}

impl Expect {
    const fn is_met(self, affected: u64) -> bool {
        match self {
            Self::Any => true,
            Self::Exactly(n) => affected == n,
            Self::AtLeastOne => affected > 0,
        }
    }
}

/// One statement of a unit of work.
#[derive(Debug, Clone)]
struct Step {
    statement: Statement,
    expect: Expect,
}

/// An ordered, all-or-nothing sequence of write statements.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    label: &'static str,
    steps: Vec<Step>,
}

impl UnitOfWork {
    /// Start an empty unit of work; `label` names it in logs.
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            steps: Vec::new(),
        }
    }

    /// Append a statement whose affected-row count does not matter.
    #[must_use]
    pub fn then(self, statement: Statement) -> Self {
        self.then_expect(statement, Expect::Any)
    }

    /// Append a statement with a row-count expectation.
    #[must_use]
    pub fn then_expect(mut self, statement: Statement, expect: Expect) -> Self {
        self.steps.push(Step { statement, expect });
        self
    }

    /// Append several statements, in iteration order.
    #[must_use]
    pub fn then_all(mut self, statements: impl IntoIterator<Item = Statement>) -> Self {
        self.steps.extend(statements.into_iter().map(|statement| Step {
            statement,
            expect: Expect::Any,
        }));
        self
    }

    /// Acquire a connection, run every step in one transaction, and release
    /// the connection.
    ///
    /// Returns the affected-row count of each step.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Cancelled`] if `cancel` fires before or between steps.
    /// - [`RepositoryError::NotFound`] if a step's [`Expect`] is not met.
    /// - [`RepositoryError::Conflict`] / [`RepositoryError::Unavailable`] from the driver.
    ///
    /// In every error case the transaction has been rolled back.
    #[instrument(skip_all, fields(unit = self.label, steps = self.steps.len()))]
    pub async fn run<D: Database>(
        self,
        db: &D,
        cancel: &CancelSignal,
    ) -> Result<Vec<u64>, RepositoryError> {
        if self.steps.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = cancel.guard(db.acquire()).await?;
        let result = self.run_on(&mut conn, cancel).await;

        if let Err(e) = conn.close().await {
            warn!(unit = self.label, error = %e, "failed to release connection");
        }

        result
    }

    async fn run_on<C: Connection>(
        &self,
        conn: &mut C,
        cancel: &CancelSignal,
    ) -> Result<Vec<u64>, RepositoryError> {
        let mut tx = ScopedTransaction::begin(conn, cancel, self.label).await?;

        let result = async {
            let mut counts = Vec::with_capacity(self.steps.len());
            for (index, step) in self.steps.iter().enumerate() {
                let affected = tx.execute(&step.statement).await?;
                if !step.expect.is_met(affected) {
                    debug!(
                        unit = self.label,
                        step = index,
                        affected,
                        expected = ?step.expect,
                        sql = step.statement.summary(),
                        "row-count expectation not met"
                    );
                    return Err(RepositoryError::NotFound);
                }
                counts.push(affected);
            }
            Ok::<_, RepositoryError>(counts)
        }
        .await;

        tx.finish(result).await
    }
}

/// A transaction on a borrowed connection that is always either committed or
/// rolled back through [`ScopedTransaction::finish`].
///
/// Dropping it unfinished (the enclosing future was dropped) leaves the
/// rollback to the driver, which must not return a connection with an open
/// transaction to its pool.
pub struct ScopedTransaction<'c, C: Connection> {
    conn: &'c mut C,
    cancel: &'c CancelSignal,
    label: &'static str,
    finished: bool,
}

impl<'c, C: Connection> ScopedTransaction<'c, C> {
    /// Begin a transaction on `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Cancelled`] if `cancel` already fired, or the
    /// driver's error if `BEGIN` fails.
    pub async fn begin(
        conn: &'c mut C,
        cancel: &'c CancelSignal,
        label: &'static str,
    ) -> Result<Self, RepositoryError> {
        cancel.check()?;
        conn.begin().await?;
        debug!(unit = label, "transaction started");
        Ok(Self {
            conn,
            cancel,
            label,
            finished: false,
        })
    }

    /// Run a write statement, checking for cancellation first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Cancelled`] or the driver's error.
    pub async fn execute(&mut self, statement: &Statement) -> Result<u64, RepositoryError> {
        self.cancel.check()?;
        self.conn.execute(statement).await
    }

    /// Run a query inside the transaction, checking for cancellation first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Cancelled`] or the driver's error.
    pub async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, RepositoryError> {
        self.cancel.check()?;
        self.conn.query(statement).await
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// A failed commit is itself rolled back. If the rollback fails too, that
    /// failure is logged and the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error carried by `result`, or the commit failure.
    pub async fn finish<T>(
        mut self,
        result: Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        self.finished = true;
        match result {
            Ok(value) => match self.conn.commit().await {
                Ok(()) => {
                    debug!(unit = self.label, "transaction committed");
                    Ok(value)
                }
                Err(e) => Err(self.roll_back(e).await),
            },
            Err(e) => Err(self.roll_back(e).await),
        }
    }

    async fn roll_back(&mut self, cause: RepositoryError) -> RepositoryError {
        if cause.is_cancelled() {
            debug!(unit = self.label, "cancelled, rolling back");
        } else {
            warn!(unit = self.label, error = %cause, "rolling back");
        }

        if let Err(rollback_error) = self.conn.rollback().await {
            error!(
                unit = self.label,
                error = %rollback_error,
                cause = %cause,
                "rollback failed"
            );
        }
        cause
    }
}

impl<C: Connection> Drop for ScopedTransaction<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                unit = self.label,
                "transaction dropped before commit or rollback"
            );
        }
    }
}
