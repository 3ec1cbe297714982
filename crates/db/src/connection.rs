//! The storage-engine boundary.
//!
//! Repositories never talk to a driver directly. They build [`Statement`]s and
//! run them through a [`Connection`] obtained from a [`Database`]. The
//! PostgreSQL adapter lives in [`crate::postgres`]; tests use
//! `crate::testing::ScriptedDatabase`.

use std::borrow::Cow;

use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::row::Row;
use crate::value::Param;

/// A parameterized SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: Cow<'static, str>,
    params: Vec<Param>,
}

impl Statement {
    /// Create a statement with no parameters.
    #[must_use]
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter (`$1`, `$2`, ...).
    #[must_use]
    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    /// The SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in positional order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// First line of the SQL text, trimmed, for logs.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.sql
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
    }
}

/// A source of connections.
#[async_trait]
pub trait Database: Send + Sync {
    /// The connection type this database hands out.
    type Conn: Connection;

    /// Acquire a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unavailable`] if no connection can be obtained.
    async fn acquire(&self) -> Result<Self::Conn, RepositoryError>;
}

/// One connection to the store.
///
/// A connection runs at most one transaction at a time; `begin` inside an
/// open transaction is a driver error.
#[async_trait]
pub trait Connection: Send {
    /// Start a transaction.
    async fn begin(&mut self) -> Result<(), RepositoryError>;

    /// Run a statement that returns no rows; yields the affected-row count.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, RepositoryError>;

    /// Run a query and collect its rows in result order.
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, RepositoryError>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<(), RepositoryError>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<(), RepositoryError>;

    /// Release the connection.
    async fn close(self) -> Result<(), RepositoryError>
    where
        Self: Sized;
}
