//! `PostgreSQL` adapter for [`Database`] and [`Connection`].
//!
//! Statements are sent with runtime `sqlx::query` calls so nothing here needs
//! a database at compile time. Result cells are decoded into [`Value`] by the
//! column's `PostgreSQL` type name.
//!
//! A connection that is dropped or closed while a transaction is open, or
//! while a statement was still in flight, is detached from the pool and shut
//! down instead of being handed to the next caller. The server rolls back
//! whatever that session left open.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::{DatabaseConfig, create_pool};
use crate::connection::{Connection, Database, Statement};
use crate::error::RepositoryError;
use crate::row::{Columns, Row};
use crate::value::{Param, Value};

/// Embedded schema migrations from `crates/db/migrations`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply pending schema migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history diverged.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// A pooled `PostgreSQL` database.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unavailable`] if the server cannot be reached.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let pool = create_pool(config).await.map_err(map_error)?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Conn = PgConn;

    async fn acquire(&self) -> Result<Self::Conn, RepositoryError> {
        let conn = self.pool.acquire().await.map_err(map_error)?;
        Ok(PgConn {
            conn: Some(conn),
            in_tx: false,
            busy: false,
        })
    }
}

/// One pooled `PostgreSQL` connection.
#[derive(Debug)]
pub struct PgConn {
    conn: Option<PoolConnection<Postgres>>,
    in_tx: bool,
    /// Set while a statement is awaited; still set if that future was dropped.
    busy: bool,
}

impl PgConn {
    async fn control(&mut self, sql: &'static str) -> Result<(), RepositoryError> {
        let conn = checkout(&mut self.conn, &mut self.busy)?;
        let result = sqlx::query(sql).execute(&mut **conn).await;
        self.busy = false;
        result.map(|_| ()).map_err(map_error)
    }

    fn discard(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(
                in_tx = self.in_tx,
                busy = self.busy,
                "discarding connection instead of returning it to the pool"
            );
            drop(conn.detach());
        }
    }

    const fn reusable(&self) -> bool {
        !self.in_tx && !self.busy
    }
}

#[async_trait]
impl Connection for PgConn {
    async fn begin(&mut self) -> Result<(), RepositoryError> {
        if self.in_tx {
            return Err(RepositoryError::Unavailable(
                "transaction already open".to_string(),
            ));
        }
        self.control("BEGIN").await?;
        self.in_tx = true;
        Ok(())
    }

    #[instrument(skip_all, fields(sql = statement.summary()))]
    async fn execute(&mut self, statement: &Statement) -> Result<u64, RepositoryError> {
        let conn = checkout(&mut self.conn, &mut self.busy)?;
        let result = bind_all(sqlx::query(statement.sql()), statement.params())
            .execute(&mut **conn)
            .await;
        self.busy = false;
        let affected = result.map_err(map_error)?.rows_affected();
        debug!(affected, "statement executed");
        Ok(affected)
    }

    #[instrument(skip_all, fields(sql = statement.summary()))]
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, RepositoryError> {
        let conn = checkout(&mut self.conn, &mut self.busy)?;
        let result = bind_all(sqlx::query(statement.sql()), statement.params())
            .fetch_all(&mut **conn)
            .await;
        self.busy = false;
        let pg_rows = result.map_err(map_error)?;
        debug!(rows = pg_rows.len(), "query returned");
        decode_rows(&pg_rows)
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        self.control("COMMIT").await?;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.control("ROLLBACK").await?;
        self.in_tx = false;
        Ok(())
    }

    async fn close(mut self) -> Result<(), RepositoryError> {
        if !self.reusable() {
            self.discard();
        }
        // Dropping a healthy `PoolConnection` returns it to the pool.
        drop(self.conn.take());
        Ok(())
    }
}

impl Drop for PgConn {
    fn drop(&mut self) {
        if !self.reusable() {
            self.discard();
        }
    }
}

/// Borrow the live connection and mark it busy until the caller clears the
/// flag.
fn checkout<'c>(
    conn: &'c mut Option<PoolConnection<Postgres>>,
    busy: &mut bool,
) -> Result<&'c mut PoolConnection<Postgres>, RepositoryError> {
    if *busy {
        return Err(RepositoryError::Unavailable(
            "connection interrupted mid-statement".to_string(),
        ));
    }
    let conn = conn
        .as_mut()
        .ok_or_else(|| RepositoryError::Unavailable("connection already released".to_string()))?;
    *busy = true;
    Ok(conn)
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Param],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Bool(v) => query.bind(*v),
            Param::SmallInt(v) => query.bind(*v),
            Param::Int(v) => query.bind(*v),
            Param::BigInt(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.as_deref()),
            Param::Decimal(v) => query.bind(*v),
            Param::Uuid(v) => query.bind(*v),
            Param::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

fn decode_rows(pg_rows: &[PgRow]) -> Result<Vec<Row>, RepositoryError> {
    let Some(first) = pg_rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into();

    pg_rows
        .iter()
        .map(|pg_row| {
            let values = (0..pg_row.len())
                .map(|i| decode_cell(pg_row, i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(Arc::clone(&columns), values))
        })
        .collect()
}

fn decode_cell(row: &PgRow, index: usize) -> Result<Value, RepositoryError> {
    let column = row
        .columns()
        .get(index)
        .ok_or_else(|| RepositoryError::DataCorruption(format!("no column {index}")))?;
    let type_name = column.type_info().name();

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::Int(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::Int(i64::from(v))),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::Text)
        }
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(index)?.map(Value::Decimal),
        "UUID" => row.try_get::<Option<Uuid>, _>(index)?.map(Value::Uuid),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Value::Timestamp(v.and_utc())),
        other => {
            return Err(RepositoryError::DataCorruption(format!(
                "column `{}` has unsupported type {other}",
                column.name()
            )));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        map_error(e)
    }
}

/// Classify a driver error.
///
/// Integrity-constraint violations (SQLSTATE class 23) are conflicts, decode
/// failures are corruption, and everything else means the store could not
/// serve the request.
fn map_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db_err)
            if db_err.code().is_some_and(|code| code.starts_with("23")) =>
        {
            RepositoryError::Conflict(db_err.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => RepositoryError::DataCorruption(e.to_string()),
        _ => RepositoryError::Unavailable(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(map_error(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(map_error(sqlx::Error::PoolClosed).is_retryable());
    }

    #[test]
    fn test_decode_errors_are_corruption() {
        let err = map_error(sqlx::Error::ColumnNotFound("total".to_string()));
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }

    #[test]
    fn test_empty_result_decodes_to_nothing() {
        assert!(decode_rows(&[]).unwrap_or_default().is_empty());
    }

    #[test]
    fn test_migrations_are_embedded() {
        assert!(MIGRATOR.iter().count() >= 1);
    }
}
