//! Read path: acquire, query, release, hydrate.

use tracing::warn;

use crate::cancel::CancelSignal;
use crate::connection::{Connection, Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{hydrate, hydrate_one, Aggregate, Shape};
use crate::row::Row;
use crate::value::FromValue;

/// Run one query on a freshly acquired connection and return its rows.
///
/// The connection is released on every path, including a cancelled query.
///
/// # Errors
///
/// Returns [`RepositoryError::Cancelled`] if `cancel` fires before the rows
/// arrive, or the driver's error.
pub async fn fetch_rows<D: Database>(
    db: &D,
    cancel: &CancelSignal,
    statement: &Statement,
) -> Result<Vec<Row>, RepositoryError> {
    let mut conn = cancel.guard(db.acquire()).await?;
    let result = cancel.guard(conn.query(statement)).await;
    if let Err(e) = conn.close().await {
        warn!(sql = statement.summary(), error = %e, "failed to release connection");
    }
    result
}

/// Run a join query and hydrate every root it returns.
///
/// # Errors
///
/// See [`fetch_rows`]; undecodable rows are [`RepositoryError::DataCorruption`].
pub async fn fetch_all<D: Database, A: Aggregate>(
    db: &D,
    cancel: &CancelSignal,
    statement: &Statement,
    shape: &Shape<A>,
) -> Result<Vec<A>, RepositoryError> {
    let rows = fetch_rows(db, cancel, statement).await?;
    Ok(hydrate(&rows, shape)?)
}

/// Run a join query for a single root.
///
/// # Errors
///
/// See [`fetch_all`]. Absence is `Ok(None)`, not an error.
pub async fn fetch_optional<D: Database, A: Aggregate>(
    db: &D,
    cancel: &CancelSignal,
    statement: &Statement,
    shape: &Shape<A>,
) -> Result<Option<A>, RepositoryError> {
    let rows = fetch_rows(db, cancel, statement).await?;
    Ok(hydrate_one(&rows, shape)?)
}

/// Run a query expected to return exactly one row and read one column.
///
/// # Errors
///
/// See [`fetch_rows`]; no row at all is [`RepositoryError::DataCorruption`].
pub async fn fetch_scalar<D: Database, T: FromValue>(
    db: &D,
    cancel: &CancelSignal,
    statement: &Statement,
    column: &str,
) -> Result<T, RepositoryError> {
    let rows = fetch_rows(db, cancel, statement).await?;
    let row = rows.first().ok_or_else(|| {
        RepositoryError::DataCorruption(format!("no row from `{}`", statement.summary()))
    })?;
    Ok(row.get(column)?)
}
