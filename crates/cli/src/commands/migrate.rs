//! Database migration command.
//!
//! Migrations live in `crates/db/migrations/` and are embedded in the
//! binary, so `mercato migrate` needs nothing but `DATABASE_URL`.

use super::{CliError, connect};

/// Apply every pending migration.
pub async fn run() -> Result<(), CliError> {
    let db = connect().await?;

    let known = mercato_db::postgres::MIGRATOR.iter().count();
    tracing::info!(migrations = known, "Running migrations...");
    mercato_db::run_migrations(db.pool()).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
