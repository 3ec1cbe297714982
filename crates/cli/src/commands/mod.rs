//! CLI subcommands.

pub mod migrate;
pub mod seed;
pub mod show;

use mercato_db::{ConfigError, DatabaseConfig, PgDatabase, RepositoryError};
use thiserror::Error;

/// Errors surfaced by any subcommand.
#[derive(Debug, Error)]
pub enum CliError {
    /// Database settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A repository call failed.
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Applying migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The seed file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The seed file is not valid YAML for the expected layout.
    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The seed file parsed but failed validation.
    #[error("{0} validation errors found")]
    Validation(usize),

    /// Formatting output failed.
    #[error("Failed to render output: {0}")]
    Render(#[from] std::fmt::Error),

    /// The requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

/// Load configuration from the environment and open a pool.
pub async fn connect() -> Result<PgDatabase, CliError> {
    let config = DatabaseConfig::from_env()?;
    tracing::info!(max_connections = config.max_connections, "Connecting to database...");
    Ok(PgDatabase::connect(&config).await?)
}
