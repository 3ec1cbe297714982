//! Mercato storage layer.
//!
//! Two pieces do the real work here:
//!
//! - [`hydrate`] folds the flat rows of a join query back into nested
//!   aggregates (a user with its addresses, payment systems and reviews; an
//!   order with its lines and payments), deduplicating the join fan-out.
//! - [`unit_of_work`] runs composite writes (an address plus its junction row,
//!   an order plus its lines) as one transaction that either commits entirely
//!   or rolls back entirely.
//!
//! Everything talks to storage through the [`connection::Database`] and
//! [`connection::Connection`] traits. [`postgres`] implements them on `sqlx`;
//! the `testing` feature adds an in-memory scripted driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use mercato_db::{CancelSignal, DatabaseConfig, PgDatabase};
//! use mercato_db::repositories::OrderRepository;
//!
//! let db = PgDatabase::connect(&DatabaseConfig::from_env()?).await?;
//! let cancel = CancelSignal::new();
//! let order = OrderRepository::new(&db)
//!     .with_cancel(cancel.clone())
//!     .get(order_id)
//!     .await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cancel;
pub mod config;
pub mod connection;
pub mod error;
pub mod hydrate;
pub mod models;
pub mod postgres;
pub mod read;
pub mod repositories;
pub mod row;
pub mod unit_of_work;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cancel::CancelSignal;
pub use config::{ConfigError, DatabaseConfig, create_pool};
pub use connection::{Connection, Database, Statement};
pub use error::RepositoryError;
pub use hydrate::{Aggregate, Key, Shape, hydrate, hydrate_one};
pub use postgres::{PgDatabase, run_migrations};
pub use row::{FieldGroup, HydrateError, Row};
pub use unit_of_work::{Expect, ScopedTransaction, UnitOfWork};
pub use value::{FromValue, Param, Value};
