//! Mercato Core - Shared domain types.
//!
//! This crate provides the types shared by every Mercato component:
//! - `db` - Row hydration, unit-of-work writes and the entity repositories
//! - `cli` - Command-line tools for migrations and inspection
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access. Storage
//! representations (the text stored for a status, the raw key of an id) are
//! exposed as plain conversions so the storage layer decides how to bind them.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, prices, emails and closed status enumerations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
