//! One repository per aggregate.
//!
//! Repositories own their SQL text and the [`Shape`](crate::hydrate::Shape)
//! of every join they run. Reads go through [`crate::read`] and the
//! hydrator; composite writes are built as a [`UnitOfWork`](crate::UnitOfWork)
//! and run in one transaction.
//!
//! # Tables
//!
//! All tables live in the `shop` schema:
//!
//! - `country`, `address`, `shop_user`, `user_address` (junction)
//! - `category`, `product`
//! - `orders`, `order_line`
//! - `payment_provider`, `user_payment_system`, `payment`
//! - `review`
//!
//! # Identifiers
//!
//! Surrogate UUID keys are generated here before a write starts. Integer
//! keys are reserved from their sequence before the transaction begins, so
//! no statement inside a unit of work depends on an id the database
//! generates mid-transaction.

mod address;
mod catalog;
mod country;
mod order;
mod payment;
mod review;
mod user;

pub use address::AddressRepository;
pub use catalog::{CategoryRepository, ProductRepository};
pub use country::CountryRepository;
pub use order::OrderRepository;
pub use payment::{PaymentProviderRepository, PaymentRepository, UserPaymentSystemRepository};
pub use review::ReviewRepository;
pub use user::UserRepository;

use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::read::fetch_scalar;

/// Pagination for list reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Page size used when the caller does not choose one.
    pub const DEFAULT_LIMIT: i64 = 50;

    /// Create a page, clamping negative values to zero.
    #[must_use]
    pub const fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: if limit < 0 { 0 } else { limit },
            offset: if offset < 0 { 0 } else { offset },
        }
    }

    /// The page after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.limit, self.offset.saturating_add(self.limit))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// Reserve the next value of an integer key sequence.
///
/// Runs outside any transaction. A reserved value that ends up unused (the
/// write rolled back) leaves a gap, which is harmless.
async fn reserve_id<D: Database>(
    db: &D,
    cancel: &CancelSignal,
    sequence: &'static str,
) -> Result<i32, RepositoryError> {
    let stmt = Statement::new("SELECT nextval($1::regclass) AS id").bind(sequence);
    fetch_scalar(db, cancel, &stmt, "id").await
}
