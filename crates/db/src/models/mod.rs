//! Domain aggregates rebuilt from join rows.
//!
//! Each model knows how to read itself from one column group
//! (`from_group`). Which groups a query produces, and how they nest, is up
//! to the repository that owns the query.

pub mod address;
pub mod catalog;
pub mod country;
pub mod order;
pub mod payment;
pub mod review;
pub mod user;

pub use address::{Address, NewAddress};
pub use catalog::{Category, NewCategory, NewProduct, Product};
pub use country::{Country, NewCountry};
pub use order::{NewOrder, NewOrderLine, Order, OrderLine};
pub use payment::{
    NewPayment, NewPaymentProvider, NewPaymentSystem, Payment, PaymentProvider, UserPaymentSystem,
};
pub use review::{NewReview, Review};
pub use user::{NewUser, User, UserAddress, UserProfile};

use mercato_core::{CurrencyCode, Price};

use crate::row::{FieldGroup, HydrateError};

/// Read an amount column and a currency column as one [`Price`].
fn price(group: &FieldGroup<'_>, amount: &str, currency: &str) -> Result<Price, HydrateError> {
    Ok(Price::new(
        group.get(amount)?,
        group.parse::<CurrencyCode>(currency)?,
    ))
}
