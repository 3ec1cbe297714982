//! Orders and order lines.

use chrono::{DateTime, Utc};
use mercato_core::{AddressId, CurrencyCode, OrderId, OrderStatus, Price, ProductId, UserId};

use super::{Payment, Product};
use crate::hydrate::{Aggregate, Key, int_key};
use crate::row::{FieldGroup, HydrateError};

/// An order with its lines and payments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    /// The buyer.
    pub user_id: UserId,
    /// Delivery address.
    pub address_id: AddressId,
    pub total: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
}

impl Order {
    /// Read an order header from a group with columns `id, user_id,
    /// address_id, total, currency, status, created_at, shipped_at,
    /// delivered_at, returned_at, cancelled_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped, or the
    /// stored status or currency names no known variant.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            user_id: group.get("user_id")?,
            address_id: group.get("address_id")?,
            total: super::price(group, "total", "currency")?,
            status: group.parse("status")?,
            created_at: group.get("created_at")?,
            shipped_at: group.get("shipped_at")?,
            delivered_at: group.get("delivered_at")?,
            returned_at: group.get("returned_at")?,
            cancelled_at: group.get("cancelled_at")?,
            lines: Vec::new(),
            payments: Vec::new(),
        })
    }

    /// The timestamp recorded for `status`, if the status has one.
    #[must_use]
    pub const fn timestamp_for(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        match status {
            OrderStatus::Pending | OrderStatus::Processing => None,
            OrderStatus::Shipped => self.shipped_at,
            OrderStatus::Delivered => self.delivered_at,
            OrderStatus::Returned => self.returned_at,
            OrderStatus::Cancelled => self.cancelled_at,
        }
    }
}

/// One product on an order. Keyed by `(order_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Price per unit at the time of ordering, in the order's currency.
    pub unit_price: Price,
    /// The product, when the read joined it.
    pub product: Option<Product>,
}

impl OrderLine {
    /// Read a line from a group with columns
    /// `order_id, product_id, quantity, unit_price`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>, currency: CurrencyCode) -> Result<Self, HydrateError> {
        Ok(Self {
            order_id: group.get("order_id")?,
            product_id: group.get("product_id")?,
            quantity: group.get("quantity")?,
            unit_price: Price::new(group.get("unit_price")?, currency),
            product: None,
        })
    }

    /// `unit_price × quantity`, or `None` on overflow.
    #[must_use]
    pub fn subtotal(&self) -> Option<Price> {
        self.unit_price.times(self.quantity)
    }
}

/// Input for placing an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub address_id: AddressId,
    pub currency: CurrencyCode,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    /// Sum of all line subtotals.
    ///
    /// `None` if a line is priced in another currency or the sum overflows.
    #[must_use]
    pub fn total(&self) -> Option<Price> {
        self.lines
            .iter()
            .try_fold(Price::zero(self.currency), |acc, line| {
                acc.checked_add(line.unit_price.times(line.quantity)?)
            })
    }
}

/// One line of a [`NewOrder`].
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Price,
}

impl Aggregate for Order {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        int_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
