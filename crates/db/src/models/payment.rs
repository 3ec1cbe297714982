//! Payments, payment providers and users' saved payment systems.
//!
//! A payment is made through a user's payment system, which in turn belongs
//! to a provider. Loading a provider with its payments goes through both
//! joins.

use chrono::{DateTime, Utc};
use mercato_core::{
    OrderId, PaymentId, PaymentMethod, PaymentProviderId, PaymentStatus, PaymentSystemId, Price,
    UserId,
};

use crate::hydrate::{Aggregate, Key, int_key, uuid_key};
use crate::row::{FieldGroup, HydrateError};

/// A payment against an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payment_system_id: PaymentSystemId,
    pub amount: Price,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    /// Set together with [`PaymentStatus::Completed`].
    pub paid_at: Option<DateTime<Utc>>,
    /// Set together with [`PaymentStatus::Refunded`].
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Read a payment from a group with columns `id, order_id,
    /// payment_system_id, amount, currency, method, status, created_at,
    /// paid_at, refunded_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped, or the
    /// stored method, status or currency names no known variant.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            order_id: group.get("order_id")?,
            payment_system_id: group.get("payment_system_id")?,
            amount: super::price(group, "amount", "currency")?,
            method: group.parse("method")?,
            status: group.parse("status")?,
            created_at: group.get("created_at")?,
            paid_at: group.get("paid_at")?,
            refunded_at: group.get("refunded_at")?,
        })
    }
}

/// A payment provider and, when joined, the payments made through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProvider {
    pub id: PaymentProviderId,
    pub name: String,
    pub active: bool,
    pub payments: Vec<Payment>,
}

impl PaymentProvider {
    /// Read a provider from a group with columns `id, name, active`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            name: group.get("name")?,
            active: group.get("active")?,
            payments: Vec::new(),
        })
    }
}

/// A user's saved account with a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaymentSystem {
    pub id: PaymentSystemId,
    pub user_id: UserId,
    pub provider_id: PaymentProviderId,
    /// The provider's reference for the account (token, masked number).
    pub reference: String,
    pub is_default: bool,
    /// Payments made with this account. Empty unless the read joined them.
    pub payments: Vec<Payment>,
}

impl UserPaymentSystem {
    /// Read a payment system from a group with columns
    /// `id, user_id, provider_id, reference, is_default`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            user_id: group.get("user_id")?,
            provider_id: group.get("provider_id")?,
            reference: group.get("reference")?,
            is_default: group.get("is_default")?,
            payments: Vec::new(),
        })
    }
}

/// Input for recording a payment. New payments start as
/// [`PaymentStatus::Pending`].
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub payment_system_id: PaymentSystemId,
    pub amount: Price,
    pub method: PaymentMethod,
}

/// Input for creating a provider.
#[derive(Debug, Clone)]
pub struct NewPaymentProvider {
    pub name: String,
    pub active: bool,
}

/// Input for saving a payment system for a user.
#[derive(Debug, Clone)]
pub struct NewPaymentSystem {
    pub user_id: UserId,
    pub provider_id: PaymentProviderId,
    pub reference: String,
    pub is_default: bool,
}

impl Aggregate for Payment {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        uuid_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}

impl Aggregate for PaymentProvider {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        int_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}

impl Aggregate for UserPaymentSystem {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        uuid_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
