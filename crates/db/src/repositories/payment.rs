//! Payment, payment provider and saved payment system repositories.

use chrono::{DateTime, Utc};
use mercato_core::{
    OrderId, PaymentId, PaymentProviderId, PaymentStatus, PaymentSystemId, UserId,
};
use tracing::{info, instrument};

use super::{Page, reserve_id};
use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{Key, Shape, group_at, uuid_key};
use crate::models::{
    NewPayment, NewPaymentProvider, NewPaymentSystem, Payment, PaymentProvider,
    UserPaymentSystem,
};
use crate::read::{fetch_all, fetch_optional};
use crate::row::{FieldGroup, HydrateError};
use crate::unit_of_work::{Expect, UnitOfWork};

const PAYMENT_COLUMNS: &str = "id, order_id, payment_system_id, amount, currency, method, \
                               status, created_at, paid_at, refunded_at";

const INSERT_PAYMENT: &str = r"
INSERT INTO shop.payment
    (id, order_id, payment_system_id, amount, currency, method, status, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

const GET_PROVIDER: &str = r"
SELECT pp.id, pp.name, pp.active,
       pay.id, pay.order_id, pay.payment_system_id, pay.amount, pay.currency, pay.method,
       pay.status, pay.created_at, pay.paid_at, pay.refunded_at
FROM shop.payment_provider pp
LEFT JOIN shop.user_payment_system ups ON ups.provider_id = pp.id
LEFT JOIN shop.payment pay ON pay.payment_system_id = ups.id
WHERE pp.id = $1
ORDER BY pay.created_at, pay.id
";

const LIST_PROVIDERS: &str = r"
SELECT id, name, active
FROM shop.payment_provider
ORDER BY name, id
LIMIT $1 OFFSET $2
";

const INSERT_PROVIDER: &str = r"
INSERT INTO shop.payment_provider (id, name, active)
VALUES ($1, $2, $3)
";

const GET_SYSTEM: &str = r"
SELECT ups.id, ups.user_id, ups.provider_id, ups.reference, ups.is_default,
       pay.id, pay.order_id, pay.payment_system_id, pay.amount, pay.currency, pay.method,
       pay.status, pay.created_at, pay.paid_at, pay.refunded_at
FROM shop.user_payment_system ups
LEFT JOIN shop.payment pay ON pay.payment_system_id = ups.id
WHERE ups.id = $1
ORDER BY pay.created_at, pay.id
";

const LIST_SYSTEMS: &str = r"
SELECT id, user_id, provider_id, reference, is_default
FROM shop.user_payment_system
WHERE user_id = $1
ORDER BY is_default DESC, id
";

const CLEAR_DEFAULT_SYSTEM: &str = r"
UPDATE shop.user_payment_system SET is_default = FALSE
WHERE user_id = $1 AND is_default
";

const INSERT_SYSTEM: &str = r"
INSERT INTO shop.user_payment_system (id, user_id, provider_id, reference, is_default)
VALUES ($1, $2, $3, $4, $5)
";

const DELETE_SYSTEM: &str = "DELETE FROM shop.user_payment_system WHERE id = $1";

fn get_payment_sql() -> String {
    format!("SELECT {PAYMENT_COLUMNS} FROM shop.payment WHERE id = $1")
}

fn list_payments_sql() -> String {
    format!("SELECT {PAYMENT_COLUMNS} FROM shop.payment WHERE order_id = $1 ORDER BY created_at, id")
}

/// SQL that sets a payment status together with its paired timestamp.
fn status_sql(status: PaymentStatus) -> String {
    status.timestamp_column().map_or_else(
        || "UPDATE shop.payment SET status = $1 WHERE id = $2".to_owned(),
        |column| format!("UPDATE shop.payment SET status = $1, {column} = $2 WHERE id = $3"),
    )
}

fn payment_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    uuid_key(group, "id")
}

fn joined_payment(groups: &[FieldGroup<'_>]) -> Result<Payment, HydrateError> {
    Payment::from_group(group_at(groups, 1, "payments")?)
}

fn attach_provider_payment(
    provider: &mut PaymentProvider,
    groups: &[FieldGroup<'_>],
) -> Result<(), HydrateError> {
    provider.payments.push(joined_payment(groups)?);
    Ok(())
}

fn attach_system_payment(
    system: &mut UserPaymentSystem,
    groups: &[FieldGroup<'_>],
) -> Result<(), HydrateError> {
    system.payments.push(joined_payment(groups)?);
    Ok(())
}

fn provider_shape() -> Shape<PaymentProvider> {
    Shape::joined("payment_provider", &["id"]).nest(
        "payments",
        1,
        payment_key,
        attach_provider_payment,
    )
}

fn system_shape() -> Shape<UserPaymentSystem> {
    Shape::joined("user_payment_system", &["id"]).nest(
        "payments",
        1,
        payment_key,
        attach_system_payment,
    )
}

/// Repository for payments.
pub struct PaymentRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> PaymentRepository<'a, D> {
    /// Create a new payment repository.
    #[must_use]
    pub fn new(db: &'a D) -> Self {
        Self {
            db,
            cancel: CancelSignal::never(),
        }
    }

    /// Abort operations when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or the row does not decode.
    #[instrument(skip(self), fields(payment_id = %id))]
    pub async fn get(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let stmt = Statement::new(get_payment_sql()).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &Shape::flat("payment")).await
    }

    /// Payments made against an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        let stmt = Statement::new(list_payments_sql()).bind(order_id);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("payment")).await
    }

    /// Record a pending payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order or payment system
    /// does not exist.
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id))]
    pub async fn create(&self, payment: NewPayment) -> Result<Payment, RepositoryError> {
        let id = PaymentId::generate();
        let created_at = Utc::now();

        UnitOfWork::new("create_payment")
            .then(
                Statement::new(INSERT_PAYMENT)
                    .bind(id)
                    .bind(payment.order_id)
                    .bind(payment.payment_system_id)
                    .bind(payment.amount.amount)
                    .bind(payment.amount.currency_code.as_str())
                    .bind(payment.method.as_str())
                    .bind(PaymentStatus::Pending.as_str())
                    .bind(created_at),
            )
            .run(self.db, &self.cancel)
            .await?;

        Ok(Payment {
            id,
            order_id: payment.order_id,
            payment_system_id: payment.payment_system_id,
            amount: payment.amount,
            method: payment.method,
            status: PaymentStatus::Pending,
            created_at,
            paid_at: None,
            refunded_at: None,
        })
    }

    /// Move a payment to `status`, writing `paid_at` or `refunded_at` in
    /// the same statement when the status has one. Returns the time
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    #[instrument(skip(self), fields(payment_id = %id, status = status.as_str()))]
    pub async fn update_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let at = Utc::now();
        let mut stmt = Statement::new(status_sql(status)).bind(status.as_str());
        if status.timestamp_column().is_some() {
            stmt = stmt.bind(at);
        }
        stmt = stmt.bind(id);

        UnitOfWork::new("update_payment_status")
            .then_expect(stmt, Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;

        info!(payment_id = %id, status = status.as_str(), "payment status changed");
        Ok(at)
    }
}

/// Repository for payment providers.
pub struct PaymentProviderRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> PaymentProviderRepository<'a, D> {
    /// Create a new provider repository.
    #[must_use]
    pub fn new(db: &'a D) -> Self {
        Self {
            db,
            cancel: CancelSignal::never(),
        }
    }

    /// Abort operations when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a provider with every payment made through any of its saved
    /// payment systems.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(provider_id = %id))]
    pub async fn get(
        &self,
        id: PaymentProviderId,
    ) -> Result<Option<PaymentProvider>, RepositoryError> {
        let stmt = Statement::new(GET_PROVIDER).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &provider_shape()).await
    }

    /// List providers by name, without payments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self))]
    pub async fn list(&self, page: Page) -> Result<Vec<PaymentProvider>, RepositoryError> {
        let stmt = Statement::new(LIST_PROVIDERS)
            .bind(page.limit)
            .bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("payment_provider")).await
    }

    /// Create a provider.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    #[instrument(skip(self, provider), fields(name = %provider.name))]
    pub async fn create(
        &self,
        provider: NewPaymentProvider,
    ) -> Result<PaymentProvider, RepositoryError> {
        let id = PaymentProviderId::new(
            reserve_id(self.db, &self.cancel, "shop.payment_provider_id_seq").await?,
        );

        UnitOfWork::new("create_payment_provider")
            .then(
                Statement::new(INSERT_PROVIDER)
                    .bind(id)
                    .bind(provider.name.as_str())
                    .bind(provider.active),
            )
            .run(self.db, &self.cancel)
            .await?;

        Ok(PaymentProvider {
            id,
            name: provider.name,
            active: provider.active,
            payments: Vec::new(),
        })
    }
}

/// Repository for users' saved payment systems.
pub struct UserPaymentSystemRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> UserPaymentSystemRepository<'a, D> {
    /// Create a new payment system repository.
    #[must_use]
    pub fn new(db: &'a D) -> Self {
        Self {
            db,
            cancel: CancelSignal::never(),
        }
    }

    /// Abort operations when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a saved payment system with the payments made through it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(payment_system_id = %id))]
    pub async fn get(
        &self,
        id: PaymentSystemId,
    ) -> Result<Option<UserPaymentSystem>, RepositoryError> {
        let stmt = Statement::new(GET_SYSTEM).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &system_shape()).await
    }

    /// A user's payment systems, default first, without payments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserPaymentSystem>, RepositoryError> {
        let stmt = Statement::new(LIST_SYSTEMS).bind(user_id);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("user_payment_system")).await
    }

    /// Save a payment system. A new default replaces the previous one in
    /// the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the provider reference is
    /// already saved or the user or provider does not exist.
    #[instrument(skip(self, system), fields(user_id = %system.user_id, provider_id = %system.provider_id))]
    pub async fn create(
        &self,
        system: NewPaymentSystem,
    ) -> Result<UserPaymentSystem, RepositoryError> {
        let id = PaymentSystemId::generate();

        let mut work = UnitOfWork::new("create_payment_system");
        if system.is_default {
            work = work.then(Statement::new(CLEAR_DEFAULT_SYSTEM).bind(system.user_id));
        }
        work.then(
            Statement::new(INSERT_SYSTEM)
                .bind(id)
                .bind(system.user_id)
                .bind(system.provider_id)
                .bind(system.reference.as_str())
                .bind(system.is_default),
        )
        .run(self.db, &self.cancel)
        .await?;

        Ok(UserPaymentSystem {
            id,
            user_id: system.user_id,
            provider_id: system.provider_id,
            reference: system.reference,
            is_default: system.is_default,
            payments: Vec::new(),
        })
    }

    /// Delete a saved payment system.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist, or
    /// `RepositoryError::Conflict` while payments still reference it.
    #[instrument(skip(self), fields(payment_system_id = %id))]
    pub async fn delete(&self, id: PaymentSystemId) -> Result<(), RepositoryError> {
        UnitOfWork::new("delete_payment_system")
            .then_expect(Statement::new(DELETE_SYSTEM).bind(id), Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}
