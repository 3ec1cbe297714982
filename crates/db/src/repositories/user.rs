//! User repository.
//!
//! A full user read joins three independent collections (linked addresses
//! with their countries, saved payment systems, reviews) in one query.

use chrono::Utc;
use mercato_core::{AddressId, Email, UserId};
use tracing::{info, instrument};

use super::Page;
use super::address::{insert_address, insert_link};
use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{Key, Shape, group_at, uuid_key};
use crate::models::{
    Address, Country, NewUser, Review, User, UserAddress, UserPaymentSystem, UserProfile,
};
use crate::read::{fetch_all, fetch_optional};
use crate::row::{FieldGroup, HydrateError};
use crate::unit_of_work::{Expect, UnitOfWork};

const SELECT_TREE: &str = r"
SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash, u.created_at,
       a.id, a.street, a.city, a.region, a.zip, a.country_id,
       ua.is_default AS is_default_address,
       c.id, c.iso2, c.iso3, c.name,
       ps.id, ps.user_id, ps.provider_id, ps.reference, ps.is_default,
       r.id, r.product_id, r.user_id, r.rating, r.body, r.created_at
FROM shop.shop_user u
LEFT JOIN shop.user_address ua ON ua.user_id = u.id
LEFT JOIN shop.address a ON a.id = ua.address_id
LEFT JOIN shop.country c ON c.id = a.country_id
LEFT JOIN shop.user_payment_system ps ON ps.user_id = u.id
LEFT JOIN shop.review r ON r.user_id = u.id
";

const ORDER_TREE: &str = "ORDER BY ua.is_default DESC, a.id, ps.is_default DESC, ps.id, r.created_at DESC, r.id";

const LIST: &str = r"
SELECT id, username, email, first_name, last_name, password_hash, created_at
FROM shop.shop_user
ORDER BY username
LIMIT $1 OFFSET $2
";

const INSERT_USER: &str = r"
INSERT INTO shop.shop_user
    (id, username, email, first_name, last_name, password_hash, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const UPDATE_PROFILE: &str = r"
UPDATE shop.shop_user
SET email = $1, first_name = $2, last_name = $3
WHERE id = $4
";

/// Unlinks every address of the user, deleting those no other user or
/// order references. The outer DELETE still sees the junction rows the CTE
/// removes, hence the `user_id <> $1` filter.
const DELETE_ADDRESSES: &str = r"
WITH unlinked AS (
    DELETE FROM shop.user_address WHERE user_id = $1 RETURNING address_id
)
DELETE FROM shop.address a
USING unlinked
WHERE a.id = unlinked.address_id
  AND NOT EXISTS (
      SELECT 1 FROM shop.user_address ua WHERE ua.address_id = a.id AND ua.user_id <> $1
  )
  AND NOT EXISTS (SELECT 1 FROM shop.orders o WHERE o.address_id = a.id)
";

const DELETE_PAYMENT_SYSTEMS: &str = "DELETE FROM shop.user_payment_system WHERE user_id = $1";
const DELETE_USER: &str = "DELETE FROM shop.shop_user WHERE id = $1";

fn address_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    uuid_key(group, "id")
}

fn attach_address(user: &mut User, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    let mut link = UserAddress::from_group(group_at(groups, 1, "addresses")?)?;
    let country = group_at(groups, 2, "addresses")?;
    if !country.is_null("id") {
        link.address.country = Some(Country::from_group(country)?);
    }
    user.addresses.push(link);
    Ok(())
}

fn payment_system_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    uuid_key(group, "id")
}

fn attach_payment_system(user: &mut User, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    user.payment_systems
        .push(UserPaymentSystem::from_group(group_at(groups, 3, "payment_systems")?)?);
    Ok(())
}

fn review_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    uuid_key(group, "id")
}

fn attach_review(user: &mut User, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    user.reviews
        .push(Review::from_group(group_at(groups, 4, "reviews")?)?);
    Ok(())
}

fn user_shape() -> Shape<User> {
    Shape::joined("user", &["id", "id", "id", "id"])
        .nest("addresses", 1, address_key, attach_address)
        .nest("payment_systems", 3, payment_system_key, attach_payment_system)
        .nest("reviews", 4, review_key, attach_review)
}

/// Repository for users.
pub struct UserRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> UserRepository<'a, D> {
    /// Create a new user repository.
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

    /// Get a user with addresses, payment systems and reviews.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let stmt = Statement::new(format!("{SELECT_TREE}WHERE u.id = $1\n{ORDER_TREE}")).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &user_shape()).await
    }

    /// Get a user by email, fully loaded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self, email), fields(domain = email.domain()))]
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let stmt = Statement::new(format!("{SELECT_TREE}WHERE u.email = $1\n{ORDER_TREE}"))
            .bind(email.as_str());
        fetch_optional(self.db, &self.cancel, &stmt, &user_shape()).await
    }

    /// List users by username, without collections.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self))]
    pub async fn list(&self, page: Page) -> Result<Vec<User>, RepositoryError> {
        let stmt = Statement::new(LIST).bind(page.limit).bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("user")).await
    }

    /// Register a user, together with a first default address if given.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username or email is taken
    /// or the address's country does not exist. Nothing is stored then.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let id = UserId::generate();
        let created_at = Utc::now();

        let mut work = UnitOfWork::new("create_user").then(
            Statement::new(INSERT_USER)
                .bind(id)
                .bind(user.username.as_str())
                .bind(user.email.as_str())
                .bind(user.first_name.as_str())
                .bind(user.last_name.as_str())
                .bind(user.password_hash.as_str())
                .bind(created_at),
        );
        let address = user.address.map(|address| (AddressId::generate(), address));
        if let Some((address_id, address)) = &address {
            work = work
                .then(insert_address(*address_id, address))
                .then(insert_link(id, *address_id, true));
        }
        work.run(self.db, &self.cancel).await?;

        info!(user_id = %id, "user registered");

        Ok(User {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            created_at,
            addresses: address
                .into_iter()
                .map(|(address_id, address)| UserAddress {
                    address: Address::from_new(address_id, address),
                    is_default: true,
                })
                .collect(),
            payment_systems: Vec::new(),
            reviews: Vec::new(),
        })
    }

    /// Update a user's email and name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist, or
    /// `RepositoryError::Conflict` if the email is taken.
    #[instrument(skip(self, profile), fields(user_id = %id))]
    pub async fn update_profile(
        &self,
        id: UserId,
        profile: UserProfile,
    ) -> Result<(), RepositoryError> {
        UnitOfWork::new("update_profile")
            .then_expect(
                Statement::new(UPDATE_PROFILE)
                    .bind(profile.email.as_str())
                    .bind(profile.first_name.as_str())
                    .bind(profile.last_name.as_str())
                    .bind(id),
                Expect::Exactly(1),
            )
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }

    /// Delete a user with their address links, unshared addresses and saved
    /// payment systems.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist, or
    /// `RepositoryError::Conflict` while orders or reviews reference them.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        UnitOfWork::new("delete_user")
            .then(Statement::new(DELETE_ADDRESSES).bind(id))
            .then(Statement::new(DELETE_PAYMENT_SYSTEMS).bind(id))
            .then_expect(Statement::new(DELETE_USER).bind(id), Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}
