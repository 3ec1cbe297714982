//! Users and their linked addresses.

use chrono::{DateTime, Utc};
use mercato_core::{Email, UserId};

use super::{Address, NewAddress, Review, UserPaymentSystem};
use crate::hydrate::{Aggregate, Key, uuid_key};
use crate::row::{FieldGroup, HydrateError};

/// A shop user with the collections a full read loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    /// Credential hash; never the plain password.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub addresses: Vec<UserAddress>,
    pub payment_systems: Vec<UserPaymentSystem>,
    pub reviews: Vec<Review>,
}

impl User {
    /// Read a user from a group with columns `id, username, email,
    /// first_name, last_name, password_hash, created_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped, or the
    /// stored email is not a valid address.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            username: group.get("username")?,
            email: group.parse("email")?,
            first_name: group.get("first_name")?,
            last_name: group.get("last_name")?,
            password_hash: group.get("password_hash")?,
            created_at: group.get("created_at")?,
            addresses: Vec::new(),
            payment_systems: Vec::new(),
            reviews: Vec::new(),
        })
    }

    /// The address marked as default, if any.
    #[must_use]
    pub fn default_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.is_default)
            .map(|a| &a.address)
    }
}

/// An address as linked to one user through the junction table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAddress {
    pub address: Address,
    pub is_default: bool,
}

impl UserAddress {
    /// Read an address group that also carries the junction's
    /// `is_default_address` column.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            address: Address::from_group(group)?,
            is_default: group.get("is_default_address")?,
        })
    }
}

/// Input for registering a user, optionally with a first address.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    /// Stored and linked as the user's default address.
    pub address: Option<NewAddress>,
}

/// Editable profile fields.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
}

impl Aggregate for User {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        uuid_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}

impl Aggregate for UserAddress {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        uuid_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
