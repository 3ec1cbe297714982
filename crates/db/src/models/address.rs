//! Postal addresses.
//!
//! An address belongs to no aggregate on its own. Users reach theirs through
//! the `user_address` junction; countries reach theirs through the
//! `country_id` reference.

use mercato_core::{AddressId, CountryId};

use super::Country;
use crate::hydrate::{Aggregate, Key, uuid_key};
use crate::row::{FieldGroup, HydrateError};

/// A stored address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub id: AddressId,
    pub street: String,
    pub city: String,
    pub region: Option<String>,
    pub zip: String,
    pub country_id: CountryId,
    /// The referenced country, when the read joined it.
    pub country: Option<Country>,
}

impl Address {
    /// Read an address from a group with columns
    /// `id, street, city, region, zip, country_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            street: group.get("street")?,
            city: group.get("city")?,
            region: group.get("region")?,
            zip: group.get("zip")?,
            country_id: group.get("country_id")?,
            country: None,
        })
    }

    /// The address a [`NewAddress`] becomes once stored under `id`.
    #[must_use]
    pub fn from_new(id: AddressId, new: NewAddress) -> Self {
        Self {
            id,
            street: new.street,
            city: new.city,
            region: new.region,
            zip: new.zip,
            country_id: new.country_id,
            country: None,
        }
    }
}

/// Input for creating an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub street: String,
    pub city: String,
    pub region: Option<String>,
    pub zip: String,
    pub country_id: CountryId,
}

impl Aggregate for Address {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        uuid_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
