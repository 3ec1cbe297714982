//! Countries.

use mercato_core::CountryId;

use super::Address;
use crate::hydrate::{Aggregate, Key, int_key};
use crate::row::{FieldGroup, HydrateError};

/// A country and, when loaded through its join, the addresses in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub id: CountryId,
    /// ISO 3166-1 alpha-2 code.
    pub iso2: String,
    /// ISO 3166-1 alpha-3 code.
    pub iso3: String,
    pub name: String,
    /// Addresses referencing this country. Empty unless the read joined them.
    pub addresses: Vec<Address>,
}

impl Country {
    /// Read a country from a group with columns `id, iso2, iso3, name`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            iso2: group.get("iso2")?,
            iso3: group.get("iso3")?,
            name: group.get("name")?,
            addresses: Vec::new(),
        })
    }
}

/// Input for creating a country.
#[derive(Debug, Clone)]
pub struct NewCountry {
    pub iso2: String,
    pub iso3: String,
    pub name: String,
}

impl Aggregate for Country {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        int_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
