//! Country repository.

use mercato_core::CountryId;
use tracing::instrument;

use super::{Page, reserve_id};
use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{Key, Shape, group_at, uuid_key};
use crate::models::{Address, Country, NewCountry};
use crate::read::{fetch_all, fetch_optional};
use crate::row::{FieldGroup, HydrateError};
use crate::unit_of_work::{Expect, UnitOfWork};

const GET: &str = r"
SELECT c.id, c.iso2, c.iso3, c.name,
       a.id, a.street, a.city, a.region, a.zip, a.country_id
FROM shop.country c
LEFT JOIN shop.address a ON a.country_id = c.id
WHERE c.id = $1
ORDER BY a.city, a.id
";

const LIST: &str = r"
SELECT id, iso2, iso3, name
FROM shop.country
ORDER BY name, id
LIMIT $1 OFFSET $2
";

const INSERT: &str = r"
INSERT INTO shop.country (id, iso2, iso3, name)
VALUES ($1, $2, $3, $4)
";

const DELETE: &str = "DELETE FROM shop.country WHERE id = $1";

fn address_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    uuid_key(group, "id")
}

fn attach_address(country: &mut Country, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    country
        .addresses
        .push(Address::from_group(group_at(groups, 1, "addresses")?)?);
    Ok(())
}

fn country_shape() -> Shape<Country> {
    Shape::joined("country", &["id"]).nest("addresses", 1, address_key, attach_address)
}

/// Repository for countries.
pub struct CountryRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> CountryRepository<'a, D> {
    /// Create a new country repository.
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

    /// Get a country with every address that references it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(country_id = %id))]
    pub async fn get(&self, id: CountryId) -> Result<Option<Country>, RepositoryError> {
        let stmt = Statement::new(GET).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &country_shape()).await
    }

    /// List countries by name, without addresses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self))]
    pub async fn list(&self, page: Page) -> Result<Vec<Country>, RepositoryError> {
        let stmt = Statement::new(LIST).bind(page.limit).bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("country")).await
    }

    /// Create a country.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if either ISO code is taken.
    #[instrument(skip(self, country), fields(iso2 = %country.iso2))]
    pub async fn create(&self, country: NewCountry) -> Result<Country, RepositoryError> {
        let id = CountryId::new(reserve_id(self.db, &self.cancel, "shop.country_id_seq").await?);

        UnitOfWork::new("create_country")
            .then(
                Statement::new(INSERT)
                    .bind(id)
                    .bind(country.iso2.as_str())
                    .bind(country.iso3.as_str())
                    .bind(country.name.as_str()),
            )
            .run(self.db, &self.cancel)
            .await?;

        Ok(Country {
            id,
            iso2: country.iso2,
            iso3: country.iso3,
            name: country.name,
            addresses: Vec::new(),
        })
    }

    /// Delete a country.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist, or
    /// `RepositoryError::Conflict` while addresses still reference it.
    #[instrument(skip(self), fields(country_id = %id))]
    pub async fn delete(&self, id: CountryId) -> Result<(), RepositoryError> {
        UnitOfWork::new("delete_country")
            .then_expect(Statement::new(DELETE).bind(id), Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}
