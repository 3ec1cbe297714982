//! Address repository.
//!
//! Addresses are linked to users through `shop.user_address`. Every write
//! that touches an address and its junction row runs as one unit of work, so
//! a reader never sees an address without its link or a link to a missing
//! address.

use mercato_core::{AddressId, UserId};
use tracing::{instrument, warn};

use super::Page;
use crate::cancel::CancelSignal;
use crate::connection::{Connection, Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{Key, Shape, group_at, int_key};
use crate::models::{Address, Country, NewAddress, UserAddress};
use crate::read::{fetch_all, fetch_optional};
use crate::row::{FieldGroup, HydrateError};
use crate::unit_of_work::{Expect, ScopedTransaction, UnitOfWork};

const GET: &str = r"
SELECT a.id, a.street, a.city, a.region, a.zip, a.country_id,
       c.id, c.iso2, c.iso3, c.name
FROM shop.address a
LEFT JOIN shop.country c ON c.id = a.country_id
WHERE a.id = $1
";

const LIST_FOR_USER: &str = r"
SELECT a.id, a.street, a.city, a.region, a.zip, a.country_id,
       ua.is_default AS is_default_address,
       c.id, c.iso2, c.iso3, c.name
FROM shop.user_address ua
JOIN shop.address a ON a.id = ua.address_id
LEFT JOIN shop.country c ON c.id = a.country_id
WHERE ua.user_id = $1
ORDER BY ua.is_default DESC, a.city, a.id
LIMIT $2 OFFSET $3
";

pub(super) const INSERT_ADDRESS: &str = r"
INSERT INTO shop.address (id, street, city, region, zip, country_id)
VALUES ($1, $2, $3, $4, $5, $6)
";

pub(super) const INSERT_LINK: &str = r"
INSERT INTO shop.user_address (user_id, address_id, is_default)
VALUES ($1, $2, $3)
";

const CLEAR_DEFAULT: &str = r"
UPDATE shop.user_address SET is_default = FALSE
WHERE user_id = $1 AND is_default
";

const LOCK_LINK: &str = r"
SELECT is_default FROM shop.user_address
WHERE user_id = $1 AND address_id = $2
FOR UPDATE
";

const DELETE_LINK: &str = r"
DELETE FROM shop.user_address
WHERE user_id = $1 AND address_id = $2
";

/// Deletes an address once nothing references it any more.
const DELETE_ORPHAN: &str = r"
DELETE FROM shop.address a
WHERE a.id = $1
  AND NOT EXISTS (SELECT 1 FROM shop.user_address ua WHERE ua.address_id = a.id)
  AND NOT EXISTS (SELECT 1 FROM shop.orders o WHERE o.address_id = a.id)
";

fn country_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    int_key(group, "id")
}

fn attach_country(address: &mut Address, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    address.country = Some(Country::from_group(group_at(groups, 1, "country")?)?);
    Ok(())
}

fn attach_linked_country(
    link: &mut UserAddress,
    groups: &[FieldGroup<'_>],
) -> Result<(), HydrateError> {
    attach_country(&mut link.address, groups)
}

fn address_shape() -> Shape<Address> {
    Shape::joined("address", &["id"]).nest("country", 1, country_key, attach_country)
}

fn user_address_shape() -> Shape<UserAddress> {
    Shape::joined("user_address", &["id"]).nest("country", 1, country_key, attach_linked_country)
}

/// Statement inserting `address` under `id`.
pub(super) fn insert_address(id: AddressId, address: &NewAddress) -> Statement {
    Statement::new(INSERT_ADDRESS)
        .bind(id)
        .bind(address.street.as_str())
        .bind(address.city.as_str())
        .bind(address.region.as_deref())
        .bind(address.zip.as_str())
        .bind(address.country_id)
}

/// Statement linking `address_id` to `user_id`.
pub(super) fn insert_link(user_id: UserId, address_id: AddressId, is_default: bool) -> Statement {
    Statement::new(INSERT_LINK)
        .bind(user_id)
        .bind(address_id)
        .bind(is_default)
}

/// Repository for addresses and their user links.
pub struct AddressRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> AddressRepository<'a, D> {
    /// Create a new address repository.
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

    /// Get an address with its country.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn get(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let stmt = Statement::new(GET).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &address_shape()).await
    }

    /// List a user's addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<UserAddress>, RepositoryError> {
        let stmt = Statement::new(LIST_FOR_USER)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &user_address_shape()).await
    }

    /// Store a new address and link it to a user in one transaction.
    ///
    /// When `is_default` is set, the user's previous default is cleared in
    /// the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user or country does not
    /// exist. Nothing is written in that case.
    #[instrument(skip(self, address), fields(user_id = %user_id))]
    pub async fn create_for_user(
        &self,
        user_id: UserId,
        address: NewAddress,
        is_default: bool,
    ) -> Result<UserAddress, RepositoryError> {
        let id = AddressId::generate();

        let mut unit = UnitOfWork::new("create_address").then(insert_address(id, &address));
        if is_default {
            unit = unit.then(Statement::new(CLEAR_DEFAULT).bind(user_id));
        }
        unit.then(insert_link(user_id, id, is_default))
            .run(self.db, &self.cancel)
            .await?;

        Ok(UserAddress {
            address: Address::from_new(id, address),
            is_default,
        })
    }

    /// Replace one of a user's addresses with a new one.
    ///
    /// The old address row is left untouched (orders may still point at it);
    /// a new row is inserted and the user's link moves to it, keeping the
    /// default flag. All of it happens in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `old` is not linked to the
    /// user, or `RepositoryError::Conflict` on a constraint violation.
    #[instrument(skip(self, address), fields(user_id = %user_id, old_address_id = %old))]
    pub async fn replace_for_user(
        &self,
        user_id: UserId,
        old: AddressId,
        address: NewAddress,
    ) -> Result<UserAddress, RepositoryError> {
        let id = AddressId::generate();
        let mut conn = self.cancel.guard(self.db.acquire()).await?;

        let result = async {
            let mut tx = ScopedTransaction::begin(&mut conn, &self.cancel, "replace_address").await?;
            let outcome = async {
                let rows = tx
                    .query(&Statement::new(LOCK_LINK).bind(user_id).bind(old))
                    .await?;
                let is_default: bool = rows
                    .first()
                    .ok_or(RepositoryError::NotFound)?
                    .get("is_default")?;

                tx.execute(&insert_address(id, &address)).await?;
                tx.execute(&Statement::new(DELETE_LINK).bind(user_id).bind(old))
                    .await?;
                tx.execute(&insert_link(user_id, id, is_default)).await?;
                Ok::<_, RepositoryError>(is_default)
            }
            .await;
            tx.finish(outcome).await
        }
        .await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "failed to release connection");
        }

        Ok(UserAddress {
            address: Address::from_new(id, address),
            is_default: result?,
        })
    }

    /// Unlink an address from a user, deleting the address itself when no
    /// other user or order references it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address is not linked to
    /// the user.
    #[instrument(skip(self), fields(user_id = %user_id, address_id = %address_id))]
    pub async fn remove_from_user(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<(), RepositoryError> {
        UnitOfWork::new("remove_address")
            .then_expect(
                Statement::new(DELETE_LINK).bind(user_id).bind(address_id),
                Expect::Exactly(1),
            )
            .then(Statement::new(DELETE_ORPHAN).bind(address_id))
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use mercato_core::CountryId;

    use super::*;
    use crate::row::{Row, columns};
    use crate::testing::{Event, Failure, ScriptedDatabase};
    use crate::value::{Param, Value};

    fn new_address() -> NewAddress {
        NewAddress {
            street: "Keizersgracht 1".to_owned(),
            city: "Amsterdam".to_owned(),
            region: None,
            zip: "1015 CJ".to_owned(),
            country_id: CountryId::new(1),
        }
    }

    fn address_row(id: AddressId, country: Option<i64>) -> Row {
        let country_cells = country.map_or_else(
            || vec![Value::Null; 4],
            |c| {
                vec![
                    Value::Int(c),
                    Value::Text("NL".to_owned()),
                    Value::Text("NLD".to_owned()),
                    Value::Text("Netherlands".to_owned()),
                ]
            },
        );
        let mut values = vec![
            Value::Uuid(id.as_uuid()),
            Value::Text("Keizersgracht 1".to_owned()),
            Value::Text("Amsterdam".to_owned()),
            Value::Null,
            Value::Text("1015 CJ".to_owned()),
            Value::Int(1),
        ];
        values.extend(country_cells);
        Row::new(
            columns([
                "id", "street", "city", "region", "zip", "country_id", "id", "iso2", "iso3", "name",
            ]),
            values,
        )
    }

    #[tokio::test]
    async fn test_get_embeds_country() {
        let db = ScriptedDatabase::new();
        let id = AddressId::generate();
        db.respond("FROM shop.address a", vec![address_row(id, Some(1))]);

        let address = AddressRepository::new(&db).get(id).await.unwrap().unwrap();
        assert_eq!(address.id, id);
        assert_eq!(address.region, None);
        assert_eq!(address.country.unwrap().iso3, "NLD");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let db = ScriptedDatabase::new();
        let found = AddressRepository::new(&db)
            .get(AddressId::generate())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_create_for_user_writes_address_then_link() {
        let db = ScriptedDatabase::new();
        let user = UserId::generate();

        let created = AddressRepository::new(&db)
            .create_for_user(user, new_address(), false)
            .await
            .unwrap();

        let committed = db.committed();
        assert_eq!(committed.len(), 2);
        assert!(committed[0].sql().contains("INSERT INTO shop.address"));
        assert!(committed[1].sql().contains("INSERT INTO shop.user_address"));
        assert_eq!(committed[1].params()[1], Param::from(created.address.id));
    }

    #[tokio::test]
    async fn test_default_address_clears_previous_default() {
        let db = ScriptedDatabase::new();
        AddressRepository::new(&db)
            .create_for_user(UserId::generate(), new_address(), true)
            .await
            .unwrap();
        assert_eq!(db.committed_matching("SET is_default = FALSE").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_link_leaves_no_address() {
        let db = ScriptedDatabase::new();
        db.fail_on("INSERT INTO shop.user_address", Failure::Conflict);

        let err = AddressRepository::new(&db)
            .create_for_user(UserId::generate(), new_address(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(db.committed_matching("INSERT INTO shop.address").is_empty());
        assert!(db.events().contains(&Event::Rollback));
    }

    #[tokio::test]
    async fn test_replace_moves_link_and_keeps_default() {
        let db = ScriptedDatabase::new();
        db.respond(
            "FOR UPDATE",
            vec![Row::new(columns(["is_default"]), vec![Value::Bool(true)])],
        );
        let user = UserId::generate();
        let old = AddressId::generate();

        let replaced = AddressRepository::new(&db)
            .replace_for_user(user, old, new_address())
            .await
            .unwrap();

        assert!(replaced.is_default);
        assert_ne!(replaced.address.id, old);
        let committed = db.committed();
        assert_eq!(committed.len(), 3);
        assert!(committed[0].sql().contains("INSERT INTO shop.address"));
        assert!(committed[1].sql().contains("DELETE FROM shop.user_address"));
        assert!(committed[2].sql().contains("INSERT INTO shop.user_address"));
        assert_eq!(db.events().last(), Some(&Event::Close));
    }

    #[tokio::test]
    async fn test_replace_unlinked_address_is_not_found() {
        let db = ScriptedDatabase::new();
        let err = AddressRepository::new(&db)
            .replace_for_user(UserId::generate(), AddressId::generate(), new_address())
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::NotFound));
        assert!(db.committed().is_empty());
        assert!(db.events().contains(&Event::Rollback));
    }

    #[tokio::test]
    async fn test_remove_requires_existing_link() {
        let db = ScriptedDatabase::new();
        db.affect("DELETE FROM shop.user_address", 0);

        let err = AddressRepository::new(&db)
            .remove_from_user(UserId::generate(), AddressId::generate())
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::NotFound));
        assert!(db.committed().is_empty());
    }
}
