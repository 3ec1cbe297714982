//! Integration tests for Mercato.
//!
//! # Running Tests
//!
//! ```bash
//! # Scripted-driver tests only
//! cargo test -p mercato-integration-tests
//!
//! # Including PostgreSQL tests (migrations are applied automatically)
//! TEST_DATABASE_URL=postgres://localhost/mercato_test cargo test -p mercato-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `repositories` - Cross-repository behavior on the scripted driver
//! - `postgres` - End-to-end reads and writes; skipped without `TEST_DATABASE_URL`

use mercato_core::{CategoryId, CountryId, CurrencyCode, Email, Price};
use mercato_db::models::{NewAddress, NewCategory, NewProduct, NewUser, Product, User};
use mercato_db::repositories::{CategoryRepository, ProductRepository, UserRepository};
use mercato_db::{DatabaseConfig, PgDatabase, run_migrations};
use secrecy::SecretString;
use uuid::Uuid;

/// Environment variable naming the test database.
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Connect to the test database and apply migrations, or `None` when
/// `TEST_DATABASE_URL` is unset.
///
/// # Panics
///
/// Panics if the database is configured but unreachable, or a migration fails.
pub async fn postgres() -> Option<PgDatabase> {
    let url = std::env::var(TEST_DATABASE_URL).ok()?;
    let mut config = DatabaseConfig::new(SecretString::from(url));
    config.max_connections = 4;
    config.min_connections = 0;

    let db = PgDatabase::connect(&config)
        .await
        .expect("test database unreachable");
    run_migrations(db.pool()).await.expect("migrations failed");
    Some(db)
}

/// A short random suffix for unique names.
#[must_use]
pub fn unique() -> String {
    Uuid::new_v4().simple().to_string().chars().take(10).collect()
}

/// The shared test country, created on first use.
///
/// # Panics
///
/// Panics on a database error.
pub async fn test_country(db: &PgDatabase) -> CountryId {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO shop.country (iso2, iso3, name) VALUES ('ZZ', 'ZZZ', 'Testland') \
         ON CONFLICT (iso2) DO UPDATE SET name = EXCLUDED.name RETURNING id",
    )
    .fetch_one(db.pool())
    .await
    .expect("test country");
    CountryId::new(id)
}

/// An address in the test country.
#[must_use]
pub fn new_address(country_id: CountryId, street: &str) -> NewAddress {
    NewAddress {
        street: street.to_owned(),
        city: "Testville".to_owned(),
        region: None,
        zip: "0000".to_owned(),
        country_id,
    }
}

/// Register a user with a unique username and, optionally, a first address.
///
/// # Panics
///
/// Panics on a database error.
pub async fn test_user(db: &PgDatabase, address: Option<NewAddress>) -> User {
    let name = format!("user{}", unique());
    UserRepository::new(db)
        .create(NewUser {
            email: Email::parse(&format!("{name}@example.com")).expect("valid email"),
            username: name,
            first_name: "Test".to_owned(),
            last_name: "User".to_owned(),
            password_hash: "$argon2id$v=19$test".to_owned(),
            address,
        })
        .await
        .expect("create user")
}

/// A fresh category holding one product per price (in euro cents).
///
/// # Panics
///
/// Panics on a database error.
pub async fn test_products(db: &PgDatabase, prices: &[i64]) -> (CategoryId, Vec<Product>) {
    let category = CategoryRepository::new(db)
        .create(NewCategory {
            name: format!("category-{}", unique()),
            description: None,
        })
        .await
        .expect("create category");

    let repo = ProductRepository::new(db);
    let mut products = Vec::with_capacity(prices.len());
    for cents in prices {
        let product = repo
            .create(NewProduct {
                category_id: category.id,
                code: format!("SKU-{}", unique()),
                name: format!("Product {cents}"),
                price: Price::from_cents(*cents, CurrencyCode::EUR),
                stock: 10,
            })
            .await
            .expect("create product");
        products.push(product);
    }
    (category.id, products)
}
