//! Seed reference data from a YAML file.
//!
//! ```yaml
//! countries:
//!   - { iso2: PT, iso3: PRT, name: Portugal }
//! categories:
//!   - name: Teas
//!     description: Loose leaf
//!     products:
//!       - { code: TEA-001, name: Sencha, price_cents: 1250, currency: EUR, stock: 40 }
//! payment_providers:
//!   - { name: Stripe, active: true }
//! ```
//!
//! Rows that already exist (a unique-key conflict) are skipped, so seeding
//! the same file twice is harmless.

use std::collections::HashSet;

use mercato_core::{CategoryId, CurrencyCode, Price};
use mercato_db::models::{NewCategory, NewCountry, NewPaymentProvider, NewProduct};
use mercato_db::repositories::{
    CategoryRepository, CountryRepository, PaymentProviderRepository, ProductRepository,
};
use mercato_db::{Database, RepositoryError};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{CliError, connect};

/// Top-level layout of a seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub countries: Vec<CountrySeed>,
    pub categories: Vec<CategorySeed>,
    pub payment_providers: Vec<ProviderSeed>,
}

#[derive(Debug, Deserialize)]
pub struct CountrySeed {
    pub iso2: String,
    pub iso3: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct ProviderSeed {
    pub name: String,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

const fn active_by_default() -> bool {
    true
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
}

impl SeedSummary {
    /// Count a create result. A conflict means the row exists already.
    fn record<T>(
        &mut self,
        kind: &str,
        key: &str,
        result: Result<T, RepositoryError>,
    ) -> Result<Option<T>, RepositoryError> {
        match result {
            Ok(value) => {
                self.inserted += 1;
                Ok(Some(value))
            }
            Err(RepositoryError::Conflict(reason)) => {
                warn!(kind, key, %reason, "Skipping existing row");
                self.skipped += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Check a parsed seed file, returning one message per problem.
#[must_use]
pub fn validate(seed: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();

    let mut iso2 = HashSet::new();
    let mut iso3 = HashSet::new();
    for country in &seed.countries {
        if country.name.trim().is_empty() {
            errors.push(format!("country {}: empty name", country.iso2));
        }
        if country.iso2.len() != 2 || !country.iso2.chars().all(|c| c.is_ascii_uppercase()) {
            errors.push(format!("country {}: iso2 must be two uppercase letters", country.name));
        }
        if country.iso3.len() != 3 || !country.iso3.chars().all(|c| c.is_ascii_uppercase()) {
            errors.push(format!("country {}: iso3 must be three uppercase letters", country.name));
        }
        if !iso2.insert(country.iso2.as_str()) {
            errors.push(format!("country {}: duplicate iso2 {}", country.name, country.iso2));
        }
        if !iso3.insert(country.iso3.as_str()) {
            errors.push(format!("country {}: duplicate iso3 {}", country.name, country.iso3));
        }
    }

    let mut categories = HashSet::new();
    let mut codes = HashSet::new();
    for category in &seed.categories {
        if category.name.trim().is_empty() {
            errors.push("category with an empty name".to_owned());
        } else if !categories.insert(category.name.trim()) {
            errors.push(format!("category {}: duplicate name", category.name));
        }
        for product in &category.products {
            if product.price_cents < 0 {
                errors.push(format!("product {}: negative price", product.code));
            }
            if product.stock < 0 {
                errors.push(format!("product {}: negative stock", product.code));
            }
            if !codes.insert(product.code.as_str()) {
                errors.push(format!("product {}: duplicate code", product.code));
            }
        }
    }

    let mut providers = HashSet::new();
    for provider in &seed.payment_providers {
        if provider.name.trim().is_empty() {
            errors.push("payment provider with an empty name".to_owned());
        } else if !providers.insert(provider.name.trim()) {
            errors.push(format!("payment provider {}: duplicate name", provider.name));
        }
    }

    errors
}

async fn load(file_path: &str) -> Result<SeedFile, CliError> {
    info!(path = %file_path, "Loading seed file");
    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|source| CliError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CliError::Validation(errors.len()));
    }

    info!(
        countries = seed.countries.len(),
        categories = seed.categories.len(),
        providers = seed.payment_providers.len(),
        "Seed file validated"
    );
    Ok(seed)
}

/// Parse and validate a seed file without touching the database.
pub async fn check(file_path: &str) -> Result<(), CliError> {
    load(file_path).await.map(|_| ())
}

/// Seed the database from a YAML file.
pub async fn run(file_path: &str) -> Result<(), CliError> {
    let seed = load(file_path).await?;
    let db = connect().await?;

    let summary = apply(&db, seed).await?;

    info!("Seeding complete!");
    info!("  Rows inserted: {}", summary.inserted);
    info!("  Rows skipped (already exist): {}", summary.skipped);
    Ok(())
}

/// Write every row of `seed`, skipping rows that already exist.
///
/// Products of a category that already exists are skipped with it.
pub async fn apply<D: Database>(db: &D, seed: SeedFile) -> Result<SeedSummary, RepositoryError> {
    let mut summary = SeedSummary::default();

    let countries = CountryRepository::new(db);
    for country in seed.countries {
        let key = country.iso2.clone();
        let result = countries
            .create(NewCountry {
                iso2: country.iso2,
                iso3: country.iso3,
                name: country.name,
            })
            .await;
        summary.record("country", &key, result)?;
    }

    let categories = CategoryRepository::new(db);
    let products = ProductRepository::new(db);
    for category in seed.categories {
        let name = category.name.clone();
        let result = categories
            .create(NewCategory {
                name: category.name,
                description: category.description,
            })
            .await;
        let Some(created) = summary.record("category", &name, result)? else {
            summary.skipped += category.products.len();
            continue;
        };
        seed_products(&products, created.id, category.products, &mut summary).await?;
    }

    let providers = PaymentProviderRepository::new(db);
    for provider in seed.payment_providers {
        let name = provider.name.clone();
        let result = providers
            .create(NewPaymentProvider {
                name: provider.name,
                active: provider.active,
            })
            .await;
        summary.record("payment_provider", &name, result)?;
    }

    Ok(summary)
}

async fn seed_products<D: Database>(
    repo: &ProductRepository<'_, D>,
    category_id: CategoryId,
    products: Vec<ProductSeed>,
    summary: &mut SeedSummary,
) -> Result<(), RepositoryError> {
    for product in products {
        let code = product.code.clone();
        let result = repo
            .create(NewProduct {
                category_id,
                code: product.code,
                name: product.name,
                price: Price::from_cents(product.price_cents, product.currency),
                stock: product.stock,
            })
            .await;
        summary.record("product", &code, result)?;
    }
    Ok(())
}
