//! Category and product repositories.

use mercato_core::{CategoryId, ProductId};
use tracing::instrument;

use super::{Page, reserve_id};
use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{Key, Shape, group_at, int_key};
use crate::models::{Category, NewCategory, NewProduct, Product};
use crate::read::{fetch_all, fetch_optional};
use crate::row::{FieldGroup, HydrateError};
use crate::unit_of_work::{Expect, UnitOfWork};

const GET_CATEGORY: &str = r"
SELECT c.id, c.name, c.description,
       p.id, p.category_id, p.code, p.name, p.price, p.currency, p.stock
FROM shop.category c
LEFT JOIN shop.product p ON p.category_id = c.id
WHERE c.id = $1
ORDER BY p.name, p.id
";

const LIST_CATEGORIES: &str = r"
SELECT id, name, description
FROM shop.category
ORDER BY name, id
LIMIT $1 OFFSET $2
";

const INSERT_CATEGORY: &str = r"
INSERT INTO shop.category (id, name, description)
VALUES ($1, $2, $3)
";

const DELETE_CATEGORY: &str = "DELETE FROM shop.category WHERE id = $1";

const GET_PRODUCT: &str = r"
SELECT id, category_id, code, name, price, currency, stock
FROM shop.product
WHERE id = $1
";

const LIST_PRODUCTS: &str = r"
SELECT id, category_id, code, name, price, currency, stock
FROM shop.product
WHERE category_id = $1
ORDER BY name, id
LIMIT $2 OFFSET $3
";

const INSERT_PRODUCT: &str = r"
INSERT INTO shop.product (id, category_id, code, name, price, currency, stock)
VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const UPDATE_STOCK: &str = "UPDATE shop.product SET stock = $1 WHERE id = $2";

fn product_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    int_key(group, "id")
}

fn attach_product(category: &mut Category, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    category
        .products
        .push(Product::from_group(group_at(groups, 1, "products")?)?);
    Ok(())
}

fn category_shape() -> Shape<Category> {
    Shape::joined("category", &["id"]).nest("products", 1, product_key, attach_product)
}

/// Repository for product categories.
pub struct CategoryRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> CategoryRepository<'a, D> {
    /// Create a new category repository.
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

    /// Get a category with its products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let stmt = Statement::new(GET_CATEGORY).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &category_shape()).await
    }

    /// List categories by name, without products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self))]
    pub async fn list(&self, page: Page) -> Result<Vec<Category>, RepositoryError> {
        let stmt = Statement::new(LIST_CATEGORIES)
            .bind(page.limit)
            .bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("category")).await
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    #[instrument(skip(self, category), fields(name = %category.name))]
    pub async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        let id = CategoryId::new(reserve_id(self.db, &self.cancel, "shop.category_id_seq").await?);

        UnitOfWork::new("create_category")
            .then(
                Statement::new(INSERT_CATEGORY)
                    .bind(id)
                    .bind(category.name.as_str())
                    .bind(category.description.as_deref()),
            )
            .run(self.db, &self.cancel)
            .await?;

        Ok(Category {
            id,
            name: category.name,
            description: category.description,
            products: Vec::new(),
        })
    }

    /// Delete an empty category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist, or
    /// `RepositoryError::Conflict` while products still belong to it.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        UnitOfWork::new("delete_category")
            .then_expect(Statement::new(DELETE_CATEGORY).bind(id), Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}

/// Repository for products.
pub struct ProductRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> ProductRepository<'a, D> {
    /// Create a new product repository.
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

    /// Get a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or the row does not decode.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let stmt = Statement::new(GET_PRODUCT).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &Shape::flat("product")).await
    }

    /// List the products of a category by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(category_id = %category_id))]
    pub async fn list_by_category(
        &self,
        category_id: CategoryId,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let stmt = Statement::new(LIST_PRODUCTS)
            .bind(category_id)
            .bind(page.limit)
            .bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("product")).await
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken or the
    /// category does not exist.
    #[instrument(skip(self, product), fields(code = %product.code))]
    pub async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let id = ProductId::new(reserve_id(self.db, &self.cancel, "shop.product_id_seq").await?);

        UnitOfWork::new("create_product")
            .then(
                Statement::new(INSERT_PRODUCT)
                    .bind(id)
                    .bind(product.category_id)
                    .bind(product.code.as_str())
                    .bind(product.name.as_str())
                    .bind(product.price.amount)
                    .bind(product.price.currency_code.as_str())
                    .bind(product.stock),
            )
            .run(self.db, &self.cancel)
            .await?;

        Ok(Product {
            id,
            category_id: product.category_id,
            code: product.code,
            name: product.name,
            price: product.price,
            stock: product.stock,
        })
    }

    /// Set a product's stock level.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist, or
    /// `RepositoryError::Conflict` for a negative level.
    #[instrument(skip(self), fields(product_id = %id, stock))]
    pub async fn update_stock(&self, id: ProductId, stock: i32) -> Result<(), RepositoryError> {
        UnitOfWork::new("update_stock")
            .then_expect(
                Statement::new(UPDATE_STOCK).bind(stock).bind(id),
                Expect::Exactly(1),
            )
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}
