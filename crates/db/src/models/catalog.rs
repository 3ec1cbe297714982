//! Categories and products.

use mercato_core::{CategoryId, Price, ProductId};

use crate::hydrate::{Aggregate, Key, int_key};
use crate::row::{FieldGroup, HydrateError};

/// A product category and, when joined, its products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub products: Vec<Product>,
}

impl Category {
    /// Read a category from a group with columns `id, name, description`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            name: group.get("name")?,
            description: group.get("description")?,
            products: Vec::new(),
        })
    }
}

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    /// Internal stock-keeping code, unique across the catalog.
    pub code: String,
    pub name: String,
    pub price: Price,
    pub stock: i32,
}

impl Product {
    /// Read a product from a group with columns
    /// `id, category_id, code, name, price, currency, stock`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing, mistyped, or the
    /// currency is unknown.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            category_id: group.get("category_id")?,
            code: group.get("code")?,
            name: group.get("name")?,
            price: super::price(group, "price", "currency")?,
            stock: group.get("stock")?,
        })
    }
}

/// Input for creating a category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub category_id: CategoryId,
    pub code: String,
    pub name: String,
    pub price: Price,
    pub stock: i32,
}

impl Aggregate for Category {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        int_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}

impl Aggregate for Product {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        int_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
