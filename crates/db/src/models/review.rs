//! Product reviews.

use chrono::{DateTime, Utc};
use mercato_core::{ProductId, ReviewId, UserId};

use crate::hydrate::{Aggregate, Key, uuid_key};
use crate::row::{FieldGroup, HydrateError};

/// A user's review of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    /// 1 to 5.
    pub rating: i16,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Read a review from a group with columns
    /// `id, product_id, user_id, rating, body, created_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a column is missing or mistyped.
    pub fn from_group(group: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Ok(Self {
            id: group.get("id")?,
            product_id: group.get("product_id")?,
            user_id: group.get("user_id")?,
            rating: group.get("rating")?,
            body: group.get("body")?,
            created_at: group.get("created_at")?,
        })
    }
}

/// Input for creating a review.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: i16,
    pub body: Option<String>,
}

impl Aggregate for Review {
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
        uuid_key(root, "id")
    }

    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError> {
        Self::from_group(root)
    }
}
