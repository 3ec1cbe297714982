//! Review repository.

use chrono::Utc;
use mercato_core::{ProductId, ReviewId};
use tracing::instrument;

use super::Page;
use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::Shape;
use crate::models::{NewReview, Review};
use crate::read::fetch_all;
use crate::unit_of_work::UnitOfWork;

const LIST_FOR_PRODUCT: &str = r"
SELECT id, product_id, user_id, rating, body, created_at
FROM shop.review
WHERE product_id = $1
ORDER BY created_at DESC, id
LIMIT $2 OFFSET $3
";

const INSERT: &str = r"
INSERT INTO shop.review (id, product_id, user_id, rating, body, created_at)
VALUES ($1, $2, $3, $4, $5, $6)
";

const RATINGS: std::ops::RangeInclusive<i16> = 1..=5;

/// Repository for product reviews.
pub struct ReviewRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> ReviewRepository<'a, D> {
    /// Create a new review repository.
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

    /// Reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        page: Page,
    ) -> Result<Vec<Review>, RepositoryError> {
        let stmt = Statement::new(LIST_FOR_PRODUCT)
            .bind(product_id)
            .bind(page.limit)
            .bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &Shape::flat("review")).await
    }

    /// Store a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a rating outside 1 to 5, a
    /// second review of the same product by the same user, or a missing
    /// product or user.
    #[instrument(skip(self, review), fields(product_id = %review.product_id, rating = review.rating))]
    pub async fn create(&self, review: NewReview) -> Result<Review, RepositoryError> {
        if !RATINGS.contains(&review.rating) {
            return Err(RepositoryError::Conflict(format!(
                "rating {} is outside 1..=5",
                review.rating
            )));
        }

        let id = ReviewId::generate();
        let created_at = Utc::now();

        UnitOfWork::new("create_review")
            .then(
                Statement::new(INSERT)
                    .bind(id)
                    .bind(review.product_id)
                    .bind(review.user_id)
                    .bind(review.rating)
                    .bind(review.body.as_deref())
                    .bind(created_at),
            )
            .run(self.db, &self.cancel)
            .await?;

        Ok(Review {
            id,
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating,
            body: review.body,
            created_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mercato_core::UserId;
    use uuid::Uuid;

    use super::*;
    use crate::row::{Row, columns};
    use crate::testing::{Failure, ScriptedDatabase};
    use crate::value::{Param, Value};

    fn new_review(rating: i16) -> NewReview {
        NewReview {
            product_id: ProductId::new(4),
            user_id: UserId::generate(),
            rating,
            body: Some("Smoky, a little sweet.".to_owned()),
        }
    }

    #[tokio::test]
    async fn test_list_binds_page() {
        let db = ScriptedDatabase::new();
        db.respond(
            "FROM shop.review",
            vec![Row::new(
                columns(["id", "product_id", "user_id", "rating", "body", "created_at"]),
                vec![
                    Value::Uuid(Uuid::new_v4()),
                    Value::Int(4),
                    Value::Uuid(Uuid::new_v4()),
                    Value::Int(5),
                    Value::Null,
                    Value::Timestamp(Utc.with_ymd_and_hms(2026, 1, 5, 8, 30, 0).unwrap()),
                ],
            )],
        );

        let reviews = ReviewRepository::new(&db)
            .list_for_product(ProductId::new(4), Page::new(10, 20))
            .await
            .unwrap();

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 5);
        assert!(reviews[0].body.is_none());
    }

    #[tokio::test]
    async fn test_create_binds_rating_as_smallint() {
        let db = ScriptedDatabase::new();
        let review = ReviewRepository::new(&db).create(new_review(4)).await.unwrap();

        let insert = &db.committed()[0];
        assert_eq!(insert.params()[0], Param::from(review.id));
        assert_eq!(insert.params()[3], Param::SmallInt(Some(4)));
    }

    #[tokio::test]
    async fn test_rating_out_of_range_never_writes() {
        let db = ScriptedDatabase::new();
        let repo = ReviewRepository::new(&db);
        for rating in [0, 6] {
            let err = repo.create(new_review(rating)).await.unwrap_err();
            assert!(matches!(err, RepositoryError::Conflict(_)));
        }
        assert!(db.events().is_empty());
    }

    #[tokio::test]
    async fn test_second_review_conflicts() {
        let db = ScriptedDatabase::new();
        db.fail_on("INSERT INTO shop.review", Failure::Conflict);
        let err = ReviewRepository::new(&db)
            .create(new_review(3))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(db.committed().is_empty());
    }
}
