//! Per-book review models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Review joined with the reviewer's public name for display.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewJoinRow {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
    pub updated_at: String,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i64,
    pub comment: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub async fn list_reviews_for_book(
    pool: &SqlitePool,
    book_id: &str,
) -> Result<Vec<ReviewJoinRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT r.id, r.book_id, r.user_id, r.rating, r.comment, r.created_at, r.updated_at, \
         u.name AS user_name \
         FROM reviews r JOIN users u ON u.id = r.user_id \
         WHERE r.book_id = ? ORDER BY r.created_at DESC",
    )
    .bind(book_id)
    .fetch_all(pool)
    .await
}

pub async fn find_review(pool: &SqlitePool, id: &str) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM reviews WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}
