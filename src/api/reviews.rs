//! Per-book review API endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    self, actions, find_book, find_review, resource_types, CreateReviewRequest, Review,
    ReviewJoinRow, UpdateReviewRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_comment, validate_rating, validate_uuid};

/// List reviews for a book. Public.
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<ReviewJoinRow>>, ApiError> {
    if let Err(e) = validate_uuid(&book_id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }

    find_book(&state.db, &book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    let reviews = db::list_reviews_for_book(&state.db, &book_id).await?;
    Ok(Json(reviews))
}

/// Post a review of a book
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(book_id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    if let Err(e) = validate_uuid(&book_id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_rating(req.rating) {
        errors.add("rating", &e);
    }
    if let Err(e) = validate_comment(&req.comment) {
        errors.add("comment", &e);
    }
    errors.finish()?;

    find_book(&state.db, &book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO reviews (id, book_id, user_id, rating, comment, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&book_id)
    .bind(&user.id)
    .bind(req.rating)
    .bind(&req.comment)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let review: Review = sqlx::query_as("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

/// Edit a review (author or librarian)
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Path((book_id, review_id)): Path<(String, String)>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    if let Err(e) = validate_uuid(&review_id, "review_id") {
        return Err(ApiError::validation_field("review_id", e));
    }

    let mut errors = ValidationErrorBuilder::new();
    if let Some(rating) = req.rating {
        if let Err(e) = validate_rating(rating) {
            errors.add("rating", &e);
        }
    }
    if let Some(ref comment) = req.comment {
        if let Err(e) = validate_comment(comment) {
            errors.add("comment", &e);
        }
    }
    errors.finish()?;

    let review = find_review(&state.db, &review_id)
        .await?
        .filter(|r| r.book_id == book_id)
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    if !user.is_librarian() && review.user_id != user.id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    sqlx::query(
        "UPDATE reviews SET \
            rating = COALESCE(?, rating), \
            comment = COALESCE(?, comment), \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(req.rating)
    .bind(&req.comment)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&review_id)
    .execute(&state.db)
    .await?;

    let updated: Review = sqlx::query_as("SELECT * FROM reviews WHERE id = ?")
        .bind(&review_id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(updated))
}

/// Delete a review (author or librarian)
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path((book_id, review_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = validate_uuid(&review_id, "review_id") {
        return Err(ApiError::validation_field("review_id", e));
    }

    let review = find_review(&state.db, &review_id)
        .await?
        .filter(|r| r.book_id == book_id)
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    if !user.is_librarian() && review.user_id != user.id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(&review_id)
        .execute(&state.db)
        .await?;

    // Moderation by a librarian is worth an audit trail entry
    if user.is_librarian() && review.user_id != user.id {
        let ip = extract_client_ip(&headers, None);
        audit_log(
            &state,
            actions::REVIEW_DELETE,
            resource_types::REVIEW,
            Some(&review_id),
            None,
            Some(&user.id),
            ip.as_deref(),
            None,
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}
