//! Circulation API endpoints: borrow, list, return.
//!
//! Readers see their own records; librarians see everything. Borrow status
//! in responses is derived from the record's dates at serialization time.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::db::{
    self, actions, load_settings, resource_types, BorrowQuery, BorrowResponse,
    CirculationError, CreateBorrowRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::ApiError;
use super::validation::{validate_date, validate_uuid};

impl From<CirculationError> for ApiError {
    fn from(err: CirculationError) -> Self {
        match err {
            CirculationError::BookNotFound => ApiError::not_found("Book not found"),
            CirculationError::BorrowNotFound => ApiError::not_found("Borrow record not found"),
            CirculationError::BookUnavailable(status) => {
                ApiError::conflict(format!("Book is currently {}", status))
            }
            CirculationError::QuotaExceeded(limit) => ApiError::unprocessable(format!(
                "Borrow limit of {} books reached",
                limit
            )),
            CirculationError::AlreadyReturned => {
                ApiError::bad_request("Book already marked as returned.")
            }
            CirculationError::Database(e) => e.into(),
        }
    }
}

fn validate_query(query: &BorrowQuery) -> Result<(), ApiError> {
    if let Err(e) = validate_date(&query.start_date, "start_date") {
        return Err(ApiError::validation_field("start_date", e));
    }
    if let Err(e) = validate_date(&query.end_date, "end_date") {
        return Err(ApiError::validation_field("end_date", e));
    }
    Ok(())
}

/// List borrow records, scoped by role and an optional borrow-date range
pub async fn list_borrows(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<BorrowQuery>,
) -> Result<Json<Vec<BorrowResponse>>, ApiError> {
    validate_query(&query)?;

    let scope = if user.is_librarian() {
        None
    } else {
        Some(user.id.as_str())
    };
    let rows = db::list_borrows(&state.db, scope, &query).await?;

    let settings = load_settings(&state.db).await?;
    let today = chrono::Utc::now().date_naive();
    let records = rows
        .into_iter()
        .map(|row| row.into_response(today, settings.overdue_fine_per_day))
        .collect();

    Ok(Json(records))
}

/// Get a single borrow record (owner or librarian)
pub async fn get_borrow(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<BorrowResponse>, ApiError> {
    if let Err(e) = validate_uuid(&id, "borrow_id") {
        return Err(ApiError::validation_field("borrow_id", e));
    }

    let row = db::find_borrow_row(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Borrow record not found"))?;

    if !user.is_librarian() && row.user_id != user.id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    let settings = load_settings(&state.db).await?;
    let today = chrono::Utc::now().date_naive();
    Ok(Json(row.into_response(today, settings.overdue_fine_per_day)))
}

/// Borrow a book for the signed-in user
pub async fn create_borrow(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateBorrowRequest>,
) -> Result<(StatusCode, Json<BorrowResponse>), ApiError> {
    if let Err(e) = validate_uuid(&req.book_id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }

    let settings = load_settings(&state.db).await?;
    let borrow = db::create_borrow(&state.db, &user.id, &req.book_id, &settings).await?;

    tracing::info!(user = %user.email, book_id = %req.book_id, due = %borrow.due_date, "Book borrowed");

    let row = db::find_borrow_row(&state.db, &borrow.id)
        .await?
        .ok_or_else(|| ApiError::internal("Borrow record vanished after creation"))?;

    let today = chrono::Utc::now().date_naive();
    Ok((
        StatusCode::CREATED,
        Json(row.into_response(today, settings.overdue_fine_per_day)),
    ))
}

/// Return a borrowed book. The borrower may return their own loan; a
/// librarian may return anyone's. Routed from both `/borrows/:id/return`
/// and the legacy `/borrows/:id/mark_returned` spelling.
pub async fn return_borrow(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BorrowResponse>, ApiError> {
    if let Err(e) = validate_uuid(&id, "borrow_id") {
        return Err(ApiError::validation_field("borrow_id", e));
    }

    let row = db::find_borrow_row(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Borrow record not found"))?;

    if !user.is_librarian() && row.user_id != user.id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    let returned = db::return_borrow(&state.db, &id).await?;

    tracing::info!(borrow_id = %id, by = %user.email, "Book returned");

    // A librarian closing someone else's loan is an administrative action
    if user.is_librarian() && row.user_id != user.id {
        let ip = extract_client_ip(&headers, None);
        audit_log(
            &state,
            actions::BORROW_FORCE_RETURN,
            resource_types::BORROW,
            Some(&returned.id),
            Some(&row.book_title),
            Some(&user.id),
            ip.as_deref(),
            None,
        )
        .await;
    }

    let settings = load_settings(&state.db).await?;
    let today = chrono::Utc::now().date_naive();
    let row = db::find_borrow_row(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Borrow record not found"))?;
    Ok(Json(row.into_response(today, settings.overdue_fine_per_day)))
}
