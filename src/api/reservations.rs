//! Reservation API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{
    self, load_settings, CreateReservationRequest, Reservation, ReservationError,
    ReservationJoinRow, User,
};
use crate::AppState;

use super::error::ApiError;
use super::validation::validate_uuid;

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::BookNotFound => ApiError::not_found("Book not found"),
            ReservationError::NotFound => ApiError::not_found("Reservation not found"),
            ReservationError::Duplicate => {
                ApiError::conflict("You already have a pending reservation for this book")
            }
            ReservationError::QuotaExceeded(limit) => ApiError::unprocessable(format!(
                "Reservation limit of {} books reached",
                limit
            )),
            ReservationError::NotPending => {
                ApiError::bad_request("Only pending reservations can be cancelled")
            }
            ReservationError::Database(e) => e.into(),
        }
    }
}

/// List reservations, scoped by role
pub async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<ReservationJoinRow>>, ApiError> {
    let scope = if user.is_librarian() {
        None
    } else {
        Some(user.id.as_str())
    };
    let reservations = db::list_reservations(&state.db, scope).await?;
    Ok(Json(reservations))
}

/// Place a reservation for the signed-in user
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    if let Err(e) = validate_uuid(&req.book_id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }

    let settings = load_settings(&state.db).await?;
    let reservation = db::create_reservation(
        &state.db,
        &user.id,
        &req.book_id,
        settings.max_reserve_books,
        settings.reserve_expiry_days,
    )
    .await?;

    tracing::info!(user = %user.email, book_id = %req.book_id, "Reservation placed");

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Cancel a pending reservation (owner or librarian)
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, ApiError> {
    if let Err(e) = validate_uuid(&id, "reservation_id") {
        return Err(ApiError::validation_field("reservation_id", e));
    }

    let reservation = db::find_reservation(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reservation not found"))?;

    if !user.is_librarian() && reservation.user_id != user.id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    let cancelled = db::cancel_reservation(&state.db, &id).await?;

    tracing::info!(reservation_id = %id, by = %user.email, "Reservation cancelled");

    Ok(Json(cancelled))
}
