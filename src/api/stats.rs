//! Dashboard statistics endpoints.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::db::{self, today_string, LibraryStats, User, UserStats};
use crate::AppState;

use super::auth::require_librarian;
use super::error::ApiError;

/// Library-wide aggregates (librarian only)
pub async fn library_stats(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<LibraryStats>, ApiError> {
    require_librarian(&user)?;
    let stats = db::library_stats(&state.db, &today_string()).await?;
    Ok(Json(stats))
}

/// Aggregates for the signed-in user
pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<UserStats>, ApiError> {
    let stats = db::user_stats(&state.db, &user.id).await?;
    Ok(Json(stats))
}
