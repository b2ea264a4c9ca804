//! System settings endpoints.

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::db::{
    self, actions, resource_types, SystemSettings, UpdateSettingsRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::require_librarian;
use super::error::{ApiError, ValidationErrorBuilder};

fn validate_update_request(req: &UpdateSettingsRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if matches!(req.max_borrow_days, Some(v) if v < 1) {
        errors.add("max_borrow_days", "Must be at least 1");
    }
    if matches!(req.max_borrow_books, Some(v) if v < 1) {
        errors.add("max_borrow_books", "Must be at least 1");
    }
    if matches!(req.max_reserve_books, Some(v) if v < 1) {
        errors.add("max_reserve_books", "Must be at least 1");
    }
    if matches!(req.reserve_expiry_days, Some(v) if v < 1) {
        errors.add("reserve_expiry_days", "Must be at least 1");
    }
    if matches!(req.overdue_fine_per_day, Some(v) if v < 0.0) {
        errors.add("overdue_fine_per_day", "Cannot be negative");
    }

    errors.finish()
}

/// Read the global configuration (any authenticated user)
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<SystemSettings>, ApiError> {
    let settings = db::load_settings(&state.db).await?;
    Ok(Json(settings))
}

/// Update the global configuration (librarian only)
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<SystemSettings>, ApiError> {
    require_librarian(&user)?;
    validate_update_request(&req)?;

    let settings = db::update_settings(&state.db, &req).await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::SETTINGS_UPDATE,
        resource_types::SETTINGS,
        None,
        None,
        Some(&user.id),
        ip.as_deref(),
        serde_json::to_value(&settings).ok(),
    )
    .await;

    Ok(Json(settings))
}
