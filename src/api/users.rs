//! Profile and user administration endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, resource_types, UpdateUserRequest, User, UserResponse,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::{hash_password, require_librarian};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_password, validate_role, validate_uuid};

fn validate_update_request(req: &UpdateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", &e);
        }
    }
    if let Some(ref email) = req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", &e);
        }
    }
    if let Some(ref role) = req.role {
        if let Err(e) = validate_role(role) {
            errors.add("role", &e);
        }
    }
    if let Some(ref password) = req.password {
        if let Err(e) = validate_password(password) {
            errors.add("password", &e);
        }
    }

    errors.finish()
}

async fn apply_update(
    state: &AppState,
    id: &str,
    req: &UpdateUserRequest,
    allow_role_change: bool,
) -> Result<User, ApiError> {
    if req.role.is_some() && !allow_role_change {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    let password_hash = match req.password {
        Some(ref password) => Some(
            hash_password(password)
                .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?,
        ),
        None => None,
    };

    sqlx::query(
        "UPDATE users SET \
            name = COALESCE(?, name), \
            email = COALESCE(?, email), \
            phone = COALESCE(?, phone), \
            role = COALESCE(?, role), \
            password_hash = COALESCE(?, password_hash), \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.role)
    .bind(&password_hash)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::conflict("An account with this email already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(user)
}

/// Get the signed-in user's profile
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Update the signed-in user's profile. Role changes are not allowed here.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    validate_update_request(&req)?;
    let updated = apply_update(&state, &user.id, &req, false).await?;
    Ok(Json(UserResponse::from(updated)))
}

/// List all users (librarian only)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_librarian(&user)?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Get one user (self or librarian)
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Err(e) = validate_uuid(&id, "user_id") {
        return Err(ApiError::validation_field("user_id", e));
    }
    if !user.is_librarian() && user.id != id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    let target: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;

    let target = target.ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(target)))
}

/// Update a user (self without role changes, librarian with)
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Err(e) = validate_uuid(&id, "user_id") {
        return Err(ApiError::validation_field("user_id", e));
    }
    if !user.is_librarian() && user.id != id {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }
    validate_update_request(&req)?;

    let _target: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let updated = apply_update(&state, &id, &req, user.is_librarian()).await?;

    if user.is_librarian() && user.id != id {
        let ip = extract_client_ip(&headers, None);
        audit_log(
            &state,
            actions::USER_UPDATE,
            resource_types::USER,
            Some(&updated.id),
            Some(&updated.email),
            Some(&user.id),
            ip.as_deref(),
            None,
        )
        .await;
    }

    Ok(Json(UserResponse::from(updated)))
}

/// Delete a user (librarian only). Self-deletion and accounts with open
/// loans are refused.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_librarian(&user)?;
    if let Err(e) = validate_uuid(&id, "user_id") {
        return Err(ApiError::validation_field("user_id", e));
    }
    if user.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let target: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let open = crate::db::open_borrow_count(&state.db, &id).await?;
    if open > 0 {
        return Err(ApiError::conflict(
            "User cannot be deleted while they have books out on loan",
        ));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::USER_DELETE,
        resource_types::USER,
        Some(&target.id),
        Some(&target.email),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
