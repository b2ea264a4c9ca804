//! Catalog API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    self, actions, find_book, resource_types, Book, BookListResponse, BookQuery, BookStatus,
    CreateBookRequest, UpdateBookRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::auth::require_librarian;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_author, validate_category, validate_date, validate_isbn, validate_shelf_location,
    validate_title, validate_uuid,
};

fn validate_create_request(req: &CreateBookRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_title(&req.title) {
        errors.add("title", &e);
    }
    if let Err(e) = validate_author(&req.author) {
        errors.add("author", &e);
    }
    if let Err(e) = validate_isbn(&req.isbn) {
        errors.add("isbn", &e);
    }
    if let Err(e) = validate_category(&req.category) {
        errors.add("category", &e);
    }
    if let Err(e) = validate_shelf_location(&req.shelf_location) {
        errors.add("shelf_location", &e);
    }
    if let Err(e) = validate_date(&req.publish_date, "publish_date") {
        errors.add("publish_date", &e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateBookRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref title) = req.title {
        if let Err(e) = validate_title(title) {
            errors.add("title", &e);
        }
    }
    if let Some(ref author) = req.author {
        if let Err(e) = validate_author(author) {
            errors.add("author", &e);
        }
    }
    if let Some(ref isbn) = req.isbn {
        if let Err(e) = validate_isbn(isbn) {
            errors.add("isbn", &e);
        }
    }
    if let Some(ref category) = req.category {
        if let Err(e) = validate_category(category) {
            errors.add("category", &e);
        }
    }
    if let Some(ref shelf_location) = req.shelf_location {
        if let Err(e) = validate_shelf_location(shelf_location) {
            errors.add("shelf_location", &e);
        }
    }
    if let Err(e) = validate_date(&req.publish_date, "publish_date") {
        errors.add("publish_date", &e);
    }

    errors.finish()
}

/// List the catalog with pagination, search and filters. Public.
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> Result<Json<BookListResponse>, ApiError> {
    let response = db::list_books(&state.db, &query).await?;
    Ok(Json(response))
}

/// Get a single book. Public.
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Book>, ApiError> {
    if let Err(e) = validate_uuid(&id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }

    let book = find_book(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    Ok(Json(book))
}

/// Add a book to the catalog (librarian only)
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    require_librarian(&user)?;
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO books (id, title, author, isbn, category, shelf_location, status, \
         description, publish_date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.title)
    .bind(&req.author)
    .bind(&req.isbn)
    .bind(&req.category)
    .bind(&req.shelf_location)
    .bind(BookStatus::Available.to_string())
    .bind(&req.description)
    .bind(&req.publish_date)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let book: Book = sqlx::query_as("SELECT * FROM books WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::BOOK_CREATE,
        resource_types::BOOK,
        Some(&book.id),
        Some(&book.title),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(book)))
}

/// Update catalog fields of a book (librarian only). Availability is owned
/// by the circulation transitions and cannot be patched here.
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<Json<Book>, ApiError> {
    require_librarian(&user)?;
    if let Err(e) = validate_uuid(&id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }
    validate_update_request(&req)?;

    let _existing = find_book(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    sqlx::query(
        "UPDATE books SET \
            title = COALESCE(?, title), \
            author = COALESCE(?, author), \
            isbn = COALESCE(?, isbn), \
            category = COALESCE(?, category), \
            shelf_location = COALESCE(?, shelf_location), \
            description = COALESCE(?, description), \
            publish_date = COALESCE(?, publish_date), \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(&req.title)
    .bind(&req.author)
    .bind(&req.isbn)
    .bind(&req.category)
    .bind(&req.shelf_location)
    .bind(&req.description)
    .bind(&req.publish_date)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let book: Book = sqlx::query_as("SELECT * FROM books WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::BOOK_UPDATE,
        resource_types::BOOK,
        Some(&book.id),
        Some(&book.title),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(book))
}

/// Remove a book from the catalog (librarian only). Refused while a copy
/// is out on loan.
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_librarian(&user)?;
    if let Err(e) = validate_uuid(&id, "book_id") {
        return Err(ApiError::validation_field("book_id", e));
    }

    let book = find_book(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    let (open_borrows,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM borrows WHERE book_id = ? AND return_date IS NULL",
    )
    .bind(&id)
    .fetch_one(&state.db)
    .await?;
    if open_borrows > 0 {
        return Err(ApiError::conflict(
            "Book cannot be deleted while it is out on loan",
        ));
    }

    sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    let ip = extract_client_ip(&headers, None);
    audit_log(
        &state,
        actions::BOOK_DELETE,
        resource_types::BOOK,
        Some(&book.id),
        Some(&book.title),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
