//! Audit log model for tracking librarian actions.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogListResponse {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    /// Filter by action (e.g., "book.create")
    pub action: Option<String>,
    /// Filter by resource type (e.g., "book", "user")
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub per_page: Option<i64>,
}

/// Common audit action types
pub mod actions {
    pub const BOOK_CREATE: &str = "book.create";
    pub const BOOK_UPDATE: &str = "book.update";
    pub const BOOK_DELETE: &str = "book.delete";

    pub const USER_UPDATE: &str = "user.update";
    pub const USER_DELETE: &str = "user.delete";

    pub const BORROW_FORCE_RETURN: &str = "borrow.force_return";

    pub const REVIEW_DELETE: &str = "review.delete";

    pub const SETTINGS_UPDATE: &str = "settings.update";
}

/// Common resource types
pub mod resource_types {
    pub const BOOK: &str = "book";
    pub const USER: &str = "user";
    pub const BORROW: &str = "borrow";
    pub const REVIEW: &str = "review";
    pub const SETTINGS: &str = "settings";
}

#[allow(clippy::too_many_arguments)]
pub async fn log_audit(
    pool: &SqlitePool,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    resource_name: Option<&str>,
    user_id: Option<&str>,
    ip_address: Option<&str>,
    details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_logs (id, action, resource_type, resource_id, resource_name, user_id, ip_address, details, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(resource_name)
    .bind(user_id)
    .bind(ip_address)
    .bind(details.map(|d| d.to_string()))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_audit_logs(
    pool: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<AuditLogListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);

    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(ref action) = query.action {
        clauses.push("action = ?");
        binds.push(action.clone());
    }
    if let Some(ref resource_type) = query.resource_type {
        clauses.push("resource_type = ?");
        binds.push(resource_type.clone());
    }
    if let Some(ref resource_id) = query.resource_id {
        clauses.push("resource_id = ?");
        binds.push(resource_id.clone());
    }
    if let Some(ref user_id) = query.user_id {
        clauses.push("user_id = ?");
        binds.push(user_id.clone());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let (total,) = count_query.fetch_one(pool).await?;

    let list_sql = format!(
        "SELECT * FROM audit_logs{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_sql
    );
    let mut list_query = sqlx::query_as::<_, AuditLog>(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind);
    }
    let items = list_query
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(pool)
        .await?;

    let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };

    Ok(AuditLogListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    })
}
