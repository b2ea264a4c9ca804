//! Aggregate statistics for the dashboard views.

use serde::Serialize;
use sqlx::SqlitePool;

/// Library-wide aggregates (librarian dashboard).
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub total_books: i64,
    pub available_books: i64,
    pub borrowed_books: i64,
    pub reserved_books: i64,
    pub total_users: i64,
    pub readers: i64,
    pub librarians: i64,
    pub open_borrows: i64,
    pub overdue_borrows: i64,
    pub pending_reservations: i64,
}

/// Per-user aggregates (reader home page).
#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub total_books: i64,
    pub borrowed_books: i64,
    pub pending_reservations: i64,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await?;
    Ok(n)
}

pub async fn library_stats(pool: &SqlitePool, today: &str) -> Result<LibraryStats, sqlx::Error> {
    let overdue: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM borrows WHERE return_date IS NULL AND due_date < ?",
    )
    .bind(today)
    .fetch_one(pool)
    .await?;

    Ok(LibraryStats {
        total_books: count(pool, "SELECT COUNT(*) FROM books").await?,
        available_books: count(pool, "SELECT COUNT(*) FROM books WHERE status = 'Available'").await?,
        borrowed_books: count(pool, "SELECT COUNT(*) FROM books WHERE status = 'Borrowed'").await?,
        reserved_books: count(pool, "SELECT COUNT(*) FROM books WHERE status = 'Reserved'").await?,
        total_users: count(pool, "SELECT COUNT(*) FROM users").await?,
        readers: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'Reader'").await?,
        librarians: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'Librarian'").await?,
        open_borrows: count(pool, "SELECT COUNT(*) FROM borrows WHERE return_date IS NULL").await?,
        overdue_borrows: overdue.0,
        pending_reservations: count(pool, "SELECT COUNT(*) FROM reservations WHERE status = 'Pending'")
            .await?,
    })
}

pub async fn user_stats(pool: &SqlitePool, user_id: &str) -> Result<UserStats, sqlx::Error> {
    let borrowed: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM borrows WHERE user_id = ? AND return_date IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let pending: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reservations WHERE user_id = ? AND status = 'Pending'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(UserStats {
        total_books: count(pool, "SELECT COUNT(*) FROM books").await?,
        borrowed_books: borrowed.0,
        pending_reservations: pending.0,
    })
}
