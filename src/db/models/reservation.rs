//! Reservation models and lifecycle operations.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use super::common::{BookStatus, ReservationStatus};
use crate::circulation;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub reserve_date: String,
    pub expiry_date: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Reservation row joined with book and reserver columns for listings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReservationJoinRow {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub reserve_date: String,
    pub expiry_date: String,
    pub status: String,
    pub book_title: String,
    pub book_author: String,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub book_id: String,
}

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Book not found")]
    BookNotFound,
    #[error("Reservation not found")]
    NotFound,
    #[error("You already have a pending reservation for this book")]
    Duplicate,
    #[error("Reservation limit of {0} books reached")]
    QuotaExceeded(i64),
    #[error("Only pending reservations can be cancelled")]
    NotPending,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub async fn list_reservations(
    pool: &SqlitePool,
    user_id: Option<&str>,
) -> Result<Vec<ReservationJoinRow>, sqlx::Error> {
    let mut sql = String::from(
        "SELECT r.id, r.book_id, r.user_id, r.reserve_date, r.expiry_date, r.status, \
         k.title AS book_title, k.author AS book_author, \
         u.name AS user_name, u.email AS user_email \
         FROM reservations r JOIN books k ON k.id = r.book_id JOIN users u ON u.id = r.user_id",
    );
    if user_id.is_some() {
        sql.push_str(" WHERE r.user_id = ?");
    }
    sql.push_str(" ORDER BY r.reserve_date DESC, r.created_at DESC");

    let mut q = sqlx::query_as::<_, ReservationJoinRow>(&sql);
    if let Some(uid) = user_id {
        q = q.bind(uid.to_string());
    }
    q.fetch_all(pool).await
}

/// Place a reservation. Enforces the pending-reservation quota, one pending
/// reservation per user per book, and flips an Available book to Reserved
/// so its state reflects the hold.
pub async fn create_reservation(
    pool: &SqlitePool,
    user_id: &str,
    book_id: &str,
    max_reserve_books: i64,
    reserve_expiry_days: i64,
) -> Result<Reservation, ReservationError> {
    let mut tx = pool.begin().await?;

    let (pending_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reservations WHERE user_id = ? AND status = 'Pending'",
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;
    if pending_count >= max_reserve_books {
        return Err(ReservationError::QuotaExceeded(max_reserve_books));
    }

    let (duplicates,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reservations WHERE user_id = ? AND book_id = ? AND status = 'Pending'",
    )
    .bind(user_id)
    .bind(book_id)
    .fetch_one(&mut *tx)
    .await?;
    if duplicates > 0 {
        return Err(ReservationError::Duplicate);
    }

    let book: Option<(String,)> = sqlx::query_as("SELECT status FROM books WHERE id = ?")
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?;
    let (book_status,) = book.ok_or(ReservationError::BookNotFound)?;

    let today = chrono::Utc::now().date_naive();
    let expiry = circulation::reservation_expiry(today, reserve_expiry_days);
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO reservations (id, book_id, user_id, reserve_date, expiry_date, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(book_id)
    .bind(user_id)
    .bind(today.format("%Y-%m-%d").to_string())
    .bind(expiry.format("%Y-%m-%d").to_string())
    .bind(ReservationStatus::Pending.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    if book_status.parse::<BookStatus>() == Ok(BookStatus::Available) {
        sqlx::query("UPDATE books SET status = ?, updated_at = ? WHERE id = ?")
            .bind(BookStatus::Reserved.to_string())
            .bind(&now)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;
    }

    let reservation: Reservation = sqlx::query_as("SELECT * FROM reservations WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await.map_err(ReservationError::Database)?;
    Ok(reservation)
}

/// Cancel a pending reservation. When it was the last hold on a book that
/// is not out on loan, the book goes back to Available.
pub async fn cancel_reservation(
    pool: &SqlitePool,
    reservation_id: &str,
) -> Result<Reservation, ReservationError> {
    let mut tx = pool.begin().await?;

    let reservation: Option<Reservation> =
        sqlx::query_as("SELECT * FROM reservations WHERE id = ?")
            .bind(reservation_id)
            .fetch_optional(&mut *tx)
            .await?;
    let reservation = reservation.ok_or(ReservationError::NotFound)?;

    if reservation.status.parse::<ReservationStatus>() != Ok(ReservationStatus::Pending) {
        return Err(ReservationError::NotPending);
    }

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query("UPDATE reservations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(ReservationStatus::Cancelled.to_string())
        .bind(&now)
        .bind(reservation_id)
        .execute(&mut *tx)
        .await?;

    release_book_if_unheld(&mut tx, &reservation.book_id, &now).await?;

    let updated: Reservation = sqlx::query_as("SELECT * FROM reservations WHERE id = ?")
        .bind(reservation_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await.map_err(ReservationError::Database)?;
    Ok(updated)
}

/// Put a Reserved book back to Available when no pending holds remain.
/// Books out on loan are left alone.
async fn release_book_if_unheld(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    book_id: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    let (remaining,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reservations WHERE book_id = ? AND status = 'Pending'",
    )
    .bind(book_id)
    .fetch_one(&mut **tx)
    .await?;

    if remaining == 0 {
        sqlx::query("UPDATE books SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(BookStatus::Available.to_string())
            .bind(now)
            .bind(book_id)
            .bind(BookStatus::Reserved.to_string())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

pub async fn find_reservation(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<Reservation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM reservations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Cancel pending reservations past their expiry date, releasing any books
/// held only by them. Returns the number of reservations expired.
pub async fn expire_reservations(pool: &SqlitePool, today: &str) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = chrono::Utc::now().to_rfc3339();

    let expired: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, book_id FROM reservations WHERE status = 'Pending' AND expiry_date < ?",
    )
    .bind(today)
    .fetch_all(&mut *tx)
    .await?;

    for (id, book_id) in &expired {
        sqlx::query("UPDATE reservations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(ReservationStatus::Cancelled.to_string())
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        release_book_if_unheld(&mut tx, book_id, &now).await?;
    }

    tx.commit().await?;
    Ok(expired.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_user(pool: &SqlitePool, email: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role) VALUES (?, ?, 'x', 'Test', 'Reader')",
        )
        .bind(&id)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn seed_book(pool: &SqlitePool, title: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO books (id, title, author, isbn, category, shelf_location) \
             VALUES (?, ?, 'Author', '978-1', 'Fiction', 'A-1')",
        )
        .bind(&id)
        .bind(title)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn book_status(pool: &SqlitePool, id: &str) -> String {
        let (status,): (String,) = sqlx::query_as("SELECT status FROM books WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap();
        status
    }

    #[tokio::test]
    async fn test_reserve_holds_available_book() {
        let pool = test_pool().await;
        let user = seed_user(&pool, "reader@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        let reservation = create_reservation(&pool, &user, &book, 3, 7).await.unwrap();
        assert_eq!(reservation.status, "Pending");
        assert_eq!(book_status(&pool, &book).await, "Reserved");

        let reserve = circulation::parse_date(&reservation.reserve_date).unwrap();
        let expiry = circulation::parse_date(&reservation.expiry_date).unwrap();
        assert_eq!((expiry - reserve).num_days(), 7);
    }

    #[tokio::test]
    async fn test_duplicate_and_quota() {
        let pool = test_pool().await;
        let user = seed_user(&pool, "reader@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        create_reservation(&pool, &user, &book, 2, 7).await.unwrap();
        let err = create_reservation(&pool, &user, &book, 2, 7).await.unwrap_err();
        assert!(matches!(err, ReservationError::Duplicate));

        let other = seed_book(&pool, "Foundation").await;
        create_reservation(&pool, &user, &other, 2, 7).await.unwrap();

        let third = seed_book(&pool, "Hyperion").await;
        let err = create_reservation(&pool, &user, &third, 2, 7).await.unwrap_err();
        assert!(matches!(err, ReservationError::QuotaExceeded(2)));
    }

    #[tokio::test]
    async fn test_cancel_releases_book() {
        let pool = test_pool().await;
        let user = seed_user(&pool, "reader@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        let reservation = create_reservation(&pool, &user, &book, 3, 7).await.unwrap();
        let cancelled = cancel_reservation(&pool, &reservation.id).await.unwrap();
        assert_eq!(cancelled.status, "Cancelled");
        assert_eq!(book_status(&pool, &book).await, "Available");

        let err = cancel_reservation(&pool, &reservation.id).await.unwrap_err();
        assert!(matches!(err, ReservationError::NotPending));
    }

    #[tokio::test]
    async fn test_expire_reservations() {
        let pool = test_pool().await;
        let user = seed_user(&pool, "reader@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        create_reservation(&pool, &user, &book, 3, 7).await.unwrap();
        sqlx::query("UPDATE reservations SET expiry_date = '2020-01-01'")
            .execute(&pool)
            .await
            .unwrap();

        let expired = expire_reservations(&pool, "2025-01-01").await.unwrap();
        assert_eq!(expired, 1);
        assert_eq!(book_status(&pool, &book).await, "Available");

        let (status,): (String,) = sqlx::query_as("SELECT status FROM reservations LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "Cancelled");
    }
}
