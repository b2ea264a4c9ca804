//! Borrow records and the transactional borrow/return operations.
//!
//! The borrow row and the book's availability state always change inside
//! one transaction: they commit together or not at all.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use super::common::{today_string, BookStatus, ReservationStatus};
use super::settings::SystemSettings;
use crate::circulation;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Borrow {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub borrow_date: String,
    pub due_date: String,
    pub return_date: Option<String>,
    pub overdue_notified: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Borrow row joined with the book and borrower columns the views need,
/// avoiding a round trip per record.
#[derive(Debug, Clone, FromRow)]
pub struct BorrowJoinRow {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub borrow_date: String,
    pub due_date: String,
    pub return_date: Option<String>,
    pub book_title: String,
    pub book_author: String,
    pub book_isbn: String,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BorrowBookSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BorrowUserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Wire shape of a borrow record. `status` and `fine` are derived from the
/// dates at serialization time, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct BorrowResponse {
    pub id: String,
    pub book: BorrowBookSummary,
    pub user: BorrowUserSummary,
    pub borrow_date: String,
    pub due_date: String,
    pub return_date: Option<String>,
    pub status: &'static str,
    pub fine: f64,
}

impl BorrowJoinRow {
    pub fn into_response(self, today: chrono::NaiveDate, fine_per_day: f64) -> BorrowResponse {
        let state =
            circulation::derive_state(&self.due_date, self.return_date.as_deref(), today);
        let fine =
            circulation::fine(&self.due_date, self.return_date.as_deref(), today, fine_per_day);
        BorrowResponse {
            id: self.id,
            book: BorrowBookSummary {
                id: self.book_id,
                title: self.book_title,
                author: self.book_author,
                isbn: self.book_isbn,
            },
            user: BorrowUserSummary {
                id: self.user_id,
                name: self.user_name,
                email: self.user_email,
            },
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: self.return_date,
            status: state.as_str(),
            fine,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBorrowRequest {
    pub book_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BorrowQuery {
    /// Inclusive lower bound on borrow_date (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Inclusive upper bound on borrow_date (YYYY-MM-DD)
    pub end_date: Option<String>,
    /// When true, only open (unreturned) records
    pub active: Option<bool>,
}

#[derive(Debug, Error)]
pub enum CirculationError {
    #[error("Book not found")]
    BookNotFound,
    #[error("Borrow record not found")]
    BorrowNotFound,
    #[error("Book is currently {0}")]
    BookUnavailable(String),
    #[error("Borrow limit of {0} books reached")]
    QuotaExceeded(i64),
    #[error("Book already marked as returned.")]
    AlreadyReturned,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const JOIN_SELECT: &str = "SELECT b.id, b.book_id, b.user_id, b.borrow_date, b.due_date, \
     b.return_date, k.title AS book_title, k.author AS book_author, k.isbn AS book_isbn, \
     u.name AS user_name, u.email AS user_email \
     FROM borrows b JOIN books k ON k.id = b.book_id JOIN users u ON u.id = b.user_id";

/// List borrow records, optionally scoped to one user and a borrow-date range.
pub async fn list_borrows(
    pool: &SqlitePool,
    user_id: Option<&str>,
    query: &BorrowQuery,
) -> Result<Vec<BorrowJoinRow>, sqlx::Error> {
    let mut sql = String::from(JOIN_SELECT);
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(uid) = user_id {
        clauses.push("b.user_id = ?");
        binds.push(uid.to_string());
    }
    if let Some(ref start) = query.start_date {
        clauses.push("b.borrow_date >= ?");
        binds.push(start.clone());
    }
    if let Some(ref end) = query.end_date {
        clauses.push("b.borrow_date <= ?");
        binds.push(end.clone());
    }
    if query.active == Some(true) {
        clauses.push("b.return_date IS NULL");
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY b.borrow_date DESC, b.created_at DESC");

    let mut q = sqlx::query_as::<_, BorrowJoinRow>(&sql);
    for bind in &binds {
        q = q.bind(bind);
    }
    q.fetch_all(pool).await
}

pub async fn find_borrow_row(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<BorrowJoinRow>, sqlx::Error> {
    let sql = format!("{} WHERE b.id = ?", JOIN_SELECT);
    sqlx::query_as(&sql).bind(id).fetch_optional(pool).await
}

/// Create a borrow: checks the borrower's quota and the book's
/// availability, stamps the due date from settings, and flips the book to
/// Borrowed. A book Reserved for this borrower is borrowable and fulfills
/// the reservation.
pub async fn create_borrow(
    pool: &SqlitePool,
    user_id: &str,
    book_id: &str,
    settings: &SystemSettings,
) -> Result<Borrow, CirculationError> {
    let mut tx = pool.begin().await?;

    let (open_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM borrows WHERE user_id = ? AND return_date IS NULL",
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if open_count >= settings.max_borrow_books {
        return Err(CirculationError::QuotaExceeded(settings.max_borrow_books));
    }

    let book: Option<(String,)> = sqlx::query_as("SELECT status FROM books WHERE id = ?")
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?;
    let (status,) = book.ok_or(CirculationError::BookNotFound)?;

    match status.parse::<BookStatus>() {
        Ok(BookStatus::Available) => {}
        Ok(BookStatus::Reserved) => {
            // Only the holder of a pending reservation may take a reserved book
            let reservation: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM reservations WHERE book_id = ? AND user_id = ? \
                 AND status = 'Pending' ORDER BY reserve_date ASC LIMIT 1",
            )
            .bind(book_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

            match reservation {
                Some((reservation_id,)) => {
                    sqlx::query(
                        "UPDATE reservations SET status = ?, updated_at = ? WHERE id = ?",
                    )
                    .bind(ReservationStatus::Fulfilled.to_string())
                    .bind(chrono::Utc::now().to_rfc3339())
                    .bind(&reservation_id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => return Err(CirculationError::BookUnavailable(status)),
            }
        }
        _ => return Err(CirculationError::BookUnavailable(status)),
    }

    let today = chrono::Utc::now().date_naive();
    let due = circulation::due_date(today, settings.max_borrow_days);

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO borrows (id, book_id, user_id, borrow_date, due_date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(book_id)
    .bind(user_id)
    .bind(today.format("%Y-%m-%d").to_string())
    .bind(due.format("%Y-%m-%d").to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE books SET status = ?, updated_at = ? WHERE id = ?")
        .bind(BookStatus::Borrowed.to_string())
        .bind(&now)
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

    let borrow: Borrow = sqlx::query_as("SELECT * FROM borrows WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await.map_err(CirculationError::Database)?;
    Ok(borrow)
}

/// Return a borrowed book: stamps the return date and releases the book.
/// When another reader holds a pending reservation the book goes to
/// Reserved instead of Available. Double returns are rejected.
pub async fn return_borrow(pool: &SqlitePool, borrow_id: &str) -> Result<Borrow, CirculationError> {
    let mut tx = pool.begin().await?;

    let borrow: Option<Borrow> = sqlx::query_as("SELECT * FROM borrows WHERE id = ?")
        .bind(borrow_id)
        .fetch_optional(&mut *tx)
        .await?;
    let borrow = borrow.ok_or(CirculationError::BorrowNotFound)?;

    if borrow.return_date.is_some() {
        return Err(CirculationError::AlreadyReturned);
    }

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query("UPDATE borrows SET return_date = ?, updated_at = ? WHERE id = ?")
        .bind(today_string())
        .bind(&now)
        .bind(borrow_id)
        .execute(&mut *tx)
        .await?;

    let pending: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM reservations WHERE book_id = ? AND status = 'Pending' \
         ORDER BY reserve_date ASC, created_at ASC LIMIT 1",
    )
    .bind(&borrow.book_id)
    .fetch_optional(&mut *tx)
    .await?;

    let next_status = if pending.is_some() {
        BookStatus::Reserved
    } else {
        BookStatus::Available
    };

    sqlx::query("UPDATE books SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next_status.to_string())
        .bind(&now)
        .bind(&borrow.book_id)
        .execute(&mut *tx)
        .await?;

    let updated: Borrow = sqlx::query_as("SELECT * FROM borrows WHERE id = ?")
        .bind(borrow_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await.map_err(CirculationError::Database)?;
    Ok(updated)
}

/// Count of a user's open (unreturned) borrows.
pub async fn open_borrow_count(pool: &SqlitePool, user_id: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM borrows WHERE user_id = ? AND return_date IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::settings::load_settings;
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
    async fn test_borrow_marks_book_borrowed() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        let user = seed_user(&pool, "reader@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        let borrow = create_borrow(&pool, &user, &book, &settings).await.unwrap();
        assert!(borrow.return_date.is_none());
        assert_eq!(book_status(&pool, &book).await, "Borrowed");

        let due = circulation::parse_date(&borrow.due_date).unwrap();
        let borrowed = circulation::parse_date(&borrow.borrow_date).unwrap();
        assert_eq!((due - borrowed).num_days(), settings.max_borrow_days);
    }

    #[tokio::test]
    async fn test_cannot_borrow_borrowed_book() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        let alice = seed_user(&pool, "alice@example.org").await;
        let bob = seed_user(&pool, "bob@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        create_borrow(&pool, &alice, &book, &settings).await.unwrap();
        let err = create_borrow(&pool, &bob, &book, &settings).await.unwrap_err();
        assert!(matches!(err, CirculationError::BookUnavailable(_)));
    }

    #[tokio::test]
    async fn test_borrow_quota_enforced() {
        let pool = test_pool().await;
        let mut settings = load_settings(&pool).await.unwrap();
        settings.max_borrow_books = 2;
        let user = seed_user(&pool, "reader@example.org").await;

        for i in 0..2 {
            let book = seed_book(&pool, &format!("Book {}", i)).await;
            create_borrow(&pool, &user, &book, &settings).await.unwrap();
        }

        let extra = seed_book(&pool, "One Too Many").await;
        let err = create_borrow(&pool, &user, &extra, &settings).await.unwrap_err();
        assert!(matches!(err, CirculationError::QuotaExceeded(2)));
    }

    #[tokio::test]
    async fn test_return_releases_book_and_rejects_double_return() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        let user = seed_user(&pool, "reader@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        let borrow = create_borrow(&pool, &user, &book, &settings).await.unwrap();
        let returned = return_borrow(&pool, &borrow.id).await.unwrap();
        assert!(returned.return_date.is_some());
        assert_eq!(book_status(&pool, &book).await, "Available");

        let err = return_borrow(&pool, &borrow.id).await.unwrap_err();
        assert!(matches!(err, CirculationError::AlreadyReturned));
    }

    #[tokio::test]
    async fn test_return_hands_book_to_pending_reservation() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        let alice = seed_user(&pool, "alice@example.org").await;
        let bob = seed_user(&pool, "bob@example.org").await;
        let book = seed_book(&pool, "Dune").await;

        let borrow = create_borrow(&pool, &alice, &book, &settings).await.unwrap();

        sqlx::query(
            "INSERT INTO reservations (id, book_id, user_id, reserve_date, expiry_date) \
             VALUES (?, ?, ?, '2025-01-01', '2025-01-08')",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&book)
        .bind(&bob)
        .execute(&pool)
        .await
        .unwrap();

        return_borrow(&pool, &borrow.id).await.unwrap();
        assert_eq!(book_status(&pool, &book).await, "Reserved");

        // Bob can take the reserved copy; his reservation is fulfilled
        create_borrow(&pool, &bob, &book, &settings).await.unwrap();
        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM reservations WHERE user_id = ?")
                .bind(&bob)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "Fulfilled");
        assert_eq!(book_status(&pool, &book).await, "Borrowed");

        // Alice cannot jump Bob's reservation
        let book2 = {
            let b = seed_book(&pool, "Hold Me").await;
            sqlx::query("UPDATE books SET status = 'Reserved' WHERE id = ?")
                .bind(&b)
                .execute(&pool)
                .await
                .unwrap();
            b
        };
        let err = create_borrow(&pool, &alice, &book2, &settings).await.unwrap_err();
        assert!(matches!(err, CirculationError::BookUnavailable(_)));
    }

    #[tokio::test]
    async fn test_active_filter_excludes_returned_records() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        let user = seed_user(&pool, "reader@example.org").await;
        let kept = seed_book(&pool, "Kept").await;
        let returned = seed_book(&pool, "Returned").await;

        let open = create_borrow(&pool, &user, &kept, &settings).await.unwrap();
        let closed = create_borrow(&pool, &user, &returned, &settings).await.unwrap();
        return_borrow(&pool, &closed.id).await.unwrap();

        let rows = list_borrows(&pool, Some(user.as_str()), &BorrowQuery::default())
            .await
            .unwrap();
        let active: Vec<_> = rows
            .iter()
            .filter(|r| circulation::is_active(r.return_date.as_deref()))
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);

        // The same filter is servable directly
        let filtered = list_borrows(
            &pool,
            Some(user.as_str()),
            &BorrowQuery {
                active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, open.id);

        assert_eq!(open_borrow_count(&pool, &user).await.unwrap(), 1);
    }
}
