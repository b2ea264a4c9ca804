//! Catalog models and list queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub shelf_location: String,
    pub status: String,
    pub description: Option<String>,
    pub publish_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub shelf_location: String,
    pub description: Option<String>,
    pub publish_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub shelf_location: Option<String>,
    pub description: Option<String>,
    pub publish_date: Option<String>,
}

/// Query parameters for the catalog listing.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BookQuery {
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 20, max 100)
    pub page_size: Option<i64>,
    /// Matches title, author or ISBN
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub results: Vec<Book>,
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Paginated catalog listing with optional search and filters.
pub async fn list_books(pool: &SqlitePool, query: &BookQuery) -> Result<BookListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);

    let mut where_clauses: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(ref search) = query.search {
        if !search.is_empty() {
            where_clauses
                .push("(title LIKE ? OR author LIKE ? OR isbn LIKE ?)".to_string());
            let pattern = format!("%{}%", search);
            binds.push(pattern.clone());
            binds.push(pattern.clone());
            binds.push(pattern);
        }
    }
    if let Some(ref category) = query.category {
        if !category.is_empty() {
            where_clauses.push("category = ?".to_string());
            binds.push(category.clone());
        }
    }
    if let Some(ref status) = query.status {
        if !status.is_empty() {
            where_clauses.push("status = ?".to_string());
            binds.push(status.clone());
        }
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM books{}", where_sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let (count,) = count_query.fetch_one(pool).await?;

    let list_sql = format!(
        "SELECT * FROM books{} ORDER BY title ASC LIMIT ? OFFSET ?",
        where_sql
    );
    let mut list_query = sqlx::query_as::<_, Book>(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind);
    }
    let results = list_query
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(pool)
        .await?;

    let total_pages = if count == 0 { 0 } else { (count + page_size - 1) / page_size };

    Ok(BookListResponse {
        results,
        count,
        page,
        page_size,
        total_pages,
    })
}

pub async fn find_book(pool: &SqlitePool, id: &str) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM books WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn insert_book(pool: &SqlitePool, title: &str, author: &str, category: &str) {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO books (id, title, author, isbn, category, shelf_location) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(author)
        .bind("978-0000000000")
        .bind(category)
        .bind("A-1")
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_list_books_pagination() {
        let pool = test_pool().await;
        for i in 0..25 {
            insert_book(&pool, &format!("Book {:02}", i), "Author", "Fiction").await;
        }

        let page1 = list_books(
            &pool,
            &BookQuery {
                page: Some(1),
                page_size: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page1.count, 25);
        assert_eq!(page1.results.len(), 10);
        assert_eq!(page1.total_pages, 3);

        let page3 = list_books(
            &pool,
            &BookQuery {
                page: Some(3),
                page_size: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page3.results.len(), 5);
    }

    #[tokio::test]
    async fn test_list_books_search() {
        let pool = test_pool().await;
        insert_book(&pool, "The Rust Programming Language", "Klabnik", "Tech").await;
        insert_book(&pool, "Pride and Prejudice", "Austen", "Fiction").await;

        let found = list_books(
            &pool,
            &BookQuery {
                search: Some("rust".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(found.count, 1);
        assert_eq!(found.results[0].author, "Klabnik");

        let by_category = list_books(
            &pool,
            &BookQuery {
                category: Some("Fiction".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_category.count, 1);
        assert_eq!(by_category.results[0].author, "Austen");
    }
}
