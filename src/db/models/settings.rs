//! Global system settings: a singleton row read by circulation rules.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemSettings {
    pub max_borrow_days: i64,
    pub max_borrow_books: i64,
    pub max_reserve_books: i64,
    pub reserve_expiry_days: i64,
    pub overdue_fine_per_day: f64,
    pub enable_email_notification: bool,
    pub enable_sms_notification: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub max_borrow_days: Option<i64>,
    pub max_borrow_books: Option<i64>,
    pub max_reserve_books: Option<i64>,
    pub reserve_expiry_days: Option<i64>,
    pub overdue_fine_per_day: Option<f64>,
    pub enable_email_notification: Option<bool>,
    pub enable_sms_notification: Option<bool>,
}

pub async fn load_settings(pool: &SqlitePool) -> Result<SystemSettings, sqlx::Error> {
    sqlx::query_as(
        "SELECT max_borrow_days, max_borrow_books, max_reserve_books, reserve_expiry_days, \
         overdue_fine_per_day, enable_email_notification, enable_sms_notification \
         FROM settings WHERE id = 1",
    )
    .fetch_one(pool)
    .await
}

pub async fn update_settings(
    pool: &SqlitePool,
    req: &UpdateSettingsRequest,
) -> Result<SystemSettings, sqlx::Error> {
    sqlx::query(
        "UPDATE settings SET \
            max_borrow_days = COALESCE(?, max_borrow_days), \
            max_borrow_books = COALESCE(?, max_borrow_books), \
            max_reserve_books = COALESCE(?, max_reserve_books), \
            reserve_expiry_days = COALESCE(?, reserve_expiry_days), \
            overdue_fine_per_day = COALESCE(?, overdue_fine_per_day), \
            enable_email_notification = COALESCE(?, enable_email_notification), \
            enable_sms_notification = COALESCE(?, enable_sms_notification), \
            updated_at = ? \
         WHERE id = 1",
    )
    .bind(req.max_borrow_days)
    .bind(req.max_borrow_books)
    .bind(req.max_reserve_books)
    .bind(req.reserve_expiry_days)
    .bind(req.overdue_fine_per_day)
    .bind(req.enable_email_notification)
    .bind(req.enable_sms_notification)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    load_settings(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_defaults_seeded() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        assert_eq!(settings.max_borrow_days, 30);
        assert_eq!(settings.max_borrow_books, 5);
        assert_eq!(settings.max_reserve_books, 3);
        assert!(!settings.enable_email_notification);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let pool = test_pool().await;
        let updated = update_settings(
            &pool,
            &UpdateSettingsRequest {
                max_borrow_days: Some(14),
                overdue_fine_per_day: Some(1.25),
                enable_email_notification: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.max_borrow_days, 14);
        assert_eq!(updated.overdue_fine_per_day, 1.25);
        assert!(updated.enable_email_notification);
        // Untouched fields keep their values
        assert_eq!(updated.max_borrow_books, 5);
    }
}
