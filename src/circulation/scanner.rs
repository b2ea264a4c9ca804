//! Background maintenance loop for the circulation lifecycle.
//!
//! Expires stale reservations and sends overdue notices. Failures are
//! logged and retried on the next tick; the loop itself never exits.

use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{self, today_string};
use crate::notifications::Mailer;

pub struct CirculationScanner {
    db: SqlitePool,
    config: Config,
    mailer: Mailer,
}

/// Overdue loan joined with the borrower, as picked up by the notifier.
#[derive(Debug, sqlx::FromRow)]
struct OverdueLoan {
    id: String,
    due_date: String,
    book_title: String,
    user_name: String,
    user_email: String,
}

impl CirculationScanner {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let mailer = Mailer::new(config.email.clone());
        Self { db, config, mailer }
    }

    pub async fn run(self) {
        let interval = Duration::from_secs(self.config.circulation.scan_interval_secs.max(60));
        info!(interval_secs = interval.as_secs(), "Circulation scanner started");

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.scan().await;
        }
    }

    async fn scan(&self) {
        let today = today_string();

        match db::expire_reservations(&self.db, &today).await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "Expired stale reservations"),
            Err(e) => error!(error = %e, "Failed to expire reservations"),
        }

        if let Err(e) = self.notify_overdue(&today).await {
            error!(error = %e, "Overdue notification pass failed");
        }
    }

    /// Send one notice per newly overdue loan, when notices are enabled.
    async fn notify_overdue(&self, today: &str) -> Result<(), sqlx::Error> {
        let settings = db::load_settings(&self.db).await?;
        if !settings.enable_email_notification {
            return Ok(());
        }
        if !self.mailer.is_enabled() {
            warn!("Email notifications enabled in settings but SMTP is not configured");
            return Ok(());
        }

        let loans: Vec<OverdueLoan> = sqlx::query_as(
            "SELECT b.id, b.due_date, k.title AS book_title, \
             u.name AS user_name, u.email AS user_email \
             FROM borrows b \
             JOIN books k ON k.id = b.book_id \
             JOIN users u ON u.id = b.user_id \
             WHERE b.return_date IS NULL AND b.due_date < ? AND b.overdue_notified = 0",
        )
        .bind(today)
        .fetch_all(&self.db)
        .await?;

        for loan in loans {
            let today_date = chrono::Utc::now().date_naive();
            let fine = crate::circulation::fine(
                &loan.due_date,
                None,
                today_date,
                settings.overdue_fine_per_day,
            );

            match self
                .mailer
                .send_overdue_notice(
                    &loan.user_email,
                    &loan.user_name,
                    &loan.book_title,
                    &loan.due_date,
                    fine,
                )
                .await
            {
                Ok(()) => {
                    sqlx::query("UPDATE borrows SET overdue_notified = 1 WHERE id = ?")
                        .bind(&loan.id)
                        .execute(&self.db)
                        .await?;
                }
                Err(e) => {
                    // Leave the flag unset so the next tick retries
                    warn!(borrow_id = %loan.id, error = %e, "Failed to send overdue notice");
                }
            }
        }

        Ok(())
    }
}
