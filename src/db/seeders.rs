//! Seed data applied on every startup.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Ensure the singleton settings row exists. Existing values are never
/// overwritten; this only fills in the row on a fresh database.
pub async fn seed_default_settings(pool: &SqlitePool) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings WHERE id = 1")
        .fetch_one(pool)
        .await?;

    if count == 0 {
        sqlx::query("INSERT INTO settings (id) VALUES (1)")
            .execute(pool)
            .await?;
        info!("Seeded default system settings");
    }

    Ok(())
}
