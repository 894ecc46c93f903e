//! # Settings Repository
//!
//! The singleton settings record, stored as one JSON document in row `id = 1`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use medstock_core::SettingsConfig;

/// Repository for the settings document.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Loads the stored settings; `None` until an operator first saves them.
    pub async fn get(&self) -> DbResult<Option<SettingsConfig>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn).await
    }

    /// Loads the stored settings on the caller's transaction.
    pub async fn get_in(conn: &mut SqliteConnection) -> DbResult<Option<SettingsConfig>> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM settings WHERE id = 1")
            .fetch_optional(&mut *conn)
            .await?;

        payload
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| DbError::corrupt("Settings", "1", e.to_string()))
            })
            .transpose()
    }

    /// Replaces the settings document (last writer wins).
    pub async fn save(&self, settings: &SettingsConfig, now: DateTime<Utc>) -> DbResult<()> {
        let payload =
            serde_json::to_string(settings).map_err(|e| DbError::Internal(e.to_string()))?;
        debug!(bytes = payload.len(), "Saving settings");

        sqlx::query(
            r#"
            INSERT INTO settings (id, payload, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_settings_upsert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.settings().get().await.unwrap().is_none());

        let mut settings = SettingsConfig::default();
        db.settings().save(&settings, Utc::now()).await.unwrap();
        settings.delivery_services.push("Yandex Delivery".to_string());
        settings.keep_manual_discount = true;
        db.settings().save(&settings, Utc::now()).await.unwrap();

        let loaded = db.settings().get().await.unwrap().unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_reported() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("INSERT INTO settings (id, payload, updated_at) VALUES (1, 'not json', 'x')")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(matches!(db.settings().get().await, Err(DbError::Corrupt { .. })));
    }
}
