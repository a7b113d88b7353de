//! Thin sqlx sqlite skeleton for the `db` persistence driver (§6: "Under the
//! db driver the same logical keys live in appConfig(key,value) and
//! parallel tables"). `app_config` covers the whole-snapshot keys the file
//! driver writes as json (calibration/variance/trust); `run_logs` is the
//! parallel table for the append-only run log.

use std::str::FromStr;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::domain::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct DbDriverConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl Default for DbDriverConfig {
    fn default() -> Self {
        Self { url: "sqlite::memory:".to_string(), max_connections: 10, connection_timeout_secs: 30 }
    }
}

pub struct DbDriver {
    pool: Pool<Sqlite>,
}

impl DbDriver {
    pub async fn connect(config: &DbDriverConfig) -> Result<Self> {
        info!(url = %config.url, "opening sqlite pool");

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| CoreError::internal(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.connection_timeout_secs))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::internal(format!("failed to open sqlite pool: {e}")))?;

        let driver = Self { pool };
        driver.ensure_schema().await?;
        Ok(driver)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS app_config (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS run_logs (run_session_id TEXT PRIMARY KEY, payload TEXT NOT NULL, created_at TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::internal(e.to_string()))?;

        Ok(())
    }

    pub async fn set_config<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        sqlx::query("INSERT INTO app_config (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(json)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn get_config<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM app_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_run_log(&self, run_session_id: &str, payload: &impl Serialize) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        sqlx::query(
            "INSERT INTO run_logs (run_session_id, payload, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(run_session_id) DO UPDATE SET payload = excluded.payload",
        )
        .bind(run_session_id)
        .bind(json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| CoreError::internal(e.to_string()))?;
        Ok(())
    }
}
