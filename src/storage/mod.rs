//! Persistence drivers for §6 "Persisted state": `file` (append-only JSONL
//! plus JSON snapshots) and `db` (sqlite, same logical keys in
//! `app_config(key,value)` and parallel tables). [`PersistenceStore`] picks
//! one at startup per [`crate::config::PersistenceDriver`] and presents a
//! single surface to the scheduler and governance endpoints.

pub mod db_driver;
pub mod file_driver;

use std::collections::HashMap;

use crate::config::{AppConfig, PersistenceDriver};
use crate::domain::{LedgerEntry, Result, TaskType};
use crate::trackers::{CalibrationRecord, TrustEntry, VarianceBucket};

pub use db_driver::{DbDriver, DbDriverConfig};
pub use file_driver::FileDriver;

const CALIBRATION_KEY: &str = "calibration";
const VARIANCE_KEY: &str = "variance_stats";
const TRUST_KEY: &str = "model_stats";

pub enum PersistenceStore {
    File(FileDriver),
    Db(DbDriver),
}

impl PersistenceStore {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        match config.persistence_driver {
            PersistenceDriver::File => Ok(Self::File(FileDriver::new(config.paths.clone()))),
            PersistenceDriver::Db => {
                let db_config = DbDriverConfig {
                    url: config.database.url.clone(),
                    max_connections: config.database.pool_size,
                    ..DbDriverConfig::default()
                };
                Ok(Self::Db(DbDriver::connect(&db_config).await?))
            }
        }
    }

    pub async fn append_run_log(&self, entry: &LedgerEntry) -> Result<()> {
        match self {
            Self::File(driver) => driver.append_run_log(entry).await,
            Self::Db(driver) => driver.upsert_run_log(&entry.run_session_id, entry).await,
        }
    }

    pub async fn append_governance_event(&self, event: &impl serde::Serialize) -> Result<()> {
        match self {
            Self::File(driver) => driver.append_governance_event(event).await,
            Self::Db(driver) => {
                let key = format!("governance:{}", uuid_like_suffix());
                driver.set_config(&key, event).await
            }
        }
    }

    pub async fn save_demo_run(&self, run_session_id: &str, payload: &impl serde::Serialize) -> Result<()> {
        match self {
            Self::File(driver) => driver.save_demo_run(run_session_id, payload).await,
            Self::Db(driver) => driver.set_config(&format!("demo_run:{run_session_id}"), payload).await,
        }
    }

    pub async fn save_calibration(&self, records: HashMap<(String, TaskType), CalibrationRecord>) -> Result<()> {
        match self {
            Self::File(driver) => driver.save_calibration(records).await,
            Self::Db(driver) => {
                let rows: Vec<((String, TaskType), CalibrationRecord)> = records.into_iter().collect();
                driver.set_config(CALIBRATION_KEY, &rows).await
            }
        }
    }

    pub async fn load_calibration(&self) -> Result<HashMap<(String, TaskType), CalibrationRecord>> {
        match self {
            Self::File(driver) => driver.load_calibration().await,
            Self::Db(driver) => {
                let rows: Vec<((String, TaskType), CalibrationRecord)> =
                    driver.get_config(CALIBRATION_KEY).await?.unwrap_or_default();
                Ok(rows.into_iter().collect())
            }
        }
    }

    pub async fn save_variance(&self, buckets: Vec<(String, TaskType, VarianceBucket)>) -> Result<()> {
        match self {
            Self::File(driver) => driver.save_variance(buckets).await,
            Self::Db(driver) => driver.set_config(VARIANCE_KEY, &buckets).await,
        }
    }

    pub async fn save_trust(&self, entries: HashMap<String, TrustEntry>) -> Result<()> {
        match self {
            Self::File(driver) => driver.save_trust(entries).await,
            Self::Db(driver) => driver.set_config(TRUST_KEY, &entries).await,
        }
    }

    pub async fn load_trust(&self) -> Result<HashMap<String, TrustEntry>> {
        match self {
            Self::File(driver) => driver.load_trust().await,
            Self::Db(driver) => Ok(driver.get_config(TRUST_KEY).await?.unwrap_or_default()),
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            Self::File(_) => Ok(()),
            Self::Db(driver) => driver.health_check().await,
        }
    }
}

/// Cheap unique suffix for db-backed governance event keys; the file driver
/// appends instead of keying, so this only matters on the `db` path.
fn uuid_like_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:016x}", n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceDriver;

    #[tokio::test]
    async fn db_driver_round_trips_trust_snapshot() {
        let mut config = AppConfig::default();
        config.persistence_driver = PersistenceDriver::Db;
        config.database.url = "sqlite::memory:".to_string();
        let store = PersistenceStore::connect(&config).await.unwrap();

        let mut entries = HashMap::new();
        entries.insert(
            "m1".to_string(),
            TrustEntry { worker: 0.8, qa: 0.75, last_updated: chrono::Utc::now() },
        );
        store.save_trust(entries.clone()).await.unwrap();
        let loaded = store.load_trust().await.unwrap();
        assert_eq!(loaded.get("m1").unwrap().worker, 0.8);
    }

    #[tokio::test]
    async fn file_driver_connect_does_not_touch_disk_until_a_write_happens() {
        let config = AppConfig::default();
        let store = PersistenceStore::connect(&config).await.unwrap();
        store.health_check().await.unwrap();
    }
}
