//! File persistence driver (§6 "Persisted state"): one append-only JSONL
//! file per run log / governance log, and whole-file JSON snapshots for the
//! tracker stores. Each tracker I/O call is fire-and-forget from the
//! scheduler's point of view (§9 "async fire-and-forget"): failures are
//! logged, never surfaced to the run outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::PersistedPaths;
use crate::domain::{LedgerEntry, Result, TaskType};
use crate::trackers::{CalibrationRecord, TrustEntry, VarianceBucket};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationRow {
    model_id: String,
    task_type: TaskType,
    record: CalibrationRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VarianceRow {
    model_id: String,
    task_type: TaskType,
    bucket: VarianceBucket,
}

/// Thin wrapper around [`PersistedPaths`] that does the actual file I/O.
pub struct FileDriver {
    paths: PersistedPaths,
}

impl FileDriver {
    pub fn new(paths: PersistedPaths) -> Self {
        Self { paths }
    }

    pub async fn append_run_log(&self, entry: &LedgerEntry) -> Result<()> {
        append_jsonl(&self.paths.runs_jsonl, entry).await
    }

    pub async fn append_governance_event(&self, event: &impl Serialize) -> Result<()> {
        append_jsonl(&self.paths.governance_jsonl, event).await
    }

    pub async fn save_demo_run(&self, run_session_id: &str, payload: &impl Serialize) -> Result<()> {
        let dir = Path::new(&self.paths.demo_runs_dir);
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{run_session_id}.json"));
        write_json(&path, payload).await
    }

    pub async fn save_calibration(&self, records: HashMap<(String, TaskType), CalibrationRecord>) -> Result<()> {
        let rows: Vec<CalibrationRow> = records
            .into_iter()
            .map(|((model_id, task_type), record)| CalibrationRow { model_id, task_type, record })
            .collect();
        write_json(Path::new(&self.paths.calibration_json), &rows).await
    }

    pub async fn load_calibration(&self) -> Result<HashMap<(String, TaskType), CalibrationRecord>> {
        let rows: Vec<CalibrationRow> = read_json_or_default(Path::new(&self.paths.calibration_json)).await?;
        Ok(rows.into_iter().map(|row| ((row.model_id, row.task_type), row.record)).collect())
    }

    pub async fn save_variance(&self, buckets: Vec<(String, TaskType, VarianceBucket)>) -> Result<()> {
        let rows: Vec<VarianceRow> =
            buckets.into_iter().map(|(model_id, task_type, bucket)| VarianceRow { model_id, task_type, bucket }).collect();
        write_json(Path::new(&self.paths.variance_stats_json), &rows).await
    }

    pub async fn save_trust(&self, entries: HashMap<String, TrustEntry>) -> Result<()> {
        write_json(Path::new(&self.paths.model_stats_json), &entries).await
    }

    pub async fn load_trust(&self) -> Result<HashMap<String, TrustEntry>> {
        read_json_or_default(Path::new(&self.paths.model_stats_json)).await
    }
}

async fn append_jsonl(path: &str, value: &impl Serialize) -> Result<()> {
    let path = PathBuf::from(path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let line = serde_json::to_string(value)?;
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

async fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

async fn read_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths(dir: &tempfile::TempDir) -> PersistedPaths {
        let base = dir.path();
        PersistedPaths {
            runs_jsonl: base.join("runs.jsonl").to_string_lossy().to_string(),
            calibration_json: base.join("calibration.json").to_string_lossy().to_string(),
            variance_stats_json: base.join("variance.json").to_string_lossy().to_string(),
            model_stats_json: base.join("trust.json").to_string_lossy().to_string(),
            governance_jsonl: base.join("governance.jsonl").to_string_lossy().to_string(),
            demo_runs_dir: base.join("demo-runs").to_string_lossy().to_string(),
        }
    }

    #[tokio::test]
    async fn appending_two_run_logs_produces_two_lines() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FileDriver::new(temp_paths(&dir));
        driver.append_run_log(&LedgerEntry::new("run-1")).await.unwrap();
        driver.append_run_log(&LedgerEntry::new("run-2")).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("runs.jsonl")).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn calibration_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FileDriver::new(temp_paths(&dir));
        let mut records = HashMap::new();
        records.insert(("m1".to_string(), TaskType::Code), CalibrationRecord { n: 3, ewma_quality: 0.8, ewma_abs_dev: 0.1 });

        driver.save_calibration(records.clone()).await.unwrap();
        let loaded = driver.load_calibration().await.unwrap();
        assert_eq!(loaded.get(&("m1".to_string(), TaskType::Code)).unwrap().n, 3);
    }

    #[tokio::test]
    async fn loading_missing_calibration_file_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FileDriver::new(temp_paths(&dir));
        let loaded = driver.load_calibration().await.unwrap();
        assert!(loaded.is_empty());
    }
}
