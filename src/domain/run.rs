//! `RunSession`: the lifetime-scoped record of one project run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub total: u32,
    pub completed: u32,
    pub running: u32,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub partial_result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub id: String,
    pub status: RunStatus,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl RunSession {
    pub fn new(id: impl Into<String>, total_packages: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: RunStatus::Running,
            progress: Progress {
                total: total_packages,
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
            tenant_id: None,
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.updated_at = Utc::now();
    }
}
