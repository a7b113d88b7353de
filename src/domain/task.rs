//! `TaskCard` and the enums that classify a unit of work.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Code,
    Writing,
    Analysis,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Low,
    Medium,
    High,
}

/// Caller-supplied constraints on routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub min_quality: Option<f64>,
    pub max_cost_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCard {
    pub id: String,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub constraints: Constraints,
    /// The only multi-tenancy support this system carries: a passthrough tag.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl TaskCard {
    pub fn new(id: impl Into<String>, task_type: TaskType, difficulty: Difficulty) -> Self {
        Self {
            id: id.into(),
            task_type,
            difficulty,
            constraints: Constraints::default(),
            tenant_id: None,
        }
    }
}
