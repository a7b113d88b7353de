//! `PerformancePrior` and `Observation`: the evaluator's rolling-window inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Difficulty, TaskType};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VarianceBand {
    pub low: f64,
    pub high: f64,
}

/// Per (model, taskType, difficulty) prior derived from a rolling observation
/// window by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePrior {
    pub model_id: String,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub quality_prior: f64,
    pub cost_multiplier: f64,
    pub sample_count: u64,
    pub defect_rate: Option<f64>,
    pub variance_band: Option<VarianceBand>,
    pub last_updated: DateTime<Utc>,
}

impl PerformancePrior {
    /// Clamp to the invariants named in the data model: quality in [0,1],
    /// cost multiplier in [0.25, 5].
    pub fn clamped(mut self) -> Self {
        self.quality_prior = self.quality_prior.clamp(0.0, 1.0);
        self.cost_multiplier = self.cost_multiplier.clamp(0.25, 5.0);
        self
    }
}

/// Append-only observation record feeding the trackers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub model_id: String,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub predicted_cost_usd: f64,
    pub actual_cost_usd: f64,
    pub predicted_quality: f64,
    pub actual_quality: f64,
    pub defect_count: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn cost_ratio(&self) -> f64 {
        if self.predicted_cost_usd <= 0.0 {
            1.0
        } else {
            self.actual_cost_usd / self.predicted_cost_usd
        }
    }
}
