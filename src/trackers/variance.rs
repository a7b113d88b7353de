//! C3 Variance Tracker — running cost-multiplier and quality-bias sums per
//! (model, taskType), gated on minimum sample counts before trusted.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::domain::{Observation, TaskType, VarianceBand};

const MIN_COST_SAMPLES: u32 = 5;
const MIN_QUALITY_SAMPLES: u32 = 5;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct RunningSum {
    n: u32,
    sum: f64,
    sum_sq: f64,
}

impl RunningSum {
    fn push(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    fn variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        let n = self.n as f64;
        ((self.sum_sq / n) - self.mean().powi(2)).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VarianceBucket {
    pub n_cost: u32,
    pub n_quality: u32,
    pub cost_multiplier_mean: f64,
    pub quality_bias_mean: f64,
    pub cost_multiplier_variance: f64,
}

impl VarianceBucket {
    pub fn cost_is_trusted(&self) -> bool {
        self.n_cost >= MIN_COST_SAMPLES
    }

    pub fn quality_is_trusted(&self) -> bool {
        self.n_quality >= MIN_QUALITY_SAMPLES
    }

    pub fn variance_band(&self) -> Option<VarianceBand> {
        if !self.cost_is_trusted() {
            return None;
        }
        let spread = self.cost_multiplier_variance.sqrt();
        Some(VarianceBand {
            low: (self.cost_multiplier_mean - spread).max(0.0),
            high: self.cost_multiplier_mean + spread,
        })
    }
}

#[derive(Debug, Default)]
pub struct VarianceTracker {
    cost: RwLock<HashMap<(String, TaskType), RunningSum>>,
    quality: RwLock<HashMap<(String, TaskType), RunningSum>>,
}

impl VarianceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, observation: &Observation) {
        let key = (observation.model_id.clone(), observation.task_type);
        let ratio = observation.cost_ratio();
        self.cost.write().expect("variance lock poisoned").entry(key.clone()).or_default().push(ratio);

        let bias = observation.actual_quality - observation.predicted_quality;
        self.quality.write().expect("variance lock poisoned").entry(key).or_default().push(bias);
    }

    pub fn bucket_for(&self, model_id: &str, task_type: TaskType) -> VarianceBucket {
        let key = (model_id.to_string(), task_type);
        let cost = self.cost.read().expect("variance lock poisoned").get(&key).copied().unwrap_or_default();
        let quality = self.quality.read().expect("variance lock poisoned").get(&key).copied().unwrap_or_default();

        VarianceBucket {
            n_cost: cost.n,
            n_quality: quality.n,
            cost_multiplier_mean: if cost.n == 0 { 1.0 } else { cost.mean() },
            quality_bias_mean: quality.mean(),
            cost_multiplier_variance: cost.variance(),
        }
    }

    /// Flattened `(model_id, taskType) -> bucket` view for persistence.
    pub fn snapshot(&self) -> Vec<(String, TaskType, VarianceBucket)> {
        let cost_guard = self.cost.read().expect("variance lock poisoned");
        let quality_guard = self.quality.read().expect("variance lock poisoned");
        let keys: std::collections::HashSet<(String, TaskType)> =
            cost_guard.keys().chain(quality_guard.keys()).cloned().collect();
        drop(cost_guard);
        drop(quality_guard);

        keys.into_iter().map(|(model_id, task_type)| {
            let bucket = self.bucket_for(&model_id, task_type);
            (model_id, task_type, bucket)
        }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Difficulty;
    use chrono::Utc;

    fn obs(model_id: &str, predicted_cost: f64, actual_cost: f64, predicted_q: f64, actual_q: f64) -> Observation {
        Observation {
            model_id: model_id.into(),
            task_type: TaskType::Code,
            difficulty: Difficulty::Medium,
            predicted_cost_usd: predicted_cost,
            actual_cost_usd: actual_cost,
            predicted_quality: predicted_q,
            actual_quality: actual_q,
            defect_count: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn untrusted_bucket_defaults_to_neutral_multiplier() {
        let tracker = VarianceTracker::new();
        let bucket = tracker.bucket_for("m1", TaskType::Code);
        assert!(!bucket.cost_is_trusted());
        assert_eq!(bucket.cost_multiplier_mean, 1.0);
        assert!(bucket.variance_band().is_none());
    }

    #[test]
    fn becomes_trusted_after_minimum_sample_count() {
        let tracker = VarianceTracker::new();
        for _ in 0..5 {
            tracker.record(&obs("m1", 1.0, 1.2, 0.8, 0.8));
        }
        let bucket = tracker.bucket_for("m1", TaskType::Code);
        assert!(bucket.cost_is_trusted());
        assert!((bucket.cost_multiplier_mean - 1.2).abs() < 1e-9);
        assert!(bucket.variance_band().is_some());
    }

    #[test]
    fn quality_bias_can_be_negative_when_actual_underperforms_predicted() {
        let tracker = VarianceTracker::new();
        for _ in 0..5 {
            tracker.record(&obs("m1", 1.0, 1.0, 0.9, 0.6));
        }
        let bucket = tracker.bucket_for("m1", TaskType::Code);
        assert!(bucket.quality_bias_mean < 0.0);
    }

    #[test]
    fn cost_ratio_guards_against_division_by_zero_predicted_cost() {
        let observation = obs("m1", 0.0, 1.0, 0.5, 0.5);
        assert_eq!(observation.cost_ratio(), 1.0);
    }
}
