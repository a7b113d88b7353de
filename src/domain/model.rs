//! Registry-level model definitions (`Model`, pricing, governance flags).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::TaskType;

/// Lifecycle status of a registered model. `Disabled` models are never
/// eligible for routing regardless of any other field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Active,
    Probation,
    Deprecated,
    Disabled,
}

/// Governance constraints a registry entry can carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Governance {
    #[serde(default)]
    pub allowed_tiers: Vec<String>,
    #[serde(default)]
    pub kill_switch: bool,
    pub min_quality_prior: Option<f64>,
    pub max_cost_variance_ratio: Option<f64>,
}

/// Per-1k-token pricing for a model. Immutable within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pricing {
    pub in_per_1k: f64,
    pub out_per_1k: f64,
}

impl Pricing {
    pub fn new(in_per_1k: f64, out_per_1k: f64) -> Self {
        debug_assert!(in_per_1k >= 0.0 && out_per_1k >= 0.0);
        Self { in_per_1k, out_per_1k }
    }

    /// `(in/1000)*inPer1k + (out/1000)*outPer1k`
    pub fn expected_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.in_per_1k
            + (output_tokens as f64 / 1000.0) * self.out_per_1k
    }
}

/// A single entry in the model registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub provider: String,
    pub pricing: Pricing,
    /// Per-taskType expertise prior, `expertise[taskType] ∈ [0,1]`.
    pub expertise: HashMap<TaskType, f64>,
    pub reliability: f64,
    pub status: ModelStatus,
    #[serde(default)]
    pub governance: Governance,
}

impl Model {
    pub fn is_eligible(&self) -> bool {
        self.status != ModelStatus::Disabled && !self.governance.kill_switch
    }

    pub fn expertise_for(&self, task_type: TaskType) -> f64 {
        self.expertise.get(&task_type).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model(status: ModelStatus) -> Model {
        Model {
            id: "m1".into(),
            provider: "openai".into(),
            pricing: Pricing::new(0.01, 0.03),
            expertise: HashMap::from([(TaskType::Code, 0.8)]),
            reliability: 0.9,
            status,
            governance: Governance::default(),
        }
    }

    #[test]
    fn disabled_model_is_never_eligible() {
        let model = sample_model(ModelStatus::Disabled);
        assert!(!model.is_eligible());
    }

    #[test]
    fn kill_switch_overrides_active_status() {
        let mut model = sample_model(ModelStatus::Active);
        model.governance.kill_switch = true;
        assert!(!model.is_eligible());
    }

    #[test]
    fn expected_cost_matches_per_1k_formula() {
        let pricing = Pricing::new(10.0, 30.0);
        let cost = pricing.expected_cost(1000, 500);
        assert!((cost - 25.0).abs() < 1e-9);
    }

    #[test]
    fn expertise_for_missing_task_type_defaults_to_zero() {
        let model = sample_model(ModelStatus::Active);
        assert_eq!(model.expertise_for(TaskType::Writing), 0.0);
    }
}
