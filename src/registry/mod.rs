//! Model Registry (C1): the authoritative, read-mostly list of routable models.
//!
//! Shaped after the reference platform's `agents::registry::AgentRegistry` —
//! a `HashMap`-backed store with list/filter accessors — generalized from
//! "one entry per agent" to "one entry per LLM model" and extended with the
//! write-path (`upsert`/`set_status`) the spec's concurrency model requires:
//! registry writes take a lock and publish an invalidation token the
//! portfolio cache consumes (§9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::domain::{Model, ModelStatus, PerformancePrior, TaskType};

/// One-shot invalidation token consumed by the portfolio cache. Each
/// successful mutation bumps this counter; `ModelRegistry::version()` lets a
/// cache holder detect "a write happened since my last lookup".
#[derive(Debug)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Model>>,
    priors: RwLock<HashMap<(String, TaskType, crate::domain::Difficulty), PerformancePrior>>,
    version: AtomicU64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            priors: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
        }
    }

    pub fn from_models(models: impl IntoIterator<Item = Model>) -> Self {
        let registry = Self::new();
        for model in models {
            registry.upsert(model);
        }
        registry
    }

    /// Monotonically increasing version; bumped on every write.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn upsert(&self, model: Model) {
        let mut guard = self.models.write().expect("registry lock poisoned");
        guard.insert(model.id.clone(), model);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_status(&self, model_id: &str, status: ModelStatus) -> bool {
        let mut guard = self.models.write().expect("registry lock poisoned");
        let Some(model) = guard.get_mut(model_id) else {
            return false;
        };
        model.status = status;
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn get(&self, model_id: &str) -> Option<Model> {
        self.models.read().expect("registry lock poisoned").get(model_id).cloned()
    }

    pub fn list(&self) -> Vec<Model> {
        self.models.read().expect("registry lock poisoned").values().cloned().collect()
    }

    pub fn list_eligible(&self) -> Vec<Model> {
        self.list().into_iter().filter(Model::is_eligible).collect()
    }

    pub fn count(&self) -> usize {
        self.models.read().expect("registry lock poisoned").len()
    }

    pub fn record_prior(&self, prior: PerformancePrior) {
        let key = (prior.model_id.clone(), prior.task_type, prior.difficulty);
        self.priors.write().expect("priors lock poisoned").insert(key, prior.clamped());
    }

    pub fn prior_for(
        &self,
        model_id: &str,
        task_type: TaskType,
        difficulty: crate::domain::Difficulty,
    ) -> Option<PerformancePrior> {
        self.priors
            .read()
            .expect("priors lock poisoned")
            .get(&(model_id.to_string(), task_type, difficulty))
            .cloned()
    }

    /// Sorted ids, used as half of the portfolio cache key (§4.3).
    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.read().expect("registry lock poisoned").keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Deterministic fallback registry for the CLI and HTTP bootstrap when no
/// external model source is configured: a cheap/mid/pro spread across both
/// providers, enough to exercise routing end to end (§8 scenario 1's
/// `M_cheap`/`M_pro` shape).
pub fn demo_seed() -> ModelRegistry {
    use crate::domain::{Governance, Pricing};
    use std::collections::HashMap as Map;

    let expertise = |code: f64, writing: f64, analysis: f64, general: f64| {
        Map::from([
            (TaskType::Code, code),
            (TaskType::Writing, writing),
            (TaskType::Analysis, analysis),
            (TaskType::General, general),
        ])
    };

    ModelRegistry::from_models([
        Model {
            id: "gpt-4o-mini".into(),
            provider: "openai".into(),
            pricing: Pricing::new(0.00015, 0.0006),
            expertise: expertise(0.75, 0.72, 0.7, 0.74),
            reliability: 0.92,
            status: ModelStatus::Active,
            governance: Governance::default(),
        },
        Model {
            id: "gpt-4o".into(),
            provider: "openai".into(),
            pricing: Pricing::new(0.0025, 0.01),
            expertise: expertise(0.88, 0.85, 0.86, 0.87),
            reliability: 0.95,
            status: ModelStatus::Active,
            governance: Governance::default(),
        },
        Model {
            id: "claude-sonnet-4-5-20250929".into(),
            provider: "anthropic".into(),
            pricing: Pricing::new(0.003, 0.015),
            expertise: expertise(0.92, 0.9, 0.91, 0.89),
            reliability: 0.96,
            status: ModelStatus::Active,
            governance: Governance::default(),
        },
    ])
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Governance, Pricing};
    use std::collections::HashMap as Map;

    fn model(id: &str, status: ModelStatus) -> Model {
        Model {
            id: id.into(),
            provider: "openai".into(),
            pricing: Pricing::new(0.01, 0.03),
            expertise: Map::from([(TaskType::Code, 0.8)]),
            reliability: 0.9,
            status,
            governance: Governance::default(),
        }
    }

    #[test]
    fn upsert_bumps_version_and_is_retrievable() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.version(), 0);
        registry.upsert(model("m1", ModelStatus::Active));
        assert_eq!(registry.version(), 1);
        assert!(registry.get("m1").is_some());
    }

    #[test]
    fn list_eligible_excludes_disabled_models() {
        let registry = ModelRegistry::from_models([
            model("m1", ModelStatus::Active),
            model("m2", ModelStatus::Disabled),
        ]);
        let eligible = registry.list_eligible();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "m1");
    }

    #[test]
    fn set_status_on_missing_model_returns_false_without_bumping_version() {
        let registry = ModelRegistry::new();
        assert!(!registry.set_status("ghost", ModelStatus::Disabled));
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn sorted_ids_are_lexicographically_ordered() {
        let registry = ModelRegistry::from_models([
            model("zeta", ModelStatus::Active),
            model("alpha", ModelStatus::Active),
        ]);
        assert_eq!(registry.sorted_ids(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
