//! C5 Portfolio Optimizer — deterministic five-slot assignment of registry
//! models to canonical worker/QA roles, per §4.5.

use serde::{Deserialize, Serialize};

use crate::domain::{Model, TaskType};
use crate::registry::ModelRegistry;
use crate::trackers::{TrustTracker, VarianceTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioSlot {
    WorkerCheap,
    WorkerImplementation,
    WorkerStrategy,
    QaPrimary,
    QaBackup,
}

impl PortfolioSlot {
    pub const ALL: [PortfolioSlot; 5] = [
        PortfolioSlot::WorkerCheap,
        PortfolioSlot::WorkerImplementation,
        PortfolioSlot::WorkerStrategy,
        PortfolioSlot::QaPrimary,
        PortfolioSlot::QaBackup,
    ];

    fn is_qa(self) -> bool {
        matches!(self, PortfolioSlot::QaPrimary | PortfolioSlot::QaBackup)
    }

    fn label(self) -> &'static str {
        match self {
            PortfolioSlot::WorkerCheap => "workerCheap",
            PortfolioSlot::WorkerImplementation => "workerImplementation",
            PortfolioSlot::WorkerStrategy => "workerStrategy",
            PortfolioSlot::QaPrimary => "qaPrimary",
            PortfolioSlot::QaBackup => "qaBackup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub worker_trust_floor: f64,
    pub qa_trust_floor: f64,
    pub min_predicted_quality: f64,
    pub worker_cheap_quality_relaxation: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            worker_trust_floor: 0.5,
            qa_trust_floor: 0.55,
            min_predicted_quality: 0.72,
            worker_cheap_quality_relaxation: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAssignment {
    pub model_id: String,
    pub is_fallback: bool,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioRecommendation {
    pub worker_cheap: Option<PortfolioAssignment>,
    pub worker_implementation: Option<PortfolioAssignment>,
    pub worker_strategy: Option<PortfolioAssignment>,
    pub qa_primary: Option<PortfolioAssignment>,
    pub qa_backup: Option<PortfolioAssignment>,
}

impl PortfolioRecommendation {
    pub fn slot_model_id(&self, slot: PortfolioSlot) -> Option<&str> {
        match slot {
            PortfolioSlot::WorkerCheap => self.worker_cheap.as_ref(),
            PortfolioSlot::WorkerImplementation => self.worker_implementation.as_ref(),
            PortfolioSlot::WorkerStrategy => self.worker_strategy.as_ref(),
            PortfolioSlot::QaPrimary => self.qa_primary.as_ref(),
            PortfolioSlot::QaBackup => self.qa_backup.as_ref(),
        }
        .map(|assignment| assignment.model_id.as_str())
    }

    pub fn model_ids(&self) -> Vec<String> {
        PortfolioSlot::ALL
            .iter()
            .filter_map(|slot| self.slot_model_id(*slot))
            .map(str::to_string)
            .collect()
    }
}

struct Candidate {
    model: Model,
    score: f64,
}

/// "Augments base reliability with variance qualityBias when nQuality≥5" —
/// base quality is the model's reliability score, corrected by the observed
/// predicted-vs-actual quality bias for this (model, taskType).
fn quality_for(model: &Model, variance: &VarianceTracker, task_type: TaskType) -> f64 {
    let base = model.reliability;
    let bucket = variance.bucket_for(&model.id, task_type);
    if bucket.quality_is_trusted() {
        (base + bucket.quality_bias_mean).clamp(0.0, 1.0)
    } else {
        base
    }
}

fn cost_for(model: &Model, variance: &VarianceTracker, task_type: TaskType) -> f64 {
    let base = model.pricing.expected_cost(1000, 500).max(1e-9);
    let bucket = variance.bucket_for(&model.id, task_type);
    if bucket.cost_is_trusted() {
        base * bucket.cost_multiplier_mean
    } else {
        base
    }
}

fn rank_candidates(
    models: &[Model],
    trust: &TrustTracker,
    variance: &VarianceTracker,
    config: &PortfolioConfig,
    slot: PortfolioSlot,
    task_type: TaskType,
    exclude_provider: Option<&str>,
    exclude_model_id: Option<&str>,
) -> Vec<Candidate> {
    let trust_floor = if slot.is_qa() { config.qa_trust_floor } else { config.worker_trust_floor };
    let quality_floor = if slot == PortfolioSlot::WorkerCheap {
        config.min_predicted_quality - config.worker_cheap_quality_relaxation
    } else {
        config.min_predicted_quality
    };
    let now = chrono::Utc::now();

    let mut candidates: Vec<Candidate> = models
        .iter()
        .filter(|model| model.is_eligible())
        .filter(|model| Some(model.provider.as_str()) != exclude_provider)
        .filter(|model| Some(model.id.as_str()) != exclude_model_id)
        .filter(|model| {
            let entry = trust.get(&model.id, now);
            let relevant_trust = if slot.is_qa() { entry.qa } else { entry.worker };
            relevant_trust >= trust_floor
        })
        .filter(|model| quality_for(model, variance, task_type) >= quality_floor)
        .map(|model| {
            let quality = quality_for(model, variance, task_type);
            let cost = cost_for(model, variance, task_type);
            Candidate { model: model.clone(), score: quality / cost }
        })
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

pub struct PortfolioOptimizer<'a> {
    registry: &'a ModelRegistry,
    trust: &'a TrustTracker,
    variance: &'a VarianceTracker,
    config: PortfolioConfig,
}

impl<'a> PortfolioOptimizer<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        trust: &'a TrustTracker,
        variance: &'a VarianceTracker,
        config: PortfolioConfig,
    ) -> Self {
        Self { registry, trust, variance, config }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Deterministic per-run slot assignment. `task_type` biases the quality
    /// lens each slot is ranked under; worker slots use `Code` by default
    /// callers may override per run context.
    pub fn recommend(&self, task_type: TaskType) -> PortfolioRecommendation {
        let models = self.registry.list();
        let mut recommendation = PortfolioRecommendation::default();

        let implementation = self.fill_slot(&models, PortfolioSlot::WorkerImplementation, task_type, None, None);
        let implementation_provider = implementation
            .as_ref()
            .and_then(|a| self.registry.get(&a.model_id))
            .map(|m| m.provider);
        recommendation.worker_implementation = implementation;

        recommendation.worker_cheap = self.fill_slot(&models, PortfolioSlot::WorkerCheap, task_type, None, None);

        recommendation.worker_strategy = self.fill_slot(
            &models,
            PortfolioSlot::WorkerStrategy,
            task_type,
            implementation_provider.as_deref(),
            None,
        );

        let primary = self.fill_slot(&models, PortfolioSlot::QaPrimary, task_type, None, None);
        let primary_id = primary.as_ref().map(|a| a.model_id.clone());
        recommendation.qa_primary = primary;

        recommendation.qa_backup =
            self.fill_slot(&models, PortfolioSlot::QaBackup, task_type, None, primary_id.as_deref());

        recommendation
    }

    fn fill_slot(
        &self,
        models: &[Model],
        slot: PortfolioSlot,
        task_type: TaskType,
        exclude_provider: Option<&str>,
        exclude_model_id: Option<&str>,
    ) -> Option<PortfolioAssignment> {
        let candidates = rank_candidates(
            models,
            self.trust,
            self.variance,
            &self.config,
            slot,
            task_type,
            exclude_provider,
            exclude_model_id,
        );

        if let Some(best) = candidates.into_iter().next() {
            return Some(PortfolioAssignment { model_id: best.model.id, is_fallback: false, rationale: None });
        }

        models.first().map(|model| PortfolioAssignment {
            model_id: model.id.clone(),
            is_fallback: true,
            rationale: Some(format!("No qualified models for {}; using fallback {}", slot.label(), model.id)),
        })
    }
}
