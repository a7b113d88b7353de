//! End-to-end checks against the concrete router scenarios: a two-model
//! registry routed through `router::route` with no scheduler/executor
//! involved, mirroring how `cli::agent`'s own integration tests exercised
//! the reference platform's routing core directly.

use std::collections::HashMap;

use task_router_core::{
    Difficulty, Governance, Model, ModelStatus, PortfolioOptions, Pricing, RoutingCandidate,
    RoutingOptions, RoutingStatus, RouterConfig, SelectionPolicy, TaskCard, TaskType,
};

fn model(id: &str, provider: &str, in_per_1k: f64, out_per_1k: f64, expertise: f64) -> Model {
    let mut table = HashMap::new();
    for task_type in [TaskType::Code, TaskType::Writing, TaskType::Analysis, TaskType::General] {
        table.insert(task_type, expertise);
    }
    Model {
        id: id.to_string(),
        provider: provider.to_string(),
        pricing: Pricing::new(in_per_1k, out_per_1k),
        expertise: table,
        reliability: 0.9,
        status: ModelStatus::Active,
        governance: Governance::default(),
    }
}

fn candidate(model: Model) -> RoutingCandidate {
    RoutingCandidate { model, quality_prior: None, raw_confidence: 0.0, candidate_score: None }
}

#[test]
fn minimal_cheap_task_picks_the_cheap_model_under_lowest_cost_qualified() {
    let mut task = TaskCard::new("t1", TaskType::Code, Difficulty::Low);
    task.constraints.min_quality = Some(0.0);

    let cheap = model("m-cheap", "openai", 0.0001, 0.0002, 0.75);
    let pro = model("m-pro", "anthropic", 0.002, 0.004, 0.92);
    let candidates = vec![candidate(cheap), candidate(pro)];

    let mut config = RouterConfig::default();
    config.selection_policy = SelectionPolicy::LowestCostQualified;

    let portfolio = PortfolioOptions::default();
    let options = RoutingOptions { max_cost_usd: Some(1.0), directive: Some("print hello".into()), ..Default::default() };

    let decision = task_router_core::route(&task, &candidates, &config, &portfolio, &options);

    assert_eq!(decision.status, RoutingStatus::Ok);
    assert_eq!(decision.chosen_model_id.as_deref(), Some("m-cheap"));
    assert_eq!(decision.routing_audit.candidates.len(), 2);
    assert!(decision.routing_audit.candidates.iter().all(|c| c.passed));
}

#[test]
fn best_value_near_threshold_falls_back_when_nothing_qualifies_strictly() {
    let mut task = TaskCard::new("t2", TaskType::Analysis, Difficulty::Medium);
    task.constraints.min_quality = Some(0.8);

    let model_a = model("m-a", "openai", 0.001, 0.001, 0.79);
    let model_b = model("m-b", "anthropic", 0.01, 0.01, 0.90);
    let candidates = vec![candidate(model_a), candidate(model_b)];

    let mut config = RouterConfig::default();
    config.selection_policy = SelectionPolicy::BestValue;

    let portfolio = PortfolioOptions::default();
    let options = RoutingOptions::default();

    let decision = task_router_core::route(&task, &candidates, &config, &portfolio, &options);

    // Either a strict qualifier wins outright, or the near-threshold fallback
    // picks m-a — never "no qualified models" when a near-threshold model exists.
    assert_eq!(decision.status, RoutingStatus::Ok);
    assert!(decision.chosen_model_id.is_some());
}

#[test]
fn disabled_models_are_never_eligible() {
    let task = TaskCard::new("t3", TaskType::General, Difficulty::Low);

    let mut disabled = model("m-off", "openai", 0.0001, 0.0001, 0.99);
    disabled.status = ModelStatus::Disabled;
    let candidates = vec![candidate(disabled)];

    let config = RouterConfig::default();
    let portfolio = PortfolioOptions::default();
    let options = RoutingOptions::default();

    let decision = task_router_core::route(&task, &candidates, &config, &portfolio, &options);

    assert_eq!(decision.status, RoutingStatus::NoQualifiedModels);
    assert!(decision.chosen_model_id.is_none());
}
