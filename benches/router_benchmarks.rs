//! Throughput of the pure routing path (§4.1): candidate qualification plus
//! selection-policy scoring, the hot loop `scheduler::run_packages` drives
//! once per package per attempt.

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use task_router_core::{
    Difficulty, Governance, Model, ModelStatus, PortfolioOptions, Pricing, RoutingCandidate,
    RoutingOptions, RouterConfig, SelectionPolicy, TaskCard, TaskType,
};

fn registry_candidates(n: usize) -> Vec<RoutingCandidate> {
    (0..n)
        .map(|i| {
            let mut expertise = HashMap::new();
            for task_type in [TaskType::Code, TaskType::Writing, TaskType::Analysis, TaskType::General] {
                expertise.insert(task_type, 0.6 + (i as f64 % 10.0) / 25.0);
            }
            let model = Model {
                id: format!("m{i}"),
                provider: if i % 2 == 0 { "openai".into() } else { "anthropic".into() },
                pricing: Pricing::new(0.0001 + i as f64 * 0.0001, 0.0002 + i as f64 * 0.0002),
                expertise,
                reliability: 0.9,
                status: ModelStatus::Active,
                governance: Governance::default(),
            };
            RoutingCandidate { model, quality_prior: None, raw_confidence: 0.0, candidate_score: None }
        })
        .collect()
}

fn bench_route(c: &mut Criterion) {
    let task = TaskCard::new("bench", TaskType::Code, Difficulty::Medium);
    let candidates = registry_candidates(50);
    let portfolio = PortfolioOptions::default();
    let options = RoutingOptions::default();

    let mut group = c.benchmark_group("route");
    for policy in [SelectionPolicy::LowestCostQualified, SelectionPolicy::BestValue, SelectionPolicy::CheapestViable] {
        let mut config = RouterConfig::default();
        config.selection_policy = policy;
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter(|| {
                black_box(task_router_core::route(&task, &candidates, &config, &portfolio, &options));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_route);
criterion_main!(benches);
