//! Router/scheduler-specific instruments recorded through the global
//! `metrics` facade (see [`super::recorder::init_metrics`] for the exporter
//! that actually serves them).

use crate::domain::{LedgerDecision, LedgerEntry, RoutingStatus};

/// Emits counters/histograms/gauges for one completed run's ledger. Cheap
/// and infallible: metrics recording never fails a run (§7 "Trackers
/// swallow I/O errors").
pub fn record_run(entry: &LedgerEntry, remaining_budget_usd: f64) {
    metrics::counter!("task_router_packages_total", entry.counts.total_packages as u64);
    metrics::counter!("task_router_packages_succeeded_total", entry.counts.succeeded as u64);
    metrics::counter!("task_router_packages_failed_total", entry.counts.failed as u64);
    metrics::counter!("task_router_packages_skipped_budget_total", entry.counts.skipped_budget as u64);
    metrics::counter!("task_router_escalations_total", entry.escalations as u64);
    metrics::counter!("task_router_portfolio_bypass_total", entry.portfolio_bypass_count as u64);
    metrics::gauge!("task_router_run_cost_usd", entry.costs.total_usd);
    metrics::gauge!("task_router_budget_remaining_usd", remaining_budget_usd);

    for decision in &entry.decisions {
        if let LedgerDecision::Route { routing_candidates, .. } = decision {
            let status_label = route_status_label(routing_candidates);
            metrics::counter!("task_router_routing_decisions_total", 1, "status" => status_label);
        }
    }
}

fn route_status_label(audit: &crate::domain::RoutingAudit) -> &'static str {
    if audit.candidates.iter().any(|c| c.passed) {
        "ok"
    } else {
        "no_qualified_models"
    }
}

/// Records a single attempt's latency, keyed by model id and outcome.
pub fn record_attempt_latency(model_id: &str, latency_ms: u64, status: RoutingStatus) {
    let status_label = match status {
        RoutingStatus::Ok => "ok",
        RoutingStatus::BestEffort => "best_effort",
        RoutingStatus::NoQualifiedModels => "no_qualified_models",
    };
    metrics::histogram!(
        "task_router_attempt_latency_ms",
        latency_ms as f64,
        "model_id" => model_id.to_string(),
        "status" => status_label,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateAudit, CostBuckets, LedgerCounts, RoutingAudit};

    #[test]
    fn record_run_does_not_panic_without_an_installed_recorder() {
        let mut entry = LedgerEntry::new("run-1");
        entry.counts = LedgerCounts { total_packages: 1, succeeded: 1, failed: 0, skipped_budget: 0 };
        entry.costs = CostBuckets { total_usd: 0.01, ..Default::default() };
        entry.push_decision(LedgerDecision::Route {
            package_id: "p1".into(),
            tier_profile: "default".into(),
            chosen_model_id: Some("m1".into()),
            chosen_predicted_cost_usd: Some(0.01),
            ranked_by: Some("best_value".into()),
            enforce_cheapest_viable: false,
            routing_candidates: RoutingAudit {
                candidates: vec![CandidateAudit {
                    model_id: "m1".into(),
                    predicted_cost: 0.01,
                    predicted_quality: 0.8,
                    passed: true,
                    disqualified_reason: None,
                    score: None,
                    value_score_entry: None,
                }],
                escalation_aware: None,
            },
            pricing_mismatch_count: 0,
        });

        record_run(&entry, 0.5);
        record_attempt_latency("m1", 120, RoutingStatus::Ok);
    }
}
