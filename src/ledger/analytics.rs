//! C12 Analytics (§4.7): pure aggregation over completed `LedgerEntry`
//! arrays. No I/O, no clock reads — callers pass in whatever window of
//! history they want summarized.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{LedgerDecision, LedgerEntry, PortfolioBypassReason};

/// A cheap-first attempt that escalated and still cost more than routing to
/// the normal (non-cheap-first) choice would have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegretExample {
    pub package_id: String,
    pub cheap_first_model_id: String,
    pub normal_model_id: String,
    pub normal_expected_cost_usd: f64,
    pub realized_cost_usd: f64,
    pub regret_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub runs: u32,
    pub total_packages: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped_budget: u32,
    pub total_cost_usd: f64,
    pub avg_cost_per_package_usd: f64,
    pub escalations: u32,
    pub portfolio_bypass_count: u32,
    pub bypass_reason_histogram: HashMap<PortfolioBypassReason, u32>,
    pub cheap_first_primary_blocker_histogram: HashMap<String, u32>,
    pub regret_examples: Vec<RegretExample>,
}

/// Aggregates totals/averages, bypass histograms, and regret examples across
/// a window of ledger entries. Pure: the caller decides what "a window"
/// means (a run, a day, a tenant) by slicing `entries` beforehand.
pub fn summarize(entries: &[LedgerEntry]) -> AnalyticsSummary {
    let mut summary = AnalyticsSummary { runs: entries.len() as u32, ..Default::default() };

    for entry in entries {
        summary.total_packages += entry.counts.total_packages;
        summary.succeeded += entry.counts.succeeded;
        summary.failed += entry.counts.failed;
        summary.skipped_budget += entry.counts.skipped_budget;
        summary.total_cost_usd += entry.costs.total_usd;
        summary.escalations += entry.escalations;
        summary.portfolio_bypass_count += entry.portfolio_bypass_count;

        for decision in &entry.decisions {
            match decision {
                LedgerDecision::PortfolioValidationFailed { reason, .. } => {
                    *summary.bypass_reason_histogram.entry(*reason).or_insert(0) += 1;
                }
                LedgerDecision::Route { package_id, routing_candidates, .. } => {
                    let Some(aware) = &routing_candidates.escalation_aware else { continue };
                    if let Some(blocker) = &aware.primary_blocker {
                        *summary.cheap_first_primary_blocker_histogram.entry(blocker.clone()).or_insert(0) += 1;
                    }
                    if let Some(regret) = regret_for_package(entry, package_id, aware) {
                        summary.regret_examples.push(regret);
                    }
                }
                _ => {}
            }
        }
    }

    summary.avg_cost_per_package_usd =
        if summary.total_packages > 0 { summary.total_cost_usd / summary.total_packages as f64 } else { 0.0 };

    summary
}

fn regret_for_package(
    entry: &LedgerEntry,
    package_id: &str,
    aware: &crate::domain::EscalationAwareAudit,
) -> Option<RegretExample> {
    let cheap_first_model_id = aware.cheap_first_choice.clone()?;

    let escalated = entry.decisions.iter().any(|d| {
        matches!(d, LedgerDecision::Escalation { package_id: p, .. } if p == package_id)
    });
    if !escalated {
        return None;
    }

    let route_decision = entry.decisions.iter().find_map(|d| match d {
        LedgerDecision::Route { package_id: p, routing_candidates, .. } if p == package_id => Some(routing_candidates),
        _ => None,
    })?;
    let normal_expected_cost_usd = route_decision
        .candidates
        .iter()
        .find(|c| c.model_id == aware.normal_choice)
        .map(|c| c.predicted_cost)?;

    let realized_cost_usd: f64 =
        entry.role_executions.iter().filter(|r| r.package_id == package_id).map(|r| r.cost_usd).sum();

    if realized_cost_usd <= normal_expected_cost_usd {
        return None;
    }

    Some(RegretExample {
        package_id: package_id.to_string(),
        cheap_first_model_id,
        normal_model_id: aware.normal_choice.clone(),
        normal_expected_cost_usd,
        realized_cost_usd,
        regret_usd: realized_cost_usd - normal_expected_cost_usd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CandidateAudit, CostBuckets, EscalationAwareAudit, LedgerCounts, RoleExecution, RoleExecutionRole, RoutingAudit,
    };

    fn candidate(model_id: &str, predicted_cost: f64) -> CandidateAudit {
        CandidateAudit {
            model_id: model_id.into(),
            predicted_cost,
            predicted_quality: 0.8,
            passed: true,
            disqualified_reason: None,
            score: None,
            value_score_entry: None,
        }
    }

    fn entry_with_regret() -> LedgerEntry {
        let mut entry = LedgerEntry::new("run-1");
        entry.counts = LedgerCounts { total_packages: 1, succeeded: 1, failed: 0, skipped_budget: 0 };
        entry.costs = CostBuckets { worker_usd: 0.5, total_usd: 0.5, ..Default::default() };

        entry.push_decision(LedgerDecision::Route {
            package_id: "p1".into(),
            tier_profile: "default".into(),
            chosen_model_id: Some("cheap".into()),
            chosen_predicted_cost_usd: Some(0.05),
            ranked_by: Some("best_value".into()),
            enforce_cheapest_viable: false,
            routing_candidates: RoutingAudit {
                candidates: vec![candidate("cheap", 0.05), candidate("strong", 0.2)],
                escalation_aware: Some(EscalationAwareAudit {
                    normal_choice: "strong".into(),
                    cheap_first_choice: Some("cheap".into()),
                    savings_usd: Some(0.15),
                    gate_progress: vec!["quality_gate".into()],
                    primary_blocker: Some("quality_gate".into()),
                }),
            },
            pricing_mismatch_count: 0,
        });
        entry.push_decision(LedgerDecision::Escalation {
            package_id: "p1".into(),
            from_model_id: "cheap".into(),
            to_model_id: "strong".into(),
            incremental_cost_usd: 0.3,
        });
        entry.role_executions.push(RoleExecution {
            package_id: "p1".into(),
            role: RoleExecutionRole::Worker,
            model_id: "strong".into(),
            cost_usd: 0.35,
            success: true,
        });
        entry
    }

    #[test]
    fn totals_sum_across_entries() {
        let entries = vec![entry_with_regret(), entry_with_regret()];
        let summary = summarize(&entries);
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.total_packages, 2);
        assert_eq!(summary.succeeded, 2);
        assert!((summary.total_cost_usd - 1.0).abs() < 1e-9);
        assert!((summary.avg_cost_per_package_usd - 0.5).abs() < 1e-9);
    }

    #[test]
    fn primary_blocker_histogram_counts_occurrences() {
        let entries = vec![entry_with_regret(), entry_with_regret()];
        let summary = summarize(&entries);
        assert_eq!(summary.cheap_first_primary_blocker_histogram.get("quality_gate"), Some(&2));
    }

    #[test]
    fn regret_example_captured_when_realized_exceeds_normal_expected() {
        let entries = vec![entry_with_regret()];
        let summary = summarize(&entries);
        assert_eq!(summary.regret_examples.len(), 1);
        let regret = &summary.regret_examples[0];
        assert_eq!(regret.package_id, "p1");
        assert_eq!(regret.cheap_first_model_id, "cheap");
        assert_eq!(regret.normal_model_id, "strong");
        assert!((regret.normal_expected_cost_usd - 0.2).abs() < 1e-9);
        assert!((regret.realized_cost_usd - 0.35).abs() < 1e-9);
        assert!(regret.regret_usd > 0.0);
    }

    #[test]
    fn no_regret_when_cheap_first_never_considered() {
        let mut entry = LedgerEntry::new("run-2");
        entry.push_decision(LedgerDecision::Route {
            package_id: "p2".into(),
            tier_profile: "default".into(),
            chosen_model_id: Some("m1".into()),
            chosen_predicted_cost_usd: Some(0.1),
            ranked_by: Some("best_value".into()),
            enforce_cheapest_viable: false,
            routing_candidates: RoutingAudit { candidates: vec![candidate("m1", 0.1)], escalation_aware: None },
            pricing_mismatch_count: 0,
        });
        let summary = summarize(&[entry]);
        assert!(summary.regret_examples.is_empty());
    }

    #[test]
    fn bypass_reason_histogram_counts_by_reason() {
        let mut entry = LedgerEntry::new("run-3");
        entry.push_decision(LedgerDecision::PortfolioValidationFailed {
            reason: PortfolioBypassReason::NoAllowedModels,
            missing_model_ids: vec!["m1".into()],
        });
        entry.push_decision(LedgerDecision::PortfolioValidationFailed {
            reason: PortfolioBypassReason::NoAllowedModels,
            missing_model_ids: vec![],
        });
        let summary = summarize(&[entry]);
        assert_eq!(summary.bypass_reason_histogram.get(&PortfolioBypassReason::NoAllowedModels), Some(&2));
    }
}
