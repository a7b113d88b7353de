//! `LedgerEntry` and the decision records the scheduler emits into it.

use serde::{Deserialize, Serialize};

use super::routing::{PortfolioBypassReason, RoutingAudit};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerDecision {
    #[serde(rename = "ROUTE")]
    Route {
        package_id: String,
        tier_profile: String,
        chosen_model_id: Option<String>,
        chosen_predicted_cost_usd: Option<f64>,
        ranked_by: Option<String>,
        enforce_cheapest_viable: bool,
        routing_candidates: RoutingAudit,
        pricing_mismatch_count: u32,
    },
    #[serde(rename = "BUDGET_OPTIMIZATION")]
    BudgetOptimization {
        package_id: String,
        remaining_budget_usd: f64,
        reservation_usd: f64,
    },
    #[serde(rename = "COUNCIL_PLANNING_SKIPPED")]
    CouncilPlanningSkipped { reason: String },
    #[serde(rename = "ESCALATION")]
    Escalation {
        package_id: String,
        from_model_id: String,
        to_model_id: String,
        incremental_cost_usd: f64,
    },
    #[serde(rename = "PORTFOLIO_VALIDATION_FAILED")]
    PortfolioValidationFailed {
        reason: PortfolioBypassReason,
        missing_model_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBuckets {
    pub council_usd: f64,
    pub worker_usd: f64,
    pub qa_usd: f64,
    pub deterministic_qa_usd: f64,
    pub total_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleExecutionRole {
    Worker,
    Qa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleExecution {
    pub package_id: String,
    pub role: RoleExecutionRole,
    pub model_id: String,
    pub cost_usd: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub total_packages: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped_budget: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub run_session_id: String,
    pub decisions: Vec<LedgerDecision>,
    pub costs: CostBuckets,
    pub role_executions: Vec<RoleExecution>,
    pub counts: LedgerCounts,
    pub escalations: u32,
    pub portfolio_bypass_count: u32,
}

impl LedgerEntry {
    pub fn new(run_session_id: impl Into<String>) -> Self {
        Self {
            run_session_id: run_session_id.into(),
            ..Default::default()
        }
    }

    pub fn push_decision(&mut self, decision: LedgerDecision) {
        if matches!(decision, LedgerDecision::Escalation { .. }) {
            self.escalations += 1;
        }
        if matches!(decision, LedgerDecision::PortfolioValidationFailed { .. }) {
            self.portfolio_bypass_count += 1;
        }
        self.decisions.push(decision);
    }
}
