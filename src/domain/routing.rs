//! Router output contract: `RoutingDecision` and its audit trail.
//!
//! Shaped after the reference platform's `DecisionEvent` contract
//! (`agents::contracts::decision_event`) — every routing call, like every
//! agent invocation there, must leave behind enough structure to reconstruct
//! why a choice was made, not just what the choice was.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStatus {
    Ok,
    BestEffort,
    NoQualifiedModels,
}

/// Why a candidate was excluded from the qualification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisqualifiedReason {
    Disabled,
    BelowQualityThreshold,
    OverBudget,
    NotAllowedByPortfolio,
    BelowMinBenefit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedTokens {
    pub input: u64,
    pub output: u64,
}

/// One row of the routing audit: every model in the input registry appears
/// exactly once here (P10), whether it passed or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAudit {
    pub model_id: String,
    pub predicted_cost: f64,
    pub predicted_quality: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disqualified_reason: Option<DisqualifiedReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_score_entry: Option<f64>,
}

impl CandidateAudit {
    /// P4: gate exclusivity — `passed` and `disqualified_reason` are mutually exclusive.
    pub fn is_consistent(&self) -> bool {
        self.passed == self.disqualified_reason.is_none()
    }
}

/// Cheap-first escalation-aware routing audit, emitted only when escalation
/// routing mode considered substituting a cheaper attempt-1 model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAwareAudit {
    pub normal_choice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheap_first_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings_usd: Option<f64>,
    pub gate_progress: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_blocker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingAudit {
    pub candidates: Vec<CandidateAudit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_aware: Option<EscalationAwareAudit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingMeta {
    pub ranked_by: Option<String>,
    pub enforce_cheapest_viable: bool,
    pub portfolio_bypassed: Option<PortfolioBypass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioBypassReason {
    NoAllowedModels,
    AllowedModelsOverBudget,
    AllowedModelsBelowQuality,
    AllowedModelsBelowTrust,
    PortfolioNotProvided,
    PortfolioCoverageInvalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioBypass {
    pub reason: PortfolioBypassReason,
    #[serde(default)]
    pub missing_model_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub chosen_model_id: Option<String>,
    #[serde(default)]
    pub fallback_model_ids: Vec<String>,
    pub expected_cost_usd: Option<f64>,
    pub estimated_tokens: EstimatedTokens,
    pub status: RoutingStatus,
    pub rationale: String,
    #[serde(default)]
    pub routing_meta: RoutingMeta,
    pub routing_audit: RoutingAudit,
}

impl RoutingDecision {
    pub fn no_qualified(
        estimated_tokens: EstimatedTokens,
        audit: RoutingAudit,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            chosen_model_id: None,
            fallback_model_ids: Vec::new(),
            expected_cost_usd: None,
            estimated_tokens,
            status: RoutingStatus::NoQualifiedModels,
            rationale: rationale.into(),
            routing_meta: RoutingMeta::default(),
            routing_audit: audit,
        }
    }
}
