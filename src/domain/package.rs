//! `WorkPackage`: the unit of work the scheduler's DAG executes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::{Difficulty, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Worker,
    Qa,
}

/// QA policy attached to a Worker's dependent QA package. `always_llm_for_high_risk`
/// and `llm_second_pass_importance_threshold` implement the `chooseQaPolicy`
/// behavior decided in DESIGN.md's Open Question resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaPolicy {
    pub llm_second_pass_importance_threshold: u8,
    pub always_llm_for_high_risk: bool,
    pub deterministic_checks: Vec<String>,
}

impl Default for QaPolicy {
    fn default() -> Self {
        Self {
            llm_second_pass_importance_threshold: 4,
            always_llm_for_high_risk: false,
            deterministic_checks: Vec::new(),
        }
    }
}

impl QaPolicy {
    /// `chooseQaPolicy` per the resolved Open Question: the threshold never
    /// moves; high risk instead flips `always_llm_for_high_risk`.
    pub fn for_risk_score(risk_score: f64) -> Self {
        Self {
            llm_second_pass_importance_threshold: 4,
            always_llm_for_high_risk: risk_score >= 0.6,
            deterministic_checks: Vec::new(),
        }
    }
}

/// Fixed QA output shape (§3 invariant: "QA outputs must include
/// `{pass, qualityScore, defects[]}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaOutputs {
    pub pass: bool,
    pub quality_score: f64,
    pub defects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedTokens {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPackage {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Value,
    pub dependencies: Vec<String>,
    pub estimated_tokens: EstimatedTokens,
    pub qa_checks: Option<Vec<String>>,
    pub importance: u8,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub qa_policy: QaPolicy,
    pub tier_profile_override: Option<String>,
    #[serde(default)]
    pub cheapest_viable_chosen: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl WorkPackage {
    /// Invariant: Worker packages carry 3-7 acceptance criteria.
    pub fn has_valid_acceptance_criteria(&self) -> bool {
        if self.role != Role::Worker {
            return true;
        }
        (3..=7).contains(&self.acceptance_criteria.len())
    }

    /// Invariant: importance is in [1, 5].
    pub fn has_valid_importance(&self) -> bool {
        (1..=5).contains(&self.importance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_package(role: Role, criteria: usize) -> WorkPackage {
        WorkPackage {
            id: "p1".into(),
            role,
            name: "do thing".into(),
            description: "desc".into(),
            acceptance_criteria: (0..criteria).map(|i| format!("criterion {i}")).collect(),
            inputs: Value::Null,
            outputs: Value::Null,
            dependencies: Vec::new(),
            estimated_tokens: EstimatedTokens { input: 100, output: 100 },
            qa_checks: None,
            importance: 3,
            task_type: TaskType::Code,
            difficulty: Difficulty::Medium,
            qa_policy: QaPolicy::default(),
            tier_profile_override: None,
            cheapest_viable_chosen: false,
            tenant_id: None,
        }
    }

    #[test]
    fn worker_needs_three_to_seven_criteria() {
        assert!(!base_package(Role::Worker, 2).has_valid_acceptance_criteria());
        assert!(base_package(Role::Worker, 3).has_valid_acceptance_criteria());
        assert!(base_package(Role::Worker, 7).has_valid_acceptance_criteria());
        assert!(!base_package(Role::Worker, 8).has_valid_acceptance_criteria());
    }

    #[test]
    fn qa_packages_are_exempt_from_the_criteria_count_rule() {
        assert!(base_package(Role::Qa, 0).has_valid_acceptance_criteria());
    }

    #[test]
    fn qa_policy_open_question_resolution_keeps_threshold_and_flips_flag() {
        let low_risk = QaPolicy::for_risk_score(0.2);
        assert_eq!(low_risk.llm_second_pass_importance_threshold, 4);
        assert!(!low_risk.always_llm_for_high_risk);

        let high_risk = QaPolicy::for_risk_score(0.75);
        assert_eq!(high_risk.llm_second_pass_importance_threshold, 4);
        assert!(high_risk.always_llm_for_high_risk);
    }
}
