//! Fully enumerated `RouterConfig`, per §9's design note that dynamic config
//! objects at the router boundary become concrete fields, not loose maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    LowestCostQualified,
    BestValue,
    CheapestViable,
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnBudgetFail {
    Fail,
    BestEffortWithinBudget,
    IgnoreBudget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoQualifiedPolicy {
    Default,
    BestValueNearThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    None,
    PromoteOnLowScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationRoutingMode {
    Normal,
    EscalationAware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    Prod,
    Benchmark,
    Test,
    Focused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyTable<T> {
    pub low: T,
    pub medium: T,
    pub high: T,
}

impl<T: Copy> DifficultyTable<T> {
    pub fn get(&self, difficulty: Difficulty) -> T {
        match difficulty {
            Difficulty::Low => self.low,
            Difficulty::Medium => self.medium,
            Difficulty::High => self.high,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub policy: EscalationPolicy,
    pub max_promotions: u32,
    pub promotion_margin: f64,
    pub score_resolution: u32,
    pub min_score_by_difficulty: DifficultyTable<f64>,
    #[serde(default)]
    pub min_score_by_task_type: Option<HashMap<TaskType, DifficultyTable<f64>>>,
    pub require_eval_for_decision: bool,
    pub escalate_judge_always: bool,
    pub routing_mode: EscalationRoutingMode,
    pub cheap_first_max_gap_by_difficulty: DifficultyTable<f64>,
    #[serde(default)]
    pub cheap_first_max_gap_by_task_type: Option<HashMap<TaskType, DifficultyTable<f64>>>,
    pub cheap_first_min_confidence: f64,
    pub cheap_first_savings_min_pct: f64,
    #[serde(default)]
    pub cheap_first_savings_min_usd: Option<f64>,
    pub cheap_first_budget_headroom_factor: f64,
    pub cheap_first_only_when_can_promote: bool,
    #[serde(default)]
    pub cheap_first_overrides_by_task_type: Option<HashMap<TaskType, bool>>,
    #[serde(default)]
    pub max_extra_cost_usd: Option<f64>,
    pub escalation_model_order_by_task_type: HashMap<TaskType, Vec<String>>,
    #[serde(default)]
    pub evaluation_mode: Option<EvaluationMode>,
    #[serde(default)]
    pub normal_eval_rate: Option<f64>,
    #[serde(default)]
    pub cheap_first_eval_rate: Option<f64>,
    #[serde(default)]
    pub log_primary_blocker_only_when_failed: Option<bool>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            policy: EscalationPolicy::PromoteOnLowScore,
            max_promotions: 1,
            promotion_margin: 0.03,
            score_resolution: 2,
            min_score_by_difficulty: DifficultyTable { low: 0.6, medium: 0.7, high: 0.8 },
            min_score_by_task_type: None,
            require_eval_for_decision: false,
            escalate_judge_always: false,
            routing_mode: EscalationRoutingMode::Normal,
            cheap_first_max_gap_by_difficulty: DifficultyTable { low: 0.06, medium: 0.08, high: 0.10 },
            cheap_first_max_gap_by_task_type: None,
            cheap_first_min_confidence: 0.5,
            cheap_first_savings_min_pct: 0.2,
            cheap_first_savings_min_usd: None,
            cheap_first_budget_headroom_factor: 1.1,
            cheap_first_only_when_can_promote: true,
            cheap_first_overrides_by_task_type: None,
            max_extra_cost_usd: None,
            escalation_model_order_by_task_type: HashMap::new(),
            evaluation_mode: None,
            normal_eval_rate: Some(0.1),
            cheap_first_eval_rate: Some(0.3),
            log_primary_blocker_only_when_failed: Some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub thresholds: DifficultyTable<f64>,
    pub base_token_estimates: HashMap<TaskType, TokenEstimate>,
    pub difficulty_multipliers: DifficultyTable<f64>,
    pub fallback_count: u32,
    pub on_budget_fail: OnBudgetFail,
    pub selection_policy: SelectionPolicy,
    pub no_qualified_policy: NoQualifiedPolicy,
    pub near_threshold_delta_by_difficulty: DifficultyTable<f64>,
    pub min_confidence_to_use_calibration: f64,
    pub confidence_floor: f64,
    pub min_benefit_by_difficulty: DifficultyTable<f64>,
    pub min_benefit_near_threshold_by_difficulty: DifficultyTable<f64>,
    pub premium_task_types: Vec<TaskType>,
    pub evaluation_sample_rate: f64,
    pub escalation: EscalationConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            thresholds: DifficultyTable { low: 0.5, medium: 0.65, high: 0.78 },
            base_token_estimates: HashMap::from([
                (TaskType::Code, TokenEstimate { input: 2500, output: 1500 }),
                (TaskType::Writing, TokenEstimate { input: 2000, output: 1000 }),
                (TaskType::Analysis, TokenEstimate { input: 3000, output: 2000 }),
                (TaskType::General, TokenEstimate { input: 2000, output: 1000 }),
            ]),
            difficulty_multipliers: DifficultyTable { low: 0.7, medium: 1.0, high: 1.5 },
            fallback_count: 1,
            on_budget_fail: OnBudgetFail::Fail,
            selection_policy: SelectionPolicy::BestValue,
            no_qualified_policy: NoQualifiedPolicy::Default,
            near_threshold_delta_by_difficulty: DifficultyTable { low: 0.04, medium: 0.06, high: 0.10 },
            min_confidence_to_use_calibration: 0.3,
            confidence_floor: 0.2,
            min_benefit_by_difficulty: DifficultyTable { low: 0.0, medium: 0.02, high: 0.05 },
            min_benefit_near_threshold_by_difficulty: DifficultyTable { low: 0.0, medium: 0.0, high: 0.0 },
            premium_task_types: Vec::new(),
            evaluation_sample_rate: 0.1,
            escalation: EscalationConfig::default(),
        }
    }
}
