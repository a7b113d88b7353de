//! C9 Task Runner (§4.2): the single-task state machine composing the
//! router, executor pool, and evaluator, with one fallback retry and one
//! optional escalation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{CoreError, Result, TaskCard, TaskType};
use crate::evaluator::{validate, Judge, JudgeEvaluation, ValidationResult};
use crate::executor::{ExecutionRequest, ExecutorPool, TokenUsage};
use crate::router::{self, EvaluationMode, PortfolioOptions, RoutingCandidate, RoutingOptions, RouterConfig};
use crate::trackers::{CalibrationStore, TrustTracker, VarianceTracker, WorkerTrustSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok,
    ExecutionError,
    ValidationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub model_id: String,
    pub output: Option<String>,
    pub outcome: AttemptOutcome,
    pub reasons: Vec<String>,
    pub cost_usd: f64,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcomeStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChosenAttempt {
    Initial,
    Escalated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunOutcome {
    pub status: RunOutcomeStatus,
    pub attempts: Vec<Attempt>,
    pub routing: crate::domain::RoutingDecision,
    pub judge_eval: Option<JudgeEvaluation>,
    pub chosen_attempt: Option<ChosenAttempt>,
    pub incremental_cost_usd: Option<f64>,
    pub final_output: Option<String>,
}

fn build_prompt(task: &TaskCard, directive: Option<&str>, suffix: &str) -> String {
    let mut prompt = String::new();
    if let Some(directive) = directive {
        if !directive.is_empty() {
            prompt.push_str(&format!("User directive:\n{directive}\n\n"));
        }
    }
    prompt.push_str(&format!("taskType={:?} difficulty={:?} id={}", task.task_type, task.difficulty, task.id));
    prompt.push_str(suffix);
    prompt
}

fn provider_for(candidates: &[RoutingCandidate], model_id: &str) -> Option<String> {
    candidates.iter().find(|c| c.model.id == model_id).map(|c| c.model.provider.clone())
}

fn cost_for(candidates: &[RoutingCandidate], model_id: &str, usage: Option<&TokenUsage>, expected: f64) -> f64 {
    match usage {
        Some(usage) => candidates
            .iter()
            .find(|c| c.model.id == model_id)
            .map(|c| c.model.pricing.expected_cost(usage.input_tokens, usage.output_tokens))
            .unwrap_or(expected),
        None => expected,
    }
}

async fn run_attempt(
    executor_pool: &ExecutorPool,
    candidates: &[RoutingCandidate],
    model_id: &str,
    prompt: String,
    timeout: Duration,
    task_type: TaskType,
) -> (AttemptOutcome, Option<String>, Vec<String>, Option<TokenUsage>) {
    let Some(provider) = provider_for(candidates, model_id) else {
        return (AttemptOutcome::ExecutionError, None, vec!["unknown provider for model".into()], None);
    };
    let request = ExecutionRequest { model_id: model_id.to_string(), prompt, timeout };

    match executor_pool.execute(&provider, &request).await {
        Ok(result) => {
            let validation: ValidationResult = validate(task_type, &result.text);
            if validation.ok {
                (AttemptOutcome::Ok, Some(result.text), Vec::new(), result.usage)
            } else {
                (AttemptOutcome::ValidationFailed, Some(result.text), validation.reasons, result.usage)
            }
        }
        Err(err) => (AttemptOutcome::ExecutionError, None, vec![format!("Execution error: {err}")], None),
    }
}

/// Everything the runner needs that is not itself (router/executor/judge
/// are passed separately to keep each trait object swappable in tests).
pub struct RunnerContext<'a> {
    pub router_config: &'a RouterConfig,
    pub portfolio: &'a PortfolioOptions,
    pub executor_pool: &'a ExecutorPool,
    pub judge: &'a dyn Judge,
    pub calibration: &'a CalibrationStore,
    pub variance: &'a VarianceTracker,
    pub trust: &'a TrustTracker,
    pub attempt_timeout: Duration,
    pub directive: Option<String>,
    pub max_cost_usd: Option<f64>,
    /// Pre-sampled uniform draw in `[0,1)` deciding whether the judge runs;
    /// callers own the RNG so this stays a pure, testable function.
    pub eval_sample_draw: f64,
    pub deterministic_qa_pass: Option<bool>,
}

/// §4.2: runs one task end to end. Pure apart from the executor/judge calls
/// it is handed — no global state is touched except through the tracker
/// references, and those updates happen only after the final attempt.
pub async fn run_task(task: &TaskCard, candidates: &[RoutingCandidate], ctx: &RunnerContext<'_>) -> Result<TaskRunOutcome> {
    let routing_options = RoutingOptions {
        max_cost_usd: ctx.max_cost_usd,
        cheapest_viable_chosen: false,
        directive: ctx.directive.clone(),
    };
    let routing = router::route(task, candidates, ctx.router_config, ctx.portfolio, &routing_options);

    let Some(chosen_model_id) = routing.chosen_model_id.clone() else {
        return Ok(TaskRunOutcome {
            status: RunOutcomeStatus::Failed,
            attempts: Vec::new(),
            routing,
            judge_eval: None,
            chosen_attempt: None,
            incremental_cost_usd: None,
            final_output: None,
        });
    };
    let expected_cost = routing.expected_cost_usd.unwrap_or(0.0);

    let prompt = build_prompt(task, ctx.directive.as_deref(), "");
    let (outcome, output, reasons, usage) =
        run_attempt(ctx.executor_pool, candidates, &chosen_model_id, prompt, ctx.attempt_timeout, task.task_type).await;

    let mut attempts = vec![Attempt {
        model_id: chosen_model_id.clone(),
        output: output.clone(),
        outcome,
        reasons,
        cost_usd: cost_for(candidates, &chosen_model_id, usage.as_ref(), expected_cost),
        usage,
    }];

    let mut final_output = output;
    let mut final_outcome = outcome;
    let mut final_model_id = chosen_model_id.clone();

    if final_outcome != AttemptOutcome::Ok {
        if let Some(fallback_id) = routing.fallback_model_ids.first().cloned() {
            let retry_prompt = build_prompt(task, ctx.directive.as_deref(), "\nRETRY");
            let (fb_outcome, fb_output, fb_reasons, fb_usage) = run_attempt(
                ctx.executor_pool,
                candidates,
                &fallback_id,
                retry_prompt,
                ctx.attempt_timeout,
                task.task_type,
            )
            .await;
            attempts.push(Attempt {
                model_id: fallback_id.clone(),
                output: fb_output.clone(),
                outcome: fb_outcome,
                reasons: fb_reasons,
                cost_usd: cost_for(candidates, &fallback_id, fb_usage.as_ref(), expected_cost),
                usage: fb_usage,
            });
            final_outcome = fb_outcome;
            final_output = fb_output;
            final_model_id = fallback_id;
        }
    }

    if final_outcome != AttemptOutcome::Ok {
        return Ok(TaskRunOutcome {
            status: RunOutcomeStatus::Failed,
            attempts,
            routing,
            judge_eval: None,
            chosen_attempt: None,
            incremental_cost_usd: None,
            final_output: None,
        });
    }

    let escalation = &ctx.router_config.escalation;
    let cheap_first_used = routing
        .routing_audit
        .escalation_aware
        .as_ref()
        .and_then(|audit| audit.cheap_first_choice.as_ref())
        .is_some();
    // §4.2 step 5: in focused mode the sample rate forks on whether
    // cheap-first substituted the attempt-1 model.
    let sample_rate = match escalation.evaluation_mode {
        Some(EvaluationMode::Focused) if cheap_first_used => {
            escalation.cheap_first_eval_rate.unwrap_or(ctx.router_config.evaluation_sample_rate)
        }
        Some(EvaluationMode::Focused) => {
            escalation.normal_eval_rate.unwrap_or(ctx.router_config.evaluation_sample_rate)
        }
        _ => ctx.router_config.evaluation_sample_rate,
    };
    let should_sample = ctx.eval_sample_draw < sample_rate || escalation.require_eval_for_decision;

    let mut judge_eval = None;
    let mut chosen_attempt = None;
    let mut incremental_cost = None;

    if should_sample {
        if let Some(text) = final_output.as_deref() {
            let initial_eval = ctx.judge.evaluate(task.task_type, text).await?;
            ctx.calibration.record(&final_model_id, task.task_type, initial_eval.overall);
            judge_eval = Some(initial_eval.clone());
            chosen_attempt = Some(ChosenAttempt::Initial);

            if escalation.policy == crate::router::EscalationPolicy::PromoteOnLowScore {
                let target = escalation.min_score_by_task_type.as_ref().and_then(|by_type| {
                    by_type.get(&task.task_type).map(|table| table.get(task.difficulty))
                }).unwrap_or_else(|| escalation.min_score_by_difficulty.get(task.difficulty));
                let effective = target - escalation.promotion_margin;
                let resolution = 10f64.powi(escalation.score_resolution as i32);
                let round = |v: f64| (v * resolution).round() / resolution;

                if round(initial_eval.overall) < round(effective) {
                    if let Some(order) = escalation.escalation_model_order_by_task_type.get(&task.task_type) {
                        if let Some(target_model_id) = order.iter().find(|id| id.as_str() != final_model_id).cloned() {
                            let promotion_cost = candidates
                                .iter()
                                .find(|c| c.model.id == target_model_id)
                                .map(|c| c.model.pricing.expected_cost(2500, 1500))
                                .unwrap_or(0.0);
                            let actual_so_far: f64 = attempts.iter().map(|a| a.cost_usd).sum();
                            let within_budget = ctx.max_cost_usd.map_or(true, |max| actual_so_far + promotion_cost <= max);
                            let within_extra = escalation.max_extra_cost_usd.map_or(true, |extra| promotion_cost <= extra);

                            if within_budget && within_extra {
                                let escalate_prompt = build_prompt(task, ctx.directive.as_deref(), "\nESCALATED");
                                let (esc_outcome, esc_output, esc_reasons, esc_usage) = run_attempt(
                                    ctx.executor_pool,
                                    candidates,
                                    &target_model_id,
                                    escalate_prompt,
                                    ctx.attempt_timeout,
                                    task.task_type,
                                )
                                .await;
                                let esc_cost = cost_for(candidates, &target_model_id, esc_usage.as_ref(), promotion_cost);
                                attempts.push(Attempt {
                                    model_id: target_model_id.clone(),
                                    output: esc_output.clone(),
                                    outcome: esc_outcome,
                                    reasons: esc_reasons,
                                    cost_usd: esc_cost,
                                    usage: esc_usage,
                                });

                                if esc_outcome == AttemptOutcome::Ok {
                                    if let Some(esc_text) = esc_output.as_deref() {
                                        let escalated_eval = ctx.judge.evaluate(task.task_type, esc_text).await?;
                                        ctx.calibration.record(&target_model_id, task.task_type, escalated_eval.overall);

                                        let escalated_wins = escalated_eval.overall > initial_eval.overall
                                            || (escalated_eval.overall == initial_eval.overall && esc_cost < attempts[0].cost_usd);

                                        if escalated_wins {
                                            judge_eval = Some(escalated_eval);
                                            chosen_attempt = Some(ChosenAttempt::Escalated);
                                            final_output = esc_output;
                                            final_model_id = target_model_id;
                                        }
                                        incremental_cost = Some(esc_cost);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    let actual_cost = attempts.iter().find(|a| a.model_id == final_model_id).map(|a| a.cost_usd).unwrap_or(expected_cost);
    let cost_ratio = if expected_cost > 0.0 { actual_cost / expected_cost } else { 1.0 };
    let predicted_quality = routing
        .routing_audit
        .candidates
        .iter()
        .find(|c| c.model_id == final_model_id)
        .map(|c| c.predicted_quality)
        .unwrap_or(0.0);
    let actual_quality = judge_eval.as_ref().map(|e| e.overall).unwrap_or(predicted_quality);

    let observation = crate::domain::Observation {
        model_id: final_model_id.clone(),
        task_type: task.task_type,
        difficulty: task.difficulty,
        predicted_cost_usd: expected_cost,
        actual_cost_usd: actual_cost,
        predicted_quality,
        actual_quality,
        defect_count: None,
        timestamp: chrono::Utc::now(),
    };
    ctx.variance.record(&observation);

    let qa_pass = ctx.deterministic_qa_pass.unwrap_or(true);
    let signal = WorkerTrustSignal { predicted_quality, actual_quality, qa_pass, cost_ratio };
    ctx.trust.update_worker(&final_model_id, &signal, chrono::Utc::now());
    if let Some(deterministic_pass) = ctx.deterministic_qa_pass {
        let llm_agrees_with_deterministic = judge_eval.as_ref().map(|e| e.overall >= 0.5).unwrap_or(deterministic_pass);
        ctx.trust.update_qa(&final_model_id, llm_agrees_with_deterministic == deterministic_pass, chrono::Utc::now());
    }

    info!(task_id = %task.id, model_id = %final_model_id, "task run finalized");

    Ok(TaskRunOutcome {
        status: RunOutcomeStatus::Done,
        attempts,
        routing,
        judge_eval,
        chosen_attempt,
        incremental_cost_usd: incremental_cost,
        final_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Difficulty, Governance, ModelStatus, Pricing};
    use crate::evaluator::{FixedJudge, JudgeDimensions};
    use crate::executor::MockExecutor;
    use std::collections::HashMap as Map;

    fn candidate(id: &str) -> RoutingCandidate {
        RoutingCandidate {
            model: crate::domain::Model {
                id: id.into(),
                provider: "mock".into(),
                pricing: Pricing::new(0.01, 0.03),
                expertise: Map::from([(TaskType::Code, 0.9)]),
                reliability: 0.9,
                status: ModelStatus::Active,
                governance: Governance::default(),
            },
            quality_prior: None,
            raw_confidence: 0.0,
            candidate_score: None,
        }
    }

    fn context<'a>(
        router_config: &'a RouterConfig,
        portfolio: &'a PortfolioOptions,
        executor_pool: &'a ExecutorPool,
        judge: &'a dyn Judge,
        calibration: &'a CalibrationStore,
        variance: &'a VarianceTracker,
        trust: &'a TrustTracker,
    ) -> RunnerContext<'a> {
        RunnerContext {
            router_config,
            portfolio,
            executor_pool,
            judge,
            calibration,
            variance,
            trust,
            attempt_timeout: Duration::from_secs(5),
            directive: None,
            max_cost_usd: None,
            eval_sample_draw: 0.0,
            deterministic_qa_pass: Some(true),
        }
    }

    #[tokio::test]
    async fn successful_attempt_reaches_done_with_a_judge_eval() {
        let router_config = RouterConfig::default();
        let portfolio = PortfolioOptions::default();
        let mut pool = ExecutorPool::new();
        pool.register("mock", Box::new(MockExecutor::new("a working implementation")));
        let judge = FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.9, completeness: 0.9, clarity: 0.9, safety: 0.9 },
            compliance: 0.9,
        };
        let calibration = CalibrationStore::new();
        let variance = VarianceTracker::new();
        let trust = TrustTracker::new();
        let ctx = context(&router_config, &portfolio, &pool, &judge, &calibration, &variance, &trust);

        let task = TaskCard::new("t1", TaskType::Code, Difficulty::Low);
        let candidates = vec![candidate("m1")];
        let outcome = run_task(&task, &candidates, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunOutcomeStatus::Done);
        assert!(outcome.judge_eval.is_some());
        assert_eq!(outcome.chosen_attempt, Some(ChosenAttempt::Initial));
    }

    #[tokio::test]
    async fn validation_failure_retries_once_on_fallback() {
        let router_config = RouterConfig::default();
        let portfolio = PortfolioOptions::default();
        let mut pool = ExecutorPool::new();
        pool.register("mock", Box::new(MockExecutor::new("I am not sure")));
        let judge = FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.5, completeness: 0.5, clarity: 0.5, safety: 0.5 },
            compliance: 0.5,
        };
        let calibration = CalibrationStore::new();
        let variance = VarianceTracker::new();
        let trust = TrustTracker::new();
        let ctx = context(&router_config, &portfolio, &pool, &judge, &calibration, &variance, &trust);

        let task = TaskCard::new("t1", TaskType::Code, Difficulty::Low);
        let candidates = vec![candidate("m1"), candidate("m2")];
        let outcome = run_task(&task, &candidates, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunOutcomeStatus::Failed);
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[tokio::test]
    async fn focused_mode_uses_normal_eval_rate_when_cheap_first_not_used() {
        let mut router_config = RouterConfig::default();
        router_config.escalation.evaluation_mode = Some(crate::router::EvaluationMode::Focused);
        router_config.escalation.normal_eval_rate = Some(0.0);
        let portfolio = PortfolioOptions::default();
        let mut pool = ExecutorPool::new();
        pool.register("mock", Box::new(MockExecutor::new("a working implementation")));
        let judge = FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.9, completeness: 0.9, clarity: 0.9, safety: 0.9 },
            compliance: 0.9,
        };
        let calibration = CalibrationStore::new();
        let variance = VarianceTracker::new();
        let trust = TrustTracker::new();
        let mut ctx = context(&router_config, &portfolio, &pool, &judge, &calibration, &variance, &trust);
        ctx.eval_sample_draw = 0.01; // clears the default 0.1 rate, but not the focused-mode normal rate of 0.0

        let task = TaskCard::new("t1", TaskType::Code, Difficulty::Low);
        let candidates = vec![candidate("m1")];
        let outcome = run_task(&task, &candidates, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunOutcomeStatus::Done);
        assert!(outcome.judge_eval.is_none());
    }

    #[tokio::test]
    async fn focused_mode_uses_cheap_first_eval_rate_when_cheap_first_substituted() {
        let mut router_config = RouterConfig::default();
        router_config.selection_policy = crate::router::SelectionPolicy::LowestCostQualified;
        router_config.escalation.routing_mode = crate::router::EscalationRoutingMode::EscalationAware;
        router_config.escalation.escalation_model_order_by_task_type.insert(TaskType::Code, vec!["m-normal".to_string()]);
        router_config.escalation.evaluation_mode = Some(crate::router::EvaluationMode::Focused);
        router_config.escalation.normal_eval_rate = Some(0.0);
        router_config.escalation.cheap_first_eval_rate = Some(1.0);

        let portfolio = PortfolioOptions::default();
        let mut pool = ExecutorPool::new();
        pool.register("mock", Box::new(MockExecutor::new("a working implementation")));
        let judge = FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.9, completeness: 0.9, clarity: 0.9, safety: 0.9 },
            compliance: 0.9,
        };
        let calibration = CalibrationStore::new();
        let variance = VarianceTracker::new();
        let trust = TrustTracker::new();
        let mut ctx = context(&router_config, &portfolio, &pool, &judge, &calibration, &variance, &trust);
        ctx.eval_sample_draw = 0.5; // clears cheap_first_eval_rate (1.0), would fail normal_eval_rate (0.0)

        let task = TaskCard::new("t1", TaskType::Code, Difficulty::Medium);
        let normal = candidate("m-normal");
        let mut cheap = candidate("m-cheap");
        cheap.model.pricing = Pricing::new(0.0001, 0.0003);
        cheap.model.expertise = Map::from([(TaskType::Code, 0.60)]);
        cheap.raw_confidence = 0.8;
        let candidates = vec![normal, cheap];

        let outcome = run_task(&task, &candidates, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunOutcomeStatus::Done);
        assert_eq!(outcome.attempts[0].model_id, "m-cheap");
        assert!(outcome.judge_eval.is_some());
    }

    #[tokio::test]
    async fn no_qualified_models_short_circuits_without_attempts() {
        let mut router_config = RouterConfig::default();
        router_config.thresholds = crate::router::DifficultyTable { low: 0.99, medium: 0.99, high: 0.99 };
        let portfolio = PortfolioOptions::default();
        let pool = ExecutorPool::new();
        let judge = FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.5, completeness: 0.5, clarity: 0.5, safety: 0.5 },
            compliance: 0.5,
        };
        let calibration = CalibrationStore::new();
        let variance = VarianceTracker::new();
        let trust = TrustTracker::new();
        let ctx = context(&router_config, &portfolio, &pool, &judge, &calibration, &variance, &trust);

        let task = TaskCard::new("t1", TaskType::Code, Difficulty::Low);
        let candidates = vec![candidate("m1")];
        let outcome = run_task(&task, &candidates, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunOutcomeStatus::Failed);
        assert!(outcome.attempts.is_empty());
    }
}
