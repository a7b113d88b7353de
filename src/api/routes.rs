//! Axum handlers for §6's external interface contract. Grounded on
//! `agents::edge_function`'s router-construction and handler shape — one
//! `AppState` extractor per handler, `ApiError` on the failure path.

use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::directive::DecomposeOptions;
use crate::domain::{Constraints, CoreError, Difficulty, RunSession, TaskCard, TaskType};
use crate::evaluator::JudgeEvaluation;
use crate::ledger::{summarize, AnalyticsSummary};
use crate::packager::{build_packages, Subtask};
use crate::portfolio::PortfolioConfig;
use crate::router::{PortfolioOptions, RouterConfig, SelectionPolicy};
use crate::runner::{self, Attempt, RunnerContext, TaskRunOutcome};
use crate::scheduler::{self, ConcurrencyConfig, PortfolioMode, SchedulerConfig, SchedulerContext};
use crate::trackers::TrustEntry;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run_task))
        .route("/projects/run-scenario", post(run_scenario))
        .route("/governance/portfolio-config", get(get_portfolio_config).post(post_portfolio_config))
        .route("/governance/portfolio", get(get_portfolio))
        .route("/governance/trust", get(get_trust))
        .route("/governance/variance", get(get_variance))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.persistence.health_check().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}

// ---------------------------------------------------------------------
// POST /run
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequestBody {
    message: String,
    task_type: TaskType,
    difficulty: Difficulty,
    #[serde(default)]
    constraints: Option<Constraints>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    test_mode: Option<bool>,
    #[serde(default)]
    selection_policy_override: Option<SelectionPolicy>,
    #[serde(default)]
    escalation_routing_mode_override: Option<crate::router::EscalationRoutingMode>,
    #[serde(default)]
    premium_task_types_override: Option<Vec<TaskType>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunLogEvent {
    attempts: Vec<Attempt>,
    routing: crate::domain::RoutingDecision,
    #[serde(rename = "final")]
    final_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy_eval: Option<JudgeEvaluation>,
}

impl From<TaskRunOutcome> for RunLogEvent {
    fn from(outcome: TaskRunOutcome) -> Self {
        Self {
            attempts: outcome.attempts,
            routing: outcome.routing,
            final_output: outcome.final_output,
            policy_eval: outcome.judge_eval,
        }
    }
}

fn effective_router_config(base: &RouterConfig, body: &RunRequestBody) -> RouterConfig {
    let mut config = base.clone();
    if let Some(policy) = body.selection_policy_override {
        config.selection_policy = policy;
    }
    if let Some(mode) = body.escalation_routing_mode_override {
        config.escalation.routing_mode = mode;
    }
    if let Some(premium) = &body.premium_task_types_override {
        config.premium_task_types = premium.clone();
    }
    match body.profile.as_deref() {
        Some("low_cost") => config.selection_policy = SelectionPolicy::LowestCostQualified,
        Some("strict") => config.selection_policy = SelectionPolicy::BestValue,
        _ => {}
    }
    config
}

/// §6 `POST /run`: single-task submission. Exit codes 200/400/500 are
/// produced by [`ApiError`]'s `CoreError` mapping; a graceful
/// `no_qualified_models` routing status still returns 200 with the routing
/// decision embedded in the body.
async fn run_task(State(state): State<AppState>, Json(body): Json<RunRequestBody>) -> Result<Json<RunLogEvent>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::from(CoreError::validation("message must not be empty")));
    }

    let router_config = effective_router_config(&state.router_config, &body);
    let mut task = TaskCard::new(uuid::Uuid::new_v4().to_string(), body.task_type, body.difficulty);
    task.constraints = body.constraints.unwrap_or_default();

    let candidates = scheduler::build_candidates(&state.registry, &state.calibration, task.task_type, task.difficulty);
    let portfolio = PortfolioOptions::default();

    let deterministic_qa_pass = body.test_mode.and_then(|test_mode| test_mode.then_some(true));
    let eval_sample_draw = if body.test_mode == Some(true) { 0.0 } else { rand::random::<f64>() };

    let ctx = RunnerContext {
        router_config: &router_config,
        portfolio: &portfolio,
        executor_pool: &state.executor_pool,
        judge: state.judge.as_ref(),
        calibration: &state.calibration,
        variance: &state.variance,
        trust: &state.trust,
        attempt_timeout: Duration::from_secs(30),
        directive: Some(body.message.clone()),
        max_cost_usd: task.constraints.max_cost_usd,
        eval_sample_draw,
        deterministic_qa_pass,
    };

    let outcome = runner::run_task(&task, &candidates, &ctx).await?;
    Ok(Json(RunLogEvent::from(outcome)))
}

// ---------------------------------------------------------------------
// POST /projects/run-scenario
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConcurrencyOverride {
    #[serde(default)]
    worker: Option<usize>,
    #[serde(default)]
    qa: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunScenarioBody {
    #[serde(default)]
    directive: Option<String>,
    #[serde(default)]
    preset_id: Option<String>,
    project_budget_usd: f64,
    tier_profile: String,
    #[serde(default)]
    difficulty: Option<Difficulty>,
    #[serde(default)]
    estimate_only: bool,
    #[serde(default)]
    include_council_audit: bool,
    #[serde(default)]
    portfolio_mode: Option<PortfolioMode>,
    #[serde(default)]
    concurrency: Option<ConcurrencyOverride>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    r#async: bool,
}

#[derive(Debug, Serialize)]
struct ScenarioPlan {
    subtasks: Vec<Subtask>,
}

#[derive(Debug, Serialize)]
struct ScenarioBundle {
    ledger: crate::domain::LedgerEntry,
    summary: AnalyticsSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust: Option<std::collections::HashMap<String, TrustEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variance: Option<Vec<(String, TaskType, crate::trackers::VarianceBucket)>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RunScenarioResponse {
    EstimateOnly { plan: ScenarioPlan, packages: Vec<crate::domain::WorkPackage> },
    Async { run_session_id: String },
    Completed {
        plan: ScenarioPlan,
        packages: Vec<crate::domain::WorkPackage>,
        result: std::collections::HashMap<String, scheduler::PackageResult>,
        bundle: ScenarioBundle,
    },
}

fn resolve_subtasks(state: &AppState, body: &RunScenarioBody) -> Result<Vec<Subtask>, ApiError> {
    let directive_text = match (&body.directive, &body.preset_id) {
        (Some(directive), _) => directive.clone(),
        (None, Some(preset_id)) => crate::directive::preset_directive(preset_id)
            .ok_or_else(|| ApiError::from(CoreError::validation(format!("unknown presetId '{preset_id}'"))))?
            .to_string(),
        (None, None) => return Err(ApiError::from(CoreError::validation("either directive or presetId is required"))),
    };

    let options = DecomposeOptions { tenant_id: body.tenant_id.clone() };
    state.decomposer.decompose(&directive_text, &options).map_err(ApiError::from)
}

fn council_audit(
    state: &AppState,
    include: bool,
) -> (Option<std::collections::HashMap<String, TrustEntry>>, Option<Vec<(String, TaskType, crate::trackers::VarianceBucket)>>) {
    if !include {
        return (None, None);
    }
    (Some(state.trust.snapshot()), Some(state.variance.snapshot()))
}

/// §6 `POST /projects/run-scenario`. Three distinct response shapes
/// depending on `estimateOnly`/`async`, matched by [`RunScenarioResponse`]'s
/// untagged serialization.
async fn run_scenario(State(state): State<AppState>, Json(body): Json<RunScenarioBody>) -> Result<Json<RunScenarioResponse>, ApiError> {
    let subtasks = resolve_subtasks(&state, &body)?;
    let packages = build_packages(&subtasks)?;

    if body.estimate_only {
        return Ok(Json(RunScenarioResponse::EstimateOnly { plan: ScenarioPlan { subtasks }, packages }));
    }

    let defaults = ConcurrencyConfig::default();
    let concurrency = body
        .concurrency
        .as_ref()
        .map(|c| ConcurrencyConfig { worker: c.worker.unwrap_or(defaults.worker), qa: c.qa.unwrap_or(defaults.qa) })
        .unwrap_or(defaults);

    let portfolio_mode = body.portfolio_mode.unwrap_or_else(|| state.portfolio_mode());
    let sched_config = SchedulerConfig {
        concurrency,
        portfolio_mode,
        tier_profile: body.tier_profile.clone(),
        budget_usd: body.project_budget_usd,
    };

    let portfolio_config = PortfolioConfig::default();
    let draw = rand::random::<f64>();
    let eval_sample_draw = move || draw;

    if body.r#async {
        let run_session_id = uuid::Uuid::new_v4().to_string();
        state.run_sessions.insert(RunSession::new(run_session_id.clone(), packages.len() as u32));

        let background_state = state.clone();
        let session_id = run_session_id.clone();
        let directive = body.directive.clone();
        tokio::spawn(async move {
            let optimizer = crate::portfolio::PortfolioOptimizer::new(
                &background_state.registry,
                &background_state.trust,
                &background_state.variance,
                portfolio_config,
            );
            let ctx = SchedulerContext {
                router_config: &background_state.router_config,
                registry: &background_state.registry,
                executor_pool: &background_state.executor_pool,
                judge: background_state.judge.as_ref(),
                calibration: &background_state.calibration,
                variance: &background_state.variance,
                trust: &background_state.trust,
                portfolio_optimizer: Some(&optimizer),
                portfolio_cache: Some(&background_state.portfolio_cache),
                attempt_timeout: Duration::from_secs(30),
                directive,
                eval_sample_draw: &eval_sample_draw,
            };

            match scheduler::run_packages(&packages, &ctx, &sched_config, &session_id).await {
                Ok((ledger, _results)) => {
                    if let Err(err) = background_state.persistence.append_run_log(&ledger).await {
                        tracing::warn!(%err, "failed to persist async run-scenario ledger");
                    }
                    background_state.run_sessions.update(&session_id, |session| session.mark_completed());
                }
                Err(err) => {
                    tracing::warn!(%err, "async run-scenario failed");
                    background_state.run_sessions.update(&session_id, |session| session.mark_failed());
                }
            }
        });

        return Ok(Json(RunScenarioResponse::Async { run_session_id }));
    }

    let optimizer = crate::portfolio::PortfolioOptimizer::new(&state.registry, &state.trust, &state.variance, portfolio_config);
    let ctx = SchedulerContext {
        router_config: &state.router_config,
        registry: &state.registry,
        executor_pool: &state.executor_pool,
        judge: state.judge.as_ref(),
        calibration: &state.calibration,
        variance: &state.variance,
        trust: &state.trust,
        portfolio_optimizer: Some(&optimizer),
        portfolio_cache: Some(&state.portfolio_cache),
        attempt_timeout: Duration::from_secs(30),
        directive: body.directive.clone(),
        eval_sample_draw: &eval_sample_draw,
    };

    let run_session_id = uuid::Uuid::new_v4().to_string();
    let (ledger, result) = scheduler::run_packages(&packages, &ctx, &sched_config, &run_session_id).await?;
    state.persistence.append_run_log(&ledger).await?;

    let summary = summarize(std::slice::from_ref(&ledger));
    let (trust, variance) = council_audit(&state, body.include_council_audit);

    Ok(Json(RunScenarioResponse::Completed {
        plan: ScenarioPlan { subtasks },
        packages,
        result,
        bundle: ScenarioBundle { ledger, summary, trust, variance },
    }))
}

// ---------------------------------------------------------------------
// Governance endpoints
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PortfolioConfigResponse {
    mode: PortfolioMode,
}

async fn get_portfolio_config(State(state): State<AppState>) -> Json<PortfolioConfigResponse> {
    Json(PortfolioConfigResponse { mode: state.portfolio_mode() })
}

#[derive(Debug, Deserialize)]
struct PortfolioConfigRequest {
    mode: PortfolioMode,
}

async fn post_portfolio_config(
    State(state): State<AppState>,
    Json(body): Json<PortfolioConfigRequest>,
) -> Json<PortfolioConfigResponse> {
    state.set_portfolio_mode(body.mode);
    Json(PortfolioConfigResponse { mode: body.mode })
}

async fn get_portfolio(State(state): State<AppState>) -> Json<Value> {
    let config = PortfolioConfig::default();
    let optimizer = crate::portfolio::PortfolioOptimizer::new(&state.registry, &state.trust, &state.variance, config.clone());
    let sorted_ids = state.registry.sorted_ids();
    let recommendation = state.portfolio_cache.get_or_compute(sorted_ids, &config, TaskType::Code, || optimizer.recommend(TaskType::Code));
    Json(serde_json::to_value(recommendation).unwrap_or(Value::Null))
}

async fn get_trust(State(state): State<AppState>) -> Json<std::collections::HashMap<String, TrustEntry>> {
    Json(state.trust.snapshot())
}

async fn get_variance(State(state): State<AppState>) -> Json<Vec<(String, TaskType, crate::trackers::VarianceBucket)>> {
    Json(state.variance.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::{Governance, Model, ModelStatus, Pricing};
    use crate::evaluator::FixedJudge;
    use crate::evaluator::{JudgeDimensions, JudgeEvaluation as JudgeEval};
    use crate::executor::{ExecutorPool, MockExecutor};
    use crate::registry::ModelRegistry;
    use crate::storage::PersistenceStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap as Map;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let registry = ModelRegistry::from_models([Model {
            id: "m1".into(),
            provider: "mock".into(),
            pricing: Pricing::new(0.001, 0.002),
            expertise: Map::from([(TaskType::Code, 0.9), (TaskType::General, 0.9)]),
            reliability: 0.9,
            status: ModelStatus::Active,
            governance: Governance::default(),
        }]);

        let mut pool = ExecutorPool::new();
        pool.register("mock", Box::new(MockExecutor::new("fn main() { println!(\"ok\"); }")));

        let judge: Arc<dyn crate::evaluator::Judge> = Arc::new(FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.9, completeness: 0.9, clarity: 0.9, safety: 0.9 },
            compliance: 0.9,
        });
        let _ = JudgeEval {
            dimensions: JudgeDimensions { correctness: 0.9, completeness: 0.9, clarity: 0.9, safety: 0.9 },
            dimension_notes: None,
            compliance: 0.9,
            overall: 0.9,
        };

        let config = AppConfig::default();
        let persistence = PersistenceStore::connect(&config).await.unwrap();
        AppState::new(config, registry, pool, judge, persistence)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_rejects_empty_message_with_400() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({ "message": "", "taskType": "code", "difficulty": "medium" });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/run")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_executes_a_task_end_to_end() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({
            "message": "implement the parser",
            "taskType": "code",
            "difficulty": "low",
            "testMode": true,
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/run")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_scenario_estimate_only_skips_execution() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({
            "directive": "Implement the parser. Write the release notes.",
            "projectBudgetUSD": 5.0,
            "tierProfile": "default",
            "estimateOnly": true,
            "includeCouncilAudit": false,
            "async": false,
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/projects/run-scenario")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_scenario_missing_directive_and_preset_is_rejected() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({
            "projectBudgetUSD": 5.0,
            "tierProfile": "default",
            "estimateOnly": true,
            "includeCouncilAudit": false,
            "async": false,
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/projects/run-scenario")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn governance_portfolio_config_round_trips() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({ "mode": "prefer" });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/governance/portfolio-config")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/governance/portfolio-config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn governance_trust_and_variance_are_reachable() {
        let app = build_router(test_state().await);
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/governance/trust").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/governance/variance").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
