//! C11 Scheduler (§4.3): executes a validated Work-Package DAG with bounded
//! worker/QA concurrency, budget accounting, and portfolio enforcement.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::domain::{
    CostBuckets, Difficulty, LedgerCounts, LedgerDecision, LedgerEntry, PortfolioBypass, PortfolioBypassReason,
    Result, Role, RoleExecution, RoleExecutionRole, TaskCard, TaskType, WorkPackage,
};
use crate::evaluator::Judge;
use crate::executor::ExecutorPool;
use crate::packager::validate_packages;
use crate::portfolio::{PortfolioCache, PortfolioOptimizer, PortfolioRecommendation, PortfolioSlot};
use crate::registry::ModelRegistry;
use crate::router::{self, PortfolioOptions, RouterConfig, RoutingCandidate, RoutingOptions, SelectionPolicy};
use crate::runner::{self, ChosenAttempt, RunOutcomeStatus, RunnerContext, TaskRunOutcome};
use crate::trackers::{effective_expertise, CalibrationStore, TrustTracker, VarianceTracker};

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyConfig {
    pub worker: usize,
    pub qa: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { worker: 3, qa: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioMode {
    Off,
    Prefer,
    Lock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Ok,
    Failed,
    SkippedBudget,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageResult {
    pub package_id: String,
    pub status: PackageStatus,
    pub outcome: Option<TaskRunOutcome>,
    pub actual_cost_usd: f64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrency: ConcurrencyConfig,
    pub portfolio_mode: PortfolioMode,
    pub tier_profile: String,
    pub budget_usd: f64,
}

/// Dependencies a scheduler run needs beyond the package graph itself.
/// Borrowed rather than owned so one registry/tracker set can back many runs.
pub struct SchedulerContext<'a> {
    pub router_config: &'a RouterConfig,
    pub registry: &'a ModelRegistry,
    pub executor_pool: &'a ExecutorPool,
    pub judge: &'a dyn Judge,
    pub calibration: &'a CalibrationStore,
    pub variance: &'a VarianceTracker,
    pub trust: &'a TrustTracker,
    pub portfolio_optimizer: Option<&'a PortfolioOptimizer<'a>>,
    pub portfolio_cache: Option<&'a PortfolioCache>,
    pub attempt_timeout: Duration,
    pub directive: Option<String>,
    /// Called once per attempted judge sample; callers own the RNG so the
    /// runner underneath stays pure (mirrors `RunnerContext::eval_sample_draw`).
    pub eval_sample_draw: &'a (dyn Fn() -> f64 + Sync),
}

fn role_execution_role(role: Role) -> RoleExecutionRole {
    match role {
        Role::Worker => RoleExecutionRole::Worker,
        Role::Qa => RoleExecutionRole::Qa,
    }
}

fn task_card_for(package: &WorkPackage) -> TaskCard {
    TaskCard::new(package.id.clone(), package.task_type, package.difficulty)
}

/// Shared with the single-task API handler so both the scheduler's package
/// loop and a bare `POST /run` resolve candidates identically.
pub fn build_candidates(registry: &ModelRegistry, calibration: &CalibrationStore, task_type: TaskType, difficulty: Difficulty) -> Vec<RoutingCandidate> {
    registry
        .list_eligible()
        .into_iter()
        .map(|model| {
            let prior = registry.prior_for(&model.id, task_type, difficulty);
            let record = calibration.get(&model.id, task_type);
            let raw_confidence = record.as_ref().map(|r| r.confidence()).unwrap_or(0.0);
            let quality_prior = match (prior, &record) {
                (Some(prior), Some(record)) => {
                    Some(effective_expertise(prior.quality_prior, record.calibrated_expertise(), raw_confidence))
                }
                (Some(prior), None) => Some(prior.quality_prior),
                (None, _) => None,
            };
            RoutingCandidate { model, quality_prior, raw_confidence, candidate_score: None }
        })
        .collect()
}

/// §4.3 tier overrides: `premium`/`cheap` bias the selection policy; a
/// package-level `cheapestViableChosen` hint always wins as an assertion mode.
fn effective_router_config(base: &RouterConfig, package: &WorkPackage) -> RouterConfig {
    let mut config = base.clone();
    match package.tier_profile_override.as_deref() {
        Some("premium") => config.selection_policy = SelectionPolicy::BestValue,
        Some("cheap") => config.selection_policy = SelectionPolicy::LowestCostQualified,
        _ => {}
    }
    if package.cheapest_viable_chosen {
        config.selection_policy = SelectionPolicy::CheapestViable;
    }
    config
}

fn portfolio_options_for(
    mode: PortfolioMode,
    recommendation: Option<&PortfolioRecommendation>,
    role: Role,
) -> PortfolioOptions {
    let Some(recommendation) = recommendation else {
        return PortfolioOptions::default();
    };
    let slots: Vec<PortfolioSlot> = match role {
        Role::Worker => vec![PortfolioSlot::WorkerCheap, PortfolioSlot::WorkerImplementation, PortfolioSlot::WorkerStrategy],
        Role::Qa => vec![PortfolioSlot::QaPrimary, PortfolioSlot::QaBackup],
    };
    let ids: Vec<String> = slots.into_iter().filter_map(|slot| recommendation.slot_model_id(slot)).map(str::to_string).collect();

    match mode {
        PortfolioMode::Off => PortfolioOptions::default(),
        PortfolioMode::Prefer => PortfolioOptions { prefer_model_ids: ids, allowed_model_ids: Vec::new(), portfolio_provided: true },
        PortfolioMode::Lock => PortfolioOptions { prefer_model_ids: Vec::new(), allowed_model_ids: ids, portfolio_provided: true },
    }
}

fn sort_ready_queue(ready: &mut [&str], by_id: &HashMap<&str, &WorkPackage>, dependents: &HashMap<&str, Vec<&str>>) {
    ready.sort_by(|a, b| {
        let importance_a = by_id[a].importance;
        let importance_b = by_id[b].importance;
        importance_b.cmp(&importance_a).then_with(|| {
            let dependents_a = dependents.get(a).map(Vec::len).unwrap_or(0);
            let dependents_b = dependents.get(b).map(Vec::len).unwrap_or(0);
            dependents_a.cmp(&dependents_b)
        })
    });
}

struct Completion<'p> {
    package: &'p WorkPackage,
    status: PackageStatus,
    outcome: Option<TaskRunOutcome>,
    actual_cost_usd: f64,
    reservation_usd: f64,
    portfolio_bypassed: Option<PortfolioBypass>,
}

#[allow(clippy::too_many_arguments)]
async fn run_one_package<'a>(
    package: &'a WorkPackage,
    ctx: &'a SchedulerContext<'a>,
    sched_config: &'a SchedulerConfig,
    portfolio_recommendation: Option<&'a PortfolioRecommendation>,
    remaining_budget: Arc<Mutex<f64>>,
    semaphore: Arc<Semaphore>,
) -> Completion<'a> {
    let _permit = semaphore.acquire_owned().await.expect("scheduler semaphore closed");

    let task = task_card_for(package);
    let candidates = build_candidates(ctx.registry, ctx.calibration, package.task_type, package.difficulty);
    let router_config = effective_router_config(ctx.router_config, package);

    let mut portfolio_options = portfolio_options_for(sched_config.portfolio_mode, portfolio_recommendation, package.role);
    let mut portfolio_bypassed = None;
    if sched_config.portfolio_mode == PortfolioMode::Lock && !portfolio_options.allowed_model_ids.is_empty() {
        // A locked slot id absent from the registry entirely is a distinct
        // failure from one that's merely disabled/ineligible (P9).
        let mut missing_model_ids: Vec<String> = portfolio_options
            .allowed_model_ids
            .iter()
            .filter(|id| ctx.registry.get(id.as_str()).is_none())
            .cloned()
            .collect();
        missing_model_ids.sort();
        missing_model_ids.dedup();

        if !missing_model_ids.is_empty() {
            portfolio_bypassed = Some(PortfolioBypass { reason: PortfolioBypassReason::PortfolioCoverageInvalid, missing_model_ids });
            portfolio_options = PortfolioOptions::default();
        } else {
            let any_eligible = candidates
                .iter()
                .any(|c| c.model.is_eligible() && portfolio_options.allowed_model_ids.iter().any(|id| id == &c.model.id));
            if !any_eligible {
                portfolio_bypassed = Some(PortfolioBypass { reason: PortfolioBypassReason::NoAllowedModels, missing_model_ids: Vec::new() });
                portfolio_options = PortfolioOptions::default();
            }
        }
    }

    let current_budget = {
        let guard = remaining_budget.lock().await;
        *guard
    };

    let routing_options = RoutingOptions {
        max_cost_usd: Some(current_budget),
        cheapest_viable_chosen: package.cheapest_viable_chosen,
        directive: ctx.directive.clone(),
    };
    let probe = router::route(&task, &candidates, &router_config, &portfolio_options, &routing_options);

    if probe.chosen_model_id.is_none() {
        return Completion {
            package,
            status: PackageStatus::SkippedBudget,
            outcome: Some(TaskRunOutcome {
                status: RunOutcomeStatus::Failed,
                attempts: Vec::new(),
                routing: probe,
                judge_eval: None,
                chosen_attempt: None,
                incremental_cost_usd: None,
                final_output: None,
            }),
            actual_cost_usd: 0.0,
            reservation_usd: 0.0,
            portfolio_bypassed,
        };
    }

    let reservation = probe.expected_cost_usd.unwrap_or(0.0);
    {
        let mut guard = remaining_budget.lock().await;
        *guard -= reservation;
    }

    let runner_ctx = RunnerContext {
        router_config: &router_config,
        portfolio: &portfolio_options,
        executor_pool: ctx.executor_pool,
        judge: ctx.judge,
        calibration: ctx.calibration,
        variance: ctx.variance,
        trust: ctx.trust,
        attempt_timeout: ctx.attempt_timeout,
        directive: ctx.directive.clone(),
        max_cost_usd: Some(current_budget),
        eval_sample_draw: (ctx.eval_sample_draw)(),
        deterministic_qa_pass: None,
    };

    let outcome = runner::run_task(&task, &candidates, &runner_ctx).await;

    let (status, actual_cost, outcome) = match outcome {
        Ok(outcome) => {
            let actual_cost: f64 = outcome.attempts.iter().map(|a| a.cost_usd).sum();
            let status = if outcome.status == RunOutcomeStatus::Done { PackageStatus::Ok } else { PackageStatus::Failed };
            (status, actual_cost, Some(outcome))
        }
        Err(err) => {
            warn!(package_id = %package.id, error = %err, "task run errored");
            (PackageStatus::Failed, 0.0, None)
        }
    };

    {
        let mut guard = remaining_budget.lock().await;
        *guard += reservation - actual_cost;
    }

    Completion { package, status, outcome, actual_cost_usd: actual_cost, reservation_usd: reservation, portfolio_bypassed }
}

type BoxedCompletion<'a> = Pin<Box<dyn Future<Output = Completion<'a>> + 'a>>;

fn cascade_cancel<'a>(
    id: &'a str,
    dependents: &HashMap<&'a str, Vec<&'a str>>,
    pending: &mut HashSet<&'a str>,
    results: &mut HashMap<String, PackageResult>,
) {
    let Some(children) = dependents.get(id) else { return };
    for child in children.clone() {
        if pending.remove(child) {
            results.insert(
                child.to_string(),
                PackageResult { package_id: child.to_string(), status: PackageStatus::Cancelled, outcome: None, actual_cost_usd: 0.0 },
            );
            cascade_cancel(child, dependents, pending, results);
        }
    }
}

/// §4.3: runs every package in `packages` to a terminal state, honoring
/// dependency order, bounded concurrency, budget reservation, portfolio
/// enforcement, and importance=5 fatal cancellation.
pub async fn run_packages<'a>(
    packages: &'a [WorkPackage],
    ctx: &'a SchedulerContext<'a>,
    sched_config: &'a SchedulerConfig,
    run_session_id: &str,
) -> Result<(LedgerEntry, HashMap<String, PackageResult>)> {
    validate_packages(packages)?;

    let by_id: HashMap<&str, &WorkPackage> = packages.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for package in packages {
        for dep in &package.dependencies {
            dependents.entry(dep.as_str()).or_default().push(package.id.as_str());
        }
    }

    let mut pending: HashSet<&str> = by_id.keys().copied().collect();
    let mut completed_ok: HashSet<&str> = HashSet::new();
    let mut results: HashMap<String, PackageResult> = HashMap::new();
    let mut ledger = LedgerEntry::new(run_session_id);
    let mut costs = CostBuckets::default();
    let mut role_executions = Vec::new();
    let mut fatal = false;

    let mut recommendations: HashMap<TaskType, PortfolioRecommendation> = HashMap::new();
    if sched_config.portfolio_mode != PortfolioMode::Off {
        if let (Some(optimizer), Some(cache)) = (ctx.portfolio_optimizer, ctx.portfolio_cache) {
            for task_type in packages.iter().map(|p| p.task_type).collect::<HashSet<_>>() {
                let sorted_ids = ctx.registry.sorted_ids();
                let recommendation =
                    cache.get_or_compute(sorted_ids, optimizer.config(), task_type, || optimizer.recommend(task_type));
                recommendations.insert(task_type, recommendation);
            }
        }
    }

    let mut ready: Vec<&str> = packages.iter().filter(|p| p.dependencies.is_empty()).map(|p| p.id.as_str()).collect();
    sort_ready_queue(&mut ready, &by_id, &dependents);

    let remaining_budget = Arc::new(Mutex::new(sched_config.budget_usd));
    let worker_sem = Arc::new(Semaphore::new(sched_config.concurrency.worker.max(1)));
    let qa_sem = Arc::new(Semaphore::new(sched_config.concurrency.qa.max(1)));

    let mut in_flight: FuturesUnordered<BoxedCompletion<'a>> = FuturesUnordered::new();

    loop {
        if fatal {
            let stale_workers: Vec<&str> = ready.iter().copied().filter(|id| by_id[id].role == Role::Worker).collect();
            for id in stale_workers {
                ready.retain(|candidate| *candidate != id);
                pending.remove(id);
                results.insert(
                    id.to_string(),
                    PackageResult { package_id: id.to_string(), status: PackageStatus::Cancelled, outcome: None, actual_cost_usd: 0.0 },
                );
            }
        }

        for id in ready.drain(..) {
            let package = by_id[id];
            let recommendation = recommendations.get(&package.task_type);
            let semaphore = if package.role == Role::Qa { qa_sem.clone() } else { worker_sem.clone() };
            let fut = run_one_package(package, ctx, sched_config, recommendation, remaining_budget.clone(), semaphore);
            in_flight.push(Box::pin(fut));
        }

        let Some(completion) = in_flight.next().await else {
            break;
        };

        let package = completion.package;
        pending.remove(package.id.as_str());

        ledger.push_decision(LedgerDecision::BudgetOptimization {
            package_id: package.id.clone(),
            remaining_budget_usd: *remaining_budget.lock().await,
            reservation_usd: completion.reservation_usd,
        });

        if let Some(bypass) = completion.portfolio_bypassed {
            ledger.push_decision(LedgerDecision::PortfolioValidationFailed {
                reason: bypass.reason,
                missing_model_ids: bypass.missing_model_ids,
            });
        }

        if let Some(outcome) = &completion.outcome {
            let routing_candidates = outcome.routing.routing_audit.clone();
            ledger.push_decision(LedgerDecision::Route {
                package_id: package.id.clone(),
                tier_profile: sched_config.tier_profile.clone(),
                chosen_model_id: outcome.routing.chosen_model_id.clone(),
                chosen_predicted_cost_usd: outcome.routing.expected_cost_usd,
                ranked_by: outcome.routing.routing_meta.ranked_by.clone(),
                enforce_cheapest_viable: outcome.routing.routing_meta.enforce_cheapest_viable,
                routing_candidates,
                pricing_mismatch_count: 0,
            });

            if let (Some(ChosenAttempt::Escalated), Some(incremental)) = (outcome.chosen_attempt, outcome.incremental_cost_usd) {
                if let (Some(from), Some(to)) = (outcome.attempts.first(), outcome.attempts.last()) {
                    ledger.push_decision(LedgerDecision::Escalation {
                        package_id: package.id.clone(),
                        from_model_id: from.model_id.clone(),
                        to_model_id: to.model_id.clone(),
                        incremental_cost_usd: incremental,
                    });
                }
            }

            for attempt in &outcome.attempts {
                role_executions.push(RoleExecution {
                    package_id: package.id.clone(),
                    role: role_execution_role(package.role),
                    model_id: attempt.model_id.clone(),
                    cost_usd: attempt.cost_usd,
                    success: attempt.outcome == runner::AttemptOutcome::Ok,
                });
            }
        }

        match package.role {
            Role::Worker => costs.worker_usd += completion.actual_cost_usd,
            Role::Qa => costs.qa_usd += completion.actual_cost_usd,
        }
        costs.total_usd += completion.actual_cost_usd;

        if completion.status != PackageStatus::Ok && package.importance >= 5 {
            fatal = true;
            info!(package_id = %package.id, "fatal package failure; cancelling remaining workers");
        }

        if completion.status == PackageStatus::Ok {
            completed_ok.insert(package.id.as_str());
            if let Some(children) = dependents.get(package.id.as_str()) {
                let mut newly_ready: Vec<&str> = children
                    .iter()
                    .copied()
                    .filter(|child| by_id[child].dependencies.iter().all(|dep| completed_ok.contains(dep.as_str())))
                    .collect();
                sort_ready_queue(&mut newly_ready, &by_id, &dependents);
                ready.extend(newly_ready);
            }
        } else {
            cascade_cancel(package.id.as_str(), &dependents, &mut pending, &mut results);
        }

        results.insert(
            package.id.clone(),
            PackageResult {
                package_id: package.id.clone(),
                status: completion.status,
                outcome: completion.outcome,
                actual_cost_usd: completion.actual_cost_usd,
            },
        );

        if pending.is_empty() && ready.is_empty() && in_flight.is_empty() {
            break;
        }
    }

    let counts = LedgerCounts {
        total_packages: packages.len() as u32,
        succeeded: results.values().filter(|r| r.status == PackageStatus::Ok).count() as u32,
        failed: results.values().filter(|r| r.status == PackageStatus::Failed).count() as u32,
        skipped_budget: results.values().filter(|r| r.status == PackageStatus::SkippedBudget).count() as u32,
    };

    ledger.costs = costs;
    ledger.role_executions = role_executions;
    ledger.counts = counts;

    Ok((ledger, results))
}
