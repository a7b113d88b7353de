//! `task-router run`: mirrors `POST /run` (§6) — submit a single task and
//! print the resulting `RunLogEvent` as JSON, matching `cli::agent`'s
//! "machine-readable output, deterministic behavior" contract.

use std::time::Duration;

use clap::Parser;
use serde::Serialize;

use crate::api::state::AppState;
use crate::domain::{CoreError, Result, TaskCard};
use crate::evaluator::JudgeEvaluation;
use crate::router::PortfolioOptions;
use crate::runner::{self, Attempt, RunnerContext, TaskRunOutcome};
use crate::scheduler;

#[derive(Parser)]
pub struct RunArgs {
    /// The task directive / message.
    #[arg(short, long)]
    pub message: String,

    /// code | writing | analysis | general
    #[arg(short = 't', long)]
    pub task_type: String,

    /// low | medium | high
    #[arg(short, long)]
    pub difficulty: String,

    /// Maximum cost in USD this task may spend.
    #[arg(long)]
    pub max_cost_usd: Option<f64>,

    /// Minimum acceptable quality, in [0,1].
    #[arg(long)]
    pub min_quality: Option<f64>,

    /// Run against the mock executor pool with a deterministic QA pass,
    /// skipping any live provider call.
    #[arg(long)]
    pub test_mode: bool,
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

pub async fn execute(state: &AppState, args: RunArgs) -> Result<()> {
    if args.message.trim().is_empty() {
        return Err(CoreError::validation("message must not be empty"));
    }

    let task_type = super::parse_task_type(&args.task_type)?;
    let difficulty = super::parse_difficulty(&args.difficulty)?;
    let mut task = TaskCard::new(uuid::Uuid::new_v4().to_string(), task_type, difficulty);
    task.constraints.max_cost_usd = args.max_cost_usd;
    task.constraints.min_quality = args.min_quality;

    let candidates = scheduler::build_candidates(&state.registry, &state.calibration, task.task_type, task.difficulty);
    let portfolio = PortfolioOptions::default();
    let eval_sample_draw = if args.test_mode { 0.0 } else { rand::random::<f64>() };

    let ctx = RunnerContext {
        router_config: &state.router_config,
        portfolio: &portfolio,
        executor_pool: &state.executor_pool,
        judge: state.judge.as_ref(),
        calibration: &state.calibration,
        variance: &state.variance,
        trust: &state.trust,
        attempt_timeout: Duration::from_secs(30),
        directive: Some(args.message.clone()),
        max_cost_usd: task.constraints.max_cost_usd,
        eval_sample_draw,
        deterministic_qa_pass: args.test_mode.then_some(true),
    };

    let outcome = runner::run_task(&task, &candidates, &ctx).await?;
    let event = RunLogEvent::from(outcome);
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}
