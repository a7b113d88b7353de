//! `task-router project ...`: mirrors `POST /projects/run-scenario` (§6).

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::api::state::AppState;
use crate::directive::DecomposeOptions;
use crate::domain::{CoreError, Result};
use crate::ledger::summarize;
use crate::packager::{build_packages, Subtask};
use crate::portfolio::PortfolioConfig;
use crate::scheduler::{self, ConcurrencyConfig, PortfolioMode, SchedulerConfig, SchedulerContext};

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Decompose a directive and print the plan + packages without running it.
    Estimate(ScenarioArgs),
    /// Run a project scenario to completion synchronously.
    Run(ScenarioArgs),
}

#[derive(Parser)]
pub struct ScenarioArgs {
    /// Free-text project directive. Mutually exclusive with --preset-id.
    #[arg(long)]
    pub directive: Option<String>,

    /// A canned directive id (see `directive::preset_directive`).
    #[arg(long)]
    pub preset_id: Option<String>,

    #[arg(long)]
    pub project_budget_usd: f64,

    #[arg(long, default_value = "default")]
    pub tier_profile: String,

    #[arg(long, default_value = "off")]
    pub portfolio_mode: String,

    #[arg(long, default_value_t = 3)]
    pub worker_concurrency: usize,

    #[arg(long, default_value_t = 1)]
    pub qa_concurrency: usize,

    #[arg(long)]
    pub include_council_audit: bool,

    #[arg(long)]
    pub tenant_id: Option<String>,
}

fn parse_portfolio_mode(raw: &str) -> Result<PortfolioMode> {
    match raw {
        "off" => Ok(PortfolioMode::Off),
        "prefer" => Ok(PortfolioMode::Prefer),
        "lock" => Ok(PortfolioMode::Lock),
        other => Err(CoreError::validation(format!("unknown portfolio mode '{other}'"))),
    }
}

fn resolve_subtasks(state: &AppState, args: &ScenarioArgs) -> Result<Vec<Subtask>> {
    let directive_text = match (&args.directive, &args.preset_id) {
        (Some(directive), _) => directive.clone(),
        (None, Some(preset_id)) => crate::directive::preset_directive(preset_id)
            .ok_or_else(|| CoreError::validation(format!("unknown presetId '{preset_id}'")))?
            .to_string(),
        (None, None) => return Err(CoreError::validation("either --directive or --preset-id is required")),
    };

    let options = DecomposeOptions { tenant_id: args.tenant_id.clone() };
    state.decomposer.decompose(&directive_text, &options)
}

#[derive(Debug, Serialize)]
struct ScenarioPlan {
    subtasks: Vec<Subtask>,
}

pub async fn execute(state: &AppState, command: ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Estimate(args) => estimate(state, args).await,
        ProjectCommands::Run(args) => run_scenario(state, args).await,
    }
}

async fn estimate(state: &AppState, args: ScenarioArgs) -> Result<()> {
    let subtasks = resolve_subtasks(state, &args)?;
    let packages = build_packages(&subtasks)?;
    let output = serde_json::json!({ "plan": ScenarioPlan { subtasks }, "packages": packages });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_scenario(state: &AppState, args: ScenarioArgs) -> Result<()> {
    let subtasks = resolve_subtasks(state, &args)?;
    let packages = build_packages(&subtasks)?;

    let portfolio_mode = parse_portfolio_mode(&args.portfolio_mode)?;
    let sched_config = SchedulerConfig {
        concurrency: ConcurrencyConfig { worker: args.worker_concurrency, qa: args.qa_concurrency },
        portfolio_mode,
        tier_profile: args.tier_profile.clone(),
        budget_usd: args.project_budget_usd,
    };

    let portfolio_config = PortfolioConfig::default();
    let optimizer = crate::portfolio::PortfolioOptimizer::new(&state.registry, &state.trust, &state.variance, portfolio_config);
    let draw = rand::random::<f64>();
    let eval_sample_draw = move || draw;

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
        directive: args.directive.clone(),
        eval_sample_draw: &eval_sample_draw,
    };

    let run_session_id = uuid::Uuid::new_v4().to_string();
    let (ledger, result) = scheduler::run_packages(&packages, &ctx, &sched_config, &run_session_id).await?;
    state.persistence.append_run_log(&ledger).await?;

    let summary = summarize(std::slice::from_ref(&ledger));
    let (trust, variance) = if args.include_council_audit {
        (Some(state.trust.snapshot()), Some(state.variance.snapshot()))
    } else {
        (None, None)
    };

    let output = serde_json::json!({
        "plan": ScenarioPlan { subtasks },
        "packages": packages,
        "result": result,
        "bundle": { "ledger": ledger, "summary": summary, "trust": trust, "variance": variance },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
