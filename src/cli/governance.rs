//! `task-router governance ...`: mirrors the `/governance/*` endpoints (§6).

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::api::state::AppState;
use crate::domain::{CoreError, Result, TaskType};
use crate::portfolio::PortfolioConfig;
use crate::scheduler::PortfolioMode;

#[derive(Subcommand)]
pub enum GovernanceCommands {
    /// Print the current portfolio mode.
    GetPortfolioConfig,
    /// Set the portfolio mode.
    SetPortfolioConfig(SetPortfolioConfigArgs),
    /// Print the current cached portfolio recommendation.
    Portfolio,
    /// Print trust tracker state per model.
    Trust,
    /// Print variance tracker state per (model, taskType).
    Variance,
}

#[derive(Parser)]
pub struct SetPortfolioConfigArgs {
    /// off | prefer | lock
    #[arg(long)]
    pub mode: String,
}

fn parse_portfolio_mode(raw: &str) -> Result<PortfolioMode> {
    match raw {
        "off" => Ok(PortfolioMode::Off),
        "prefer" => Ok(PortfolioMode::Prefer),
        "lock" => Ok(PortfolioMode::Lock),
        other => Err(CoreError::validation(format!("unknown portfolio mode '{other}'"))),
    }
}

pub async fn execute(state: &AppState, command: GovernanceCommands) -> Result<()> {
    match command {
        GovernanceCommands::GetPortfolioConfig => {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "mode": state.portfolio_mode() }))?);
        }
        GovernanceCommands::SetPortfolioConfig(args) => {
            let mode = parse_portfolio_mode(&args.mode)?;
            state.set_portfolio_mode(mode);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "mode": mode }))?);
        }
        GovernanceCommands::Portfolio => {
            let config = PortfolioConfig::default();
            let optimizer = crate::portfolio::PortfolioOptimizer::new(&state.registry, &state.trust, &state.variance, config.clone());
            let sorted_ids = state.registry.sorted_ids();
            let recommendation =
                state.portfolio_cache.get_or_compute(sorted_ids, &config, TaskType::Code, || optimizer.recommend(TaskType::Code));
            let value: Value = serde_json::to_value(recommendation)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        GovernanceCommands::Trust => {
            println!("{}", serde_json::to_string_pretty(&state.trust.snapshot())?);
        }
        GovernanceCommands::Variance => {
            println!("{}", serde_json::to_string_pretty(&state.variance.snapshot())?);
        }
    }
    Ok(())
}
