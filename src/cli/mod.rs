//! Local CLI surface mirroring §6's HTTP contract, shaped after the
//! reference platform's `cli::agent` module (`Parser`/`Subcommand`, JSON
//! output, deterministic behavior) so the engine is exercisable without
//! standing up the HTTP server.

pub mod governance;
pub mod project;
pub mod run;

use clap::{Parser, Subcommand};

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::domain::{CoreError, Difficulty, Result, TaskType};

#[derive(Parser)]
#[command(name = "task-router", version, about = "Cost-and-quality-aware task-routing engine for heterogeneous LLM backends")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file layered under defaults, then environment.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a single task, mirroring `POST /run`.
    Run(run::RunArgs),
    /// Project-scoped commands, mirroring `POST /projects/run-scenario`.
    #[command(subcommand)]
    Project(project::ProjectCommands),
    /// Governance commands, mirroring `/governance/*`.
    #[command(subcommand)]
    Governance(governance::GovernanceCommands),
    /// Serve the HTTP API.
    Serve(ServeArgs),
}

#[derive(Parser)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

pub(crate) fn parse_task_type(raw: &str) -> Result<TaskType> {
    match raw.to_lowercase().as_str() {
        "code" => Ok(TaskType::Code),
        "writing" => Ok(TaskType::Writing),
        "analysis" => Ok(TaskType::Analysis),
        "general" => Ok(TaskType::General),
        other => Err(CoreError::validation(format!("unknown taskType '{other}'"))),
    }
}

pub(crate) fn parse_difficulty(raw: &str) -> Result<Difficulty> {
    match raw.to_lowercase().as_str() {
        "low" => Ok(Difficulty::Low),
        "medium" => Ok(Difficulty::Medium),
        "high" => Ok(Difficulty::High),
        other => Err(CoreError::validation(format!("unknown difficulty '{other}'"))),
    }
}

/// Dispatches a parsed [`Cli`] invocation. Each subcommand bootstraps its own
/// `AppState` from the loaded config — the CLI has no long-lived process
/// state to share across invocations.
pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let state = AppState::bootstrap(config).await?;
            run::execute(&state, args).await
        }
        Commands::Project(command) => {
            let state = AppState::bootstrap(config).await?;
            project::execute(&state, command).await
        }
        Commands::Governance(command) => {
            let state = AppState::bootstrap(config).await?;
            governance::execute(&state, command).await
        }
        Commands::Serve(args) => serve(config, args).await,
    }
}

async fn serve(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        config.api.bind = bind;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }

    let addr = format!("{}:{}", config.api.bind, config.api.port);
    let state = AppState::bootstrap(config).await?;
    let app = crate::api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "serving task-router API");
    axum::serve(listener, app).await.map_err(|err| CoreError::internal(err.to_string()))?;
    Ok(())
}
