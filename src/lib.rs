//! task-router-core — a cost-and-quality-aware task-routing and execution
//! engine for heterogeneous LLM backends: pick a model per task under a
//! quality gate and a budget, execute with QA and optional escalation, and
//! track trust/variance/portfolio signals across runs.

pub mod api;
pub mod cli;
pub mod config;
pub mod directive;
pub mod domain;
pub mod evaluator;
pub mod executor;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod packager;
pub mod portfolio;
pub mod registry;
pub mod router;
pub mod runner;
pub mod scheduler;
pub mod storage;
pub mod trackers;

pub use domain::{
    CandidateAudit, Constraints, CoreError, CostBuckets, Difficulty, DisqualifiedReason,
    EscalationAwareAudit, EstimatedTokens, ErrorBody, Governance, LedgerCounts, LedgerDecision,
    LedgerEntry, Model, ModelStatus, Observation, PackageEstimatedTokens, PerformancePrior,
    PortfolioBypass, PortfolioBypassReason, Pricing, Progress, QaOutputs, QaPolicy, Result, Role,
    RoleExecution, RoleExecutionRole, RoutingAudit, RoutingDecision, RoutingMeta, RoutingStatus,
    RunSession, RunStatus, TaskCard, TaskType, VarianceBand, WorkPackage,
};

pub use registry::ModelRegistry;

pub use trackers::{
    effective_expertise, CalibrationRecord, CalibrationStore, TrustEntry, TrustTracker,
    VarianceBucket, VarianceTracker, WorkerTrustSignal,
};

pub use portfolio::{
    PortfolioAssignment, PortfolioCache, PortfolioConfig, PortfolioOptimizer,
    PortfolioRecommendation, PortfolioSlot,
};

pub use router::{
    route, DifficultyTable, EscalationConfig, EscalationPolicy, EscalationRoutingMode,
    EvaluationMode, NoQualifiedPolicy, OnBudgetFail, PortfolioOptions, RouterConfig,
    RoutingCandidate, RoutingOptions, SelectionPolicy, TokenEstimate,
};

pub use executor::{
    Executor, ExecutionRequest, ExecutionResult, ExecutorPool, HttpChatExecutor, MockExecutor,
    TokenUsage,
};

pub use evaluator::{overall_score, FixedJudge, Judge, JudgeDimensions, JudgeEvaluation, LlmJudge};

pub use runner::{
    run_task, Attempt, AttemptOutcome, ChosenAttempt, RunOutcomeStatus, RunnerContext,
    TaskRunOutcome,
};

pub use packager::{build_packages, validate_packages, Subtask};

pub use scheduler::{
    build_candidates, run_packages, ConcurrencyConfig, PackageResult, PackageStatus,
    PortfolioMode, SchedulerConfig, SchedulerContext,
};

pub use ledger::{summarize, AnalyticsSummary, RegretExample};

pub use directive::{preset_directive, DecomposeOptions, DirectiveDecomposer, KeywordDirectiveDecomposer};

pub use config::AppConfig;

pub use storage::PersistenceStore;

pub use observability::ObservabilityConfig;

pub use api::{build_router, AppState};

/// Library version, surfaced for `GET /health` and CLI `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
