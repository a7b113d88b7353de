//! Core data model (§3): the types every other module exchanges.

pub mod error;
pub mod ledger;
pub mod model;
pub mod package;
pub mod prior;
pub mod routing;
pub mod run;
pub mod task;

pub use error::{CoreError, ErrorBody, Result};
pub use ledger::{
    CostBuckets, LedgerCounts, LedgerDecision, LedgerEntry, RoleExecution, RoleExecutionRole,
};
pub use model::{Governance, Model, ModelStatus, Pricing};
pub use package::{EstimatedTokens as PackageEstimatedTokens, QaOutputs, QaPolicy, Role, WorkPackage};
pub use prior::{Observation, PerformancePrior, VarianceBand};
pub use routing::{
    CandidateAudit, DisqualifiedReason, EscalationAwareAudit, EstimatedTokens, PortfolioBypass,
    PortfolioBypassReason, RoutingAudit, RoutingDecision, RoutingMeta, RoutingStatus,
};
pub use run::{Progress, RunSession, RunStatus};
pub use task::{Constraints, Difficulty, TaskCard, TaskType};
