//! C12 Ledger & Analytics (§4.7). The event log itself (`LedgerEntry`,
//! `LedgerDecision`) lives in `domain::ledger`, since the scheduler builds
//! it incrementally as packages complete; this module re-exports it
//! alongside the pure cross-run aggregation in [`analytics`].

pub mod analytics;

pub use crate::domain::{CostBuckets, LedgerCounts, LedgerDecision, LedgerEntry, RoleExecution, RoleExecutionRole};
pub use analytics::{summarize, AnalyticsSummary, RegretExample};
