//! C5: deterministic five-slot portfolio assignment plus its TTL cache.

pub mod cache;
pub mod optimizer;

pub use cache::PortfolioCache;
pub use optimizer::{PortfolioAssignment, PortfolioConfig, PortfolioOptimizer, PortfolioRecommendation, PortfolioSlot};
