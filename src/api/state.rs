//! Shared application state handed to every axum handler, mirroring
//! `agents::edge_function::EdgeFunctionState` — a `Clone` struct of `Arc`s
//! so each request gets its own cheap handle onto the same process-wide
//! registry, trackers, and persistence driver.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::AppConfig;
use crate::directive::{DirectiveDecomposer, KeywordDirectiveDecomposer};
use crate::domain::{Result, RunSession};
use crate::evaluator::{FixedJudge, Judge, JudgeDimensions, LlmJudge};
use crate::executor::{Executor, ExecutorPool, HttpChatExecutor, MockExecutor};
use crate::portfolio::PortfolioCache;
use crate::registry::{self, ModelRegistry};
use crate::router::RouterConfig;
use crate::scheduler::PortfolioMode;
use crate::storage::PersistenceStore;
use crate::trackers::{CalibrationStore, TrustTracker, VarianceTracker};

/// In-memory tracking for `async=true` project runs (§3 `RunSession`). Not
/// persisted on its own — the scheduler's ledger entry is what survives a
/// restart; this map only backs progress polling while the process is up.
#[derive(Default)]
pub struct RunSessionRegistry {
    sessions: RwLock<HashMap<String, RunSession>>,
}

impl RunSessionRegistry {
    pub fn insert(&self, session: RunSession) {
        self.sessions.write().expect("run session lock poisoned").insert(session.id.clone(), session);
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut RunSession)) {
        if let Some(session) = self.sessions.write().expect("run session lock poisoned").get_mut(id) {
            f(session);
        }
    }

    pub fn get(&self, id: &str) -> Option<RunSession> {
        self.sessions.read().expect("run session lock poisoned").get(id).cloned()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub router_config: Arc<RouterConfig>,
    pub registry: Arc<ModelRegistry>,
    pub executor_pool: Arc<ExecutorPool>,
    pub judge: Arc<dyn Judge>,
    pub calibration: Arc<CalibrationStore>,
    pub variance: Arc<VarianceTracker>,
    pub trust: Arc<TrustTracker>,
    pub portfolio_cache: Arc<PortfolioCache>,
    pub decomposer: Arc<dyn DirectiveDecomposer>,
    pub persistence: Arc<PersistenceStore>,
    pub run_sessions: Arc<RunSessionRegistry>,
    pub portfolio_mode: Arc<RwLock<PortfolioMode>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: ModelRegistry,
        executor_pool: ExecutorPool,
        judge: Arc<dyn Judge>,
        persistence: PersistenceStore,
    ) -> Self {
        let router_config = config.effective_router_config();
        Self {
            router_config: Arc::new(router_config),
            config: Arc::new(config),
            registry: Arc::new(registry),
            executor_pool: Arc::new(executor_pool),
            judge,
            calibration: Arc::new(CalibrationStore::new()),
            variance: Arc::new(VarianceTracker::new()),
            trust: Arc::new(TrustTracker::new()),
            portfolio_cache: Arc::new(PortfolioCache::new()),
            decomposer: Arc::new(KeywordDirectiveDecomposer::new()),
            persistence: Arc::new(persistence),
            run_sessions: Arc::new(RunSessionRegistry::default()),
            portfolio_mode: Arc::new(RwLock::new(PortfolioMode::Off)),
        }
    }

    pub fn portfolio_mode(&self) -> PortfolioMode {
        *self.portfolio_mode.read().expect("portfolio mode lock poisoned")
    }

    pub fn set_portfolio_mode(&self, mode: PortfolioMode) {
        *self.portfolio_mode.write().expect("portfolio mode lock poisoned") = mode;
        self.portfolio_cache.request_refresh();
    }

    /// Wires a full `AppState` from config alone: the demo registry seed (no
    /// external model source is defined by §6), real HTTP executors when the
    /// corresponding API key is configured and a mock fallback otherwise, and
    /// an `LlmJudge` against Anthropic when a key is present. Shared by the
    /// HTTP server and the CLI so both bootstrap identically.
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        let registry = registry::demo_seed();
        let executor_pool = build_executor_pool(&config);
        let judge = build_judge(&config);
        let persistence = PersistenceStore::connect(&config).await?;
        Ok(Self::new(config, registry, executor_pool, judge, persistence))
    }
}

fn build_executor_pool(config: &AppConfig) -> ExecutorPool {
    let mut pool = ExecutorPool::new();

    let openai: Box<dyn Executor> = match &config.openai_api_key {
        Some(key) => Box::new(HttpChatExecutor::new("https://api.openai.com/v1", key.clone())),
        None => Box::new(MockExecutor::new("[mock openai response — set OPENAI_API_KEY for live calls]")),
    };
    pool.register("openai", openai);

    let anthropic: Box<dyn Executor> = match &config.anthropic_api_key {
        Some(key) => Box::new(HttpChatExecutor::new("https://api.anthropic.com/v1", key.clone())),
        None => Box::new(MockExecutor::new("[mock anthropic response — set ANTHROPIC_API_KEY for live calls]")),
    };
    pool.register("anthropic", anthropic);

    pool
}

fn build_judge(config: &AppConfig) -> Arc<dyn Judge> {
    match &config.anthropic_api_key {
        Some(key) => {
            let executor = Arc::new(HttpChatExecutor::new("https://api.anthropic.com/v1", key.clone()));
            Arc::new(LlmJudge::new(executor, config.judge_model_id.clone()))
        }
        None => Arc::new(FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.8, completeness: 0.8, clarity: 0.8, safety: 0.8 },
            compliance: 0.8,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_without_api_keys_still_produces_a_usable_state() {
        let state = AppState::bootstrap(AppConfig::default()).await.unwrap();
        assert!(state.registry.count() > 0);
        assert_eq!(state.portfolio_mode(), PortfolioMode::Off);
    }
}
