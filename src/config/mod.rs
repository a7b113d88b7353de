//! Application configuration, layered defaults → TOML file → environment,
//! per §6's environment-variable list and §9's "dynamic config objects
//! become fully enumerated options" note.

use std::sync::Once;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::Result;
use crate::router::config::{EvaluationMode, RouterConfig, SelectionPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceDriver {
    File,
    Db,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite:task-router.db".to_string(), pool_size: default_pool_size() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".to_string(), port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// File paths written by the `file` persistence driver (§6 "Persisted state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPaths {
    pub runs_jsonl: String,
    pub calibration_json: String,
    pub variance_stats_json: String,
    pub model_stats_json: String,
    pub governance_jsonl: String,
    pub demo_runs_dir: String,
}

impl Default for PersistedPaths {
    fn default() -> Self {
        Self {
            runs_jsonl: "./runs/runs.jsonl".into(),
            calibration_json: "./runs/calibration.json".into(),
            variance_stats_json: "./runs/varianceStats.json".into(),
            model_stats_json: "./runs/modelStats.json".into(),
            governance_jsonl: "./runs/governance.jsonl".into(),
            demo_runs_dir: "./.data/demo-runs".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub router: RouterConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub persistence_driver: PersistenceDriver,
    pub paths: PersistedPaths,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub judge_model_id: String,
    pub eval_mode: Option<EvaluationMode>,
    pub eval_sample_rate_prod: f64,
    pub eval_sample_rate_test: f64,
    pub eval_sample_rate_force: Option<f64>,
    pub allow_full_eval_in_prod: bool,
    pub node_env: Option<String>,
    pub router_selection_policy: Option<SelectionPolicy>,
    pub model_hr_data_dir: String,
    pub model_hr_auto_apply_disable: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            persistence_driver: PersistenceDriver::File,
            paths: PersistedPaths::default(),
            openai_api_key: None,
            anthropic_api_key: None,
            judge_model_id: "claude-sonnet-4-5-20250929".into(),
            eval_mode: None,
            eval_sample_rate_prod: 1.0,
            eval_sample_rate_test: 1.0,
            eval_sample_rate_force: None,
            allow_full_eval_in_prod: false,
            node_env: None,
            router_selection_policy: None,
            model_hr_data_dir: "./.data/model-hr".into(),
            model_hr_auto_apply_disable: false,
        }
    }
}

static EVAL_CLAMP_WARNED: Once = Once::new();

impl AppConfig {
    /// Layers defaults, an optional TOML file, then environment variables
    /// (`Env::raw()` matches unprefixed, case-insensitive names against the
    /// struct's snake_case fields).
    pub fn load(toml_path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = toml_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::raw());
        figment.extract().map_err(|err| crate::domain::CoreError::internal(err.to_string()))
    }

    fn is_production(&self) -> bool {
        self.node_env.as_deref() == Some("production")
    }

    /// §6 "Evaluation sample rates": in production, a full (1.0) sample rate
    /// is clamped to 0.25 unless explicitly overridden, logged once.
    pub fn effective_eval_sample_rate(&self) -> f64 {
        if let Some(forced) = self.eval_sample_rate_force {
            return forced;
        }

        let requested = match self.eval_mode {
            Some(EvaluationMode::Test) => self.eval_sample_rate_test,
            _ => self.eval_sample_rate_prod,
        };

        if self.is_production() && requested >= 1.0 && !self.allow_full_eval_in_prod {
            EVAL_CLAMP_WARNED.call_once(|| {
                tracing::warn!("eval_sample_rate=1.0 in production clamped to 0.25; set ALLOW_FULL_EVAL_IN_PROD to override");
            });
            return 0.25;
        }

        requested
    }

    /// Applies the `ROUTER_SELECTION_POLICY` env override, if set, on top of
    /// the loaded router config.
    pub fn effective_router_config(&self) -> RouterConfig {
        let mut router = self.router.clone();
        if let Some(policy) = self.router_selection_policy {
            router.selection_policy = policy;
        }
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.persistence_driver, PersistenceDriver::File);
        assert_eq!(config.judge_model_id, "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn full_prod_rate_clamps_without_override() {
        let mut config = AppConfig::default();
        config.node_env = Some("production".into());
        config.eval_sample_rate_prod = 1.0;
        assert_eq!(config.effective_eval_sample_rate(), 0.25);
    }

    #[test]
    fn allow_full_eval_in_prod_bypasses_the_clamp() {
        let mut config = AppConfig::default();
        config.node_env = Some("production".into());
        config.eval_sample_rate_prod = 1.0;
        config.allow_full_eval_in_prod = true;
        assert_eq!(config.effective_eval_sample_rate(), 1.0);
    }

    #[test]
    fn forced_rate_always_wins() {
        let mut config = AppConfig::default();
        config.node_env = Some("production".into());
        config.eval_sample_rate_force = Some(0.42);
        assert_eq!(config.effective_eval_sample_rate(), 0.42);
    }

    #[test]
    fn selection_policy_override_replaces_router_default() {
        let mut config = AppConfig::default();
        config.router_selection_policy = Some(SelectionPolicy::CheapestViable);
        assert_eq!(config.effective_router_config().selection_policy, SelectionPolicy::CheapestViable);
    }
}
