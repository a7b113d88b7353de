//! Structured logging/tracing init and health-check infrastructure. The
//! teacher's parallel `prometheus`-crate metrics module is not wired in here
//! — `crate::metrics` covers that surface on the `metrics`/
//! `metrics-exporter-prometheus` stack already in the dependency table.

pub mod config;
pub mod health;
pub mod tracing;

pub use config::{LoggingConfig, ObservabilityConfig, TracingConfig, TracingFormat};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus, SystemHealth};
pub use tracing::{CorrelationId, RequestId, TraceContext};

/// Initializes the global `tracing` subscriber from the resolved config.
/// Safe to call once at process start; a second call is a no-op error that
/// callers should ignore (tests may init repeatedly across cases).
pub fn init(config: &ObservabilityConfig) {
    if let Err(err) = tracing::init_tracing(&config.tracing) {
        eprintln!("tracing init failed: {err}");
    }
}
