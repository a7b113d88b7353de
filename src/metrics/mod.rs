//! Prometheus metrics: exporter bootstrap plus the router/scheduler
//! instruments recorded against it.

pub mod business;
pub mod recorder;

pub use business::{record_attempt_latency, record_run};
pub use recorder::{init_metrics, MetricsConfig};
