//! Error taxonomy for the routing/execution core.
//!
//! One enum per component boundary keeps the `?` operator usable everywhere
//! while still letting callers (the API layer, the CLI) map a failure onto a
//! structured `{code, message, details}` response.

use serde::Serialize;
use thiserror::Error;

/// Result type alias used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Structured error kinds. Each variant corresponds to one of the kinds named
/// in the error handling design: request/package validation, missing
/// entities, provider execution failures, budget and qualification outcomes,
/// calibration unavailability, portfolio coverage problems, and a catch-all.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Request body, package graph, or schema validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity (run session, model) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A provider execution attempt failed (network, timeout, non-2xx).
    #[error("execution error: {0}")]
    Execution(String),

    /// A routing or scheduling decision could not stay within budget.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// No model passed the router's qualification gate.
    #[error("no qualified models: {0}")]
    NoQualifiedModels(String),

    /// A calibration record was requested but is not yet available.
    #[error("calibration unavailable: {0}")]
    CalibrationUnavailable(String),

    /// The configured portfolio does not cover the registry at run time.
    #[error("portfolio coverage invalid: {0}")]
    PortfolioCoverageInvalid(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, not expected to be handled specially by callers.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn budget_exceeded(msg: impl Into<String>) -> Self {
        Self::BudgetExceeded(msg.into())
    }

    pub fn no_qualified_models(msg: impl Into<String>) -> Self {
        Self::NoQualifiedModels(msg.into())
    }

    pub fn portfolio_coverage_invalid(msg: impl Into<String>) -> Self {
        Self::PortfolioCoverageInvalid(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for the API layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Execution(_) => "execution_error",
            Self::BudgetExceeded(_) => "budget_exceeded",
            Self::NoQualifiedModels(_) => "no_qualified_models",
            Self::CalibrationUnavailable(_) => "calibration_unavailable",
            Self::PortfolioCoverageInvalid(_) => "portfolio_coverage_invalid",
            Self::Serialization(_) => "internal",
            Self::Io(_) => "internal",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether a tracker or background writer may safely swallow this error
    /// and just log it (never fail a run over observability-only state).
    pub fn is_observability_only(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Io(_))
    }
}

/// Wire representation used by the API layer (`{code, message, details?}`).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_constructors_set_expected_variant_and_code() {
        assert_eq!(CoreError::validation("bad").code(), "validation_error");
        assert_eq!(CoreError::not_found("x").code(), "not_found");
        assert_eq!(CoreError::execution("x").code(), "execution_error");
        assert_eq!(CoreError::budget_exceeded("x").code(), "budget_exceeded");
        assert_eq!(CoreError::no_qualified_models("x").code(), "no_qualified_models");
        assert_eq!(
            CoreError::portfolio_coverage_invalid("x").code(),
            "portfolio_coverage_invalid"
        );
    }

    #[test]
    fn io_and_serialization_errors_are_observability_only() {
        let io_err = CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(io_err.is_observability_only());
        assert!(!CoreError::validation("x").is_observability_only());
    }
}
