//! Deterministic structural validation (§4.2 step 3): cheap, local checks
//! run before any judge call is considered.

use crate::domain::TaskType;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub ok: bool,
    pub reasons: Vec<String>,
}

impl ValidationResult {
    fn pass() -> Self {
        Self { ok: true, reasons: Vec::new() }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self { ok: false, reasons: vec![reason.into()] }
    }
}

const STALL_PHRASE: &str = "I am not sure";
const MIN_ANALYSIS_LEN: usize = 20;

/// TaskType-specific structural checks. Execution errors are handled one
/// layer up by the runner; this only judges the text of a successful
/// attempt.
pub fn validate(task_type: TaskType, output: &str) -> ValidationResult {
    if output.contains(STALL_PHRASE) {
        return ValidationResult::fail(format!("output contains stall phrase '{STALL_PHRASE}'"));
    }

    match task_type {
        TaskType::Analysis if output.len() < MIN_ANALYSIS_LEN => {
            ValidationResult::fail(format!("analysis output shorter than {MIN_ANALYSIS_LEN} chars"))
        }
        _ if output.trim().is_empty() => ValidationResult::fail("output is empty"),
        _ => ValidationResult::pass(),
    }
}
