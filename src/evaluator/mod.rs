//! C8: deterministic structural validation plus the LLM-as-judge evaluator.

pub mod judge;
pub mod validator;

pub use judge::{overall_score, FixedJudge, Judge, JudgeDimensions, JudgeEvaluation, LlmJudge};
pub use validator::{validate, ValidationResult};
