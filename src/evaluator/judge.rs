//! LLM-as-judge evaluator (§4.2 step 5): scores a completed attempt along
//! four dimensions plus compliance, rolled up into a taskType-weighted
//! `overall`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{CoreError, Result, TaskType};
use crate::executor::{ExecutionRequest, Executor};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JudgeDimensions {
    pub correctness: f64,
    pub completeness: f64,
    pub clarity: f64,
    pub safety: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeEvaluation {
    pub dimensions: JudgeDimensions,
    #[serde(default)]
    pub dimension_notes: Option<DimensionNotes>,
    pub compliance: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionNotes {
    pub correctness: Option<String>,
    pub completeness: Option<String>,
    pub clarity: Option<String>,
    pub safety: Option<String>,
}

struct Weights {
    correctness: f64,
    compliance: f64,
    completeness: f64,
    clarity: f64,
    safety: f64,
}

fn weights_for(task_type: TaskType) -> Weights {
    match task_type {
        TaskType::Code => Weights { correctness: 0.50, compliance: 0.20, completeness: 0.15, clarity: 0.10, safety: 0.05 },
        TaskType::Writing => Weights { correctness: 0.10, compliance: 0.30, completeness: 0.25, clarity: 0.25, safety: 0.10 },
        TaskType::Analysis => Weights { correctness: 0.20, compliance: 0.20, completeness: 0.20, clarity: 0.20, safety: 0.20 },
        TaskType::General => {
            let quality = (1.0 - 0.05) / 4.0;
            Weights { correctness: quality, compliance: quality, completeness: quality, clarity: quality, safety: 0.05 }
        }
    }
}

pub fn overall_score(task_type: TaskType, dimensions: JudgeDimensions, compliance: f64) -> f64 {
    let weights = weights_for(task_type);
    weights.correctness * dimensions.correctness
        + weights.compliance * compliance
        + weights.completeness * dimensions.completeness
        + weights.clarity * dimensions.clarity
        + weights.safety * dimensions.safety
}

/// A judge adapter calls out to a model to produce a structured evaluation.
/// Grounded on the same executor trait the task runner uses for attempts —
/// the judge is just another provider call with a different parser on top.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, task_type: TaskType, output: &str) -> Result<JudgeEvaluation>;
}

pub struct LlmJudge {
    executor: std::sync::Arc<dyn Executor>,
    judge_model_id: String,
}

impl LlmJudge {
    pub fn new(executor: std::sync::Arc<dyn Executor>, judge_model_id: impl Into<String>) -> Self {
        Self { executor, judge_model_id: judge_model_id.into() }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn evaluate(&self, task_type: TaskType, output: &str) -> Result<JudgeEvaluation> {
        let prompt = format!(
            "Score the following output on correctness, completeness, clarity, safety, and \
             compliance, each in [0,1], as a strict JSON object with keys \
             dimensions{{correctness,completeness,clarity,safety}} and compliance.\n\nOutput:\n{output}"
        );
        let request = ExecutionRequest {
            model_id: self.judge_model_id.clone(),
            prompt,
            timeout: std::time::Duration::from_secs(30),
        };
        let result = self.executor.execute(&request).await?;
        let parsed: serde_json::Value = serde_json::from_str(&result.text)
            .map_err(|err| CoreError::execution(format!("judge returned non-JSON: {err}")))?;

        let dimensions = JudgeDimensions {
            correctness: parsed["dimensions"]["correctness"].as_f64().unwrap_or(0.0),
            completeness: parsed["dimensions"]["completeness"].as_f64().unwrap_or(0.0),
            clarity: parsed["dimensions"]["clarity"].as_f64().unwrap_or(0.0),
            safety: parsed["dimensions"]["safety"].as_f64().unwrap_or(0.0),
        };
        let compliance = parsed["compliance"].as_f64().unwrap_or(0.0);
        let overall = overall_score(task_type, dimensions, compliance);

        Ok(JudgeEvaluation { dimensions, dimension_notes: None, compliance, overall })
    }
}

/// Deterministic test double: returns a fixed evaluation regardless of
/// output, for runner tests that don't want an executor in the loop.
pub struct FixedJudge {
    pub dimensions: JudgeDimensions,
    pub compliance: f64,
}

#[async_trait]
impl Judge for FixedJudge {
    async fn evaluate(&self, task_type: TaskType, _output: &str) -> Result<JudgeEvaluation> {
        let overall = overall_score(task_type, self.dimensions, self.compliance);
        Ok(JudgeEvaluation { dimensions: self.dimensions, dimension_notes: None, compliance: self.compliance, overall })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_weighting_favors_correctness() {
        let dims = JudgeDimensions { correctness: 1.0, completeness: 0.0, clarity: 0.0, safety: 0.0 };
        let score = overall_score(TaskType::Code, dims, 0.0);
        assert!((score - 0.50).abs() < 1e-9);
    }

    #[test]
    fn analysis_weighting_is_balanced() {
        let dims = JudgeDimensions { correctness: 1.0, completeness: 1.0, clarity: 1.0, safety: 1.0 };
        let score = overall_score(TaskType::Analysis, dims, 1.0);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fixed_judge_returns_deterministic_overall() {
        let judge = FixedJudge {
            dimensions: JudgeDimensions { correctness: 0.8, completeness: 0.8, clarity: 0.8, safety: 0.8 },
            compliance: 0.8,
        };
        let eval = judge.evaluate(TaskType::General, "anything").await.unwrap();
        assert!((eval.overall - 0.8).abs() < 1e-9);
    }
}
