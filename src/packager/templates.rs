//! Acceptance-criteria template bank and deterministic taskType/difficulty
//! inference, per §4.6.

use crate::domain::{Difficulty, TaskType};

/// Keyword-based inference, checked in a fixed priority order so the same
/// subtask text always classifies the same way.
pub fn infer_task_type(title: &str, description: &str) -> TaskType {
    let text = format!("{title} {description}").to_lowercase();
    const CODE_KEYWORDS: &[&str] = &["implement", "refactor", "bug", "function", "api", "code", "test", "compile"];
    const WRITING_KEYWORDS: &[&str] = &["write", "draft", "document", "blog", "copy", "email", "readme"];
    const ANALYSIS_KEYWORDS: &[&str] = &["analyze", "compare", "evaluate", "investigate", "research", "benchmark"];

    if CODE_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        TaskType::Code
    } else if WRITING_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        TaskType::Writing
    } else if ANALYSIS_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        TaskType::Analysis
    } else {
        TaskType::General
    }
}

pub fn infer_difficulty(title: &str, description: &str) -> Difficulty {
    let text = format!("{title} {description}").to_lowercase();
    const HIGH_KEYWORDS: &[&str] = &["architecture", "migrate", "distributed", "complex", "critical", "redesign"];
    const LOW_KEYWORDS: &[&str] = &["typo", "rename", "simple", "trivial", "small", "tweak"];

    if HIGH_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        Difficulty::High
    } else if LOW_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        Difficulty::Low
    } else {
        Difficulty::Medium
    }
}

/// Fixed bank of acceptance criteria indexed by `(taskType, difficulty)`,
/// each entry sized to the 3-7 range a Worker package requires.
pub fn acceptance_criteria(task_type: TaskType, difficulty: Difficulty) -> Vec<String> {
    let mut criteria = vec![
        "Output directly addresses the stated task".to_string(),
        "No unexplained placeholders or TODOs remain".to_string(),
        "Output is internally consistent".to_string(),
    ];

    match task_type {
        TaskType::Code => {
            criteria.push("Code compiles / parses without errors".to_string());
            criteria.push("Edge cases named in the description are handled".to_string());
        }
        TaskType::Writing => {
            criteria.push("Tone matches the requested audience".to_string());
            criteria.push("No grammatical errors".to_string());
        }
        TaskType::Analysis => {
            criteria.push("Conclusions are supported by cited evidence".to_string());
            criteria.push("Counterarguments or limitations are acknowledged".to_string());
        }
        TaskType::General => {
            criteria.push("Response is complete relative to the request".to_string());
        }
    }

    if difficulty == Difficulty::High {
        criteria.push("Tradeoffs and risks are explicitly called out".to_string());
    }
    if difficulty == Difficulty::Low {
        criteria.truncate(3);
    }

    criteria
}

/// `500 + min(2*len(desc), 3000) + (Worker? 800 : 200)`, scaled by the
/// difficulty factor.
pub fn estimate_tokens(description: &str, is_worker: bool, difficulty: Difficulty) -> u64 {
    let base = 500 + (2 * description.chars().count()).min(3000) + if is_worker { 800 } else { 200 };
    let factor = match difficulty {
        Difficulty::Low => 0.7,
        Difficulty::Medium => 1.0,
        Difficulty::High => 1.5,
    };
    (base as f64 * factor).round() as u64
}
