//! Directive decomposition: turns a free-text project directive into the
//! `Subtask`s the packager expands into a Work-Package DAG.
//!
//! Kept as a narrow, swappable collaborator behind a trait — the same shape
//! as [`crate::executor::Executor`] — since a directive could later be
//! decomposed by an LLM call instead of the deterministic splitter below.
//! The deterministic implementation is what every scenario in this crate
//! actually runs; nothing here depends on a network call.

use serde::{Deserialize, Serialize};

use crate::domain::Result;
use crate::packager::Subtask;

/// Inputs a decomposer needs beyond the directive text itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecomposeOptions {
    pub tenant_id: Option<String>,
}

pub trait DirectiveDecomposer: Send + Sync {
    fn decompose(&self, directive: &str, options: &DecomposeOptions) -> Result<Vec<Subtask>>;
}

const HIGH_IMPORTANCE_KEYWORDS: &[&str] = &["critical", "urgent", "must", "blocking", "required"];
const LOW_IMPORTANCE_KEYWORDS: &[&str] = &["optional", "nice to have", "if time permits", "stretch"];
const HIGH_RISK_KEYWORDS: &[&str] = &["production", "security", "payment", "migration", "irreversible", "customer data"];

fn importance_for(text: &str) -> u8 {
    let lower = text.to_lowercase();
    if HIGH_IMPORTANCE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        5
    } else if LOW_IMPORTANCE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        1
    } else {
        3
    }
}

fn risk_score_for(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let hits = HIGH_RISK_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();
    (hits as f64 * 0.35).min(1.0)
}

fn title_for(clause: &str) -> String {
    let trimmed = clause.trim();
    let mut title: String = trimmed.chars().take(60).collect();
    if trimmed.chars().count() > 60 {
        title.push_str("...");
    }
    title
}

/// Splits a directive into clauses on line breaks, numbered/bulleted list
/// markers, and terminal punctuation, discarding empty fragments. The same
/// directive always yields the same clause sequence, so the same directive
/// always produces the same subtask ids (`subtask-0`, `subtask-1`, ...).
fn split_clauses(directive: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    for line in directive.lines() {
        let line = line.trim().trim_start_matches(|c: char| c == '-' || c == '*' || c.is_ascii_digit() || c == '.' || c == ')');
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for sentence in line.split(['.', ';']) {
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                clauses.push(sentence.to_string());
            }
        }
    }
    if clauses.is_empty() && !directive.trim().is_empty() {
        clauses.push(directive.trim().to_string());
    }
    clauses
}

/// The only `DirectiveDecomposer` this crate ships: a deterministic
/// keyword-based splitter, not a model call.
#[derive(Debug, Default)]
pub struct KeywordDirectiveDecomposer;

impl KeywordDirectiveDecomposer {
    pub fn new() -> Self {
        Self
    }
}

impl DirectiveDecomposer for KeywordDirectiveDecomposer {
    fn decompose(&self, directive: &str, options: &DecomposeOptions) -> Result<Vec<Subtask>> {
        let clauses = split_clauses(directive);
        if clauses.is_empty() {
            return Err(crate::domain::CoreError::validation("directive decomposed into zero subtasks"));
        }

        Ok(clauses
            .into_iter()
            .enumerate()
            .map(|(i, clause)| Subtask {
                id: format!("subtask-{i}"),
                title: title_for(&clause),
                description: clause.clone(),
                importance: importance_for(&clause),
                risk_score: risk_score_for(&clause),
                tenant_id: options.tenant_id.clone(),
            })
            .collect())
    }
}

/// Fixed bank of canned directives selectable by `presetId` (§6
/// "`{directive|presetId}`"), so a caller can request a known-good scenario
/// without typing one out.
pub fn preset_directive(preset_id: &str) -> Option<&'static str> {
    match preset_id {
        "landing-page-refresh" => {
            Some("Rewrite the marketing landing page copy. Fix the broken signup button. Add a pricing comparison table.")
        }
        "api-hardening" => {
            Some(
                "Audit the payment webhook handler for security issues. Migrate the legacy auth middleware to the new \
                 token format. Add integration tests for the critical checkout path.",
            )
        }
        "quarterly-report" => {
            Some("Analyze Q3 revenue trends. Draft the executive summary. Compare results against the prior quarter.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_directive_always_produces_the_same_subtask_ids() {
        let decomposer = KeywordDirectiveDecomposer::new();
        let directive = "Implement the parser. Write the release notes.";
        let first = decomposer.decompose(directive, &DecomposeOptions::default()).unwrap();
        let second = decomposer.decompose(directive, &DecomposeOptions::default()).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.description, b.description);
        }
    }

    #[test]
    fn numbered_list_markers_are_stripped_from_clauses() {
        let decomposer = KeywordDirectiveDecomposer::new();
        let directive = "1. Implement the parser\n2. Write the release notes";
        let subtasks = decomposer.decompose(directive, &DecomposeOptions::default()).unwrap();
        assert_eq!(subtasks.len(), 2);
        assert!(!subtasks[0].description.starts_with('1'));
    }

    #[test]
    fn critical_keyword_raises_importance_to_five() {
        let decomposer = KeywordDirectiveDecomposer::new();
        let subtasks = decomposer.decompose("This is a critical fix for the outage.", &DecomposeOptions::default()).unwrap();
        assert_eq!(subtasks[0].importance, 5);
    }

    #[test]
    fn production_and_security_keywords_raise_risk_score() {
        let decomposer = KeywordDirectiveDecomposer::new();
        let subtasks = decomposer
            .decompose("Audit the production payment security posture.", &DecomposeOptions::default())
            .unwrap();
        assert!(subtasks[0].risk_score > 0.5);
    }

    #[test]
    fn empty_directive_is_rejected() {
        let decomposer = KeywordDirectiveDecomposer::new();
        assert!(decomposer.decompose("   ", &DecomposeOptions::default()).is_err());
    }

    #[test]
    fn preset_ids_resolve_to_known_directives() {
        assert!(preset_directive("landing-page-refresh").is_some());
        assert!(preset_directive("does-not-exist").is_none());
    }

    #[test]
    fn tenant_id_propagates_into_every_subtask() {
        let decomposer = KeywordDirectiveDecomposer::new();
        let options = DecomposeOptions { tenant_id: Some("acme".into()) };
        let subtasks = decomposer.decompose("Draft the memo.", &options).unwrap();
        assert_eq!(subtasks[0].tenant_id.as_deref(), Some("acme"));
    }
}
