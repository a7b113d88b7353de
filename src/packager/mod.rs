//! C10 Packager (§4.6): expands a project plan's subtasks into a dependency
//! graph of Worker and QA packages.

pub mod templates;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    CoreError, Difficulty, PackageEstimatedTokens, QaOutputs, QaPolicy, Result, Role, TaskType, WorkPackage,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub importance: u8,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// §4.6: one Worker package per subtask, plus a QA package depending only on
/// that Worker whenever the inferred difficulty is medium or high.
pub fn build_packages(subtasks: &[Subtask]) -> Result<Vec<WorkPackage>> {
    let mut packages = Vec::with_capacity(subtasks.len() * 2);

    for subtask in subtasks {
        let task_type = templates::infer_task_type(&subtask.title, &subtask.description);
        let difficulty = templates::infer_difficulty(&subtask.title, &subtask.description);
        let acceptance_criteria = templates::acceptance_criteria(task_type, difficulty);
        let tokens = templates::estimate_tokens(&subtask.description, true, difficulty);
        let qa_policy = QaPolicy::for_risk_score(subtask.risk_score);

        let worker_id = format!("{}-worker", subtask.id);
        packages.push(WorkPackage {
            id: worker_id.clone(),
            role: Role::Worker,
            name: subtask.title.clone(),
            description: subtask.description.clone(),
            acceptance_criteria,
            inputs: Value::Null,
            outputs: Value::Null,
            dependencies: Vec::new(),
            estimated_tokens: PackageEstimatedTokens { input: tokens, output: tokens / 4 },
            qa_checks: None,
            importance: subtask.importance,
            task_type,
            difficulty,
            qa_policy: qa_policy.clone(),
            tier_profile_override: None,
            cheapest_viable_chosen: false,
            tenant_id: subtask.tenant_id.clone(),
        });

        if difficulty != Difficulty::Low {
            let qa_tokens = templates::estimate_tokens(&subtask.description, false, difficulty);
            let fixed_outputs = QaOutputs { pass: false, quality_score: 0.0, defects: Vec::new() };
            packages.push(WorkPackage {
                id: format!("{}-qa", subtask.id),
                role: Role::Qa,
                name: format!("QA: {}", subtask.title),
                description: format!("Validate output of {}", subtask.title),
                acceptance_criteria: Vec::new(),
                inputs: Value::Null,
                outputs: serde_json::to_value(&fixed_outputs).unwrap_or(Value::Null),
                dependencies: vec![worker_id],
                estimated_tokens: PackageEstimatedTokens { input: qa_tokens, output: qa_tokens / 4 },
                qa_checks: Some(qa_policy.deterministic_checks.clone()),
                importance: subtask.importance,
                task_type,
                difficulty,
                qa_policy,
                tier_profile_override: None,
                cheapest_viable_chosen: false,
                tenant_id: subtask.tenant_id.clone(),
            });
        }
    }

    validate_packages(&packages)?;
    Ok(packages)
}

/// Validates (§3 invariants): unique ids, QA has exactly one Worker
/// dependency, no cycles (DFS).
pub fn validate_packages(packages: &[WorkPackage]) -> Result<()> {
    let mut seen_ids = HashSet::new();
    for package in packages {
        if !seen_ids.insert(package.id.as_str()) {
            return Err(CoreError::validation(format!("duplicate package id '{}'", package.id)));
        }
    }

    let by_id: HashMap<&str, &WorkPackage> = packages.iter().map(|p| (p.id.as_str(), p)).collect();

    for package in packages {
        if package.role == Role::Qa && package.dependencies.len() != 1 {
            return Err(CoreError::validation(format!(
                "QA package '{}' must depend on exactly one Worker package, has {}",
                package.id,
                package.dependencies.len()
            )));
        }
        for dep in &package.dependencies {
            if !by_id.contains_key(dep.as_str()) {
                return Err(CoreError::validation(format!("package '{}' depends on unknown id '{}'", package.id, dep)));
            }
        }
    }

    detect_cycle(&by_id)?;
    Ok(())
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum VisitState {
    Visiting,
    Done,
}

fn detect_cycle(by_id: &HashMap<&str, &WorkPackage>) -> Result<()> {
    let mut state: HashMap<&str, VisitState> = HashMap::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a WorkPackage>,
        state: &mut HashMap<&'a str, VisitState>,
    ) -> Result<()> {
        match state.get(id) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::Visiting) => {
                return Err(CoreError::validation(format!("cycle detected involving package '{id}'")))
            }
            None => {}
        }
        state.insert(id, VisitState::Visiting);
        if let Some(package) = by_id.get(id) {
            for dep in &package.dependencies {
                visit(dep.as_str(), by_id, state)?;
            }
        }
        state.insert(id, VisitState::Done);
        Ok(())
    }

    for id in by_id.keys() {
        visit(id, by_id, &mut state)?;
    }
    Ok(())
}
