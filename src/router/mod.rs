//! C6 Router (§4.1): a pure function from a task + candidate models to a
//! `RoutingDecision` with a full per-candidate audit trail. No I/O — all
//! inputs (priors, calibration confidence) are resolved by the caller.

pub mod config;

pub use config::{
    DifficultyTable, EscalationConfig, EscalationPolicy, EscalationRoutingMode, EvaluationMode,
    NoQualifiedPolicy, OnBudgetFail, RouterConfig, SelectionPolicy, TokenEstimate,
};

use std::collections::HashMap;

use crate::domain::{
    CandidateAudit, Difficulty, DisqualifiedReason, EscalationAwareAudit, EstimatedTokens, Model,
    PortfolioBypass, PortfolioBypassReason, RoutingAudit, RoutingDecision, RoutingMeta, RoutingStatus,
    TaskCard, TaskType,
};

/// One routable candidate: the registry model plus whatever prior/
/// calibration signal the caller has resolved for it ahead of time.
#[derive(Debug, Clone)]
pub struct RoutingCandidate {
    pub model: Model,
    /// `prior.qualityPrior(taskType, difficulty)`, when available.
    pub quality_prior: Option<f64>,
    /// Calibration confidence for (model, taskType), `0` if never observed.
    pub raw_confidence: f64,
    /// Candidate score supplied by an external Model-HR scorer, consumed
    /// only by `SelectionPolicy::Score`.
    pub candidate_score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioOptions {
    pub prefer_model_ids: Vec<String>,
    pub allowed_model_ids: Vec<String>,
    pub portfolio_provided: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingOptions {
    pub max_cost_usd: Option<f64>,
    pub cheapest_viable_chosen: bool,
    pub directive: Option<String>,
}

struct ScoredCandidate<'a> {
    candidate: &'a RoutingCandidate,
    effective_quality: f64,
    expected_cost: f64,
    passed: bool,
    disqualified_reason: Option<DisqualifiedReason>,
}

fn effective_quality_of(candidate: &RoutingCandidate, task: &TaskCard) -> f64 {
    candidate.quality_prior.unwrap_or_else(|| candidate.model.expertise_for(task.task_type))
}

/// §4.1 token estimation: directive length drives the estimate when it
/// yields at least 800 combined tokens; otherwise fall back to the
/// per-taskType base estimate. Both scaled by the difficulty multiplier.
pub fn estimate_tokens(task: &TaskCard, config: &RouterConfig, directive: Option<&str>) -> EstimatedTokens {
    let multiplier = config.difficulty_multipliers.get(task.difficulty);

    let from_directive = directive.and_then(|text| {
        let len = text.chars().count();
        let input = ((len / 4) as u64).clamp(200, 6000);
        let output = (input as f64 * 0.6) as u64;
        if input + output >= 800 {
            Some((input, output))
        } else {
            None
        }
    });

    let (input, output) = from_directive.unwrap_or_else(|| {
        let base = config
            .base_token_estimates
            .get(&task.task_type)
            .cloned()
            .unwrap_or(TokenEstimate { input: 2000, output: 1000 });
        (base.input, base.output)
    });

    EstimatedTokens {
        input: (input as f64 * multiplier).round() as u64,
        output: (output as f64 * multiplier).round() as u64,
    }
}

fn portfolio_bonus(model_id: &str, difficulty: Difficulty, portfolio: &PortfolioOptions) -> f64 {
    if !portfolio.prefer_model_ids.iter().any(|id| id == model_id) {
        return 0.0;
    }
    match difficulty {
        Difficulty::Low => 0.01,
        Difficulty::Medium => 0.03,
        Difficulty::High => 0.05,
    }
}

fn qualify<'a>(
    candidates: &'a [RoutingCandidate],
    task: &TaskCard,
    tokens: &EstimatedTokens,
    config: &RouterConfig,
    portfolio: &PortfolioOptions,
    options: &RoutingOptions,
) -> Vec<ScoredCandidate<'a>> {
    let threshold = config.thresholds.get(task.difficulty).max(task.constraints.min_quality.unwrap_or(0.0));

    candidates
        .iter()
        .map(|candidate| {
            let expected_cost = candidate.model.pricing.expected_cost(tokens.input, tokens.output);
            let effective_quality = effective_quality_of(candidate, task);

            let mut reason = None;
            if !candidate.model.is_eligible() {
                reason = Some(DisqualifiedReason::Disabled);
            } else if !portfolio.allowed_model_ids.is_empty()
                && !portfolio.allowed_model_ids.iter().any(|id| id == &candidate.model.id)
            {
                reason = Some(DisqualifiedReason::NotAllowedByPortfolio);
            } else if effective_quality < threshold {
                reason = Some(DisqualifiedReason::BelowQualityThreshold);
            } else if let Some(max_cost) = options.max_cost_usd {
                if expected_cost > max_cost {
                    reason = Some(DisqualifiedReason::OverBudget);
                }
            }

            ScoredCandidate {
                candidate,
                effective_quality,
                expected_cost,
                passed: reason.is_none(),
                disqualified_reason: reason,
            }
        })
        .collect()
}

fn tie_break(a: &ScoredCandidate, b: &ScoredCandidate) -> std::cmp::Ordering {
    b.candidate
        .model
        .reliability
        .partial_cmp(&a.candidate.model.reliability)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.effective_quality.partial_cmp(&a.effective_quality).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| a.expected_cost.partial_cmp(&b.expected_cost).unwrap_or(std::cmp::Ordering::Equal))
}

fn select_best_value<'a>(
    passed: &[&'a ScoredCandidate<'a>],
    task: &TaskCard,
    config: &RouterConfig,
    threshold: f64,
    portfolio: &PortfolioOptions,
) -> Option<&'a ScoredCandidate<'a>> {
    let min_benefit = config.min_benefit_by_difficulty.get(task.difficulty);

    let mut scored: Vec<(&ScoredCandidate, f64)> = passed
        .iter()
        .filter_map(|candidate| {
            let benefit = (candidate.effective_quality - threshold).max(0.0);
            if benefit < min_benefit {
                return None;
            }
            let raw_conf = candidate.candidate.raw_confidence;
            let effective_conf = if raw_conf >= config.min_confidence_to_use_calibration {
                raw_conf
            } else {
                config.confidence_floor
            };
            let value_score = benefit * effective_conf.max(0.1) / (candidate.expected_cost + 1e-4);
            Some((*candidate, value_score))
        })
        .collect();

    if scored.is_empty() {
        // fall back to expertise-desc ordering among all passed candidates
        return passed
            .iter()
            .copied()
            .max_by(|a, b| a.effective_quality.partial_cmp(&b.effective_quality).unwrap_or(std::cmp::Ordering::Equal));
    }

    // Portfolio preference only breaks ties among equal value scores, never
    // reorders the primary ranking (§4.1: "never for gating").
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| {
            let bonus_a = portfolio_bonus(&a.0.candidate.model.id, task.difficulty, portfolio);
            let bonus_b = portfolio_bonus(&b.0.candidate.model.id, task.difficulty, portfolio);
            bonus_b.partial_cmp(&bonus_a).unwrap_or(std::cmp::Ordering::Equal).then_with(|| tie_break(a.0, b.0))
        })
    });
    scored.into_iter().next().map(|(candidate, _)| candidate)
}

fn select_for_policy<'a>(
    policy: SelectionPolicy,
    passed: &[&'a ScoredCandidate<'a>],
    task: &TaskCard,
    config: &RouterConfig,
    threshold: f64,
    portfolio: &PortfolioOptions,
) -> Option<&'a ScoredCandidate<'a>> {
    if passed.is_empty() {
        return None;
    }
    match policy {
        SelectionPolicy::LowestCostQualified => passed
            .iter()
            .copied()
            .min_by(|a, b| a.expected_cost.partial_cmp(&b.expected_cost).unwrap_or(std::cmp::Ordering::Equal).then_with(|| tie_break(a, b))),
        SelectionPolicy::CheapestViable => passed
            .iter()
            .copied()
            .min_by(|a, b| a.expected_cost.partial_cmp(&b.expected_cost).unwrap_or(std::cmp::Ordering::Equal)),
        SelectionPolicy::BestValue => select_best_value(passed, task, config, threshold, portfolio),
        SelectionPolicy::Score => {
            let mut sorted = passed.to_vec();
            sorted.sort_by(|a, b| {
                let sa = a.candidate.candidate_score.unwrap_or(0.0);
                let sb = b.candidate.candidate_score.unwrap_or(0.0);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal).then_with(|| {
                    a.expected_cost.partial_cmp(&b.expected_cost).unwrap_or(std::cmp::Ordering::Equal)
                })
            });
            sorted.into_iter().next()
        }
    }
}

fn build_audit(
    scored: &[ScoredCandidate],
    chosen_id: Option<&str>,
    escalation_aware: Option<EscalationAwareAudit>,
) -> RoutingAudit {
    let candidates = scored
        .iter()
        .map(|candidate| CandidateAudit {
            model_id: candidate.candidate.model.id.clone(),
            predicted_cost: candidate.expected_cost,
            predicted_quality: candidate.effective_quality,
            passed: candidate.passed,
            disqualified_reason: candidate.disqualified_reason,
            score: None,
            value_score_entry: None,
        })
        .collect();
    let _ = chosen_id;
    RoutingAudit { candidates, escalation_aware }
}

/// §4.1: the router's single entry point. Pure — no I/O, no shared state.
pub fn route(
    task: &TaskCard,
    candidates: &[RoutingCandidate],
    config: &RouterConfig,
    portfolio: &PortfolioOptions,
    options: &RoutingOptions,
) -> RoutingDecision {
    let tokens = estimate_tokens(task, config, options.directive.as_deref());
    let threshold = config.thresholds.get(task.difficulty).max(task.constraints.min_quality.unwrap_or(0.0));

    let mut scored = qualify(candidates, task, &tokens, config, portfolio, options);

    // Portfolio lock disqualifying everything is a caller-level concern
    // (§4.3 decides whether to downgrade to `off` and retry); here we just
    // report what qualified under the options as given.
    let passed_refs: Vec<&ScoredCandidate> = scored.iter().filter(|c| c.passed).collect();

    if let Some(chosen) = select_for_policy(config.selection_policy, &passed_refs, task, config, threshold, portfolio) {
        let normal_choice_id = chosen.candidate.model.id.clone();
        let normal_cost = chosen.expected_cost;

        // §4.1 escalation-aware cheap-first: may substitute a cheaper
        // attempt-1 model after the normal choice is already settled.
        let escalation_aware = apply_cheap_first(task, &normal_choice_id, normal_cost, candidates, config, options.max_cost_usd);
        let cheap_first_choice = escalation_aware.as_ref().and_then(|audit| audit.cheap_first_choice.clone());

        let (chosen_id, expected_cost) = match &cheap_first_choice {
            Some(cf_id) => {
                let cf_cost = scored
                    .iter()
                    .find(|c| &c.candidate.model.id == cf_id)
                    .map(|c| c.expected_cost)
                    .unwrap_or(normal_cost);
                (cf_id.clone(), cf_cost)
            }
            None => (normal_choice_id.clone(), normal_cost),
        };

        let fallback_ids: Vec<String> = passed_refs
            .iter()
            .filter(|c| c.candidate.model.id != chosen_id)
            .take(config.fallback_count as usize)
            .map(|c| c.candidate.model.id.clone())
            .collect();

        let rationale = match &cheap_first_choice {
            Some(cf_id) => format!("selected by {:?}, cheap-first substituted {cf_id} over {normal_choice_id}", config.selection_policy),
            None => format!("selected by {:?}", config.selection_policy),
        };

        let audit = build_audit(&scored, Some(&chosen_id), escalation_aware);
        return RoutingDecision {
            chosen_model_id: Some(chosen_id),
            fallback_model_ids: fallback_ids,
            expected_cost_usd: Some(expected_cost),
            estimated_tokens: tokens,
            status: RoutingStatus::Ok,
            rationale,
            routing_meta: RoutingMeta {
                ranked_by: Some(format!("{:?}", config.selection_policy)),
                enforce_cheapest_viable: options.cheapest_viable_chosen,
                portfolio_bypassed: None,
            },
            routing_audit: audit,
        };
    }

    no_qualified_fallback(task, &mut scored, &tokens, config, portfolio, options, threshold)
}

fn no_qualified_fallback(
    task: &TaskCard,
    scored: &mut [ScoredCandidate],
    tokens: &EstimatedTokens,
    config: &RouterConfig,
    portfolio: &PortfolioOptions,
    options: &RoutingOptions,
    threshold: f64,
) -> RoutingDecision {
    let audit_only = || build_audit(scored, None, None);

    match config.on_budget_fail {
        OnBudgetFail::Fail => {
            let mut decision = RoutingDecision::no_qualified(
                tokens.clone(),
                audit_only(),
                "no candidate passed the qualification gate",
            );
            if portfolio.portfolio_provided && !portfolio.allowed_model_ids.is_empty() {
                decision.routing_meta.portfolio_bypassed = Some(PortfolioBypass {
                    reason: PortfolioBypassReason::NoAllowedModels,
                    missing_model_ids: portfolio.allowed_model_ids.clone(),
                });
            }
            decision
        }
        OnBudgetFail::BestEffortWithinBudget => {
            let within_budget: Vec<&ScoredCandidate> = scored
                .iter()
                .filter(|c| match options.max_cost_usd {
                    Some(max_cost) => c.expected_cost <= max_cost,
                    None => true,
                })
                .collect();

            let candidate_pool = if config.no_qualified_policy == NoQualifiedPolicy::BestValueNearThreshold {
                let delta = config.near_threshold_delta_by_difficulty.get(task.difficulty);
                let effective_threshold = threshold - delta;
                within_budget.into_iter().filter(|c| c.effective_quality >= effective_threshold).collect::<Vec<_>>()
            } else {
                within_budget
            };

            let best = candidate_pool
                .into_iter()
                .max_by(|a, b| a.effective_quality.partial_cmp(&b.effective_quality).unwrap_or(std::cmp::Ordering::Equal));

            best_effort_decision(best, tokens, audit_only())
        }
        OnBudgetFail::IgnoreBudget => {
            let best = scored
                .iter()
                .max_by(|a, b| a.effective_quality.partial_cmp(&b.effective_quality).unwrap_or(std::cmp::Ordering::Equal));
            best_effort_decision(best, tokens, audit_only())
        }
    }
}

fn best_effort_decision(
    best: Option<&ScoredCandidate>,
    tokens: &EstimatedTokens,
    audit: RoutingAudit,
) -> RoutingDecision {
    match best {
        Some(candidate) => RoutingDecision {
            chosen_model_id: Some(candidate.candidate.model.id.clone()),
            fallback_model_ids: Vec::new(),
            expected_cost_usd: Some(candidate.expected_cost),
            estimated_tokens: tokens.clone(),
            status: RoutingStatus::BestEffort,
            rationale: "best-effort selection after qualification gate emptied the candidate set".to_string(),
            routing_meta: RoutingMeta::default(),
            routing_audit: audit,
        },
        None => RoutingDecision::no_qualified(
            tokens.clone(),
            audit,
            "best-effort selection found no candidate at all",
        ),
    }
}

/// Escalation-aware cheap-first gating (§4.1), applied after a normal choice
/// is already made. Returns `None` when cheap-first is not applicable or no
/// candidate survives the sequential gates.
pub fn apply_cheap_first(
    task: &TaskCard,
    normal_choice_id: &str,
    normal_cost: f64,
    candidates: &[RoutingCandidate],
    config: &RouterConfig,
    max_cost_usd: Option<f64>,
) -> Option<EscalationAwareAudit> {
    let escalation = &config.escalation;
    if escalation.policy != EscalationPolicy::PromoteOnLowScore
        || escalation.routing_mode != EscalationRoutingMode::EscalationAware
    {
        return None;
    }
    if config.premium_task_types.contains(&task.task_type) {
        return Some(EscalationAwareAudit {
            normal_choice: normal_choice_id.to_string(),
            cheap_first_choice: None,
            savings_usd: None,
            gate_progress: Vec::new(),
            primary_blocker: Some("premium_lane".to_string()),
        });
    }

    let threshold = config.thresholds.get(task.difficulty).max(task.constraints.min_quality.unwrap_or(0.0));
    let max_gap = escalation.cheap_first_max_gap_by_difficulty.get(task.difficulty);
    let promotion_order = escalation.escalation_model_order_by_task_type.get(&task.task_type);

    let mut gate_progress = Vec::new();
    let mut primary_blocker = None;
    let mut survivors: Vec<(&RoutingCandidate, f64)> = Vec::new();

    for candidate in candidates {
        if candidate.model.id == normal_choice_id || !candidate.model.is_eligible() {
            continue;
        }
        let cost = candidate.model.pricing.expected_cost(2500, 1500);
        let expertise = effective_quality_of(candidate, task);

        // gate 1: savings
        let savings_ok = cost <= normal_cost * (1.0 - escalation.cheap_first_savings_min_pct)
            && escalation.cheap_first_savings_min_usd.map_or(true, |min_usd| normal_cost - cost >= min_usd);
        if !savings_ok {
            if primary_blocker.is_none() {
                primary_blocker = Some("savings".to_string());
            }
            continue;
        }
        gate_progress.push("savings".to_string());

        // gate 2: confidence
        if candidate.raw_confidence < escalation.cheap_first_min_confidence {
            if primary_blocker.is_none() {
                primary_blocker = Some("confidence".to_string());
            }
            continue;
        }
        gate_progress.push("confidence".to_string());

        // gate 3: gap
        let gap = threshold - expertise;
        let gap_ok = expertise >= threshold || (0.0..=max_gap).contains(&gap);
        if !gap_ok {
            if primary_blocker.is_none() {
                primary_blocker = Some("gap".to_string());
            }
            continue;
        }
        gate_progress.push("gap".to_string());

        // gate 4: promotion target exists, strictly stronger than candidate
        let has_promotion_target = promotion_order
            .map(|order| order.iter().any(|id| id != &candidate.model.id))
            .unwrap_or(false);
        if escalation.cheap_first_only_when_can_promote && !has_promotion_target {
            if primary_blocker.is_none() {
                primary_blocker = Some("promotion_target".to_string());
            }
            continue;
        }
        gate_progress.push("promotion_target".to_string());

        // gate 5: budget
        if let Some(max_cost) = max_cost_usd {
            let promotion_cost = cost; // conservative estimate absent a concrete promotion target cost
            let headroom_ok = (cost + promotion_cost) * escalation.cheap_first_budget_headroom_factor <= max_cost;
            let extra_ok = escalation.max_extra_cost_usd.map_or(true, |extra| promotion_cost <= extra);
            if !(headroom_ok && extra_ok) {
                if primary_blocker.is_none() {
                    primary_blocker = Some("budget".to_string());
                }
                continue;
            }
        }
        gate_progress.push("budget".to_string());

        survivors.push((candidate, cost));
    }

    let best = survivors.into_iter().max_by(|(a, cost_a), (b, cost_b)| {
        let score_a = effective_quality_of(a, task) * a.raw_confidence / (cost_a + 1e-4);
        let score_b = effective_quality_of(b, task) * b.raw_confidence / (cost_b + 1e-4);
        score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
    });

    match best {
        Some((candidate, cost)) => Some(EscalationAwareAudit {
            normal_choice: normal_choice_id.to_string(),
            cheap_first_choice: Some(candidate.model.id.clone()),
            savings_usd: Some(normal_cost - cost),
            gate_progress,
            primary_blocker: None,
        }),
        None => Some(EscalationAwareAudit {
            normal_choice: normal_choice_id.to_string(),
            cheap_first_choice: None,
            savings_usd: None,
            gate_progress,
            primary_blocker,
        }),
    }
}
