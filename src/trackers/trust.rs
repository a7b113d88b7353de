//! C4 Trust Tracker — per-model worker/QA trust with EMA updates, time
//! decay, and a floor, per §4.4.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const INITIAL_TRUST: f64 = 0.7;
const FLOOR: f64 = 0.35;
const WORKER_ALPHA: f64 = 0.15;
const QA_ALPHA: f64 = 0.2;
const DECAY_GRACE_DAYS: i64 = 7;
const DECAY_PER_DAY: f64 = 0.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustEntry {
    pub worker: f64,
    pub qa: f64,
    pub last_updated: DateTime<Utc>,
}

impl TrustEntry {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self { worker: INITIAL_TRUST, qa: INITIAL_TRUST, last_updated: now }
    }

    /// Apply read-time linear decay past the 7-day grace window, without
    /// mutating the stored entry (decay is computed lazily on read).
    fn decayed(&self, now: DateTime<Utc>) -> Self {
        let days = (now - self.last_updated).num_days();
        if days <= DECAY_GRACE_DAYS {
            return *self;
        }
        let penalty = DECAY_PER_DAY * (days - DECAY_GRACE_DAYS) as f64;
        Self {
            worker: (self.worker - penalty).max(FLOOR),
            qa: (self.qa - penalty).max(FLOOR),
            last_updated: self.last_updated,
        }
    }
}

/// Inputs to one worker-trust update, per §4.4.
pub struct WorkerTrustSignal {
    pub predicted_quality: f64,
    pub actual_quality: f64,
    pub qa_pass: bool,
    pub cost_ratio: f64,
}

#[derive(Debug, Default)]
pub struct TrustTracker {
    entries: RwLock<HashMap<String, TrustEntry>>,
}

impl TrustTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry with read-time decay applied; does not persist the
    /// decayed value — the next write recomputes from the stored baseline.
    pub fn get(&self, model_id: &str, now: DateTime<Utc>) -> TrustEntry {
        self.entries
            .read()
            .expect("trust lock poisoned")
            .get(model_id)
            .map(|entry| entry.decayed(now))
            .unwrap_or_else(|| TrustEntry::fresh(now))
    }

    /// `next = clamp(current + α·δ, floor, 1)` with the multi-term δ:
    /// quality delta (asymmetric reward/penalty), QA fail penalty, cost
    /// overrun penalty past a 1.3x ratio.
    pub fn update_worker(&self, model_id: &str, signal: &WorkerTrustSignal, now: DateTime<Utc>) -> TrustEntry {
        let mut guard = self.entries.write().expect("trust lock poisoned");
        let current = guard
            .get(model_id)
            .map(|entry| entry.decayed(now))
            .unwrap_or_else(|| TrustEntry::fresh(now));

        let mut delta = 0.0;
        delta += 0.10 * (signal.actual_quality - signal.predicted_quality).max(0.0);
        delta -= 0.15 * (signal.predicted_quality - signal.actual_quality).max(0.0);
        if !signal.qa_pass {
            delta -= 0.35;
        }
        if signal.cost_ratio > 1.3 {
            delta -= 0.12 * ((signal.cost_ratio - 1.3) / 0.7).min(1.0);
        }

        let next_worker = (current.worker + WORKER_ALPHA * delta).clamp(FLOOR, 1.0);
        let updated = TrustEntry { worker: next_worker, qa: current.qa, last_updated: now };
        guard.insert(model_id.to_string(), updated);
        updated
    }

    /// Single-signal EMA: `+0.10` on agreement with deterministic QA, else
    /// `-0.15`, blended at α=0.2.
    pub fn update_qa(&self, model_id: &str, agreed_with_deterministic: bool, now: DateTime<Utc>) -> TrustEntry {
        let mut guard = self.entries.write().expect("trust lock poisoned");
        let current = guard
            .get(model_id)
            .map(|entry| entry.decayed(now))
            .unwrap_or_else(|| TrustEntry::fresh(now));

        let signal = if agreed_with_deterministic { 0.10 } else { -0.15 };
        let next_qa = (current.qa + QA_ALPHA * signal).clamp(FLOOR, 1.0);
        let updated = TrustEntry { worker: current.worker, qa: next_qa, last_updated: now };
        guard.insert(model_id.to_string(), updated);
        updated
    }

    pub fn snapshot(&self) -> HashMap<String, TrustEntry> {
        self.entries.read().expect("trust lock poisoned").clone()
    }

    pub fn restore(&self, entries: HashMap<String, TrustEntry>) {
        *self.entries.write().expect("trust lock poisoned") = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_model_starts_at_initial_trust() {
        let tracker = TrustTracker::new();
        let now = Utc::now();
        let entry = tracker.get("m1", now);
        assert_eq!(entry.worker, INITIAL_TRUST);
        assert_eq!(entry.qa, INITIAL_TRUST);
    }

    #[test]
    fn worker_trust_rises_on_positive_quality_surprise() {
        let tracker = TrustTracker::new();
        let now = Utc::now();
        let signal = WorkerTrustSignal { predicted_quality: 0.6, actual_quality: 0.9, qa_pass: true, cost_ratio: 1.0 };
        let updated = tracker.update_worker("m1", &signal, now);
        assert!(updated.worker > INITIAL_TRUST);
    }

    #[test]
    fn qa_fail_applies_large_penalty() {
        let tracker = TrustTracker::new();
        let now = Utc::now();
        let signal = WorkerTrustSignal { predicted_quality: 0.8, actual_quality: 0.8, qa_pass: false, cost_ratio: 1.0 };
        let updated = tracker.update_worker("m1", &signal, now);
        let expected = (INITIAL_TRUST + WORKER_ALPHA * -0.35).max(FLOOR);
        assert!((updated.worker - expected).abs() < 1e-9);
    }

    #[test]
    fn cost_overrun_penalty_scales_with_ratio_and_caps_at_one() {
        let tracker = TrustTracker::new();
        let now = Utc::now();
        let signal = WorkerTrustSignal { predicted_quality: 0.8, actual_quality: 0.8, qa_pass: true, cost_ratio: 3.0 };
        let updated = tracker.update_worker("m1", &signal, now);
        let expected = (INITIAL_TRUST + WORKER_ALPHA * -0.12).max(FLOOR);
        assert!((updated.worker - expected).abs() < 1e-9);
    }

    #[test]
    fn trust_never_drops_below_floor() {
        let tracker = TrustTracker::new();
        let mut now = Utc::now();
        let signal = WorkerTrustSignal { predicted_quality: 1.0, actual_quality: 0.0, qa_pass: false, cost_ratio: 5.0 };
        for _ in 0..50 {
            tracker.update_worker("m1", &signal, now);
            now += Duration::seconds(1);
        }
        assert_eq!(tracker.get("m1", now).worker, FLOOR);
    }

    #[test]
    fn decay_applies_only_past_the_seven_day_grace_window() {
        let tracker = TrustTracker::new();
        let t0 = Utc::now();
        tracker.update_qa("m1", true, t0);
        let within_grace = tracker.get("m1", t0 + Duration::days(5));
        assert!((within_grace.qa - (INITIAL_TRUST + QA_ALPHA * 0.10)).abs() < 1e-9);

        let past_grace = tracker.get("m1", t0 + Duration::days(10));
        let expected = (INITIAL_TRUST + QA_ALPHA * 0.10) - DECAY_PER_DAY * 3.0;
        assert!((past_grace.qa - expected).abs() < 1e-9);
    }

    #[test]
    fn qa_trust_updates_independently_of_worker_trust() {
        let tracker = TrustTracker::new();
        let now = Utc::now();
        tracker.update_qa("m1", false, now);
        let entry = tracker.get("m1", now);
        assert!(entry.qa < INITIAL_TRUST);
        assert_eq!(entry.worker, INITIAL_TRUST);
    }
}
