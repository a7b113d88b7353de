//! Portfolio cache: single-entry TTL cache keyed by `(sorted registry ids,
//! trust floors, minPredictedQuality)`, per §4.3/§5.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::TaskType;

use super::optimizer::{PortfolioConfig, PortfolioRecommendation};

const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    sorted_model_ids: Vec<String>,
    worker_trust_floor: u64,
    qa_trust_floor: u64,
    min_predicted_quality: u64,
    task_type: TaskType,
}

impl CacheKey {
    fn new(sorted_model_ids: Vec<String>, config: &PortfolioConfig, task_type: TaskType) -> Self {
        // Floats compared bit-for-bit are fine here: the config values come
        // from the same source on every call, never from arithmetic.
        Self {
            sorted_model_ids,
            worker_trust_floor: config.worker_trust_floor.to_bits(),
            qa_trust_floor: config.qa_trust_floor.to_bits(),
            min_predicted_quality: config.min_predicted_quality.to_bits(),
            task_type,
        }
    }
}

struct Entry {
    key: CacheKey,
    value: PortfolioRecommendation,
    inserted_at: Instant,
}

/// Single-entry cache. `force_refresh_next` consumes itself after one use,
/// per the design note on the portfolio cache's one-shot invalidation flag.
pub struct PortfolioCache {
    slot: Mutex<Option<Entry>>,
    ttl: Duration,
    force_refresh_next: Mutex<bool>,
}

impl PortfolioCache {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None), ttl: DEFAULT_TTL, force_refresh_next: Mutex::new(false) }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { slot: Mutex::new(None), ttl, force_refresh_next: Mutex::new(false) }
    }

    pub fn request_refresh(&self) {
        *self.force_refresh_next.lock().expect("cache lock poisoned") = true;
    }

    /// Returns the cached recommendation when the key matches, it's within
    /// TTL, and no forced refresh is pending; otherwise computes via
    /// `compute`, stores, and returns the fresh value.
    pub fn get_or_compute(
        &self,
        sorted_model_ids: Vec<String>,
        config: &PortfolioConfig,
        task_type: TaskType,
        compute: impl FnOnce() -> PortfolioRecommendation,
    ) -> PortfolioRecommendation {
        let key = CacheKey::new(sorted_model_ids, config, task_type);

        let mut forced = self.force_refresh_next.lock().expect("cache lock poisoned");
        let force = *forced;
        *forced = false;
        drop(forced);

        let mut slot = self.slot.lock().expect("cache lock poisoned");
        if !force {
            if let Some(entry) = slot.as_ref() {
                if entry.key == key && entry.inserted_at.elapsed() < self.ttl {
                    return entry.value.clone();
                }
            }
        }

        let value = compute();
        *slot = Some(Entry { key, value: value.clone(), inserted_at: Instant::now() });
        value
    }
}

impl Default for PortfolioCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn repeated_calls_with_same_key_hit_the_cache() {
        let cache = PortfolioCache::new();
        let config = PortfolioConfig::default();
        let calls = Cell::new(0);

        for _ in 0..3 {
            cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
                calls.set(calls.get() + 1);
                PortfolioRecommendation::default()
            });
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn different_registry_keys_bypass_the_cache() {
        let cache = PortfolioCache::new();
        let config = PortfolioConfig::default();
        let calls = Cell::new(0);

        cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        cache.get_or_compute(vec!["m1".into(), "m2".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn force_refresh_consumes_itself_after_one_use() {
        let cache = PortfolioCache::new();
        let config = PortfolioConfig::default();
        let calls = Cell::new(0);

        cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        cache.request_refresh();
        cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn expired_ttl_triggers_recompute() {
        let cache = PortfolioCache::with_ttl(Duration::from_millis(10));
        let config = PortfolioConfig::default();
        let calls = Cell::new(0);

        cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        std::thread::sleep(Duration::from_millis(20));
        cache.get_or_compute(vec!["m1".into()], &config, TaskType::Code, || {
            calls.set(calls.get() + 1);
            PortfolioRecommendation::default()
        });
        assert_eq!(calls.get(), 2);
    }
}
