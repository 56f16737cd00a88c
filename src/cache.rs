// =============================================================================
// Evaluation Cache — short-lived memoization around the engine
// =============================================================================
//
// Keyed by the snapshot fingerprint, so any change to the inputs or to the
// result-relevant settings misses. Only the snapshot-determined part of a
// report is reused; a hit still runs the engine's clock-dependent tail, so the
// clustering history evolves the same with or without the cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::engine::{Engine, EvaluationReport, EvaluationSnapshot};

pub const MAX_ENTRIES: usize = 64;

struct CacheEntry {
    stored_at: DateTime<Utc>,
    report: EvaluationReport,
}

/// Report plus whether it came from the cache.
#[derive(Debug, Clone)]
pub struct CachedEvaluation {
    pub report: EvaluationReport,
    pub hit: bool,
}

pub struct EvaluationCache {
    engine: Arc<Engine>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl EvaluationCache {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Return a fresh cached report for this snapshot, or evaluate and store.
    pub fn evaluate(&self, snapshot: &EvaluationSnapshot, now: DateTime<Utc>) -> CachedEvaluation {
        let ttl_ms = self.engine.config().cache_ttl_ms as i64;

        let key = match self.engine.fingerprint(snapshot) {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "snapshot fingerprint failed, bypassing cache");
                return CachedEvaluation {
                    report: self.engine.evaluate(snapshot, now),
                    hit: false,
                };
            }
        };

        let fresh = self
            .entries
            .lock()
            .get(&key)
            .filter(|e| is_fresh(e.stored_at, now, ttl_ms))
            .map(|e| e.report.clone());
        if let Some(mut report) = fresh {
            trace!(fingerprint = %key, "cache hit");
            self.engine.complete_cycle(&mut report, now);
            return CachedEvaluation { report, hit: true };
        }

        let report = self.engine.evaluate(snapshot, now);

        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| is_fresh(e.stored_at, now, ttl_ms));
        if entries.len() != before {
            debug!(purged = before - entries.len(), "expired cache entries purged");
        }
        if entries.len() >= MAX_ENTRIES && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                stored_at: now,
                report: report.clone(),
            },
        );

        CachedEvaluation { report, hit: false }
    }
}

fn is_fresh(stored_at: DateTime<Utc>, now: DateTime<Utc>, ttl_ms: i64) -> bool {
    let age = (now - stored_at).num_milliseconds();
    (0..ttl_ms).contains(&age)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::EngineConfig;
    use crate::types::ObservationSet;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 4, 12, 0, 0).unwrap()
    }

    fn cache_with_ttl(ttl_ms: u64) -> EvaluationCache {
        let mut cfg = EngineConfig::default();
        cfg.cache_ttl_ms = ttl_ms;
        EvaluationCache::new(Arc::new(Engine::new(cfg).unwrap()))
    }

    fn snapshot(after: f64) -> EvaluationSnapshot {
        let mut s = EvaluationSnapshot::default();
        s.observations
            .insert("VALE".into(), ObservationSet::new(Some(60.0), Some(after), Some(0.5)));
        s
    }

    #[test]
    fn hit_within_ttl() {
        let c = cache_with_ttl(5000);
        let first = c.evaluate(&snapshot(1.0), t0());
        assert!(!first.hit);
        let second = c.evaluate(&snapshot(1.0), t0() + Duration::milliseconds(4999));
        assert!(second.hit);
        assert_eq!(first.report.id, second.report.id);
    }

    #[test]
    fn clustering_evolves_the_same_with_and_without_cache() {
        let cached = cache_with_ttl(60_000);
        let bare = Engine::new(EngineConfig::default()).unwrap();
        let s = snapshot(1.0);

        for i in 0..4 {
            let now = t0() + Duration::seconds(i);
            let a = cached.evaluate(&s, now);
            let b = bare.evaluate(&s, now);
            assert_eq!(a.hit, i > 0);
            assert_eq!(a.report.clustering, b.clustering);
            assert_eq!(a.report.clustering_adjusted_signal, b.clustering_adjusted_signal);
            assert_eq!(a.report.timestamp, b.timestamp);
            assert_eq!(a.report.timing, b.timing);
        }

        assert_eq!(cached.engine().clustering(), bare.clustering());
        let last = cached.engine().clustering().unwrap();
        assert_eq!(last.sample_size, 4);
    }

    #[test]
    fn expired_entry_is_recomputed() {
        let c = cache_with_ttl(5000);
        let first = c.evaluate(&snapshot(1.0), t0());
        let later = c.evaluate(&snapshot(1.0), t0() + Duration::milliseconds(5000));
        assert!(!later.hit);
        assert_ne!(first.report.id, later.report.id);
        assert_eq!(first.report.signal, later.report.signal);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn different_inputs_miss() {
        let c = cache_with_ttl(5000);
        c.evaluate(&snapshot(1.0), t0());
        let other = c.evaluate(&snapshot(1.5), t0());
        assert!(!other.hit);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn settings_change_misses() {
        let c = cache_with_ttl(5000);
        c.evaluate(&snapshot(1.0), t0());
        let mut cfg = c.engine().config();
        cfg.sensitivity = 0.5;
        c.engine().update_config(cfg).unwrap();
        assert!(!c.evaluate(&snapshot(1.0), t0()).hit);
    }

    #[test]
    fn zero_ttl_never_hits() {
        let c = cache_with_ttl(0);
        c.evaluate(&snapshot(1.0), t0());
        assert!(!c.evaluate(&snapshot(1.0), t0()).hit);
    }

    #[test]
    fn insert_purges_expired_and_caps_size() {
        let c = cache_with_ttl(60_000);
        for i in 0..(MAX_ENTRIES + 10) {
            c.evaluate(&snapshot(0.01 * (i + 1) as f64), t0() + Duration::milliseconds(i as i64));
        }
        assert_eq!(c.len(), MAX_ENTRIES);

        // Everything above is stale one minute later.
        c.evaluate(&snapshot(9.0), t0() + Duration::minutes(2));
        assert_eq!(c.len(), 1);

        c.clear();
        assert!(c.is_empty());
    }
}
