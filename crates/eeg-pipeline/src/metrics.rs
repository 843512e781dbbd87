//! Metrics capability
//!
//! The pipeline reports stage timings and cache lookups through
//! [`PipelineMetrics`]. Emission is up to the host; [`NoopMetrics`] drops
//! everything and [`InMemoryMetrics`] keeps a tally for inspection.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Sink for pipeline measurements
pub trait PipelineMetrics: Send + Sync {
    /// A stage finished (successfully or not) after `elapsed`
    fn stage_completed(&self, stage: &str, elapsed: Duration, success: bool);

    /// A cache was consulted
    fn cache_lookup(&self, cache: &str, hit: bool);
}

/// Discards all measurements
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl PipelineMetrics for NoopMetrics {
    fn stage_completed(&self, _stage: &str, _elapsed: Duration, _success: bool) {}

    fn cache_lookup(&self, _cache: &str, _hit: bool) {}
}

/// Per-stage tally
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageTally {
    pub runs: u64,
    pub failures: u64,
    pub total: Duration,
}

/// Keeps measurements in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    stages: Mutex<BTreeMap<String, StageTally>>,
    /// (hits, misses) per cache
    caches: Mutex<BTreeMap<String, (u64, u64)>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, stage: &str) -> Option<StageTally> {
        self.stages.lock().get(stage).cloned()
    }

    /// (hits, misses) recorded for `cache`
    pub fn cache(&self, cache: &str) -> (u64, u64) {
        self.caches.lock().get(cache).copied().unwrap_or((0, 0))
    }
}

impl PipelineMetrics for InMemoryMetrics {
    fn stage_completed(&self, stage: &str, elapsed: Duration, success: bool) {
        let mut stages = self.stages.lock();
        let tally = stages.entry(stage.to_string()).or_default();
        tally.runs += 1;
        tally.total += elapsed;
        if !success {
            tally.failures += 1;
        }
    }

    fn cache_lookup(&self, cache: &str, hit: bool) {
        let mut caches = self.caches.lock();
        let entry = caches.entry(cache.to_string()).or_insert((0, 0));
        if hit {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_tally() {
        let metrics = InMemoryMetrics::new();
        metrics.stage_completed("load", Duration::from_millis(5), true);
        metrics.stage_completed("load", Duration::from_millis(7), false);
        metrics.cache_lookup("recordings", false);
        metrics.cache_lookup("recordings", true);
        metrics.cache_lookup("recordings", true);

        let load = metrics.stage("load").unwrap();
        assert_eq!(load.runs, 2);
        assert_eq!(load.failures, 1);
        assert_eq!(load.total, Duration::from_millis(12));
        assert_eq!(metrics.cache("recordings"), (2, 1));
        assert_eq!(metrics.cache("bundles"), (0, 0));
        assert!(metrics.stage("extract").is_none());
    }

    #[test]
    fn test_noop_is_object_safe() {
        let sink: Box<dyn PipelineMetrics> = Box::new(NoopMetrics);
        sink.stage_completed("extract", Duration::ZERO, true);
        sink.cache_lookup("bundles", false);
    }
}
