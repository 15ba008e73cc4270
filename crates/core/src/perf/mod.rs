use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::cache::{FetchEvent, FetchObserver};

/// Aggregate retrieval latency, as reported by [`PerformanceTracker::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub count: usize,
    pub avg_load_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_load_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_load_time_ms: Option<f64>,
    pub total_cached_entries: usize,
}

/// Records the latency of every successful cache retrieval.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    totals: Mutex<LoadTotals>,
}

/// Running aggregates; individual samples are not kept.
#[derive(Debug, Default, Clone, Copy)]
struct LoadTotals {
    count: usize,
    sum_ms: f64,
    min_ms: Option<f64>,
    max_ms: Option<f64>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency_ms: f64) {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.count += 1;
        totals.sum_ms += latency_ms;
        totals.min_ms = Some(totals.min_ms.map_or(latency_ms, |min| min.min(latency_ms)));
        totals.max_ms = Some(totals.max_ms.map_or(latency_ms, |max| max.max(latency_ms)));
    }

    /// `total_cached_entries` comes from the cache, which may hold seeded
    /// entries that were never timed.
    pub fn stats(&self, total_cached_entries: usize) -> PerformanceStats {
        let totals = *self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        if totals.count == 0 {
            return PerformanceStats {
                total_cached_entries,
                ..Default::default()
            };
        }

        PerformanceStats {
            count: totals.count,
            avg_load_time_ms: totals.sum_ms / totals.count as f64,
            min_load_time_ms: totals.min_ms,
            max_load_time_ms: totals.max_ms,
            total_cached_entries,
        }
    }
}

impl FetchObserver for PerformanceTracker {
    fn fetch_completed(&self, event: &FetchEvent) {
        self.record(event.latency_ms);
    }
}
