//! Per-tick metrics series, sampled during the tick tail (spec §4.2 phase 7,
//! "Persist tick tail: metrics series points").
//!
//! One bounded ring per equivalent backs the `/simulator/runs/{run_id}/metrics`
//! time-series query (spec §6) without unbounded memory growth; eviction
//! mirrors the event ring buffer's capacity-bound strategy (spec §4.9)
//! rather than introducing a second retention policy.

use crate::models::equivalent::Equivalent;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_SERIES_CAPACITY: usize = 4096;

/// One sampled point, recorded once per tick per equivalent in scope.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsPoint {
    pub tick_index: u64,
    pub sim_time_ms: u64,
    pub committed_total: u64,
    pub rejected_total: u64,
    pub errors_total: u64,
    pub cleared_cycles_total: u64,
    pub cleared_amount_total: f64,
    pub queue_depth: u64,
}

/// Bounded per-equivalent time series, queryable by `[from_ms, to_ms]`
/// downsampled to `step_ms` buckets.
#[derive(Debug)]
pub struct MetricsStore {
    by_equivalent: HashMap<Equivalent, VecDeque<MetricsPoint>>,
    capacity: usize,
}

impl MetricsStore {
    pub fn new(capacity: usize) -> Self {
        Self { by_equivalent: HashMap::new(), capacity }
    }

    pub fn record(&mut self, equivalent: &Equivalent, point: MetricsPoint) {
        let series = self
            .by_equivalent
            .entry(equivalent.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));
        if series.len() >= self.capacity {
            series.pop_front();
        }
        series.push_back(point);
    }

    /// Downsample the stored series to one point per `step_ms` bucket in
    /// `[from_ms, to_ms]`, taking the first sample that lands in each
    /// bucket (every point is already a tick-boundary snapshot, so this
    /// is exact whenever `step_ms` is a multiple of `tick_ms_base`).
    pub fn range(&self, equivalent: &Equivalent, from_ms: u64, to_ms: u64, step_ms: u64) -> Vec<MetricsPoint> {
        let Some(series) = self.by_equivalent.get(equivalent) else {
            return Vec::new();
        };
        let step_ms = step_ms.max(1);
        let mut out = Vec::new();
        let mut next_bucket = from_ms;
        for point in series.iter() {
            if point.sim_time_ms < from_ms || point.sim_time_ms > to_ms {
                continue;
            }
            if point.sim_time_ms >= next_bucket {
                out.push(point.clone());
                next_bucket = point.sim_time_ms.saturating_add(step_ms);
            }
        }
        out
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(tick: u64) -> MetricsPoint {
        MetricsPoint {
            tick_index: tick,
            sim_time_ms: tick * 1000,
            committed_total: tick,
            rejected_total: 0,
            errors_total: 0,
            cleared_cycles_total: 0,
            cleared_amount_total: 0.0,
            queue_depth: 0,
        }
    }

    #[test]
    fn range_respects_bounds_and_step() {
        let eq = Equivalent::new("UAH");
        let mut store = MetricsStore::new(100);
        for tick in 0..10 {
            store.record(&eq, point(tick));
        }
        let points = store.range(&eq, 2000, 8000, 2000);
        let ticks: Vec<u64> = points.iter().map(|p| p.tick_index).collect();
        assert_eq!(ticks, vec![2, 4, 6, 8]);
    }

    #[test]
    fn eviction_bounds_capacity() {
        let eq = Equivalent::new("UAH");
        let mut store = MetricsStore::new(3);
        for tick in 0..5 {
            store.record(&eq, point(tick));
        }
        let points = store.range(&eq, 0, 10_000, 1);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].tick_index, 2);
    }

    #[test]
    fn unknown_equivalent_returns_empty() {
        let store = MetricsStore::new(10);
        let points = store.range(&Equivalent::new("USD"), 0, 1000, 100);
        assert!(points.is_empty());
    }
}
