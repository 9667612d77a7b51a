//! Orchestrator statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use requel_llm::CacheStats;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Queries seen by `optimize`.
    pub total_queries: u64,
    /// Queries for which a rewrite was substituted.
    pub optimized_queries: u64,
    /// Candidates rejected or timed out during validation.
    pub failed_validations: u64,
    /// Running mean improvement ratio over optimized queries.
    pub avg_improvement_ratio: f64,
    /// Running mean wall time per optimization call, milliseconds.
    pub avg_optimization_time_ms: f64,
    /// LLM cache hits (pass-through from the client).
    pub cache_hits: u64,
}

/// Lock-free counters shared by concurrent optimization calls.
///
/// Running means are stored as f64 bit patterns and updated with a
/// compare-and-swap retry loop.
#[derive(Debug, Default)]
pub struct EngineStats {
    total_queries: AtomicU64,
    optimized_queries: AtomicU64,
    failed_validations: AtomicU64,
    avg_improvement_bits: AtomicU64,
    avg_wall_ms_bits: AtomicU64,
}

impl EngineStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call and fold its wall time into the mean.
    pub fn record_query(&self, wall_ms: f64) {
        let n = self.total_queries.fetch_add(1, Ordering::Relaxed) + 1;
        fold_mean(&self.avg_wall_ms_bits, n, wall_ms);
    }

    /// Record a substituted rewrite and fold its ratio into the mean.
    pub fn record_optimized(&self, improvement_ratio: f64) {
        let n = self.optimized_queries.fetch_add(1, Ordering::Relaxed) + 1;
        fold_mean(&self.avg_improvement_bits, n, improvement_ratio);
    }

    /// Record one candidate discarded during validation.
    pub fn record_failed_validation(&self) {
        self.failed_validations.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters, merging in the client's cache hits.
    pub fn snapshot(&self, cache: CacheStats) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            optimized_queries: self.optimized_queries.load(Ordering::Relaxed),
            failed_validations: self.failed_validations.load(Ordering::Relaxed),
            avg_improvement_ratio: f64::from_bits(
                self.avg_improvement_bits.load(Ordering::Relaxed),
            ),
            avg_optimization_time_ms: f64::from_bits(self.avg_wall_ms_bits.load(Ordering::Relaxed)),
            cache_hits: cache.hits,
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.total_queries.store(0, Ordering::Relaxed);
        self.optimized_queries.store(0, Ordering::Relaxed);
        self.failed_validations.store(0, Ordering::Relaxed);
        self.avg_improvement_bits.store(0, Ordering::Relaxed);
        self.avg_wall_ms_bits.store(0, Ordering::Relaxed);
    }
}

/// Online mean update: mean += (x - mean) / n, retried under CAS.
fn fold_mean(cell: &AtomicU64, n: u64, x: f64) {
    loop {
        let current_bits = cell.load(Ordering::Relaxed);
        let current = f64::from_bits(current_bits);
        let next = current + (x - current) / n as f64;
        if cell
            .compare_exchange_weak(
                current_bits,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_running_means() {
        let stats = EngineStats::new();
        stats.record_query(10.0);
        stats.record_query(20.0);
        stats.record_optimized(2.0);
        stats.record_optimized(4.0);

        let snapshot = stats.snapshot(CacheStats::default());
        assert_eq!(snapshot.total_queries, 2);
        assert_eq!(snapshot.optimized_queries, 2);
        assert!((snapshot.avg_optimization_time_ms - 15.0).abs() < 1e-9);
        assert!((snapshot.avg_improvement_ratio - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let stats = EngineStats::new();
        stats.record_query(10.0);
        stats.record_failed_validation();
        stats.reset();

        let snapshot = stats.snapshot(CacheStats::default());
        assert_eq!(snapshot, StatsSnapshot::default());
    }

    #[test]
    fn test_concurrent_updates_converge() {
        let stats = Arc::new(EngineStats::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_query(10.0);
                        stats.record_optimized(2.0);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let snapshot = stats.snapshot(CacheStats::default());
        assert_eq!(snapshot.total_queries, 800);
        assert_eq!(snapshot.optimized_queries, 800);
        // All samples are constant, so the means are exact regardless of
        // interleaving.
        assert!((snapshot.avg_optimization_time_ms - 10.0).abs() < 1e-9);
        assert!((snapshot.avg_improvement_ratio - 2.0).abs() < 1e-9);
    }
}
