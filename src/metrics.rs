// Metrics tracking for localization loading
// Thread-local storage to avoid contention between backend sessions
thread_local! {
    static METRICS: std::cell::RefCell<LoadMetrics> = const { std::cell::RefCell::new(LoadMetrics::new_const()) };
}

/// Structure holding current session metrics
#[derive(Debug, Default, Clone)]
struct LoadMetrics {
    /// Batch queries issued against the backend
    batches_executed: u64,
    /// Entry rows distributed into references
    rows_distributed: u64,
    /// References resolved from materialized records (no backend call)
    direct_resolutions: u64,
    /// References resolved by the batch phase
    batch_resolutions: u64,
    /// References resolved to "record does not exist"
    not_found: u64,
    /// Rows dropped during distribution (unknown id, NULL tag/value)
    rows_discarded: u64,
    /// Factory registry cache hits
    registry_cache_hits: u64,
    /// Factory registry cache misses
    registry_cache_misses: u64,
}

impl LoadMetrics {
    const fn new_const() -> Self {
        Self {
            batches_executed: 0,
            rows_distributed: 0,
            direct_resolutions: 0,
            batch_resolutions: 0,
            not_found: 0,
            rows_discarded: 0,
            registry_cache_hits: 0,
            registry_cache_misses: 0,
        }
    }
}

/// Public interface for metrics tracking
pub mod metrics_api {
    use super::*;

    /// Record one batch query round trip and the rows it returned
    pub fn record_batch_executed(row_count: usize) {
        METRICS.with(|m| {
            let mut metrics = m.borrow_mut();
            metrics.batches_executed += 1;
            metrics.rows_distributed += row_count as u64;
        });
    }

    /// Record a reference resolved from an in-memory record
    pub fn record_direct_resolution() {
        METRICS.with(|m| {
            m.borrow_mut().direct_resolutions += 1;
        });
    }

    /// Record references resolved by batch distribution
    pub fn record_batch_resolutions(count: usize) {
        METRICS.with(|m| {
            m.borrow_mut().batch_resolutions += count as u64;
        });
    }

    /// Record references resolved to "not found"
    pub fn record_not_found(count: usize) {
        METRICS.with(|m| {
            m.borrow_mut().not_found += count as u64;
        });
    }

    /// Record a row dropped during distribution
    pub fn record_row_discarded() {
        METRICS.with(|m| {
            m.borrow_mut().rows_discarded += 1;
        });
    }

    /// Record factory registry cache hit
    pub fn record_registry_cache_hit() {
        METRICS.with(|m| {
            m.borrow_mut().registry_cache_hits += 1;
        });
    }

    /// Record factory registry cache miss
    pub fn record_registry_cache_miss() {
        METRICS.with(|m| {
            m.borrow_mut().registry_cache_misses += 1;
        });
    }

    /// Get current load statistics
    pub fn get_load_stats() -> LoadStats {
        METRICS.with(|m| {
            let metrics = m.borrow();
            LoadStats {
                batches_executed: metrics.batches_executed,
                rows_distributed: metrics.rows_distributed,
                direct_resolutions: metrics.direct_resolutions,
                batch_resolutions: metrics.batch_resolutions,
                not_found: metrics.not_found,
                rows_discarded: metrics.rows_discarded,
                registry_cache_hits: metrics.registry_cache_hits,
                registry_cache_misses: metrics.registry_cache_misses,
            }
        })
    }

    /// Reset metrics (for tests and explicit SQL-level resets)
    pub fn reset_metrics() {
        METRICS.with(|m| {
            *m.borrow_mut() = LoadMetrics::default();
        });
    }
}

/// Statistics returned by metrics functions
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadStats {
    pub batches_executed: u64,
    pub rows_distributed: u64,
    pub direct_resolutions: u64,
    pub batch_resolutions: u64,
    pub not_found: u64,
    pub rows_discarded: u64,
    pub registry_cache_hits: u64,
    pub registry_cache_misses: u64,
}

impl LoadStats {
    /// Cache hit rate of the factory registry
    pub fn registry_cache_hit_rate(&self) -> f64 {
        let total = self.registry_cache_hits + self.registry_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.registry_cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::metrics_api::*;

    #[test]
    fn test_batch_counters_accumulate() {
        reset_metrics();

        record_batch_executed(3);
        record_batch_executed(0);
        record_batch_resolutions(2);
        record_not_found(1);

        let stats = get_load_stats();
        assert_eq!(stats.batches_executed, 2);
        assert_eq!(stats.rows_distributed, 3);
        assert_eq!(stats.batch_resolutions, 2);
        assert_eq!(stats.not_found, 1);

        reset_metrics();
        assert_eq!(get_load_stats().batches_executed, 0);
    }

    #[test]
    fn test_registry_hit_rate() {
        reset_metrics();
        assert_eq!(get_load_stats().registry_cache_hit_rate(), 0.0);

        record_registry_cache_hit();
        record_registry_cache_hit();
        record_registry_cache_miss();

        let rate = get_load_stats().registry_cache_hit_rate();
        assert!((rate - 2.0 / 3.0).abs() < f64::EPSILON);

        reset_metrics();
    }
}
