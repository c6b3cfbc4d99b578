//! Performance Metrics Module
//!
//! This module provides optional operation counters for [`ConcurrentMap`](crate::ConcurrentMap).
//! They show how often operations are served from the lock-free read snapshot versus the
//! locked staging path, and how often the staging map is promoted or rebuilt.
//!
//! Collection is disabled by default: the counters are shared atomics and would otherwise
//! put every reader on the same cache line.

use core::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a map's counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceMetrics {
    /// Total number of operations performed
    pub total_operations: u64,
    /// Operations answered from the read snapshot without locking
    pub fast_path_operations: u64,
    /// Operations that had to take the staging lock
    pub locked_operations: u64,
    /// Compare-based operations that applied their update
    pub successful_compares: u64,
    /// Compare-based operations that found a different value or no entry
    pub failed_compares: u64,
    /// Lookups that missed the snapshot and consulted the staging map
    pub misses: u64,
    /// Times the staging map replaced the read snapshot
    pub promotions: u64,
    /// Times the staging map was rebuilt from the snapshot
    pub staging_rebuilds: u64,
}

impl PerformanceMetrics {
    /// Calculate fast-path rate as percentage
    pub fn fast_path_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.fast_path_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    /// Calculate lock rate as percentage
    pub fn contention_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.locked_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    /// Calculate compare success rate as percentage
    pub fn compare_success_rate(&self) -> f64 {
        let compares = self.successful_compares + self.failed_compares;
        if compares == 0 {
            0.0
        } else {
            (self.successful_compares as f64 / compares as f64) * 100.0
        }
    }
}

/// Internal atomic metrics collection
#[derive(Debug, Default)]
pub(crate) struct AtomicMetrics {
    fast_path_operations: AtomicU64,
    locked_operations: AtomicU64,
    successful_compares: AtomicU64,
    failed_compares: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    staging_rebuilds: AtomicU64,
}

impl AtomicMetrics {
    pub(crate) fn record_fast_path(&self) {
        self.fast_path_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_locked(&self) {
        self.locked_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the result of a compare-based operation
    pub(crate) fn record_outcome(&self, succeeded: bool) {
        if succeeded {
            self.successful_compares.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_compares.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_staging_rebuild(&self) {
        self.staging_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub(crate) fn snapshot(&self) -> PerformanceMetrics {
        let fast_path_operations = self.fast_path_operations.load(Ordering::Relaxed);
        let locked_operations = self.locked_operations.load(Ordering::Relaxed);

        PerformanceMetrics {
            total_operations: fast_path_operations + locked_operations,
            fast_path_operations,
            locked_operations,
            successful_compares: self.successful_compares.load(Ordering::Relaxed),
            failed_compares: self.failed_compares.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            staging_rebuilds: self.staging_rebuilds.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub(crate) fn reset(&self) {
        self.fast_path_operations.store(0, Ordering::Relaxed);
        self.locked_operations.store(0, Ordering::Relaxed);
        self.successful_compares.store(0, Ordering::Relaxed);
        self.failed_compares.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.staging_rebuilds.store(0, Ordering::Relaxed);
    }
}

/// Trait for data structures that support performance metrics
pub trait MetricsCollector {
    /// Get current performance metrics
    fn metrics(&self) -> PerformanceMetrics;

    /// Reset all metrics
    fn reset_metrics(&self);

    /// Enable or disable metrics collection
    fn set_metrics_enabled(&self, enabled: bool);

    /// Check if metrics collection is enabled
    fn is_metrics_enabled(&self) -> bool;
}
