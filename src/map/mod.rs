//! Map implementations
//!
//! This module provides the concurrent map and the entry cells it is built from.
//!
//! ## Available Maps
//!
//! - [`ConcurrentMap`]: Lock-free reads, per-entry atomic updates, mutex-guarded inserts of new keys
//!
//! ## Choosing an Access Pattern
//!
//! - Works best when keys are written once and read many times, or when threads
//!   touch disjoint sets of keys
//! - Heavy churn of brand-new keys funnels through the staging lock
//! - Enable [`MetricsCollector`](crate::metrics::MetricsCollector) to see how often the
//!   locked path is taken

pub mod concurrent;
mod entry;

pub use self::concurrent::{ConcurrentMap, DefaultHashBuilder};


#[cfg(test)]
mod proptests;
