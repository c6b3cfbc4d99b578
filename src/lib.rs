//! # syncmap
//!
//! A typed, concurrency-safe map that many threads can read and write at once without
//! external locking.
//!
//! ## Features
//!
//! - **Lock-free reads**: lookups and traversals of published keys never take a lock
//! - **Atomic compound operations**: load-or-store, swap, compare-and-swap,
//!   compare-and-delete and load-and-delete act on a key in one indivisible step
//! - **Typed API**: keys and values are generic parameters, there is no runtime type check
//!
//! ## Quick Start
//!
//! ```rust
//! use syncmap::ConcurrentMap;
//!
//! let map = ConcurrentMap::new();
//! map.store("answer", 42);
//! assert_eq!(map.load("answer"), Some(42));
//! assert_eq!(map.load_or_store("answer", 0), (42, true));
//! ```
//!
//! ## Thread Safety
//!
//! [`ConcurrentMap`] is `Send + Sync` whenever its keys and values are. Operations on a
//! single key are linearizable; traversals are weakly consistent.
//!
//! ## Zero Values
//!
//! Absence is reported as `None` (or `false`), never as a placeholder value, so a stored
//! `V::default()` is never mistaken for a missing key. Use
//! [`ConcurrentMap::load_or_default`] when the `(value, found)` form is more convenient.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod map;
pub mod metrics;

pub use crate::map::{ConcurrentMap, DefaultHashBuilder};
pub use crate::metrics::{MetricsCollector, PerformanceMetrics};

/// Common utilities and helper types
pub mod util {
    /// Cache line size for alignment purposes
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Pad a value to cache line size so neighbouring fields do not share a line
    #[repr(align(64))]
    pub struct CachePadded<T> {
        value: T,
    }

    impl<T> CachePadded<T> {
        /// Create a new cache-padded value
        #[inline]
        pub const fn new(value: T) -> Self {
            Self { value }
        }

        /// Get a reference to the inner value
        #[inline]
        pub const fn get(&self) -> &T {
            &self.value
        }

        /// Get the inner value
        #[inline]
        pub fn into_inner(self) -> T {
            self.value
        }
    }

    impl<T: core::fmt::Debug> core::fmt::Debug for CachePadded<T> {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            core::fmt::Debug::fmt(&self.value, f)
        }
    }
}

/// Error types for syncmap operations
///
/// Map operations themselves are total; only the checked constructors can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested capacity could not be allocated
    CapacityOverflow {
        /// Number of entries that was requested
        requested: usize,
    },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::CapacityOverflow { requested } => {
                write!(f, "Cannot allocate capacity for {} entries", requested)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for syncmap operations
pub type Result<T> = core::result::Result<T, Error>;
