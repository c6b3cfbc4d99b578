//! Concurrent Map Implementation
//!
//! This module implements a typed concurrent map whose reads never take a lock. The
//! design splits the map into two layers that share per-key [`Entry`] cells:
//!
//! - a **read snapshot**: an immutable hash map published through an epoch-managed
//!   atomic pointer. Lookups, traversals and updates of keys it already contains go
//!   through it without locking.
//! - a **staging map**: a mutex-guarded hash map that receives new keys. When present
//!   it is a superset of the live snapshot entries.
//!
//! Lookups that miss the snapshot fall back to the staging map under the lock and count
//! a miss. Once the misses add up to the size of the staging map, it is promoted to be
//! the new snapshot, so the cost of copying is amortized over the lookups that paid for
//! the miss.
//!
//! ## Memory Ordering
//!
//! - Snapshot pointer and entry cells are loaded with `Acquire`
//! - Entry updates are `AcqRel` compare-exchange loops
//! - Replaced snapshots and values are reclaimed by `crossbeam-epoch`
//!
//! ## Performance Characteristics
//!
//! - **Load**: O(1), lock-free once the key is in the snapshot
//! - **Store / Swap / CAS on a published key**: O(1), lock-free
//! - **Store of a new key**: O(1) under the staging lock, O(n) when the staging map is rebuilt
//! - **Range**: O(n), lock-free unless the staging map has to be promoted first
//!
//! ## Example
//!
//! ```rust
//! use syncmap::ConcurrentMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ConcurrentMap::new());
//!
//! let writer = thread::spawn({
//!     let map = Arc::clone(&map);
//!     move || {
//!         for i in 0..1000u64 {
//!             map.store(i, i * 2);
//!         }
//!     }
//! });
//! writer.join().unwrap();
//!
//! let mut sum = 0;
//! map.range(|_, value| {
//!     sum += *value;
//!     true
//! });
//! assert_eq!(sum, 999_000);
//! ```

use super::entry::{Entry, LoadOrStore};
use crate::metrics::{AtomicMetrics, MetricsCollector, PerformanceMetrics};
use crate::util::CachePadded;
use crate::{Error, Result};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use log::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hasher used when none is specified
pub type DefaultHashBuilder = fxhash::FxBuildHasher;

type Entries<K, V, S> = HashMap<K, Arc<Entry<V>>, S>;

/// A concurrent map with lock-free reads and atomic compare-based updates
///
/// All operations take `&self`; share the map between threads with an [`Arc`].
/// Absence is always reported through `Option`/`bool`, never through a sentinel
/// value, so a stored `V::default()` is distinguishable from a missing key.
///
/// # Type Parameters
///
/// * `K` - The key type, must implement `Hash + Eq + Clone`
/// * `V` - The value type, must implement `Clone`; compare-based operations also need `PartialEq`
/// * `S` - The hasher, defaults to [`DefaultHashBuilder`]
///
/// # Consistency
///
/// Operations on a single key are linearizable. Nothing is promised about the relative
/// order in which a third thread observes writes to different keys, and
/// [`range`](Self::range) is only weakly consistent.
///
/// # Examples
///
/// ```rust
/// use syncmap::ConcurrentMap;
///
/// let map: ConcurrentMap<&str, u32> = ConcurrentMap::new();
/// map.store("a", 1);
/// assert_eq!(map.load("a"), Some(1));
/// assert!(map.compare_and_swap("a", &1, 2));
/// assert_eq!(map.load_and_delete("a"), Some(2));
/// assert_eq!(map.load("a"), None);
/// ```
pub struct ConcurrentMap<K, V, S = DefaultHashBuilder> {
    // Published snapshot, never null
    read: CachePadded<Atomic<ReadOnly<K, V, S>>>,

    // Staging map for keys not yet in the snapshot
    dirty: Mutex<Dirty<K, V, S>>,

    hash_builder: S,

    metrics: AtomicMetrics,
    metrics_enabled: AtomicBool,
}

/// Immutable view of the map published to readers
struct ReadOnly<K, V, S> {
    entries: Arc<Entries<K, V, S>>,

    // The staging map holds keys that `entries` lacks
    amended: bool,
}

/// Lock-protected staging state
struct Dirty<K, V, S> {
    entries: Option<Entries<K, V, S>>,

    // Snapshot misses since the last promotion
    misses: usize,
}

/// Entry found by a lookup: borrowed from the snapshot or cloned out of the staging map
enum Found<'g, V> {
    Read(&'g Entry<V>),
    Dirty(Arc<Entry<V>>),
}

impl<V> core::ops::Deref for Found<'_, V> {
    type Target = Entry<V>;

    fn deref(&self) -> &Entry<V> {
        match self {
            Found::Read(entry) => entry,
            Found::Dirty(entry) => entry,
        }
    }
}

impl<K, V> ConcurrentMap<K, V, DefaultHashBuilder> {
    /// Create an empty map
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<u64, String> = ConcurrentMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Create an empty map able to take `capacity` new keys before its staging map
    /// reallocates
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S: Clone> ConcurrentMap<K, V, S> {
    /// Create an empty map using `hash_builder` to hash keys
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::from_parts(HashMap::with_hasher(hash_builder.clone()), hash_builder)
    }

    /// Create an empty map with a pre-sized staging map and a custom hasher
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::from_parts(
            HashMap::with_capacity_and_hasher(capacity, hash_builder.clone()),
            hash_builder,
        )
    }

    fn from_parts(staging: Entries<K, V, S>, hash_builder: S) -> Self {
        let snapshot = ReadOnly {
            entries: Arc::new(HashMap::with_hasher(hash_builder.clone())),
            amended: false,
        };
        Self {
            read: CachePadded::new(Atomic::new(snapshot)),
            dirty: Mutex::new(Dirty {
                entries: Some(staging),
                misses: 0,
            }),
            hash_builder,
            metrics: AtomicMetrics::default(),
            metrics_enabled: AtomicBool::new(false),
        }
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Fallible counterpart of [`with_capacity_and_hasher`](Self::with_capacity_and_hasher)
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the staging map cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::{ConcurrentMap, DefaultHashBuilder, Error};
    ///
    /// let map = ConcurrentMap::<u8, u8>::try_with_capacity_and_hasher(16, DefaultHashBuilder::default());
    /// assert!(map.is_ok());
    ///
    /// let map = ConcurrentMap::<u8, u8>::try_with_capacity_and_hasher(usize::MAX, DefaultHashBuilder::default());
    /// assert_eq!(map.err(), Some(Error::CapacityOverflow { requested: usize::MAX }));
    /// ```
    pub fn try_with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Result<Self> {
        let mut staging = HashMap::with_hasher(hash_builder.clone());
        staging
            .try_reserve(capacity)
            .map_err(|_| Error::CapacityOverflow {
                requested: capacity,
            })?;
        Ok(Self::from_parts(staging, hash_builder))
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    S: BuildHasher + Clone + Send + 'static,
{
    /// Get the value stored for a key
    ///
    /// Returns `None` if the key is absent. Lock-free once the key has been promoted
    /// into the read snapshot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// map.store(1, "one");
    /// assert_eq!(map.load(&1), Some("one"));
    /// assert_eq!(map.load(&2), None);
    /// ```
    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &epoch::pin();
        let entry = self.find(key, guard)?;
        entry.load(guard).cloned()
    }

    /// Get the value stored for a key, or the zero value of `V`
    ///
    /// The boolean reports whether the key was present; it is the only reliable
    /// presence signal since a stored `V::default()` looks the same.
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// map.store("zero", 0u32);
    /// assert_eq!(map.load_or_default("zero"), (0, true));
    /// assert_eq!(map.load_or_default("missing"), (0, false));
    /// ```
    pub fn load_or_default<Q>(&self, key: &Q) -> (V, bool)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Default,
    {
        match self.load(key) {
            Some(value) => (value, true),
            None => (V::default(), false),
        }
    }

    /// Check whether a key is present
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &epoch::pin();
        self.find(key, guard)
            .map_or(false, |entry| entry.load(guard).is_some())
    }

    /// Associate `value` with `key`, replacing any previous value
    pub fn store(&self, key: K, value: V) {
        self.swap(key, value);
    }

    /// Associate `value` with `key` and return the value it replaces
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// assert_eq!(map.swap("k", 1), None);
    /// assert_eq!(map.swap("k", 2), Some(1));
    /// ```
    pub fn swap(&self, key: K, value: V) -> Option<V> {
        let guard = &epoch::pin();

        let read = self.load_read_only(guard);
        let value = match read.entries.get(&key) {
            Some(entry) => match entry.try_swap(value, guard) {
                Ok(previous) => {
                    self.record_fast_path();
                    return previous.cloned();
                }
                Err(value) => value,
            },
            None => value,
        };

        self.record_locked();
        let mut dirty = self.dirty.lock();
        let read = self.load_read_only(guard);
        if let Some(entry) = read.entries.get(&key) {
            if entry.unexpunge_locked(guard) {
                self.staging(&mut dirty)
                    .insert(key, Arc::clone(entry));
            }
            entry.swap_locked(value, guard).cloned()
        } else if let Some(entry) = dirty.entries.as_ref().and_then(|entries| entries.get(&key)) {
            entry.swap_locked(value, guard).cloned()
        } else {
            self.insert_new_locked(&mut dirty, read, key, value, guard);
            None
        }
    }

    /// Remove a key
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.load_and_delete(key);
    }

    /// Remove a key and return the value it held
    ///
    /// The read and the removal are a single atomic step: no other operation can
    /// observe or modify the entry in between.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// map.store(7, 'x');
    /// assert_eq!(map.load_and_delete(&7), Some('x'));
    /// assert_eq!(map.load_and_delete(&7), None);
    /// ```
    pub fn load_and_delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &epoch::pin();

        let read = self.load_read_only(guard);
        let entry = match read.entries.get(key) {
            Some(entry) => {
                self.record_fast_path();
                Found::Read(entry)
            }
            None if !read.amended => {
                self.record_fast_path();
                return None;
            }
            None => {
                self.record_locked();
                let mut dirty = self.dirty.lock();
                let read = self.load_read_only(guard);
                match read.entries.get(key) {
                    Some(entry) => Found::Read(entry),
                    None if !read.amended => return None,
                    None => {
                        let removed = dirty
                            .entries
                            .as_mut()
                            .and_then(|entries| entries.remove(key));
                        self.miss_locked(&mut dirty, guard);
                        Found::Dirty(removed?)
                    }
                }
            }
        };

        entry.delete(guard).cloned()
    }

    /// Return the existing value for `key`, or store `value` if the key is absent
    ///
    /// The boolean is `true` if the value was loaded and `false` if it was stored. Of
    /// several threads racing to store the same absent key exactly one stores, and all
    /// of them return the winner's value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// assert_eq!(map.load_or_store("k", 1), (1, false));
    /// assert_eq!(map.load_or_store("k", 2), (1, true));
    /// ```
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool) {
        let guard = &epoch::pin();

        let read = self.load_read_only(guard);
        let value = match read.entries.get(&key) {
            Some(entry) => match entry.try_load_or_store(value, guard) {
                LoadOrStore::Loaded(actual) => {
                    self.record_fast_path();
                    return (actual.clone(), true);
                }
                LoadOrStore::Stored(actual) => {
                    self.record_fast_path();
                    return (actual.clone(), false);
                }
                LoadOrStore::Expunged(value) => value,
            },
            None => value,
        };

        self.record_locked();
        let mut dirty = self.dirty.lock();
        let read = self.load_read_only(guard);
        if let Some(entry) = read.entries.get(&key) {
            if entry.unexpunge_locked(guard) {
                self.staging(&mut dirty)
                    .insert(key, Arc::clone(entry));
            }
            resolve_locked(entry.try_load_or_store(value, guard))
        } else if let Some(entry) = dirty
            .entries
            .as_ref()
            .and_then(|entries| entries.get(&key))
            .cloned()
        {
            let outcome = resolve_locked(entry.try_load_or_store(value, guard));
            self.miss_locked(&mut dirty, guard);
            outcome
        } else {
            let actual = value.clone();
            self.insert_new_locked(&mut dirty, read, key, value, guard);
            (actual, false)
        }
    }

    /// Replace the value for `key` with `new` if it currently equals `old`
    ///
    /// Returns whether the swap happened. An absent key never matches and is not
    /// created.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// assert!(!map.compare_and_swap("k", &1, 2));
    /// map.store("k", 1);
    /// assert!(map.compare_and_swap("k", &1, 2));
    /// assert!(!map.compare_and_swap("k", &1, 3));
    /// assert_eq!(map.load("k"), Some(2));
    /// ```
    pub fn compare_and_swap<Q>(&self, key: &Q, old: &V, new: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &epoch::pin();
        let swapped = match self.find(key, guard) {
            Some(entry) => entry.try_compare_and_swap(old, new, guard),
            None => false,
        };
        self.record_outcome(swapped);
        swapped
    }

    /// Remove `key` if its value currently equals `old`
    ///
    /// Returns whether the entry was removed. An absent key never matches.
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &epoch::pin();
        let deleted = match self.find(key, guard) {
            Some(entry) => entry.try_compare_and_delete(old, guard),
            None => false,
        };
        self.record_outcome(deleted);
        deleted
    }

    /// Call `visit` for each entry until it returns `false`
    ///
    /// Entries are visited in no particular order. The traversal does not correspond to
    /// any single point in time: entries stored or deleted while it runs may or may not
    /// be visited. Entries that are not modified concurrently are visited exactly once,
    /// and a visited value is always one that was stored in full.
    ///
    /// No lock is held while `visit` runs, so it may call back into the map. Doing so
    /// still falls under the rule above: what it writes may or may not be seen by the
    /// remainder of the traversal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syncmap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// for i in 0..10 {
    ///     map.store(i, i);
    /// }
    ///
    /// let mut visited = 0;
    /// map.range(|_, _| {
    ///     visited += 1;
    ///     visited < 3
    /// });
    /// assert_eq!(visited, 3);
    /// ```
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let guard = &epoch::pin();

        let mut read = self.load_read_only(guard);
        if read.amended {
            // Promote eagerly; the traversal has to copy every key anyway
            self.record_locked();
            let mut dirty = self.dirty.lock();
            read = self.load_read_only(guard);
            if read.amended {
                read = self.promote_locked(&mut dirty, guard);
            }
        } else {
            self.record_fast_path();
        }

        for (key, entry) in read.entries.iter() {
            if let Some(value) = entry.load(guard) {
                if !visit(key, value) {
                    break;
                }
            }
        }
    }

    /// Remove every entry
    ///
    /// Writes racing with `clear` on keys that were already present may land either
    /// before or after it.
    pub fn clear(&self) {
        let guard = &epoch::pin();

        let read = self.load_read_only(guard);
        if read.entries.is_empty() && !read.amended {
            self.record_fast_path();
            return;
        }

        self.record_locked();
        let mut dirty = self.dirty.lock();
        let read = self.load_read_only(guard);
        if !read.entries.is_empty() || read.amended {
            self.publish_locked(
                ReadOnly {
                    entries: Arc::new(HashMap::with_hasher(self.hash_builder.clone())),
                    amended: false,
                },
                guard,
            );
        }
        dirty.entries = None;
        dirty.misses = 0;
        trace!("cleared map");
    }

    /// Count the entries
    ///
    /// This walks the map like [`range`](Self::range) and is just as weakly consistent;
    /// under concurrent modification the result is an estimate.
    pub fn len(&self) -> usize {
        let mut len = 0;
        self.range(|_, _| {
            len += 1;
            true
        });
        len
    }

    /// Check whether the map holds no entries
    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.range(|_, _| {
            empty = false;
            false
        });
        empty
    }

    // Private helper methods

    fn load_read_only<'g>(&self, guard: &'g Guard) -> &'g ReadOnly<K, V, S> {
        let read = self.read.get().load(Ordering::Acquire, guard);
        // SAFETY: the snapshot pointer is never null, and replaced snapshots are only
        // destroyed after every guard pinned at the time of replacement is dropped.
        unsafe { read.deref() }
    }

    /// Look up the entry for `key`, consulting the staging map on a snapshot miss.
    fn find<'g, Q>(&self, key: &Q, guard: &'g Guard) -> Option<Found<'g, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.load_read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            self.record_fast_path();
            return Some(Found::Read(entry));
        }
        if !read.amended {
            self.record_fast_path();
            return None;
        }

        self.record_locked();
        let mut dirty = self.dirty.lock();
        let read = self.load_read_only(guard);
        if let Some(entry) = read.entries.get(key) {
            return Some(Found::Read(entry));
        }
        if !read.amended {
            return None;
        }
        let entry = dirty
            .entries
            .as_ref()
            .and_then(|entries| entries.get(key))
            .cloned();
        self.miss_locked(&mut dirty, guard);
        entry.map(Found::Dirty)
    }

    /// Insert a key that is in neither map.
    fn insert_new_locked(
        &self,
        dirty: &mut Dirty<K, V, S>,
        read: &ReadOnly<K, V, S>,
        key: K,
        value: V,
        guard: &Guard,
    ) {
        if !read.amended {
            // First new key since the last promotion
            self.rebuild_staging_locked(dirty, guard);
            self.publish_locked(
                ReadOnly {
                    entries: Arc::clone(&read.entries),
                    amended: true,
                },
                guard,
            );
        }
        self.staging(dirty).insert(key, Arc::new(Entry::new(value)));
    }

    fn staging<'d>(&self, dirty: &'d mut Dirty<K, V, S>) -> &'d mut Entries<K, V, S> {
        dirty
            .entries
            .get_or_insert_with(|| HashMap::with_hasher(self.hash_builder.clone()))
    }

    /// Rebuild the staging map from the snapshot, expunging deleted entries.
    fn rebuild_staging_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &Guard) {
        if dirty.entries.is_some() {
            return;
        }

        let read = self.load_read_only(guard);
        let mut entries =
            HashMap::with_capacity_and_hasher(read.entries.len(), self.hash_builder.clone());
        for (key, entry) in read.entries.iter() {
            if !entry.try_expunge_locked(guard) {
                entries.insert(key.clone(), Arc::clone(entry));
            }
        }
        trace!(
            "rebuilt staging map with {} of {} snapshot entries",
            entries.len(),
            read.entries.len()
        );
        dirty.entries = Some(entries);

        if self.is_metrics_enabled() {
            self.metrics.record_staging_rebuild();
        }
    }

    fn miss_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &Guard) {
        dirty.misses += 1;
        if self.is_metrics_enabled() {
            self.metrics.record_miss();
        }
        let staged = dirty.entries.as_ref().map_or(0, HashMap::len);
        if dirty.misses < staged {
            return;
        }
        self.promote_locked(dirty, guard);
    }

    /// Replace the snapshot with the staging map.
    fn promote_locked<'g>(&self, dirty: &mut Dirty<K, V, S>, guard: &'g Guard) -> &'g ReadOnly<K, V, S> {
        let promoted = dirty
            .entries
            .take()
            .unwrap_or_else(|| HashMap::with_hasher(self.hash_builder.clone()));
        trace!(
            "promoted {} staged entries after {} misses",
            promoted.len(),
            dirty.misses
        );
        dirty.misses = 0;

        if self.is_metrics_enabled() {
            self.metrics.record_promotion();
        }

        self.publish_locked(
            ReadOnly {
                entries: Arc::new(promoted),
                amended: false,
            },
            guard,
        )
    }

    /// Swap in a new snapshot and retire the old one.
    fn publish_locked<'g>(&self, snapshot: ReadOnly<K, V, S>, guard: &'g Guard) -> &'g ReadOnly<K, V, S> {
        let new = Owned::new(snapshot).into_shared(guard);
        let old = self.read.get().swap(new, Ordering::AcqRel, guard);
        // SAFETY: `old` is unlinked and readers that still hold it are pinned; `new` is
        // reachable from the map for at least as long as `guard`.
        unsafe {
            guard.defer_destroy(old);
            new.deref()
        }
    }

    #[inline]
    fn record_fast_path(&self) {
        if self.is_metrics_enabled() {
            self.metrics.record_fast_path();
        }
    }

    #[inline]
    fn record_locked(&self) {
        if self.is_metrics_enabled() {
            self.metrics.record_locked();
        }
    }

    #[inline]
    fn record_outcome(&self, succeeded: bool) {
        if self.is_metrics_enabled() {
            self.metrics.record_outcome(succeeded);
        }
    }
}

/// Under the lock an entry can no longer be expunged behind our back.
fn resolve_locked<V: Clone>(outcome: LoadOrStore<'_, V>) -> (V, bool) {
    match outcome {
        LoadOrStore::Loaded(actual) => (actual.clone(), true),
        LoadOrStore::Stored(actual) => (actual.clone(), false),
        LoadOrStore::Expunged(_) => unreachable!("entry expunged while holding the staging lock"),
    }
}

impl<K, V, S> MetricsCollector for ConcurrentMap<K, V, S> {
    fn metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn set_metrics_enabled(&self, enabled: bool) {
        self.metrics_enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_metrics_enabled(&self) -> bool {
        self.metrics_enabled.load(Ordering::Relaxed)
    }
}

impl<K, V, S> Default for ConcurrentMap<K, V, S>
where
    S: Default + Clone,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Clone for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    S: BuildHasher + Clone + Send + 'static,
{
    /// Copy a weakly consistent snapshot of the entries into an independent map
    fn clone(&self) -> Self {
        let map = Self::with_hasher(self.hash_builder.clone());
        self.range(|key, value| {
            map.store(key.clone(), value.clone());
            true
        });
        map
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + fmt::Debug + 'static,
    V: Clone + Send + fmt::Debug + 'static,
    S: BuildHasher + Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.range(|key, value| {
            map.entry(key, value);
            true
        });
        map.finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    S: BuildHasher + Clone + Default + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    S: BuildHasher + Clone + Send + 'static,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.store(key, value);
        }
    }
}

impl<K, V, S> Drop for ConcurrentMap<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent readers of the current snapshot.
        unsafe {
            let read = self.read.get().load(Ordering::Relaxed, epoch::unprotected());
            if !read.is_null() {
                drop(read.into_owned());
            }
        }
    }
}
