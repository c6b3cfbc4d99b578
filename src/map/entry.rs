//! Entry cells
//!
//! Every key of a [`ConcurrentMap`](super::ConcurrentMap) owns one [`Entry`]: an
//! epoch-managed atomic pointer to the boxed value. The cell is shared between the
//! read snapshot and the staging map, so a key that is already published can be
//! updated with a single CAS and no lock.
//!
//! ## States
//!
//! | Pointer | Meaning |
//! |---------|---------|
//! | non-null | the entry holds a value |
//! | null, tag 0 | deleted; still linked in the snapshot and revivable without the lock |
//! | null, tag [`EXPUNGED`] | deleted and missing from the staging map; revived only under the lock |
//!
//! Unlinked values are never freed in place: they are handed to the epoch collector
//! so that readers pinned at the time of the unlink can keep using them.

use core::sync::atomic::Ordering;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};

/// Tag carried by the null pointer of an expunged entry
const EXPUNGED: usize = 1;

/// Heap cell holding a value.
///
/// The alignment guarantees at least two free low bits in every pointer to it, which
/// is where the expunged tag lives.
#[repr(align(4))]
struct Boxed<V>(V);

/// Outcome of [`Entry::try_load_or_store`]
pub(crate) enum LoadOrStore<'g, V> {
    /// The entry already held this value
    Loaded(&'g V),
    /// The offered value was installed
    Stored(&'g V),
    /// The entry is expunged; the offered value is handed back
    Expunged(V),
}

/// Atomic value cell for a single key
pub(crate) struct Entry<V> {
    value: Atomic<Boxed<V>>,
}

impl<V> Entry<V> {
    pub(crate) fn new(value: V) -> Self {
        Self {
            value: Atomic::new(Boxed(value)),
        }
    }

    /// Current value, if the entry is neither deleted nor expunged.
    pub(crate) fn load<'a>(&'a self, guard: &'a Guard) -> Option<&'a V> {
        let current = self.value.load(Ordering::Acquire, guard);
        // SAFETY: values are only destroyed through the collector, never while `guard` is pinned.
        unsafe { current.as_ref() }.map(|boxed| &boxed.0)
    }

    /// Installs `value` unless the entry is expunged.
    ///
    /// On success the previous value (if any) is returned; an expunged entry hands the
    /// value back so the caller can retry under the lock.
    pub(crate) fn try_swap<'a>(&'a self, value: V, guard: &'a Guard) -> Result<Option<&'a V>, V> {
        let mut new = Owned::new(Boxed(value));
        let mut current = self.value.load(Ordering::Acquire, guard);
        loop {
            if is_expunged(current) {
                return Err(new.into_box().0);
            }
            match self.value.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                // SAFETY: `current` was unlinked by the successful exchange.
                Ok(_) => return Ok(unsafe { retire(current, guard) }),
                Err(err) => {
                    current = err.current;
                    new = err.new;
                }
            }
        }
    }

    /// Unconditionally installs `value`. Caller must hold the map lock and the entry
    /// must not be expunged.
    pub(crate) fn swap_locked<'a>(&'a self, value: V, guard: &'a Guard) -> Option<&'a V> {
        let previous = self
            .value
            .swap(Owned::new(Boxed(value)), Ordering::AcqRel, guard);
        debug_assert!(!is_expunged(previous));
        // SAFETY: the swap unlinked `previous`.
        unsafe { retire(previous, guard) }
    }

    /// Returns the current value, or installs `value` if the entry is deleted.
    pub(crate) fn try_load_or_store<'a>(&'a self, value: V, guard: &'a Guard) -> LoadOrStore<'a, V> {
        let mut current = self.value.load(Ordering::Acquire, guard);
        if is_expunged(current) {
            return LoadOrStore::Expunged(value);
        }
        // SAFETY: see `load`.
        if let Some(boxed) = unsafe { current.as_ref() } {
            return LoadOrStore::Loaded(&boxed.0);
        }

        let mut new = Owned::new(Boxed(value));
        loop {
            match self.value.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                // SAFETY: the freshly installed box is only retired through the collector.
                Ok(stored) => return LoadOrStore::Stored(unsafe { &stored.deref().0 }),
                Err(err) => {
                    current = err.current;
                    new = err.new;
                }
            }
            if is_expunged(current) {
                return LoadOrStore::Expunged(new.into_box().0);
            }
            // SAFETY: see `load`.
            if let Some(boxed) = unsafe { current.as_ref() } {
                return LoadOrStore::Loaded(&boxed.0);
            }
        }
    }

    /// Marks the entry deleted and returns the value it held.
    pub(crate) fn delete<'a>(&'a self, guard: &'a Guard) -> Option<&'a V> {
        let mut current = self.value.load(Ordering::Acquire, guard);
        loop {
            if current.is_null() {
                return None;
            }
            match self.value.compare_exchange(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                // SAFETY: the exchange unlinked `current`.
                Ok(_) => return unsafe { retire(current, guard) },
                Err(err) => current = err.current,
            }
        }
    }

    /// Transitions an expunged entry back to deleted. Caller must hold the map lock.
    ///
    /// Returns `true` if the entry was expunged, in which case the caller has to link
    /// it into the staging map again.
    pub(crate) fn unexpunge_locked(&self, guard: &Guard) -> bool {
        self.value
            .compare_exchange(
                Shared::null().with_tag(EXPUNGED),
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            )
            .is_ok()
    }

    /// Transitions a deleted entry to expunged. Caller must hold the map lock.
    ///
    /// Returns `true` if the entry ends up expunged, meaning it must be left out of
    /// the staging map being rebuilt.
    pub(crate) fn try_expunge_locked(&self, guard: &Guard) -> bool {
        let mut current = self.value.load(Ordering::Acquire, guard);
        loop {
            if !current.is_null() {
                return false;
            }
            if is_expunged(current) {
                return true;
            }
            match self.value.compare_exchange(
                current,
                Shared::null().with_tag(EXPUNGED),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(err) => current = err.current,
            }
        }
    }
}

impl<V: PartialEq> Entry<V> {
    /// Replaces the value with `new` only while it equals `old`.
    pub(crate) fn try_compare_and_swap(&self, old: &V, new: V, guard: &Guard) -> bool {
        let mut current = self.value.load(Ordering::Acquire, guard);
        // SAFETY: see `load`.
        if !matches!(unsafe { current.as_ref() }, Some(boxed) if boxed.0 == *old) {
            return false;
        }

        let mut new = Owned::new(Boxed(new));
        loop {
            match self.value.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: the exchange unlinked `current`.
                    unsafe { retire(current, guard) };
                    return true;
                }
                Err(err) => {
                    current = err.current;
                    new = err.new;
                }
            }
            // SAFETY: see `load`.
            if !matches!(unsafe { current.as_ref() }, Some(boxed) if boxed.0 == *old) {
                return false;
            }
        }
    }

    /// Deletes the value only while it equals `old`.
    pub(crate) fn try_compare_and_delete(&self, old: &V, guard: &Guard) -> bool {
        let mut current = self.value.load(Ordering::Acquire, guard);
        loop {
            // SAFETY: see `load`.
            if !matches!(unsafe { current.as_ref() }, Some(boxed) if boxed.0 == *old) {
                return false;
            }
            match self.value.compare_exchange(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: the exchange unlinked `current`.
                    unsafe { retire(current, guard) };
                    return true;
                }
                Err(err) => current = err.current,
            }
        }
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        // SAFETY: the last handle is gone, nobody else can reach the cell.
        unsafe {
            let current = self.value.load(Ordering::Relaxed, epoch::unprotected());
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

impl<V> core::fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let guard = &epoch::pin();
        let current = self.value.load(Ordering::Acquire, guard);
        let state = if is_expunged(current) {
            "expunged"
        } else if current.is_null() {
            "deleted"
        } else {
            "present"
        };
        f.debug_struct("Entry").field("state", &state).finish()
    }
}

#[inline]
fn is_expunged<V>(ptr: Shared<'_, Boxed<V>>) -> bool {
    ptr.is_null() && ptr.tag() == EXPUNGED
}

/// Hands an unlinked value to the collector and returns a reference that stays valid
/// for as long as `guard` is pinned.
///
/// # Safety
///
/// `ptr` must have just been unlinked from its entry by the calling thread.
unsafe fn retire<'g, V>(ptr: Shared<'g, Boxed<V>>, guard: &'g Guard) -> Option<&'g V> {
    let value = ptr.as_ref().map(|boxed| &boxed.0);
    if !ptr.is_null() {
        guard.defer_destroy(ptr);
    }
    value
}
