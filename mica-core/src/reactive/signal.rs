//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value, a
//! monotonically increasing version counter, and the set of observers that
//! depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking frame (a computed or effect
//!    evaluation), the read is recorded so the evaluator can subscribe.
//!
//! 2. When a signal's value changes, its version is bumped and all
//!    observers are notified through the runtime's propagation walk.
//!
//! 3. The version counter is what makes staleness checks cheap: a computed
//!    compares recorded versions instead of recomputing.
//!
//! # Equality policy
//!
//! `set` compares the new value against the current one with `PartialEq`.
//! Writing an equal value is a complete no-op: no version bump, no
//! notification. This is structural equality, applied uniformly to scalars
//! and containers alike; it is part of the documented contract and is
//! covered by tests.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;

use super::context;
use super::node::{ObserverId, SourceId, SourceNode, TrackedSource};
use super::runtime;

/// A reactive signal holding a value of type T.
///
/// Cloning a `Signal` is cheap and clones share state: all handles read and
/// write the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies observers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    /// Unique identifier for this signal.
    id: SourceId,

    /// The current value.
    value: RwLock<T>,

    /// Monotonic write counter. Bumped only on an observable change.
    version: AtomicU64,

    /// Ids of the observers that depend on this signal, in discovery order.
    /// Non-owning: dropping an observer never requires touching this set.
    observers: RwLock<IndexSet<ObserverId>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SourceId::new(),
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                observers: RwLock::new(IndexSet::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a computed or effect evaluation, the read is
    /// recorded so the evaluator subscribes to this signal.
    pub fn get(&self) -> T {
        if context::is_tracking() {
            // Downgrade first, unsize after: annotating the call itself would
            // pin its type parameter to the trait object.
            let weak = Arc::downgrade(&self.inner);
            let node: Weak<dyn SourceNode> = weak;
            context::track(TrackedSource {
                id: self.inner.id,
                node,
                seen_version: self.inner.version.load(Ordering::Acquire),
            });
        }

        self.inner.value.read().clone()
    }

    /// Get the current value without recording a dependency.
    ///
    /// Use this inside an effect or computed when the value is needed but a
    /// rerun on change is not wanted.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify observers.
    ///
    /// Writing a value equal to the current one is a no-op. Otherwise the
    /// version is bumped and, unless a batch is active, every affected
    /// observer finishes evaluating before this call returns.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                tracing::trace!(signal = ?self.inner.id, "write of equal value skipped");
                return;
            }
            *guard = value;
        }

        let version = self.inner.version.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(signal = ?self.inner.id, version, "signal changed");

        self.notify_observers();
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Current version of the cell. Part of the testable no-op contract:
    /// an equal-value write leaves this unchanged.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Get the number of observers currently subscribed.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Notify all observers that the value has changed, pruning any that
    /// turn out to be dead or disposed.
    fn notify_observers(&self) {
        let snapshot: Vec<ObserverId> =
            self.inner.observers.read().iter().copied().collect();
        if snapshot.is_empty() {
            return;
        }

        let dead = runtime::propagate(snapshot);
        if !dead.is_empty() {
            self.inner
                .observers
                .write()
                .retain(|id| !dead.contains(id));
        }
    }
}

impl<T> SourceNode for SignalInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn add_observer(&self, observer: ObserverId) {
        self.observers.write().insert(observer);
    }

    fn remove_observer(&self, observer: ObserverId) {
        self.observers.write().shift_remove(&observer);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}
