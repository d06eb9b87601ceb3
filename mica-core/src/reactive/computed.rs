//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its function and caches the result
//!    together with the version of every cell it read.
//!
//! 2. When accessed again while clean, it returns the cached value.
//!
//! 3. When a dependency changes, the propagation walk marks the computed
//!    maybe-stale. Nothing recomputes yet.
//!
//! 4. On the next access, the computed compares each recorded dependency
//!    version against the current one — an O(dependencies) check, never a
//!    deep recompute. Unchanged versions revalidate the cache; a changed
//!    one triggers recomputation.
//!
//! 5. Recomputation collects a fresh dependency set. Cells that were not
//!    read this time are unsubscribed, so a conditional branch that went
//!    the other way stops triggering this computed.
//!
//! # Failure
//!
//! A panic inside the computation propagates to the caller of `get()`. The
//! cache keeps its last valid value and its previous subscriptions
//! (stale-on-error); the state is forced to dirty so the next read retries.
//!
//! # Circular dependencies
//!
//! A computed whose evaluation reads itself (directly or through a cycle)
//! does not recurse: the inner read returns the cached value with a warning
//! if one exists, and fails fast otherwise.

use std::fmt::Debug;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::context::{self, TrackingScope};
use super::error::ReactiveError;
use super::node::{
    retarget_subscriptions, Observer, ObserverId, SourceId, SourceNode, TrackedSource,
};
use super::runtime;

/// Cache state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. The version check decides.
    MaybeDirty,

    /// The computed definitely needs to recompute (never evaluated, or the
    /// last evaluation failed).
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is what allows the computed to skip a version bump
/// when a recomputation produces the same value, cutting invalidation off
/// before it reaches dependents' version checks.
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// Identity as an observable cell.
    id: SourceId,

    /// Identity as a dependency-tracking observer.
    observer_id: ObserverId,

    /// The computation function.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,

    /// Own version as a source. Bumped only when a recomputation produced a
    /// different value.
    version: AtomicU64,

    /// Current cache state.
    state: RwLock<ComputedState>,

    /// Guards against re-entering the freshness check through a dependency
    /// cycle in the refresh chain.
    refreshing: AtomicBool,

    /// Sources read during the last evaluation, with the versions seen.
    /// Recollected from scratch every evaluation.
    deps: RwLock<Vec<TrackedSource>>,

    /// Ids of the observers that depend on this computed.
    observers: RwLock<IndexSet<ObserverId>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new computed with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(ComputedInner {
            id: SourceId::new(),
            observer_id: ObserverId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            version: AtomicU64::new(0),
            state: RwLock::new(ComputedState::Dirty),
            refreshing: AtomicBool::new(false),
            deps: RwLock::new(Vec::new()),
            observers: RwLock::new(IndexSet::new()),
        });

        runtime::register(inner.clone() as Arc<dyn Observer>);

        Self { inner }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value, recomputing if a dependency changed.
    ///
    /// Registers the read with the current evaluator when tracking is
    /// active, so computeds compose into chains and diamonds.
    pub fn get(&self) -> T {
        // Re-entrant read: return the cache without recursing.
        if context::on_stack(self.inner.observer_id) {
            let err = ReactiveError::CircularDependency {
                observer: self.inner.observer_id,
            };
            if let Some(value) = self.inner.value.read().clone() {
                tracing::warn!(%err, "returning cached value");
                return value;
            }
            panic!("{err}");
        }

        self.inner.ensure_fresh();

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

        self.inner
            .value
            .read()
            .clone()
            .expect("fresh computed holds a value")
    }

    /// Get the current cache state.
    pub fn state(&self) -> ComputedState {
        *self.inner.state.read()
    }

    /// Check if the computed has ever produced a value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Get the number of observers currently subscribed.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Make the cache valid, recomputing only when the version check says a
    /// dependency actually changed.
    fn ensure_fresh(&self) {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            // Already freshening somewhere up the call chain (dependency
            // cycle); treat the cache as current rather than recursing.
            return;
        }
        struct RefreshGuard<'a>(&'a AtomicBool);
        impl Drop for RefreshGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _guard = RefreshGuard(&self.refreshing);

        let state = *self.state.read();
        match state {
            ComputedState::Clean => {}
            ComputedState::MaybeDirty => {
                if self.deps_changed() {
                    self.recompute();
                } else {
                    tracing::trace!(computed = ?self.id, "revalidated without recompute");
                    *self.state.write() = ComputedState::Clean;
                }
            }
            ComputedState::Dirty => self.recompute(),
        }
    }

    /// Compare every tracked dependency's current version against the one
    /// recorded when the cache was built. Each dependency is refreshed
    /// first, so a stale upstream computed cannot hide a change behind an
    /// unbumped version. A dead dependency counts as changed.
    fn deps_changed(&self) -> bool {
        let deps: Vec<TrackedSource> = self.deps.read().clone();
        for dep in deps {
            match dep.node.upgrade() {
                Some(source) => {
                    source.refresh();
                    if source.version() != dep.seen_version {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }

    /// Run the computation inside a fresh tracking frame and swap in the
    /// newly collected dependency set.
    fn recompute(&self) {
        let scope = TrackingScope::enter(self.observer_id);
        let result = catch_unwind(AssertUnwindSafe(|| (self.compute)()));
        let new_deps = scope.finish();

        match result {
            Ok(new_value) => {
                retarget_subscriptions(self.observer_id, &self.deps, new_deps);

                let changed = {
                    let mut guard = self.value.write();
                    let changed = guard.as_ref() != Some(&new_value);
                    *guard = Some(new_value);
                    changed
                };
                if changed {
                    let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
                    tracing::debug!(computed = ?self.id, version, "computed changed");
                }

                *self.state.write() = ComputedState::Clean;
            }
            Err(payload) => {
                // Stale-on-error: keep the previous value and subscriptions,
                // force a retry on the next read, and let the caller see the
                // failure.
                *self.state.write() = ComputedState::Dirty;
                tracing::debug!(computed = ?self.id, "computation panicked; cache kept");
                resume_unwind(payload);
            }
        }
    }
}

impl<T> SourceNode for ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn refresh(&self) {
        self.ensure_fresh();
    }

    fn add_observer(&self, observer: ObserverId) {
        self.observers.write().insert(observer);
    }

    fn remove_observer(&self, observer: ObserverId) {
        self.observers.write().shift_remove(&observer);
    }
}

impl<T> Observer for ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    fn mark_stale(&self) {
        let mut state = self.state.write();
        if *state == ComputedState::Clean {
            *state = ComputedState::MaybeDirty;
        }
    }

    fn downstream(&self) -> SmallVec<[ObserverId; 4]> {
        self.observers.read().iter().copied().collect()
    }

    fn notify(&self) {
        // Computeds are pull-based; the propagation walk never runs them.
    }

    fn is_eager(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool {
        true
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        // Last handle gone: leave no observer edges behind. Effects do the
        // same through dispose; computeds have no explicit disposal, so the
        // teardown lives here.
        for dep in self.deps.get_mut().drain(..) {
            if let Some(source) = dep.node.upgrade() {
                source.remove_observer(self.observer_id);
            }
        }
        runtime::unregister(self.observer_id);
        tracing::trace!(computed = ?self.id, "computed dropped");
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}
