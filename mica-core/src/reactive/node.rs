//! Node identity and the observer/observable seam.
//!
//! Every reactive cell plays up to two roles: it can be observed (signals
//! and computeds are sources) and it can observe (computeds and effects are
//! observers). Rather than open-ended inheritance, the roles are a small
//! closed set behind two traits, and the edges between nodes are plain ids:
//! a source stores the `ObserverId`s of its dependents, never a strong
//! reference, so a cell can never keep its observers alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use parking_lot::RwLock;
use smallvec::SmallVec;

/// Unique identifier for an observable cell (signal or computed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an observing computation (computed or effect).
///
/// Each observer gets a unique ID when created. The ID is what sources
/// store in their observer sets and what the runtime registry is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// An observable cell: something whose reads can be tracked and whose
/// changes can be detected by a version comparison.
pub trait SourceNode: Send + Sync {
    /// Current version of the cell. Bumped on every observable change.
    fn version(&self) -> u64;

    /// Bring the cell up to date before a version comparison. Signals are
    /// always current; computeds revalidate or recompute so their version
    /// reflects the latest upstream state.
    fn refresh(&self) {}

    /// Add an observer edge. Re-subscribing is a no-op.
    fn add_observer(&self, observer: ObserverId);

    /// Remove an observer edge.
    fn remove_observer(&self, observer: ObserverId);
}

/// An observing computation that can be notified when a dependency changed.
pub trait Observer: Send + Sync {
    /// Get the observer's unique ID.
    fn observer_id(&self) -> ObserverId;

    /// Lazily invalidate. Computeds flip their cached state to maybe-stale;
    /// effects have nothing to invalidate.
    fn mark_stale(&self);

    /// Observer ids downstream of this node, for continuing a propagation
    /// walk. Empty for effects, which are leaves of the graph.
    fn downstream(&self) -> SmallVec<[ObserverId; 4]>;

    /// Rerun now. Effects execute their body; computeds are left to their
    /// lazy pull model and treat this as a no-op.
    fn notify(&self);

    /// Whether this observer reruns eagerly during propagation (effects)
    /// or lazily on next read (computeds).
    fn is_eager(&self) -> bool;

    /// Whether the observer is still live. Disposed effects report false
    /// and are pruned from observer sets when encountered.
    fn is_active(&self) -> bool;
}

/// One recorded read: which source, a non-owning handle to it, and the
/// version observed at read time. A computed's cache is valid iff every
/// tracked source is still alive at its recorded version.
#[derive(Clone)]
pub struct TrackedSource {
    pub id: SourceId,
    pub node: Weak<dyn SourceNode>,
    pub seen_version: u64,
}

/// Swap an observer's dependency set for a freshly collected one.
///
/// Subscribes to every newly read source and unsubscribes from every source
/// that was tracked last run but not read this run. Dependency sets are
/// recollected from scratch each evaluation, so this diff is what keeps a
/// conditional read (`flag ? a : b`) from leaking a subscription on the
/// untaken branch.
pub fn retarget_subscriptions(
    observer: ObserverId,
    deps: &RwLock<Vec<TrackedSource>>,
    new_deps: Vec<TrackedSource>,
) {
    for dep in &new_deps {
        if let Some(source) = dep.node.upgrade() {
            source.add_observer(observer);
        }
    }

    let old_deps = std::mem::replace(&mut *deps.write(), new_deps);

    let kept = deps.read();
    for dep in old_deps {
        if kept.iter().all(|d| d.id != dep.id) {
            if let Some(source) = dep.node.upgrade() {
                source.remove_observer(observer);
            }
        }
    }
}
