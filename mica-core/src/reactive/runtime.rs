//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the observer registry and performs the propagation
//! walk when a signal changes.
//!
//! # How It Works
//!
//! 1. When a computed or effect is created, it registers with the runtime
//!    under its `ObserverId`. The registry holds only weak references, so
//!    registration never keeps an observer alive.
//!
//! 2. When a signal's value changes, the runtime walks the observer graph
//!    breadth-first from the signal's direct observers:
//!    a. Computeds are marked maybe-stale and the walk continues through
//!       their own observers.
//!    b. Effects are collected, deduplicated, in discovery order.
//!
//! 3. The collected effects then run exactly once each: immediately if no
//!    batch is active, or deferred into the batch's pending set otherwise.
//!    Computeds are never run by the walk; they recompute lazily on the
//!    next read.
//!
//! Because the walk marks first and runs after, a propagation pass that
//! reaches the same effect along multiple paths (a diamond) still runs it
//! once, and every computed it reads revalidates against already-bumped
//! versions. That is what makes propagation glitch-free.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::batch;
use super::node::{Observer, ObserverId};

// Global registry of observers. Weak references only: ownership of every
// node belongs to whatever application code created it.
static REGISTRY: OnceLock<RwLock<HashMap<ObserverId, Weak<dyn Observer>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<ObserverId, Weak<dyn Observer>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register an observer with the runtime.
pub(crate) fn register(observer: Arc<dyn Observer>) {
    let id = observer.observer_id();
    registry().write().insert(id, Arc::downgrade(&observer));
    tracing::trace!(observer = ?id, "observer registered");
}

/// Unregister an observer. Called on explicit disposal.
pub(crate) fn unregister(id: ObserverId) {
    registry().write().remove(&id);
    tracing::trace!(observer = ?id, "observer unregistered");
}

/// Resolve an observer id to a live observer.
///
/// A registered-but-dropped entry is pruned on the way out.
pub(crate) fn resolve(id: ObserverId) -> Option<Arc<dyn Observer>> {
    let weak = registry().read().get(&id).cloned()?;
    match weak.upgrade() {
        Some(observer) => Some(observer),
        None => {
            registry().write().remove(&id);
            None
        }
    }
}

/// Run a single pending observer, if it is still live.
///
/// Used by the batch scheduler when draining its pending set. The run is
/// self-isolating: effect bodies catch their own panics.
pub(crate) fn run_observer(id: ObserverId) {
    if let Some(observer) = resolve(id) {
        if observer.is_active() {
            observer.notify();
        }
    }
}

/// Propagate a change from a source's direct observers.
///
/// Marks every reachable computed as maybe-stale, collects every reachable
/// effect exactly once in discovery order, then either runs the effects
/// (unbatched) or defers them into the active batch.
///
/// Returns the ids that turned out to be dead or disposed, so the notifying
/// source can prune its observer set.
pub(crate) fn propagate(
    initial: impl IntoIterator<Item = ObserverId>,
) -> SmallVec<[ObserverId; 4]> {
    let mut dead: SmallVec<[ObserverId; 4]> = SmallVec::new();
    let mut to_run: IndexSet<ObserverId> = IndexSet::new();
    let mut visited: HashSet<ObserverId> = HashSet::new();
    let mut queue: VecDeque<ObserverId> = initial.into_iter().collect();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }

        let Some(observer) = resolve(id) else {
            dead.push(id);
            continue;
        };
        if !observer.is_active() {
            dead.push(id);
            continue;
        }

        observer.mark_stale();

        if observer.is_eager() {
            to_run.insert(id);
        } else {
            queue.extend(observer.downstream());
        }
    }

    if !to_run.is_empty() {
        if batch::is_batching() {
            tracing::debug!(pending = to_run.len(), "propagation deferred into batch");
            batch::enqueue(to_run);
        } else {
            tracing::debug!(effects = to_run.len(), "propagation pass running effects");
            for id in &to_run {
                run_observer(*id);
            }
        }
    }

    dead
}
