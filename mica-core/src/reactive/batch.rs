//! Batch Scheduler
//!
//! A batch is a scope that defers and deduplicates the effect runs arising
//! from multiple signal writes. Writes inside the scope still bump versions
//! and invalidate computeds immediately (so reads inside the batch stay
//! consistent), but affected effects are parked in a pending set and run
//! exactly once when the outermost scope exits, observing only the final
//! values.
//!
//! Batch state is thread-local, like the tracking context: the runtime is
//! single-threaded by contract, and a batch opened on one thread has no
//! business coalescing writes made on another.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::node::ObserverId;
use super::runtime;

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState {
        depth: 0,
        pending: IndexSet::new(),
    });
}

/// Current batch nesting depth plus the deduplicated pending-notify set.
struct BatchState {
    depth: u32,
    pending: IndexSet<ObserverId>,
}

/// Run `body` inside a batch scope.
///
/// Signal writes inside the scope defer their effect runs; when the
/// outermost scope exits the pending set is drained exactly once, in
/// discovery order. Scopes nest to any depth: inner scopes only extend the
/// pending set, and nothing runs until the outermost exit.
///
/// The scope is released on all exit paths, including panics.
///
/// # Example
///
/// ```rust
/// use mica_core::reactive::{batch, Effect, Signal};
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let value = Signal::new(0);
/// let runs = Arc::new(AtomicI32::new(0));
///
/// let value_for_effect = value.clone();
/// let runs_for_effect = runs.clone();
/// let _effect = Effect::new(move || {
///     value_for_effect.get();
///     runs_for_effect.fetch_add(1, Ordering::SeqCst);
/// });
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
///
/// batch(|| {
///     value.set(1);
///     value.set(2);
///     value.set(3);
/// });
///
/// // One rerun for three writes.
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// assert_eq!(value.get(), 3);
/// ```
pub fn batch<T>(body: impl FnOnce() -> T) -> T {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        state.depth += 1;
        tracing::trace!(depth = state.depth, "batch scope entered");
    });

    // Guard so the scope is released even if the body panics.
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let drained = BATCH.with(|state| {
                let mut state = state.borrow_mut();
                state.depth -= 1;
                tracing::trace!(depth = state.depth, "batch scope exited");
                if state.depth == 0 {
                    Some(std::mem::take(&mut state.pending))
                } else {
                    None
                }
            });

            // Drain outside the borrow: effect runs may write signals,
            // which re-enters the batch state.
            if let Some(pending) = drained {
                if !pending.is_empty() {
                    tracing::debug!(pending = pending.len(), "draining batch");
                }
                for id in pending {
                    runtime::run_observer(id);
                }
            }
        }
    }

    let _guard = BatchGuard;
    body()
}

/// Check if a batch scope is active on this thread.
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Add observers to the pending-notify set. Duplicates are dropped, so an
/// effect enqueued by several writes still runs once.
pub(crate) fn enqueue(ids: impl IntoIterator<Item = ObserverId>) {
    BATCH.with(|state| {
        state.borrow_mut().pending.extend(ids);
    });
}
