//! Effect Implementation
//!
//! An Effect is a side-effecting computation that reruns whenever one of
//! its dependencies changes. Effects are how the binding layer pushes a
//! signal or computed value into a platform widget property: construct the
//! effect with a body that reads the cell and writes the widget, and the
//! body reruns on every change until the effect is cleaned up.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to perform the
//!    first side effect and establish the initial dependency set.
//!
//! 2. When any tracked dependency changes, the effect is rerun by the
//!    propagation walk (or once per batch, if a batch is active).
//!
//! 3. Each rerun first invokes the cleanup action returned by the previous
//!    run, then reruns the body under a fresh tracking frame. Dependencies
//!    are recollected from scratch, so a branch that stops reading a cell
//!    stops being triggered by it.
//!
//! # Cleanup
//!
//! A body constructed with [`Effect::with_cleanup`] returns a cleanup
//! action. The runtime guarantees the previous action runs exactly once:
//! either before the next rerun or on disposal, never both.
//!
//! `cleanup()` disposes the effect: it unregisters from every dependency,
//! invokes the last cleanup action, and is idempotent. A disposed effect
//! never reruns; triggering it is a documented no-op. Dropping the handle
//! disposes it the same way.
//!
//! # Failure
//!
//! A panic inside the body is caught, reported through `tracing`, and never
//! interrupts the rest of a propagation pass: the other observers of the
//! same write still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::context::{self, TrackingScope};
use super::error::{panic_message, ReactiveError};
use super::node::{retarget_subscriptions, Observer, ObserverId, TrackedSource};
use super::runtime;

/// Cleanup action returned by an effect body, run before the next rerun or
/// on disposal.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// A side-effecting computation that reruns when dependencies change.
///
/// The handle owns the effect: dropping it disposes the effect, exactly as
/// an explicit [`Effect::cleanup`] call would.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(move || {
///     println!("count is: {}", count.get());
/// });
///
/// count.set(5);      // prints: "count is: 5"
/// effect.cleanup();  // never reruns again
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    /// Identity as a dependency-tracking observer.
    observer_id: ObserverId,

    /// The effect body. Returns the cleanup action for this run, if any.
    body: Box<dyn Fn() -> Option<CleanupFn> + Send + Sync>,

    /// Cleanup action returned by the last run.
    last_cleanup: Mutex<Option<CleanupFn>>,

    /// Sources read during the last run. Recollected every run.
    deps: RwLock<Vec<TrackedSource>>,

    /// False once disposed. A disposed effect never runs again.
    active: AtomicBool,

    /// Number of completed runs.
    run_count: AtomicUsize,
}

impl Effect {
    /// Create a new effect with the given body.
    ///
    /// The body runs immediately, performing the first side effect and
    /// establishing the initial dependency set.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::from_body(Box::new(move || {
            body();
            None
        }))
    }

    /// Create a new effect whose body returns a cleanup action.
    ///
    /// The action returned by one run is invoked before the next run of the
    /// same effect, or on disposal — whichever comes first, exactly once.
    pub fn with_cleanup<F, C>(body: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::from_body(Box::new(move || Some(Box::new(body()) as CleanupFn)))
    }

    fn from_body(body: Box<dyn Fn() -> Option<CleanupFn> + Send + Sync>) -> Self {
        let inner = Arc::new(EffectInner {
            observer_id: ObserverId::new(),
            body,
            last_cleanup: Mutex::new(None),
            deps: RwLock::new(Vec::new()),
            active: AtomicBool::new(true),
            run_count: AtomicUsize::new(0),
        });

        // Register before the first run so writes made by the body itself
        // can already resolve this observer.
        runtime::register(inner.clone() as Arc<dyn Observer>);
        inner.run();

        Self { inner }
    }

    /// Get the effect's observer ID.
    pub fn id(&self) -> ObserverId {
        self.inner.observer_id
    }

    /// Dispose of the effect.
    ///
    /// Unsubscribes from every tracked dependency, invokes the last cleanup
    /// action, and prevents any further rerun. Idempotent: calling this
    /// twice (or dropping the handle afterwards) is a no-op.
    pub fn cleanup(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !self.inner.active.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies tracked by the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.read().len()
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("observer_id", &self.inner.observer_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl EffectInner {
    /// Run the body inside a fresh tracking frame.
    fn run(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        // Re-entrant trigger: the body wrote a signal it also reads.
        // Rerunning from inside itself would recurse forever; skip.
        if context::on_stack(self.observer_id) {
            let err = ReactiveError::CircularDependency {
                observer: self.observer_id,
            };
            tracing::warn!(%err, "effect triggered itself; rerun skipped");
            return;
        }

        // Previous cleanup runs outside the tracking frame: reads it makes
        // must not become dependencies.
        if let Some(cleanup) = self.last_cleanup.lock().take() {
            cleanup();
        }

        let scope = TrackingScope::enter(self.observer_id);
        let result = catch_unwind(AssertUnwindSafe(|| (self.body)()));
        let new_deps = scope.finish();

        // Even a failed run keeps the dependencies it read before the
        // panic, so a later write can still retrigger it.
        retarget_subscriptions(self.observer_id, &self.deps, new_deps);
        self.run_count.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(cleanup) => {
                *self.last_cleanup.lock() = cleanup;
            }
            Err(payload) => {
                let err = ReactiveError::Evaluation {
                    observer: self.observer_id,
                    message: panic_message(payload.as_ref()),
                };
                tracing::error!(%err, "effect body panicked");
            }
        }
    }

    /// Tear the effect down. Idempotent.
    fn dispose(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let old_deps = std::mem::take(&mut *self.deps.write());
        for dep in old_deps {
            if let Some(source) = dep.node.upgrade() {
                source.remove_observer(self.observer_id);
            }
        }

        runtime::unregister(self.observer_id);

        if let Some(cleanup) = self.last_cleanup.lock().take() {
            cleanup();
        }

        tracing::debug!(observer = ?self.observer_id, "effect disposed");
    }
}

impl Observer for EffectInner {
    fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    fn mark_stale(&self) {
        // Effects carry no cache; there is nothing to invalidate.
    }

    fn downstream(&self) -> SmallVec<[ObserverId; 4]> {
        SmallVec::new()
    }

    fn notify(&self) {
        self.run();
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::super::signal::Signal;
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_clone = run_count.clone();

        let effect = Effect::new(move || {
            run_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let signal = Signal::new(0);
        let observed = Arc::new(AtomicI32::new(-1));

        let signal_clone = signal.clone();
        let observed_clone = observed.clone();
        let effect = Effect::new(move || {
            observed_clone.store(signal_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(effect.dependency_count(), 1);

        signal.set(42);
        assert_eq!(observed.load(Ordering::SeqCst), 42);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn disposed_effect_never_reruns() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let run_clone = run_count.clone();
        let effect = Effect::new(move || {
            signal_clone.get();
            run_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        effect.cleanup();
        assert!(effect.is_disposed());
        assert_eq!(effect.dependency_count(), 0);

        signal.set(1);
        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let cleanup_count = Arc::new(AtomicI32::new(0));

        let cleanup_clone = cleanup_count.clone();
        let effect = Effect::with_cleanup(move || {
            let counter = cleanup_clone.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        effect.cleanup();
        effect.cleanup();
        effect.cleanup();

        assert_eq!(cleanup_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn previous_cleanup_runs_before_rerun() {
        let signal = Signal::new(0);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let signal_clone = signal.clone();
        let order_clone = order.clone();
        let _effect = Effect::with_cleanup(move || {
            let value = signal_clone.get();
            order_clone.lock().push(format!("run {value}"));
            let order_inner = order_clone.clone();
            move || {
                order_inner.lock().push(format!("cleanup {value}"));
            }
        });

        signal.set(1);
        signal.set(2);

        assert_eq!(
            *order.lock(),
            vec![
                "run 0".to_string(),
                "cleanup 0".to_string(),
                "run 1".to_string(),
                "cleanup 1".to_string(),
                "run 2".to_string(),
            ]
        );
    }

    #[test]
    fn drop_disposes_the_effect() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));
        let cleanup_count = Arc::new(AtomicI32::new(0));

        {
            let signal_clone = signal.clone();
            let run_clone = run_count.clone();
            let cleanup_clone = cleanup_count.clone();
            let _effect = Effect::with_cleanup(move || {
                signal_clone.get();
                run_clone.fetch_add(1, Ordering::SeqCst);
                let counter = cleanup_clone.clone();
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        assert_eq!(cleanup_count.load(Ordering::SeqCst), 1);

        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn self_triggering_effect_does_not_recurse() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let run_clone = run_count.clone();
        let _effect = Effect::new(move || {
            let value = signal_clone.get();
            run_clone.fetch_add(1, Ordering::SeqCst);
            if value < 3 {
                // Writes its own dependency; the rerun from inside the
                // running body is skipped.
                signal_clone.set(value + 1);
            }
        });

        // Construction run wrote 1, which could not retrigger the running
        // body. The write still landed.
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.get(), 1);

        // An outside write reruns it once (plus the skipped self-trigger).
        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
        assert_eq!(signal.get(), 3);
    }
}
