//! Dependency-Tracking Context
//!
//! The tracking context records which computation is currently evaluating.
//! This enables automatic dependency discovery: when a signal or computed
//! is read, the read is recorded against the current evaluation frame.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. When a computed or effect starts
//! evaluating, it pushes a frame; every tracked read during that window is
//! appended to the top frame; the frame is popped when evaluation finishes.
//! The pop is guaranteed on all exit paths (including panics) by the
//! `TrackingScope` guard.
//!
//! A real stack (not a single slot) is required because evaluations nest:
//! an effect's body may read a computed, whose recomputation opens its own
//! frame on top of the effect's.

use std::cell::RefCell;

use super::node::{ObserverId, TrackedSource};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// One evaluation frame: the observer being evaluated and the reads
/// collected so far.
struct Frame {
    observer: ObserverId,
    reads: Vec<TrackedSource>,
}

/// Guard for one evaluation frame.
///
/// Pushed on `enter`, popped on `finish` (returning the collected reads) or
/// on drop if the evaluation panicked before finishing.
pub struct TrackingScope {
    observer: ObserverId,
    finished: bool,
}

impl TrackingScope {
    /// Enter a new tracking frame for the given observer.
    ///
    /// While this frame is on top of the stack, any source read records
    /// itself against it.
    pub fn enter(observer: ObserverId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                observer,
                reads: Vec::new(),
            });
        });

        Self {
            observer,
            finished: false,
        }
    }

    /// Pop the frame and return the reads it collected.
    pub fn finish(mut self) -> Vec<TrackedSource> {
        self.finished = true;
        CONTEXT_STACK.with(|stack| {
            let frame = stack
                .borrow_mut()
                .pop()
                .expect("tracking stack underflow on finish");
            debug_assert_eq!(
                frame.observer, self.observer,
                "tracking frame mismatch: expected {:?}, got {:?}",
                self.observer, frame.observer
            );
            frame.reads
        })
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Panic path: discard the partial reads, but keep the stack balanced.
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.observer, self.observer,
                    "tracking frame mismatch on unwind: expected {:?}, got {:?}",
                    self.observer, frame.observer
                );
            }
        });
    }
}

/// Check if there is an active tracking frame.
pub fn is_tracking() -> bool {
    CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Record a read of the given source against the current frame, if any.
///
/// Duplicate reads of the same source within one evaluation collapse to the
/// first record; versions cannot change mid-evaluation on this thread.
pub fn track(read: TrackedSource) {
    CONTEXT_STACK.with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            if frame.reads.iter().all(|r| r.id != read.id) {
                frame.reads.push(read);
            }
        }
    });
}

/// Check whether the given observer is anywhere on the evaluation stack.
///
/// Used to detect a node re-entering its own evaluation frame, which is the
/// circular-dependency case.
pub fn on_stack(observer: ObserverId) -> bool {
    CONTEXT_STACK.with(|stack| stack.borrow().iter().any(|f| f.observer == observer))
}

#[cfg(test)]
mod tests {
    use super::super::node::{SourceId, SourceNode};
    use super::*;
    use std::sync::Arc;

    struct NullSource;

    impl SourceNode for NullSource {
        fn version(&self) -> u64 {
            0
        }
        fn add_observer(&self, _observer: ObserverId) {}
        fn remove_observer(&self, _observer: ObserverId) {}
    }

    fn fake_read(id: SourceId, version: u64) -> TrackedSource {
        // A dead weak is fine for exercising the stack bookkeeping.
        let source: Arc<dyn SourceNode> = Arc::new(NullSource);
        TrackedSource {
            id,
            node: Arc::downgrade(&source),
            seen_version: version,
        }
    }

    #[test]
    fn scope_tracks_observer() {
        let id = ObserverId::new();

        assert!(!is_tracking());
        assert!(!on_stack(id));

        {
            let scope = TrackingScope::enter(id);
            assert!(is_tracking());
            assert!(on_stack(id));
            let reads = scope.finish();
            assert!(reads.is_empty());
        }

        assert!(!is_tracking());
        assert!(!on_stack(id));
    }

    #[test]
    fn scope_collects_reads() {
        let scope = TrackingScope::enter(ObserverId::new());

        let a = SourceId::new();
        let b = SourceId::new();
        track(fake_read(a, 1));
        track(fake_read(b, 3));

        let reads = scope.finish();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].id, a);
        assert_eq!(reads[0].seen_version, 1);
        assert_eq!(reads[1].id, b);
    }

    #[test]
    fn duplicate_reads_collapse() {
        let scope = TrackingScope::enter(ObserverId::new());

        let a = SourceId::new();
        track(fake_read(a, 1));
        track(fake_read(a, 1));
        track(fake_read(a, 1));

        let reads = scope.finish();
        assert_eq!(reads.len(), 1);
    }

    #[test]
    fn nested_scopes() {
        let outer = ObserverId::new();
        let inner = ObserverId::new();

        let outer_scope = TrackingScope::enter(outer);
        let a = SourceId::new();
        track(fake_read(a, 1));

        {
            let inner_scope = TrackingScope::enter(inner);
            assert!(on_stack(outer));
            assert!(on_stack(inner));

            let b = SourceId::new();
            track(fake_read(b, 7));

            // Inner frame sees only its own read.
            let inner_reads = inner_scope.finish();
            assert_eq!(inner_reads.len(), 1);
            assert_eq!(inner_reads[0].id, b);
        }

        assert!(!on_stack(inner));

        // Outer frame is unaffected by the nested evaluation.
        let outer_reads = outer_scope.finish();
        assert_eq!(outer_reads.len(), 1);
        assert_eq!(outer_reads[0].id, a);
    }

    #[test]
    fn stack_is_balanced_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _scope = TrackingScope::enter(ObserverId::new());
            panic!("evaluation failed");
        });
        assert!(result.is_err());
        assert!(!is_tracking());
    }
}
