//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Mica's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changed, decided by a cheap version
//! comparison rather than a deep recompute.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are how reactive state is synchronized with
//! the outside world, such as pushing a value into a widget property.
//!
//! ## Batches
//!
//! `batch` opens a scope in which signal writes are coalesced: affected
//! effects run at most once when the outermost scope exits, observing only
//! the final values.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking stack to automatically
//! detect dependencies. When a signal is read, we check if there is an
//! active tracking frame and, if so, record the read there. Dependency sets
//! are recollected on every evaluation, so a branch that stops reading a
//! cell also stops being notified by it.

mod batch;
mod computed;
mod context;
mod effect;
mod error;
mod node;
mod runtime;
mod signal;

pub use batch::{batch, is_batching};
pub use computed::{Computed, ComputedState};
pub use effect::{CleanupFn, Effect};
pub use error::ReactiveError;
pub use node::{ObserverId, SourceId};
pub use signal::Signal;
