//! Mica Core
//!
//! This crate provides the core reactive runtime for the Mica UI toolkit.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Automatic dependency tracking
//! - Batched update coalescing
//!
//! The widget/binding layer sits on top of this crate: it creates signals,
//! reads them inside effects, and pushes the observed values into platform
//! widget properties. That layer is a consumer of this crate, not part of it.
//!
//! # Architecture
//!
//! Everything lives in the `reactive` module:
//!
//! - `signal`: mutable reactive cells with version counters
//! - `computed`: derived, cached, lazily evaluated cells
//! - `effect`: eagerly scheduled side-effecting subscribers
//! - `batch`: a scope that defers and deduplicates notifications
//! - `context`: the thread-local dependency-tracking stack
//! - `runtime`: the observer registry and the propagation walk
//!
//! # Example
//!
//! ```rust
//! use mica_core::reactive::{Signal, Computed, Effect};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let count_for_doubled = count.clone();
//! let doubled = Computed::new(move || count_for_doubled.get() * 2);
//!
//! // Create an effect
//! let count_for_effect = count.clone();
//! let _effect = Effect::new(move || {
//!     println!("count = {}, doubled = {}", count_for_effect.get(), doubled.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "count = 5, doubled = 10"
//! ```
//!
//! # Threading contract
//!
//! Execution is single-threaded and synchronous by contract. Handles are
//! `Send + Sync` so an embedding may move them across threads, but the
//! tracking context and batch state are thread-local and all propagation
//! runs inline on the writing thread. An embedding that mutates the graph
//! from multiple threads must confine those calls itself.

pub mod reactive;

pub use reactive::{batch, Computed, Effect, ReactiveError, Signal};
