//! Error taxonomy for the reactive runtime.
//!
//! User-supplied closures fail by panicking; the runtime never swallows a
//! failure silently. A panic inside `Computed::get` resumes to the caller
//! (the cache keeps its last valid value). A panic inside an effect body is
//! isolated so one failing effect cannot block the rest of a propagation
//! pass; it is reported through `tracing` as a [`ReactiveError`].
//!
//! Disposed access is deliberately *not* an error: reading or triggering a
//! disposed effect is a documented no-op, and calling `cleanup()` twice is
//! idempotent.

use std::any::Any;

use thiserror::Error;

use super::node::ObserverId;

/// Failures surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A user-supplied closure panicked while an observer was evaluating.
    #[error("evaluation of observer {observer:?} panicked: {message}")]
    Evaluation {
        observer: ObserverId,
        message: String,
    },

    /// An observer re-entered its own evaluation frame.
    #[error("observer {observer:?} re-entered its own evaluation (circular dependency)")]
    CircularDependency { observer: ObserverId },
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_str_and_string() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload =
            std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }

    #[test]
    fn errors_display_the_observer() {
        let observer = ObserverId::new();
        let err = ReactiveError::Evaluation {
            observer,
            message: "boom".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("boom"));

        let err = ReactiveError::CircularDependency { observer };
        assert!(err.to_string().contains("circular"));
    }
}
