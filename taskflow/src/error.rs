//! The crate's single error type.
//!
//! Structural misuse (self-composition, reassigning a node's kind once it has run, touching a
//! non-joinable subflow) is reported here rather than left to corrupt scheduler state silently.
//! Panics inside task bodies are also folded into this type so they can travel through a
//! [`crate::future::Future`] alongside ordinary failures.

use std::fmt;

#[derive(Debug, Clone)]
pub enum TaskflowError {
    /// A graph was composed of itself, directly.
    SelfComposition,
    /// A node's kind was reassigned after the graph it belongs to had already been run.
    KindAlreadyActivated,
    /// `Subflow::join`/`Subflow::detach` called a second time, or the subflow mutated after either.
    SubflowNotJoinable,
    /// `Semaphore::new` was asked for a capacity of zero.
    InvalidCapacity,
    /// A task body panicked; the payload has been reduced to a message.
    TaskPanicked(String),
}

impl fmt::Display for TaskflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskflowError::SelfComposition => write!(f, "a taskflow cannot be composed of itself"),
            TaskflowError::KindAlreadyActivated => {
                write!(f, "cannot change a node's kind after its graph has been run")
            }
            TaskflowError::SubflowNotJoinable => {
                write!(f, "subflow is no longer joinable (already joined or detached)")
            }
            TaskflowError::InvalidCapacity => {
                write!(f, "semaphore capacity must be at least 1")
            }
            TaskflowError::TaskPanicked(msg) => write!(f, "task panicked: {msg}"),
        }
    }
}

impl std::error::Error for TaskflowError {}

pub(crate) fn catch_unwind<R>(f: impl FnOnce() -> R) -> Result<R, TaskflowError> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(|payload| {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskflowError::TaskPanicked(msg)
    })
}
