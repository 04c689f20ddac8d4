//! Error types and propagation policy.
//!
//! All failures in the runtime flow through one closed enum. There is no
//! implicit logging of user failures and no process-wide crash path: an
//! error either reaches the routine's error-resumption path, where it may
//! be caught, or it rejects the task's overall future, which is the only
//! user-visible failure channel.

use crate::types::CancelReason;

/// Convenience alias for results carrying a [`RuntimeError`].
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// The runtime error taxonomy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// A suspended value could not be classified as a future, function,
    /// routine, list, map, or recognized effect. Fatal to the task unless
    /// the routine catches it at the suspension point.
    #[error(
        "invalid yield: you may only yield an effect, promise, routine, \
         callable, list, or map, but got {0}"
    )]
    InvalidYield(String),

    /// A suspension point was torn down by cancellation. Delivered to the
    /// routine at its current suspension point; uncaught, it becomes the
    /// task's terminal failure.
    #[error("{0}")]
    Cancelled(CancelReason),

    /// A failure raised by user code, carried as an opaque payload.
    #[error("task failed: {0}")]
    Fault(String),

    /// `block_on` detected that the awaited task can never settle: its
    /// future is pending and the scheduler has no live timers left.
    #[error("runtime stalled: task is suspended on something that can never settle")]
    Stalled,
}

impl RuntimeError {
    /// Creates a user fault from any displayable payload.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    /// Returns the cancellation reason if this is a cancellation error.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns true if this is a cancellation error.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
