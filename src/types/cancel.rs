//! Cancellation reason types.
//!
//! Cancellation here is a cooperative protocol, not a silent drop: a
//! cancelled routine observes a tagged error at its current suspension
//! point and may catch it. [`CancelReason`] records which kind of effect
//! was interrupted so a handler can tell a torn-down delay apart from a
//! cancelled nested call.

use core::fmt;

/// The suspension point a cancellation interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelPoint {
    /// A `call` effect driving a nested routine.
    Call,
    /// A detached `spawn` task, cancelled through its handle.
    Spawn,
    /// A `fork` sharing the parent's structured scope.
    Fork,
    /// A pending `delay` timer.
    Delay,
    /// The task itself, suspended on something without its own teardown
    /// hook (a plain promise, for example).
    Task,
}

impl CancelPoint {
    /// Returns a short name for the interrupted effect.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Spawn => "spawn",
            Self::Fork => "fork",
            Self::Delay => "delay",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for CancelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The reason a suspension point was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CancelReason {
    /// Which kind of effect was interrupted.
    pub point: CancelPoint,
}

impl CancelReason {
    /// Creates a reason for the given suspension point.
    #[must_use]
    pub const fn new(point: CancelPoint) -> Self {
        Self { point }
    }

    /// A cancelled nested `call`.
    #[must_use]
    pub const fn call() -> Self {
        Self::new(CancelPoint::Call)
    }

    /// A cancelled detached `spawn`.
    #[must_use]
    pub const fn spawn() -> Self {
        Self::new(CancelPoint::Spawn)
    }

    /// A cancelled `fork`.
    #[must_use]
    pub const fn fork() -> Self {
        Self::new(CancelPoint::Fork)
    }

    /// A cancelled `delay` timer.
    #[must_use]
    pub const fn delay() -> Self {
        Self::new(CancelPoint::Delay)
    }

    /// A task cancelled at a suspension point with no effect-specific hook.
    #[must_use]
    pub const fn task() -> Self {
        Self::new(CancelPoint::Task)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} has been cancelled", self.point)
    }
}
