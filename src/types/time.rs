//! Millisecond-resolution time for the timer scheduler.
//!
//! The runtime only needs enough of a clock to order delay deadlines, so
//! `Time` is a plain millisecond counter measured from the scheduler's
//! start. The virtual clock advances it directly; the wall clock derives it
//! from a monotonic `Instant`.

use core::fmt;
use core::ops::Add;
use std::time::Duration;

/// A point in scheduler time, in milliseconds since the scheduler started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Time(u64);

impl Time {
    /// The scheduler epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a time from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns the milliseconds since the epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Saturating duration from an earlier time to this one.
    #[must_use]
    pub fn since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
