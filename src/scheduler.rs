//! The event loop driving timers against a clock.
//!
//! There is no preemption and no worker pool: the scheduler's only job is
//! to settle delay promises when their deadlines arrive. One [`turn`]
//! advances to the earliest live deadline — instantly under the virtual
//! clock, by sleeping under the wall clock — and fires everything due.
//! Virtual time makes timer-dependent tests deterministic and instant.
//!
//! [`turn`]: Scheduler::turn

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::promise::Promise;
use crate::timer::TimerHeap;
use crate::types::{Time, TimerId};
use crate::value::Value;

/// The scheduler's time source.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// Monotonic wall-clock time; idle turns sleep until the next deadline.
    Wall {
        /// When the scheduler started; `Time` is measured from here.
        start: Instant,
    },
    /// Virtual time; idle turns jump straight to the next deadline.
    Virtual {
        /// The current virtual instant.
        now: Time,
    },
}

impl Clock {
    /// A wall clock starting now.
    #[must_use]
    pub fn wall() -> Self {
        Self::Wall {
            start: Instant::now(),
        }
    }

    /// A virtual clock starting at the epoch.
    #[must_use]
    pub const fn virtual_time() -> Self {
        Self::Virtual { now: Time::ZERO }
    }

    fn now(&self) -> Time {
        match self {
            Self::Wall { start } => Time::from_millis(start.elapsed().as_millis() as u64),
            Self::Virtual { now } => *now,
        }
    }
}

struct SchedulerInner {
    timers: TimerHeap,
    clock: Clock,
    next_timer: u64,
}

/// Owns the timer heap and the clock; shared by the runtime and every
/// delay effect it schedules.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    /// Creates a scheduler over the given clock.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                timers: TimerHeap::default(),
                clock,
                next_timer: 0,
            })),
        }
    }

    /// The current scheduler time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.borrow().clock.now()
    }

    /// Number of live timers. Useful to observe that cancellation really
    /// cleared a pending delay.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.live()
    }

    /// Schedules a timer that fulfils after the given duration.
    pub fn schedule(&self, after: Duration) -> (TimerId, Promise) {
        let (promise, settle) = Promise::pending();
        let mut inner = self.inner.borrow_mut();
        let id = TimerId::from_raw(inner.next_timer);
        inner.next_timer += 1;
        let deadline = inner.clock.now() + after;
        trace!(timer = %id, %deadline, "timer scheduled");
        inner.timers.insert(id, deadline, settle);
        (id, promise)
    }

    /// Cancels a pending timer so it never fires. Returns false if the
    /// timer is unknown or already fired.
    pub fn cancel(&self, id: TimerId) -> bool {
        let cancelled = self.inner.borrow_mut().timers.cancel(id);
        if cancelled {
            trace!(timer = %id, "timer cancelled");
        }
        cancelled
    }

    /// Advances to the earliest live deadline and fires everything due.
    ///
    /// Returns false if no live timers remain — the caller is stalled if
    /// it is still waiting for something.
    pub fn turn(&self) -> bool {
        let expired = {
            let mut inner = self.inner.borrow_mut();
            let Some(deadline) = inner.timers.peek_deadline() else {
                return false;
            };
            match &mut inner.clock {
                Clock::Virtual { now } => {
                    if deadline > *now {
                        *now = deadline;
                    }
                }
                Clock::Wall { start } => {
                    let now = Time::from_millis(start.elapsed().as_millis() as u64);
                    if deadline > now {
                        std::thread::sleep(deadline.since(now));
                    }
                }
            }
            let now = inner.clock.now();
            inner.timers.pop_expired(now)
        };
        trace!(fired = expired.len(), "scheduler turn");
        // Settle outside the borrow: resumed routines may schedule new
        // timers from their continuations.
        for settle in expired {
            settle.resolve(Value::Unit);
        }
        true
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &inner.clock.now())
            .field("pending_timers", &inner.timers.live())
            .finish()
    }
}
