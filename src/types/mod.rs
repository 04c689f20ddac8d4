//! Core identifier, time, and cancellation vocabulary types.
//!
//! These are the plain data types the rest of the runtime is built on:
//! type-safe identifiers for tasks and timers, a millisecond time type for
//! the scheduler, and the cancellation reason taxonomy.

pub mod cancel;
pub mod id;
pub mod time;

pub use cancel::{CancelPoint, CancelReason};
pub use id::{TaskId, TimerId};
pub use time::Time;
