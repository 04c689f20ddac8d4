//! Coeffect: a cooperative effect-driven task runtime.
//!
//! # Overview
//!
//! Coeffect drives resumable computations (routines) step by step and
//! interprets the values they suspend on as structured concurrency
//! instructions: sequential [`call`], parallel [`all`], [`race`],
//! detached [`spawn`], scoped [`fork`], timed [`delay`], and explicit
//! [`cancel`]. Every top-level task exposes one cancellable handle, and
//! cancellation propagates cooperatively into whatever the task is
//! currently suspended on.
//!
//! # Core Guarantees
//!
//! - **Exactly-once settlement**: every promise fulfils or rejects once,
//!   ever; late settlements are no-ops
//! - **Cooperative cancellation**: cancellation is thrown into the
//!   routine at its current suspension point, where it may be caught
//! - **Structured vs. detached lifetimes**: a fork shares its parent's
//!   cancellation scope; a spawn owns a private one reachable only
//!   through its handle
//! - **Single logical thread**: no preemption, no locks; suspension
//!   happens only at effect boundaries
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, time, and the cancellation vocabulary
//! - [`error`]: the runtime error taxonomy
//! - [`value`]: the dynamic value type flowing through routines
//! - [`routine`]: resumable computations and callables
//! - [`promise`]: the settle-once future primitive
//! - [`speculate`]: the cancellation primitive guarding every effect
//! - [`scheduler`]: the timer event loop (wall or virtual clock)
//! - [`effect`]: effect descriptors, constructors, and the interpreter
//! - [`middleware`]: the handler chain and the normalization layer
//! - [`runtime`]: the driver state machine and task handles
//!
//! # Example
//!
//! ```
//! use coeffect::effect::{call, delay};
//! use coeffect::routine::{Callee, Step, Steps};
//! use coeffect::runtime::Runtime;
//! use coeffect::value::Value;
//!
//! let runtime = Runtime::builder().virtual_clock().build();
//! let greet = Callee::function(|_| Ok(Value::from("hi")));
//! let main = Callee::routine(move |_| {
//!     let greet = greet.clone();
//!     Steps::new(move |index, input| match index {
//!         0 => Ok(Step::Yield(delay(10).into())),
//!         1 => Ok(Step::Yield(call(greet.clone(), Vec::new()).into())),
//!         _ => input.map(Step::Done),
//!     })
//! });
//! let task = runtime.run(main, Vec::new());
//! assert_eq!(runtime.block_on(&task), Ok(Value::from("hi")));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod effect;
pub mod error;
pub mod middleware;
pub mod promise;
pub mod routine;
pub mod scheduler;
pub mod speculate;
mod timer;
pub mod types;
pub mod value;

pub mod runtime;

// Re-exports for convenient access to the core API
pub use effect::{all, call, call_method, cancel, delay, fork, race, spawn, Effect, EffectSet};
pub use error::{Result, RuntimeError};
pub use middleware::{EffectCx, EffectResult, Middleware, Next};
pub use promise::{Promise, Settle, Settled};
pub use routine::{Callee, Extension, Invoked, Receiver, Routine, Step, Steps, Yielded};
pub use runtime::{Runtime, RuntimeBuilder, TaskHandle};
pub use scheduler::{Clock, Scheduler};
pub use speculate::{speculate, CancelScope, CancelSignal, CancelTrigger, SpeculationCx};
pub use types::{CancelPoint, CancelReason, TaskId, Time, TimerId};
pub use value::Value;
