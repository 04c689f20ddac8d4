//! Effect descriptors and their pure constructors.
//!
//! An [`Effect`] is inert tagged data describing a suspend-and-resume
//! instruction. Constructors build descriptors; the interpreter middleware
//! consumes each one exactly once and turns it into a promise. The sum
//! type is closed and matched exhaustively — extension effects go through
//! [`Extension`](crate::routine::Extension) and a custom middleware
//! instead.

pub mod interpreter;

use core::fmt;

use indexmap::IndexMap;
use std::rc::Rc;

use crate::routine::{Callee, Receiver, Yielded};
use crate::runtime::TaskHandle;
use crate::value::Value;

/// The target of a `call` effect.
#[derive(Clone)]
pub enum CallTarget {
    /// A function or coroutine function to invoke and, if needed, drive.
    Callee(Callee),
    /// A receiver/method pair; invoked immediately, resolving with the
    /// method's return value.
    Method(Rc<dyn Receiver>, String),
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callee(_) => f.write_str("Callee(..)"),
            Self::Method(_, name) => write!(f, "Method(.., {name:?})"),
        }
    }
}

/// The children of a composite (`all`/`race`) effect: either an ordered
/// list or an insertion-ordered keyed map.
#[derive(Debug)]
pub enum EffectSet {
    /// Positional children; results keep this order.
    List(Vec<Yielded>),
    /// Keyed children; results keep the full key set.
    Map(IndexMap<String, Yielded>),
}

impl From<Vec<Effect>> for EffectSet {
    fn from(effects: Vec<Effect>) -> Self {
        Self::List(effects.into_iter().map(Yielded::Effect).collect())
    }
}

impl From<Vec<Yielded>> for EffectSet {
    fn from(children: Vec<Yielded>) -> Self {
        Self::List(children)
    }
}

impl EffectSet {
    /// Builds a keyed set from entries, preserving order.
    #[must_use]
    pub fn keyed<K, Y, const N: usize>(entries: [(K, Y); N]) -> Self
    where
        K: Into<String>,
        Y: Into<Yielded>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, y)| (k.into(), y.into()))
                .collect(),
        )
    }
}

/// A structured concurrency instruction, consumed once by the interpreter.
#[derive(Debug)]
pub enum Effect {
    /// Invoke a target sequentially; the caller resumes with its result.
    Call {
        /// What to invoke.
        target: CallTarget,
        /// Arguments for the invocation.
        args: Vec<Value>,
    },
    /// Start every child eagerly; resume once all of them settle.
    All(EffectSet),
    /// Start every child eagerly; resume with the first to settle.
    Race(EffectSet),
    /// Start a detached task and resume immediately with its handle.
    Spawn {
        /// The unit of work to start.
        callee: Callee,
        /// Arguments for the invocation.
        args: Vec<Value>,
    },
    /// Start a task sharing the parent's cancellation scope; resume
    /// immediately with its handle.
    Fork {
        /// The unit of work to start.
        callee: Callee,
        /// Arguments for the invocation.
        args: Vec<Value>,
    },
    /// Resume after a duration elapses.
    Delay {
        /// The delay in milliseconds.
        ms: u64,
    },
    /// Cancel a previously spawned task by handle; always resumes
    /// immediately, whether or not the task was still running.
    Cancel {
        /// The handle returned from a `spawn`.
        task: TaskHandle,
    },
}

impl Effect {
    /// The descriptor's tag name.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::All(_) => "all",
            Self::Race(_) => "race",
            Self::Spawn { .. } => "spawn",
            Self::Fork { .. } => "fork",
            Self::Delay { .. } => "delay",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Sequentially call a function or coroutine function with arguments.
#[must_use]
pub fn call(callee: Callee, args: Vec<Value>) -> Effect {
    Effect::Call {
        target: CallTarget::Callee(callee),
        args,
    }
}

/// Call a method on a receiver; resolves immediately with its result.
#[must_use]
pub fn call_method(
    receiver: Rc<dyn Receiver>,
    method: impl Into<String>,
    args: Vec<Value>,
) -> Effect {
    Effect::Call {
        target: CallTarget::Method(receiver, method.into()),
        args,
    }
}

/// Fan out over every child effect; resume once all settle, preserving
/// order and keys.
#[must_use]
pub fn all(effects: impl Into<EffectSet>) -> Effect {
    Effect::All(effects.into())
}

/// Race every child effect; the first to settle wins. The keyed form
/// resumes with every key present, losers marked [`Value::Absent`].
#[must_use]
pub fn race(effects: impl Into<EffectSet>) -> Effect {
    Effect::Race(effects.into())
}

/// Start a detached task with its own private cancellation scope.
#[must_use]
pub fn spawn(callee: Callee, args: Vec<Value>) -> Effect {
    Effect::Spawn { callee, args }
}

/// Start a task sharing the enclosing task's cancellation scope.
#[must_use]
pub fn fork(callee: Callee, args: Vec<Value>) -> Effect {
    Effect::Fork { callee, args }
}

/// Suspend for the given number of milliseconds.
#[must_use]
pub fn delay(ms: u64) -> Effect {
    Effect::Delay { ms }
}

/// Cancel a spawned task through its handle.
#[must_use]
pub fn cancel(task: TaskHandle) -> Effect {
    Effect::Cancel { task }
}
