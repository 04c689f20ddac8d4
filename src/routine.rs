//! Resumable computations and the values they suspend on.
//!
//! A [`Routine`] is an explicit resumable-state object: the driver steps
//! it with `resume(value)` or `resume_err(error)` and gets back either
//! `Step::Yield` (a suspension) or `Step::Done` (completion). There are no
//! language generators involved; a routine is typically a small hand-rolled
//! state machine, and [`Steps`] adapts a closure into one for the common
//! case.
//!
//! A [`Callee`] is the unit of work effects point at: invoked with
//! arguments it produces either a plain value (a plain function) or a
//! routine to drive (a coroutine function).

use core::fmt;

use indexmap::IndexMap;
use std::rc::Rc;

use crate::effect::Effect;
use crate::error::RuntimeError;
use crate::promise::Promise;
use crate::value::Value;

/// The result of stepping a routine once.
pub enum Step {
    /// The routine suspended on a value for the runtime to interpret.
    Yield(Yielded),
    /// The routine finished with a value.
    Done(Value),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield(yielded) => f.debug_tuple("Yield").field(yielded).finish(),
            Self::Done(value) => f.debug_tuple("Done").field(value).finish(),
        }
    }
}

/// A resumable computation driven by the runtime.
pub trait Routine {
    /// Resumes with the settled value of whatever the routine was
    /// suspended on. The first resume of a fresh routine receives
    /// [`Value::Unit`] as its kickstart input.
    fn resume(&mut self, input: Value) -> Result<Step, RuntimeError>;

    /// Resumes by injecting an error at the current suspension point.
    ///
    /// The default rethrows: an unhandled error propagates as the task's
    /// failure. Routines with catch semantics override this.
    fn resume_err(&mut self, error: RuntimeError) -> Result<Step, RuntimeError> {
        Err(error)
    }
}

/// A value a routine may suspend on.
///
/// Effects are interpreted by the middleware chain; everything else is
/// reduced to a promise by the normalization layer.
pub enum Yielded {
    /// A plain value. Invalid at the top level of a yield, but an
    /// immediately-available element inside lists and maps.
    Value(Value),
    /// An already-made promise; passes through normalization unchanged.
    Promise(Promise),
    /// An effect descriptor for the interpreter.
    Effect(Effect),
    /// A callable to invoke with no arguments and drive.
    Callee(Callee),
    /// An in-flight routine to drive.
    Routine(Box<dyn Routine>),
    /// A list of yieldables, normalized elementwise.
    List(Vec<Yielded>),
    /// A keyed map of yieldables, normalized per value with keys preserved.
    Map(IndexMap<String, Yielded>),
    /// A middleware-defined effect; the built-in interpreter passes it
    /// through untouched.
    Extension(Extension),
}

impl Yielded {
    /// One-word description of the yielded kind, used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Value(value) => format!("a plain value ({})", value.kind()),
            Self::Promise(_) => "a promise".to_owned(),
            Self::Effect(effect) => format!("a {} effect", effect.tag()),
            Self::Callee(_) => "a callable".to_owned(),
            Self::Routine(_) => "a routine".to_owned(),
            Self::List(_) => "a list".to_owned(),
            Self::Map(_) => "a map".to_owned(),
            Self::Extension(extension) => {
                format!("an unhandled extension effect ({})", extension.tag)
            }
        }
    }
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Self::Effect(effect) => f.debug_tuple("Effect").field(effect).finish(),
            Self::Callee(_) => f.write_str("Callee(..)"),
            Self::Routine(_) => f.write_str("Routine(..)"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Extension(extension) => f.debug_tuple("Extension").field(extension).finish(),
        }
    }
}

impl From<Effect> for Yielded {
    fn from(effect: Effect) -> Self {
        Self::Effect(effect)
    }
}

impl From<Promise> for Yielded {
    fn from(promise: Promise) -> Self {
        Self::Promise(promise)
    }
}

impl From<Value> for Yielded {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A middleware-defined effect descriptor: a tag the built-in interpreter
/// does not recognize plus an opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    /// The tag a custom middleware dispatches on.
    pub tag: &'static str,
    /// The effect's data.
    pub payload: Value,
}

impl Extension {
    /// Creates an extension effect.
    #[must_use]
    pub fn new(tag: &'static str, payload: Value) -> Self {
        Self { tag, payload }
    }
}

/// What invoking a [`Callee`] produced.
pub enum Invoked {
    /// A plain function's return value; available immediately.
    Value(Value),
    /// A coroutine function's routine; must be driven to completion.
    Routine(Box<dyn Routine>),
}

impl fmt::Debug for Invoked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Routine(_) => f.write_str("Routine(..)"),
        }
    }
}

/// A cloneable callable: the target of `call`, `spawn`, `fork`, and `run`.
#[derive(Clone)]
pub struct Callee {
    invoke: Rc<dyn Fn(Vec<Value>) -> Result<Invoked, RuntimeError>>,
}

impl Callee {
    /// Wraps a plain function: its return value settles the caller
    /// immediately, with no suspension points.
    pub fn function(f: impl Fn(Vec<Value>) -> Result<Value, RuntimeError> + 'static) -> Self {
        Self {
            invoke: Rc::new(move |args| f(args).map(Invoked::Value)),
        }
    }

    /// Wraps a coroutine function: each invocation builds a fresh routine
    /// for the runtime to drive.
    pub fn routine<R>(f: impl Fn(Vec<Value>) -> R + 'static) -> Self
    where
        R: Routine + 'static,
    {
        Self {
            invoke: Rc::new(move |args| Ok(Invoked::Routine(Box::new(f(args))))),
        }
    }

    /// Invokes the callee with the given arguments.
    pub fn invoke(&self, args: Vec<Value>) -> Result<Invoked, RuntimeError> {
        (self.invoke)(args)
    }
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callee(..)")
    }
}

/// A receiver for method-pair call targets: `call_method(receiver, name)`
/// invokes it immediately and resolves the caller with the result, with
/// no suspension points of its own.
pub trait Receiver {
    /// Invokes the named method with the given arguments.
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

/// Adapts a closure into a [`Routine`].
///
/// The closure is called once per resume with the zero-based step index
/// and the resumption input: `Ok(value)` for a normal resume, `Err(error)`
/// for an error injected at the suspension point. Returning the error
/// (usually via `?`) leaves it uncaught; matching on it is a catch.
pub struct Steps<F> {
    index: usize,
    f: F,
}

impl<F> Steps<F>
where
    F: FnMut(usize, Result<Value, RuntimeError>) -> Result<Step, RuntimeError>,
{
    /// Creates a step-closure routine.
    pub fn new(f: F) -> Self {
        Self { index: 0, f }
    }
}

impl<F> Routine for Steps<F>
where
    F: FnMut(usize, Result<Value, RuntimeError>) -> Result<Step, RuntimeError>,
{
    fn resume(&mut self, input: Value) -> Result<Step, RuntimeError> {
        let index = self.index;
        self.index += 1;
        (self.f)(index, Ok(input))
    }

    fn resume_err(&mut self, error: RuntimeError) -> Result<Step, RuntimeError> {
        let index = self.index;
        self.index += 1;
        (self.f)(index, Err(error))
    }
}
