//! The single-threaded settle-once future primitive.
//!
//! A [`Promise`] is the only suspension mechanism in the runtime: every
//! effect is reduced to one, and the driver subscribes to it to learn how
//! to resume its routine. The core invariant is *exactly-once settlement*:
//! one of fulfil/reject happens per promise, exactly once, ever. The
//! [`Settle`] half enforces this by construction; late calls are no-ops.
//!
//! There is one logical thread of control, so subscriber callbacks run
//! synchronously: either at settle time, or immediately at subscribe time
//! if the promise has already settled. Settlement releases its internal
//! borrow before invoking callbacks, so a callback may freely subscribe
//! to or settle other promises.

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::Value;

/// The settled outcome of a promise.
pub type Settled = Result<Value, RuntimeError>;

type Callback = Box<dyn FnOnce(&Settled)>;

enum State {
    Pending(Vec<Callback>),
    Settled(Settled),
}

/// A shareable handle to an eventually-settled value.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<State>>,
}

/// The settling half of a promise. Cloneable; all clones share the
/// exactly-once guarantee.
#[derive(Clone)]
pub struct Settle {
    inner: Rc<RefCell<State>>,
}

impl Promise {
    /// Creates a pending promise and its settle handle.
    #[must_use]
    pub fn pending() -> (Self, Settle) {
        let inner = Rc::new(RefCell::new(State::Pending(Vec::new())));
        (
            Self {
                inner: Rc::clone(&inner),
            },
            Settle { inner },
        )
    }

    /// Creates an already-fulfilled promise.
    #[must_use]
    pub fn resolved(value: Value) -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Settled(Ok(value)))),
        }
    }

    /// Creates an already-rejected promise.
    #[must_use]
    pub fn rejected(error: RuntimeError) -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Settled(Err(error)))),
        }
    }

    /// Creates a promise that can never settle.
    #[must_use]
    pub fn never() -> Self {
        let (promise, _settle) = Self::pending();
        promise
    }

    /// Returns the settled outcome, if any.
    #[must_use]
    pub fn peek(&self) -> Option<Settled> {
        match &*self.inner.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Returns true once the promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.borrow(), State::Settled(_))
    }

    /// Registers a callback for settlement. Runs immediately if the
    /// promise has already settled.
    pub fn subscribe(&self, callback: impl FnOnce(&Settled) + 'static) {
        let mut callback = Some(callback);
        let settled = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                State::Pending(callbacks) => {
                    if let Some(callback) = callback.take() {
                        callbacks.push(Box::new(callback));
                    }
                    None
                }
                State::Settled(outcome) => Some(outcome.clone()),
            }
        };
        if let (Some(outcome), Some(callback)) = (settled, callback) {
            callback(&outcome);
        }
    }

    /// Combines promises into one that fulfils with a [`Value::List`] of
    /// all results in input order, or rejects with the first rejection.
    #[must_use]
    pub fn all(promises: Vec<Promise>) -> Promise {
        if promises.is_empty() {
            return Promise::resolved(Value::List(Vec::new()));
        }
        let (combined, settle) = Promise::pending();
        let slots = Rc::new(RefCell::new(vec![Value::Absent; promises.len()]));
        let remaining = Rc::new(Cell::new(promises.len()));
        for (index, promise) in promises.into_iter().enumerate() {
            let slots = Rc::clone(&slots);
            let remaining = Rc::clone(&remaining);
            let settle = settle.clone();
            promise.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    slots.borrow_mut()[index] = value.clone();
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let results = std::mem::take(&mut *slots.borrow_mut());
                        settle.resolve(Value::List(results));
                    }
                }
                Err(error) => {
                    settle.reject(error.clone());
                }
            });
        }
        combined
    }

    /// Combines promises into one that settles like the first of them to
    /// settle. An empty race never settles.
    #[must_use]
    pub fn race(promises: Vec<Promise>) -> Promise {
        if promises.is_empty() {
            return Promise::never();
        }
        let (combined, settle) = Promise::pending();
        for promise in promises {
            let settle = settle.clone();
            promise.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    settle.resolve(value.clone());
                }
                Err(error) => {
                    settle.reject(error.clone());
                }
            });
        }
        combined
    }
}

impl Settle {
    /// Fulfils the promise. Returns false if it had already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise. Returns false if it had already settled.
    pub fn reject(&self, error: RuntimeError) -> bool {
        self.settle(Err(error))
    }

    /// Returns true once the promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.borrow(), State::Settled(_))
    }

    fn settle(&self, outcome: Settled) -> bool {
        let callbacks = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = State::Settled(outcome.clone());
                    callbacks
                }
            }
        };
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.borrow() {
            State::Pending(callbacks) => {
                write!(f, "Promise(pending, {} subscribers)", callbacks.len())
            }
            State::Settled(Ok(value)) => write!(f, "Promise(fulfilled: {value})"),
            State::Settled(Err(error)) => write!(f, "Promise(rejected: {error})"),
        }
    }
}

impl fmt::Debug for Settle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settle({})",
            if self.is_settled() { "settled" } else { "pending" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_exactly_once() {
        let (promise, settle) = Promise::pending();
        assert!(settle.resolve(Value::Int(1)));
        assert!(!settle.resolve(Value::Int(2)));
        assert!(!settle.reject(RuntimeError::fault("late")));
        assert_eq!(promise.peek(), Some(Ok(Value::Int(1))));
    }

    #[test]
    fn subscribe_after_settlement_fires_immediately() {
        let promise = Promise::resolved(Value::from("done"));
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        promise.subscribe(move |outcome| {
            assert_eq!(outcome, &Ok(Value::from("done")));
            flag.set(true);
        });
        assert!(seen.get());
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let (promise, settle) = Promise::pending();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            promise.subscribe(move |_| order.borrow_mut().push(tag));
        }
        settle.resolve(Value::Unit);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn all_preserves_input_order() {
        let (a, sa) = Promise::pending();
        let (b, sb) = Promise::pending();
        let combined = Promise::all(vec![a, b]);
        sb.resolve(Value::Int(2));
        assert!(!combined.is_settled());
        sa.resolve(Value::Int(1));
        assert_eq!(
            combined.peek(),
            Some(Ok(Value::List(vec![Value::Int(1), Value::Int(2)])))
        );
    }

    #[test]
    fn all_rejects_on_first_rejection() {
        let (a, _sa) = Promise::pending();
        let (b, sb) = Promise::pending();
        let combined = Promise::all(vec![a, b]);
        sb.reject(RuntimeError::fault("boom"));
        assert_eq!(combined.peek(), Some(Err(RuntimeError::fault("boom"))));
    }

    #[test]
    fn race_takes_first_settlement() {
        let (a, sa) = Promise::pending();
        let (b, sb) = Promise::pending();
        let combined = Promise::race(vec![a, b]);
        sb.resolve(Value::Int(2));
        sa.resolve(Value::Int(1));
        assert_eq!(combined.peek(), Some(Ok(Value::Int(2))));
    }

    #[test]
    fn callbacks_may_settle_other_promises() {
        let (outer, outer_settle) = Promise::pending();
        let (inner, inner_settle) = Promise::pending();
        inner.subscribe(move |outcome| {
            if let Ok(value) = outcome {
                outer_settle.resolve(value.clone());
            }
        });
        inner_settle.resolve(Value::Int(9));
        assert_eq!(outer.peek(), Some(Ok(Value::Int(9))));
    }
}
