//! The effect handler chain and the normalization layer.
//!
//! Interpretation is a chain of middleware. Each layer either recognizes
//! a descriptor and returns a promise/value for it, or delegates to the
//! next layer unmodified. Custom layers installed through the builder run
//! ahead of the built-in interpreter; whatever falls off the end of the
//! chain passes through unchanged and is left to normalization.
//!
//! Normalization reduces an arbitrary yielded value to a single promise:
//! promises pass through, callables and routines are driven by a fresh
//! driver invocation, lists and maps combine their normalized elements
//! preserving order and keys, and plain values are immediately available.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::promise::Promise;
use crate::routine::Yielded;
use crate::runtime::Runtime;
use crate::speculate::{CancelScope, CancelSignal};
use crate::types::CancelReason;
use crate::value::Value;

/// The outcome of one handler layer: a (possibly transformed) yielded
/// value for normalization, or an error to inject at the suspension point.
pub type EffectResult = Result<Yielded, RuntimeError>;

/// One layer of the effect handler chain.
pub trait Middleware {
    /// Handles a recognized descriptor, or delegates to `next` unmodified.
    fn handle(&self, effect: Yielded, cx: &EffectCx, next: &dyn Next) -> EffectResult;
}

/// The rest of the chain after the current layer.
pub trait Next {
    /// Passes the effect to the next layer.
    fn call(&self, effect: Yielded, cx: &EffectCx) -> EffectResult;
}

/// A composed middleware chain. The end of the chain is the identity:
/// unrecognized values flow through to normalization untouched.
#[derive(Clone)]
pub(crate) struct Chain {
    layers: Rc<[Rc<dyn Middleware>]>,
}

struct ChainAt<'a> {
    chain: &'a Chain,
    index: usize,
}

impl Chain {
    pub(crate) fn new(layers: Vec<Rc<dyn Middleware>>) -> Self {
        Self {
            layers: layers.into(),
        }
    }

    pub(crate) fn call(&self, effect: Yielded, cx: &EffectCx) -> EffectResult {
        ChainAt {
            chain: self,
            index: 0,
        }
        .call(effect, cx)
    }
}

impl Next for ChainAt<'_> {
    fn call(&self, effect: Yielded, cx: &EffectCx) -> EffectResult {
        match self.chain.layers.get(self.index) {
            Some(layer) => layer.handle(
                effect,
                cx,
                &ChainAt {
                    chain: self.chain,
                    index: self.index + 1,
                },
            ),
            None => Ok(effect),
        }
    }
}

/// The context a middleware layer works in: the owning runtime, the
/// enclosing task's structured cancellation scope, and the normalization
/// entry point.
pub struct EffectCx {
    runtime: Runtime,
    scope: CancelScope,
}

impl EffectCx {
    pub(crate) fn new(runtime: Runtime, scope: CancelScope) -> Self {
        Self { runtime, scope }
    }

    /// The runtime interpreting this effect.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The enclosing task's structured cancellation signal. Every effect
    /// of the task registers its teardown against this signal.
    #[must_use]
    pub fn signal(&self) -> &CancelSignal {
        self.scope.signal()
    }

    pub(crate) fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Runs a yielded value through the full handler chain. Composite
    /// effects use this to interpret their children, so custom layers see
    /// nested descriptors too.
    pub fn interpret(&self, effect: Yielded) -> EffectResult {
        self.runtime.chain().call(effect, self)
    }

    /// Reduces an arbitrary yielded value to a single promise.
    #[must_use]
    pub fn normalize(&self, yielded: Yielded) -> Promise {
        match yielded {
            Yielded::Promise(promise) => promise,
            Yielded::Value(value) => Promise::resolved(value),
            Yielded::Callee(callee) => self
                .runtime
                .drive_callee(&callee, Vec::new(), CancelScope::new(), CancelReason::task())
                .future(),
            Yielded::Routine(routine) => self
                .runtime
                .drive_routine(routine, CancelScope::new(), CancelReason::task())
                .future(),
            Yielded::Effect(_) => match self.interpret(yielded) {
                // A descriptor surviving the whole chain means no handler
                // claimed it; treat it like any other unclassifiable value.
                Ok(Yielded::Effect(effect)) => Promise::rejected(RuntimeError::InvalidYield(
                    format!("an uninterpreted {} effect", effect.tag()),
                )),
                Ok(handled) => self.normalize(handled),
                Err(error) => Promise::rejected(error),
            },
            Yielded::List(items) => {
                let promises = items.into_iter().map(|item| self.normalize(item)).collect();
                Promise::all(promises)
            }
            Yielded::Map(entries) => self.normalize_map(entries),
            Yielded::Extension(extension) => {
                Promise::rejected(RuntimeError::InvalidYield(format!(
                    "an unhandled extension effect ({})",
                    extension.tag
                )))
            }
        }
    }

    /// Normalizes a keyed map. Every key is pre-populated with
    /// [`Value::Absent`] before any settlement fills it in, so a
    /// partially-resolved shape is inspectable and the full key set is
    /// always preserved.
    fn normalize_map(&self, entries: IndexMap<String, Yielded>) -> Promise {
        if entries.is_empty() {
            return Promise::resolved(Value::Map(IndexMap::new()));
        }
        let (combined, settle) = Promise::pending();
        let results: IndexMap<String, Value> = entries
            .keys()
            .map(|key| (key.clone(), Value::Absent))
            .collect();
        let results = Rc::new(RefCell::new(results));
        let remaining = Rc::new(std::cell::Cell::new(entries.len()));
        for (key, yielded) in entries {
            let promise = self.normalize(yielded);
            let results = Rc::clone(&results);
            let remaining = Rc::clone(&remaining);
            let settle = settle.clone();
            promise.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    results.borrow_mut()[&key] = value.clone();
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let map = std::mem::take(&mut *results.borrow_mut());
                        settle.resolve(Value::Map(map));
                    }
                }
                Err(error) => {
                    settle.reject(error.clone());
                }
            });
        }
        combined
    }
}
