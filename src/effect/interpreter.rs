//! The built-in effect interpreter.
//!
//! One middleware layer that recognizes the seven effect descriptors and
//! turns each into a promise, using the cancellation primitive for the
//! terminal effects and recursing through the full handler chain for the
//! children of composites. Anything that is not an [`Effect`] delegates to
//! the next layer unchanged.

use indexmap::IndexMap;
use std::time::Duration;

use tracing::debug;

use crate::effect::{CallTarget, Effect, EffectSet};
use crate::error::RuntimeError;
use crate::middleware::{EffectCx, EffectResult, Middleware, Next};
use crate::promise::Promise;
use crate::routine::{Callee, Invoked, Yielded};
use crate::runtime::TaskHandle;
use crate::speculate::{speculate, CancelScope};
use crate::types::CancelReason;
use crate::value::Value;

/// The built-in interpreter layer, installed at the end of every chain.
pub struct EffectInterpreter;

impl Middleware for EffectInterpreter {
    fn handle(&self, effect: Yielded, cx: &EffectCx, next: &dyn Next) -> EffectResult {
        match effect {
            Yielded::Effect(effect) => interpret_effect(effect, cx),
            other => next.call(other, cx),
        }
    }
}

fn interpret_effect(effect: Effect, cx: &EffectCx) -> EffectResult {
    debug!(effect = effect.tag(), "interpreting effect");
    match effect {
        Effect::Call { target, args } => Ok(Yielded::Promise(call_effect(target, args, cx))),
        Effect::All(set) => all_effect(set, cx),
        Effect::Race(set) => race_effect(set, cx),
        Effect::Spawn { callee, args } => Ok(Yielded::Promise(spawn_effect(callee, args, cx))),
        Effect::Fork { callee, args } => Ok(Yielded::Promise(fork_effect(callee, args, cx))),
        Effect::Delay { ms } => Ok(Yielded::Promise(delay_effect(ms, cx))),
        Effect::Cancel { task } => Ok(Yielded::Promise(cancel_effect(&task, cx))),
    }
}

/// `call`: invoke the target; drive a resulting routine under a scope of
/// its own. Cancellation throws into the nested routine cooperatively and
/// rejects with the call reason — a routine that catches the throw cannot
/// overwrite the rejection.
fn call_effect(target: CallTarget, args: Vec<Value>, cx: &EffectCx) -> Promise {
    let runtime = cx.runtime().clone();
    speculate(cx.signal(), |scx| match target {
        CallTarget::Method(receiver, method) => match receiver.invoke(&method, args) {
            Ok(value) => {
                scx.resolve(value);
            }
            Err(error) => {
                scx.reject(error);
            }
        },
        CallTarget::Callee(callee) => match callee.invoke(args) {
            Err(error) => {
                scx.reject(error);
            }
            Ok(Invoked::Value(value)) => {
                scx.resolve(value);
            }
            Ok(Invoked::Routine(routine)) => {
                let scope = CancelScope::new();
                let nested = runtime.drive_routine(routine, scope.clone(), CancelReason::task());
                let settle = scx.settle();
                nested.future().subscribe(move |outcome| match outcome {
                    Ok(value) => {
                        settle.resolve(value.clone());
                    }
                    Err(error) => {
                        settle.reject(error.clone());
                    }
                });
                let settle = scx.settle();
                scx.on_cancel(move || {
                    // Reject before throwing into the nested routine so a
                    // catch there cannot settle the call promise first.
                    settle.reject(RuntimeError::Cancelled(CancelReason::call()));
                    scope.fire();
                    Ok(())
                });
            }
        },
    })
}

/// `all`: interpret every child eagerly, in declared order, and hand the
/// same shape back for the normalization layer to combine.
fn all_effect(set: EffectSet, cx: &EffectCx) -> EffectResult {
    match set {
        EffectSet::List(children) => {
            let handled = children
                .into_iter()
                .map(|child| cx.interpret(child))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Yielded::List(handled))
        }
        EffectSet::Map(children) => {
            let mut handled = IndexMap::with_capacity(children.len());
            for (key, child) in children {
                handled.insert(key, cx.interpret(child)?);
            }
            Ok(Yielded::Map(handled))
        }
    }
}

/// `race`: interpret and normalize every child eagerly; first settlement
/// wins. The keyed form covers every key, losers marked absent. Losers
/// are not actively cancelled.
fn race_effect(set: EffectSet, cx: &EffectCx) -> EffectResult {
    match set {
        EffectSet::List(children) => {
            let mut promises = Vec::with_capacity(children.len());
            for child in children {
                let handled = cx.interpret(child)?;
                promises.push(cx.normalize(handled));
            }
            Ok(Yielded::Promise(Promise::race(promises)))
        }
        EffectSet::Map(children) => {
            let keys: Vec<String> = children.keys().cloned().collect();
            let (combined, settle) = Promise::pending();
            for (key, child) in children {
                let handled = cx.interpret(child)?;
                let promise = cx.normalize(handled);
                let keys = keys.clone();
                let settle = settle.clone();
                promise.subscribe(move |outcome| match outcome {
                    Ok(value) => {
                        let winners: IndexMap<String, Value> = keys
                            .iter()
                            .map(|k| {
                                let slot = if *k == key {
                                    value.clone()
                                } else {
                                    Value::Absent
                                };
                                (k.clone(), slot)
                            })
                            .collect();
                        settle.resolve(Value::Map(winners));
                    }
                    Err(error) => {
                        settle.reject(error.clone());
                    }
                });
            }
            Ok(Yielded::Promise(combined))
        }
    }
}

/// `spawn`: start the callee detached under a private scope, record the
/// trigger in the cancel registry, and resolve immediately with the
/// handle. The parent's cancellation does not reach the spawned task.
fn spawn_effect(callee: Callee, args: Vec<Value>, cx: &EffectCx) -> Promise {
    let runtime = cx.runtime().clone();
    speculate(cx.signal(), |scx| {
        let scope = CancelScope::new();
        let handle = runtime.drive_callee(&callee, args, scope.clone(), CancelReason::spawn());
        runtime.register_cancel(handle.id(), scope.trigger());
        debug!(task = %handle.id(), "spawned detached task");
        let registry_runtime = runtime.clone();
        let id = handle.id();
        // Completed tasks leave the registry, so a later cancel is a miss.
        handle.future().subscribe(move |_| {
            registry_runtime.unregister_cancel(id);
        });
        scx.resolve(Value::Task(handle));
    })
}

/// `fork`: like spawn, but shares the enclosing task's scope, so
/// cancelling the parent tears the fork down too. No registry entry.
fn fork_effect(callee: Callee, args: Vec<Value>, cx: &EffectCx) -> Promise {
    let runtime = cx.runtime().clone();
    let scope = cx.scope().clone();
    speculate(cx.signal(), |scx| {
        let handle = runtime.drive_callee(&callee, args, scope.clone(), CancelReason::fork());
        debug!(task = %handle.id(), "forked scoped task");
        scx.resolve(Value::Task(handle));
    })
}

/// `delay`: resolve after the duration; cancellation clears the pending
/// timer and rejects with the delay reason.
fn delay_effect(ms: u64, cx: &EffectCx) -> Promise {
    let scheduler = cx.runtime().scheduler().clone();
    speculate(cx.signal(), |scx| {
        let (id, timer) = scheduler.schedule(Duration::from_millis(ms));
        let settle = scx.settle();
        timer.subscribe(move |outcome| {
            if outcome.is_ok() {
                settle.resolve(Value::Unit);
            }
        });
        let settle = scx.settle();
        scx.on_cancel(move || {
            scheduler.cancel(id);
            settle.reject(RuntimeError::Cancelled(CancelReason::delay()));
            Ok(())
        });
    })
}

/// `cancel`: fire the registry trigger for the handle if one is present;
/// resolve immediately either way.
fn cancel_effect(task: &TaskHandle, cx: &EffectCx) -> Promise {
    let runtime = cx.runtime().clone();
    let id = task.id();
    speculate(cx.signal(), |scx| {
        let fired = runtime.fire_registered_cancel(id);
        debug!(task = %id, fired, "cancel effect");
        scx.resolve(Value::Unit);
    })
}
