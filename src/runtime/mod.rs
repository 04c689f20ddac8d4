//! The runtime driver: a step loop over resumable routines.
//!
//! One [`Runtime`] owns the middleware chain, the scheduler, and the
//! cancel registry for detached spawns. [`Runtime::run`] starts a task:
//! the driver invokes the callee, kickstarts the resulting routine with
//! [`Value::Unit`], and then loops — each yielded value goes through the
//! handler chain and the normalization layer, producing one promise; the
//! driver subscribes to it and resumes the routine with its settlement,
//! through the normal path on fulfilment or the error-injection path on
//! rejection. The task's overall future settles when the routine
//! completes, fails, or is cancelled without catching.
//!
//! Every suspension is guarded by the task's structured cancellation
//! signal, so an external [`TaskHandle::cancel`] always reaches whatever
//! the task is suspended on, effect or not.

mod registry;

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::effect::interpreter::EffectInterpreter;
use crate::error::RuntimeError;
use crate::middleware::{Chain, EffectCx, Middleware};
use crate::promise::{Promise, Settle};
use crate::routine::{Callee, Invoked, Routine, Step, Yielded};
use crate::scheduler::{Clock, Scheduler};
use crate::speculate::{speculate, CancelScope, CancelTrigger};
use crate::types::{CancelReason, TaskId};
use crate::value::Value;

use registry::CancelRegistry;

/// A caller-held view of one running task: its id, its overall future,
/// and its cancel trigger.
///
/// Cancelling fires the task's structured scope, which tears down the
/// effect currently in flight and throws a cancellation error into the
/// routine at its suspension point. The routine may catch it and finish
/// normally; uncaught, the task's future rejects with the reason.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    future: Promise,
    trigger: CancelTrigger,
}

impl TaskHandle {
    /// The task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's overall future.
    #[must_use]
    pub fn future(&self) -> Promise {
        self.future.clone()
    }

    /// Requests cooperative cancellation. Idempotent; returns false if
    /// the scope had already been triggered.
    pub fn cancel(&self) -> bool {
        self.trigger.fire()
    }

    /// True once the task has finished, failed, or been cancelled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.future.is_settled()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("settled", &self.future.is_settled())
            .finish()
    }
}

struct RuntimeInner {
    chain: Chain,
    scheduler: Scheduler,
    registry: CancelRegistry,
    next_task: Cell<u64>,
}

/// The cooperative task runtime.
///
/// Cheap to clone; clones share the chain, scheduler, and registry.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Builds a [`Runtime`] with extra middleware and a clock choice.
///
/// Custom layers run ahead of the built-in interpreter in installation
/// order, so the first installed layer sees every effect first.
pub struct RuntimeBuilder {
    layers: Vec<Rc<dyn Middleware>>,
    clock: Clock,
}

impl RuntimeBuilder {
    /// Installs a middleware layer ahead of the built-in interpreter.
    #[must_use]
    pub fn middleware(mut self, layer: impl Middleware + 'static) -> Self {
        self.layers.push(Rc::new(layer));
        self
    }

    /// Uses virtual time: idle turns jump to the next deadline instead of
    /// sleeping. Deterministic, for tests.
    #[must_use]
    pub fn virtual_clock(mut self) -> Self {
        self.clock = Clock::virtual_time();
        self
    }

    /// Uses an explicit clock.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Finishes the runtime, appending the built-in interpreter as the
    /// last layer of the chain.
    #[must_use]
    pub fn build(mut self) -> Runtime {
        self.layers.push(Rc::new(EffectInterpreter));
        Runtime {
            inner: Rc::new(RuntimeInner {
                chain: Chain::new(self.layers),
                scheduler: Scheduler::new(self.clock),
                registry: CancelRegistry::default(),
                next_task: Cell::new(0),
            }),
        }
    }
}

impl Runtime {
    /// A runtime with the default effect set and the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a runtime with extra middleware installed ahead of
    /// the built-in set.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder {
            layers: Vec::new(),
            clock: Clock::wall(),
        }
    }

    /// Starts a task over the given callee and returns its cancellable
    /// handle. A plain function settles immediately with its return
    /// value; a coroutine function's routine is driven to completion.
    pub fn run(&self, callee: Callee, args: Vec<Value>) -> TaskHandle {
        self.drive_callee(&callee, args, CancelScope::new(), CancelReason::task())
    }

    /// Drives scheduler turns until the task settles.
    ///
    /// Fails with [`RuntimeError::Stalled`] when the task is still
    /// pending but no timer is left that could ever resume it.
    pub fn block_on(&self, handle: &TaskHandle) -> Result<Value, RuntimeError> {
        loop {
            if let Some(outcome) = handle.future.peek() {
                return outcome;
            }
            if !self.inner.scheduler.turn() {
                return Err(RuntimeError::Stalled);
            }
        }
    }

    /// The runtime's scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn chain(&self) -> &Chain {
        &self.inner.chain
    }

    pub(crate) fn register_cancel(&self, id: TaskId, trigger: CancelTrigger) {
        self.inner.registry.insert(id, trigger);
    }

    pub(crate) fn unregister_cancel(&self, id: TaskId) {
        self.inner.registry.remove(id);
    }

    pub(crate) fn fire_registered_cancel(&self, id: TaskId) -> bool {
        self.inner.registry.fire(id)
    }

    /// Invokes a callee and drives the result under the given scope.
    /// `teardown` is the reason reported when the scope tears down a
    /// suspension with no effect-specific cleanup of its own.
    pub(crate) fn drive_callee(
        &self,
        callee: &Callee,
        args: Vec<Value>,
        scope: CancelScope,
        teardown: CancelReason,
    ) -> TaskHandle {
        let id = self.next_task_id();
        let (future, settle) = Promise::pending();
        let handle = TaskHandle {
            id,
            future,
            trigger: scope.trigger(),
        };
        debug!(task = %id, "task started");
        match callee.invoke(args) {
            Err(error) => {
                settle.reject(error);
            }
            Ok(Invoked::Value(value)) => {
                settle.resolve(value);
            }
            Ok(Invoked::Routine(routine)) => {
                self.kickstart(id, routine, settle, scope, teardown);
            }
        }
        handle
    }

    /// Drives an already-made routine under the given scope.
    pub(crate) fn drive_routine(
        &self,
        routine: Box<dyn Routine>,
        scope: CancelScope,
        teardown: CancelReason,
    ) -> TaskHandle {
        let id = self.next_task_id();
        let (future, settle) = Promise::pending();
        let handle = TaskHandle {
            id,
            future,
            trigger: scope.trigger(),
        };
        debug!(task = %id, "routine task started");
        self.kickstart(id, routine, settle, scope, teardown);
        handle
    }

    fn kickstart(
        &self,
        id: TaskId,
        routine: Box<dyn Routine>,
        settle: Settle,
        scope: CancelScope,
        teardown: CancelReason,
    ) {
        let frame = Rc::new(TaskFrame {
            id,
            runtime: self.clone(),
            routine: RefCell::new(routine),
            settle,
            scope,
            teardown,
        });
        frame.step(Ok(Value::Unit));
    }

    fn next_task_id(&self) -> TaskId {
        let raw = self.inner.next_task.get();
        self.inner.next_task.set(raw + 1);
        TaskId::from_raw(raw)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

/// One task's driving state: the routine, its settle handle, its
/// structured scope, and the reason reported when that scope tears down
/// a suspension with no effect-specific cleanup.
struct TaskFrame {
    id: TaskId,
    runtime: Runtime,
    routine: RefCell<Box<dyn Routine>>,
    settle: Settle,
    scope: CancelScope,
    teardown: CancelReason,
}

impl TaskFrame {
    /// Resumes the routine and dispatches on the step it reports. Runs as
    /// a loop so chains of immediately-settled suspensions resume in
    /// place instead of growing the stack one frame per step.
    fn step(self: &Rc<Self>, input: Result<Value, RuntimeError>) {
        let mut input = input;
        loop {
            trace!(task = %self.id, injected_error = input.is_err(), "resuming routine");
            let stepped = {
                let mut routine = self.routine.borrow_mut();
                match input {
                    Ok(value) => routine.resume(value),
                    Err(error) => routine.resume_err(error),
                }
            };
            match stepped {
                Err(error) => {
                    debug!(task = %self.id, %error, "task failed");
                    self.settle.reject(error);
                    return;
                }
                Ok(Step::Done(value)) => {
                    debug!(task = %self.id, "task done");
                    self.settle.resolve(value);
                    return;
                }
                Ok(Step::Yield(yielded)) => match self.suspend(yielded) {
                    Some(ready) => input = ready,
                    None => return,
                },
            }
        }
    }

    /// Interprets and normalizes a yielded value and guards the resulting
    /// promise with the task's structured signal. Returns the outcome
    /// directly if it is already available; otherwise subscribes for a
    /// later resume and returns `None`.
    fn suspend(self: &Rc<Self>, yielded: Yielded) -> Option<Result<Value, RuntimeError>> {
        let cx = EffectCx::new(self.runtime.clone(), self.scope.clone());
        let handled = match cx.interpret(yielded) {
            Ok(handled) => handled,
            Err(error) => return Some(Err(error)),
        };
        // Bare plain values are not suspendable; inject the error at the
        // suspension point so the routine may still catch it.
        if let Yielded::Value(_) = &handled {
            let error = RuntimeError::InvalidYield(handled.describe());
            return Some(Err(error));
        }
        let promise = cx.normalize(handled);
        let guarded = speculate(self.scope.signal(), |scx| {
            let settle = scx.settle();
            promise.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    settle.resolve(value.clone());
                }
                Err(error) => {
                    settle.reject(error.clone());
                }
            });
            let settle = scx.settle();
            let reason = self.teardown.clone();
            scx.on_cancel(move || {
                settle.reject(RuntimeError::Cancelled(reason));
                Ok(())
            });
        });
        if let Some(outcome) = guarded.peek() {
            return Some(outcome);
        }
        let frame = Rc::clone(self);
        guarded.subscribe(move |outcome| frame.step(outcome.clone()));
        None
    }
}
