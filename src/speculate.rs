//! The cancellation primitive underlying every effect.
//!
//! Cancellation is modeled as a raced signal: a [`CancelScope`] owns a
//! signal/trigger pair, the signal is passed by value down to whatever
//! work the scope covers, and [`speculate`] guards a unit of work with it.
//! If the signal fulfils before the work settles naturally, the registered
//! cleanup runs; the settled flag is checked first, so cleanup never runs
//! after natural settlement and natural settlement after cleanup is a
//! no-op.
//!
//! There is one scope per structured task and a distinct, privately owned
//! scope per detached spawn. Triggering a scope is idempotent.
//!
//! The default signal for unscoped work is [`CancelSignal::never`], a
//! forever-pending signal — not an already-settled one — so freshly
//! started work is never cancelled unless someone actually asks for it.
//! A signal that is *rejected* is inert: registrations against it are
//! dropped silently.

use core::fmt;

use crate::error::RuntimeError;
use crate::promise::{Promise, Settle};
use crate::value::Value;

/// A cancellation signal: fulfils when its scope is torn down.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    promise: Promise,
}

/// The triggering half of a scope. Firing is idempotent.
#[derive(Debug, Clone)]
pub struct CancelTrigger {
    settle: Settle,
}

/// A signal/trigger pair covering one unit of structured work.
#[derive(Debug, Clone)]
pub struct CancelScope {
    signal: CancelSignal,
    trigger: CancelTrigger,
}

impl CancelSignal {
    /// A signal that can never fire. This is the default scope for work
    /// that nothing intends to cancel.
    #[must_use]
    pub fn never() -> Self {
        Self {
            promise: Promise::never(),
        }
    }

    /// Returns true once the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        matches!(self.promise.peek(), Some(Ok(_)))
    }

    pub(crate) fn watch(&self, on_fire: impl FnOnce() + 'static) {
        self.promise.subscribe(move |outcome| {
            // A rejected signal is the inert state: nothing to do.
            if outcome.is_ok() {
                on_fire();
            }
        });
    }
}

impl CancelTrigger {
    /// Fires the signal. Returns false if it had already fired.
    pub fn fire(&self) -> bool {
        self.settle.resolve(Value::Unit)
    }
}

impl CancelScope {
    /// Creates a fresh scope with an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        let (promise, settle) = Promise::pending();
        Self {
            signal: CancelSignal { promise },
            trigger: CancelTrigger { settle },
        }
    }

    /// The signal side of the scope.
    #[must_use]
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// The trigger side of the scope.
    #[must_use]
    pub fn trigger(&self) -> CancelTrigger {
        self.trigger.clone()
    }

    /// Fires the scope's signal. Idempotent.
    pub fn fire(&self) -> bool {
        self.trigger.fire()
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

/// The context handed to a [`speculate`] setup closure.
///
/// `resolve`/`reject` settle the returned promise (idempotently);
/// `on_cancel` registers a cleanup to run if the guarding signal fires
/// while the promise is still pending.
pub struct SpeculationCx {
    settle: Settle,
    signal: CancelSignal,
}

impl SpeculationCx {
    /// Fulfils the guarded promise.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle.resolve(value)
    }

    /// Rejects the guarded promise.
    pub fn reject(&self, error: RuntimeError) -> bool {
        self.settle.reject(error)
    }

    /// A settle handle for the guarded promise, for cleanups and nested
    /// subscriptions that outlive the setup closure.
    #[must_use]
    pub fn settle(&self) -> Settle {
        self.settle.clone()
    }

    /// The guarding signal.
    #[must_use]
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Registers a cleanup against the guarding signal.
    ///
    /// The cleanup runs only if the signal fires while the promise is
    /// unsettled. A cleanup returning `Err` rejects the promise with that
    /// error; most cleanups reject explicitly through [`Self::settle`]
    /// with their cancellation reason and return `Ok`.
    pub fn on_cancel(
        &self,
        cleanup: impl FnOnce() -> Result<(), RuntimeError> + 'static,
    ) {
        let settle = self.settle.clone();
        self.signal.watch(move || {
            if settle.is_settled() {
                return;
            }
            if let Err(error) = cleanup() {
                settle.reject(error);
            }
        });
    }
}

impl fmt::Debug for SpeculationCx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeculationCx")
            .field("settled", &self.settle.is_settled())
            .finish()
    }
}

/// Wraps a unit of asynchronous work with a cancellation signal.
///
/// `setup` runs synchronously and performs the real work: invoke a
/// function, start a timer, drive a nested routine. The returned promise
/// settles at most once, through the [`SpeculationCx`].
pub fn speculate(signal: &CancelSignal, setup: impl FnOnce(&SpeculationCx)) -> Promise {
    let (promise, settle) = Promise::pending();
    let cx = SpeculationCx {
        settle,
        signal: signal.clone(),
    };
    setup(&cx);
    promise
}
