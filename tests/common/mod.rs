#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::sync::Once;

use proptest::prelude::ProptestConfig;

use coeffect::routine::{Callee, Step, Steps};
use coeffect::runtime::Runtime;
use coeffect::value::Value;

static INIT_LOGGING: Once = Once::new();

/// Initialize trace-level test logging. Safe to call repeatedly; the
/// first call wins.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Proptest configuration with an explicit case count and no persisted
/// failure files cluttering the tree.
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

/// A deterministic runtime for timer-sensitive tests.
pub fn test_runtime() -> Runtime {
    init_test_logging();
    Runtime::builder().virtual_clock().build()
}

/// A plain function callee returning a fixed string.
pub fn returns(value: &'static str) -> Callee {
    Callee::function(move |_| Ok(Value::from(value)))
}

/// A coroutine callee that yields nothing and returns a fixed value.
pub fn routine_returning(value: Value) -> Callee {
    Callee::routine(move |_| {
        let value = value.clone();
        Steps::new(move |_, _| Ok(Step::Done(value.clone())))
    })
}
