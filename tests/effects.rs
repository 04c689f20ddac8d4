//! End-to-end effect semantics: call, all, race, delay, and the
//! normalization layer, driven on a deterministic virtual clock.

mod common;

use std::rc::Rc;

use coeffect::effect::{all, call, call_method, delay, race, EffectSet};
use coeffect::error::RuntimeError;
use coeffect::routine::{Callee, Receiver, Step, Steps, Yielded};
use coeffect::value::Value;

use common::{returns, routine_returning, test_runtime};

/// A coroutine that waits `ms` and then returns `result`.
fn delayed(ms: u64, result: i64) -> Callee {
    Callee::routine(move |_| {
        Steps::new(move |index, input| match index {
            0 => Ok(Step::Yield(delay(ms).into())),
            _ => {
                input?;
                Ok(Step::Done(Value::Int(result)))
            }
        })
    })
}

/// A coroutine that yields one effect and returns its result.
fn yields_once(effect: impl Fn() -> coeffect::Effect + 'static) -> Callee {
    Callee::routine(move |_| {
        let effect = effect();
        let mut effect = Some(effect);
        Steps::new(move |index, input| match index {
            0 => match effect.take() {
                Some(effect) => Ok(Step::Yield(effect.into())),
                None => Ok(Step::Done(Value::Absent)),
            },
            _ => input.map(Step::Done),
        })
    })
}

#[test]
fn running_a_plain_function_settles_with_its_value() {
    let runtime = test_runtime();
    let task = runtime.run(returns("hi"), Vec::new());
    assert_eq!(runtime.block_on(&task), Ok(Value::from("hi")));
}

#[test]
fn call_of_a_plain_function_yields_its_value() {
    let runtime = test_runtime();
    let task = runtime.run(yields_once(|| call(returns("hi"), Vec::new())), Vec::new());
    assert_eq!(runtime.block_on(&task), Ok(Value::from("hi")));
}

#[test]
fn call_of_a_coroutine_drives_it_to_completion() {
    let runtime = test_runtime();
    let one = routine_returning(Value::from("hi"));
    let task = runtime.run(yields_once(move || call(one.clone(), Vec::new())), Vec::new());
    assert_eq!(runtime.block_on(&task), Ok(Value::from("hi")));
}

#[test]
fn call_of_a_method_pair_resolves_immediately() {
    struct Payload {
        body: &'static str,
    }
    impl Receiver for Payload {
        fn invoke(&self, method: &str, _args: Vec<Value>) -> Result<Value, RuntimeError> {
            match method {
                "body" => Ok(Value::from(self.body)),
                other => Err(RuntimeError::fault(format!("no method {other}"))),
            }
        }
    }

    let runtime = test_runtime();
    let receiver: Rc<dyn Receiver> = Rc::new(Payload { body: "hello" });
    let task = runtime.run(
        yields_once(move || call_method(Rc::clone(&receiver), "body", Vec::new())),
        Vec::new(),
    );
    assert_eq!(runtime.block_on(&task), Ok(Value::from("hello")));
}

#[test]
fn call_failure_propagates_to_the_caller() {
    let runtime = test_runtime();
    let failing = Callee::function(|_| Err(RuntimeError::fault("broken")));
    let task = runtime.run(yields_once(move || call(failing.clone(), Vec::new())), Vec::new());
    assert_eq!(runtime.block_on(&task), Err(RuntimeError::fault("broken")));
}

#[test]
fn call_failure_can_be_caught_at_the_suspension_point() {
    let runtime = test_runtime();
    let failing = Callee::function(|_| Err(RuntimeError::fault("broken")));
    let catcher = Callee::routine(move |_| {
        let failing = failing.clone();
        Steps::new(move |index, input| match index {
            0 => Ok(Step::Yield(call(failing.clone(), Vec::new()).into())),
            _ => match input {
                Ok(value) => Ok(Step::Done(value)),
                Err(_) => Ok(Step::Done(Value::from("recovered"))),
            },
        })
    });
    let task = runtime.run(catcher, Vec::new());
    assert_eq!(runtime.block_on(&task), Ok(Value::from("recovered")));
}

#[test]
fn all_over_a_list_preserves_declared_order() {
    let runtime = test_runtime();
    // The slower effect comes first; its slot must still come first.
    let task = runtime.run(
        yields_once(|| {
            all(vec![
                call(delayed(500, 1), Vec::new()),
                call(delayed(100, 2), Vec::new()),
            ])
        }),
        Vec::new(),
    );
    assert_eq!(
        runtime.block_on(&task),
        Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
    );
}

#[test]
fn all_over_a_map_preserves_the_key_set() {
    let runtime = test_runtime();
    let task = runtime.run(
        yields_once(|| {
            all(EffectSet::keyed([
                ("one", call(returns("hi"), Vec::new())),
                ("two", call(returns("hi"), Vec::new())),
            ]))
        }),
        Vec::new(),
    );
    assert_eq!(
        runtime.block_on(&task),
        Ok(Value::map([
            ("one", Value::from("hi")),
            ("two", Value::from("hi")),
        ]))
    );
}

#[test]
fn race_over_a_list_resolves_with_the_fastest() {
    let runtime = test_runtime();
    let task = runtime.run(
        yields_once(|| {
            race(vec![
                call(delayed(500, 1), Vec::new()),
                call(delayed(100, 2), Vec::new()),
            ])
        }),
        Vec::new(),
    );
    assert_eq!(runtime.block_on(&task), Ok(Value::Int(2)));
}

#[test]
fn race_over_a_map_marks_losers_absent() {
    let runtime = test_runtime();
    let task = runtime.run(
        yields_once(|| {
            race(EffectSet::keyed([
                ("one", call(delayed(500, 1), Vec::new())),
                ("two", call(delayed(100, 2), Vec::new())),
            ]))
        }),
        Vec::new(),
    );
    assert_eq!(
        runtime.block_on(&task),
        Ok(Value::map([
            ("one", Value::Absent),
            ("two", Value::Int(2)),
        ]))
    );
}

#[test]
fn delay_resolves_after_its_duration() {
    let runtime = test_runtime();
    let task = runtime.run(yields_once(|| delay(250)), Vec::new());
    assert_eq!(runtime.block_on(&task), Ok(Value::Unit));
    assert_eq!(runtime.scheduler().now().as_millis(), 250);
}

#[test]
fn yielded_lists_normalize_elementwise() {
    let runtime = test_runtime();
    let caller = Callee::routine(|_| {
        Steps::new(|index, input| match index {
            0 => Ok(Step::Yield(Yielded::List(vec![
                Yielded::Value(Value::Int(1)),
                Yielded::Effect(delay(50)),
                Yielded::Callee(routine_returning(Value::Int(3))),
            ]))),
            _ => input.map(Step::Done),
        })
    });
    let task = runtime.run(caller, Vec::new());
    assert_eq!(
        runtime.block_on(&task),
        Ok(Value::List(vec![Value::Int(1), Value::Unit, Value::Int(3)]))
    );
}

#[test]
fn yielded_maps_normalize_per_key() {
    let runtime = test_runtime();
    let caller = Callee::routine(|_| {
        Steps::new(|index, input| match index {
            0 => {
                let mut entries = indexmap::IndexMap::new();
                entries.insert("ready".to_string(), Yielded::Value(Value::from("now")));
                entries.insert("timed".to_string(), Yielded::Effect(delay(10)));
                Ok(Step::Yield(Yielded::Map(entries)))
            }
            _ => input.map(Step::Done),
        })
    });
    let task = runtime.run(caller, Vec::new());
    assert_eq!(
        runtime.block_on(&task),
        Ok(Value::map([
            ("ready", Value::from("now")),
            ("timed", Value::Unit),
        ]))
    );
}

#[test]
fn timeout_is_expressible_as_race_of_delay_and_effect() {
    let runtime = test_runtime();
    let task = runtime.run(
        yields_once(|| {
            race(EffectSet::keyed([
                ("timeout", delay(100)),
                ("work", call(delayed(5_000, 7), Vec::new())),
            ]))
        }),
        Vec::new(),
    );
    assert_eq!(
        runtime.block_on(&task),
        Ok(Value::map([
            ("timeout", Value::Unit),
            ("work", Value::Absent),
        ]))
    );
}
