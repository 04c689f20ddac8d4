//! Property tests for composite effects and settlement.
//!
//! Verifies order and key-set preservation of `all`, full key coverage of
//! keyed `race`, and first-settlement-wins semantics, across generated
//! inputs on a deterministic virtual clock.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use coeffect::effect::{all, delay, race, EffectSet};
use coeffect::promise::Promise;
use coeffect::routine::{Callee, Step, Steps, Yielded};
use coeffect::value::Value;
use common::{init_test_logging, test_proptest_config, test_runtime};
use indexmap::IndexMap;
use proptest::prelude::*;

fn arb_values() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(any::<i64>(), 0..16)
}

fn arb_keyed_values() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
        .prop_map(|map| map.into_iter().collect())
}

fn arb_delays() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..1_000, 1..8)
}

/// A coroutine that yields one composite effect and returns its result.
/// Descriptors are consumed exactly once, so the effect rides in a cell.
fn yields_set(effect: coeffect::Effect) -> Callee {
    let effect = Rc::new(RefCell::new(Some(effect)));
    Callee::routine(move |_| {
        let effect = Rc::clone(&effect);
        Steps::new(move |index, input| match index {
            0 => match effect.borrow_mut().take() {
                Some(effect) => Ok(Step::Yield(effect.into())),
                None => Ok(Step::Done(Value::Absent)),
            },
            _ => input.map(Step::Done),
        })
    })
}

proptest! {
    #![proptest_config(test_proptest_config(256))]

    /// `all` over a list resumes with one slot per child, in declared
    /// order, regardless of the values involved.
    #[test]
    fn all_preserves_positional_order(values in arb_values()) {
        init_test_logging();
        let runtime = test_runtime();
        let children: Vec<Yielded> = values
            .iter()
            .map(|n| Yielded::Value(Value::Int(*n)))
            .collect();
        let task = runtime.run(yields_set(all(children)), Vec::new());
        let expected: Vec<Value> = values.into_iter().map(Value::Int).collect();
        prop_assert_eq!(runtime.block_on(&task), Ok(Value::List(expected)));
    }

    /// `all` over a map resumes with exactly the declared key set, in
    /// insertion order.
    #[test]
    fn all_preserves_the_key_set(entries in arb_keyed_values()) {
        init_test_logging();
        let runtime = test_runtime();
        let children: IndexMap<String, Yielded> = entries
            .iter()
            .map(|(key, n)| (key.clone(), Yielded::Value(Value::Int(*n))))
            .collect();
        let task = runtime.run(yields_set(all(EffectSet::Map(children))), Vec::new());
        let result = runtime.block_on(&task);
        let map = match result {
            Ok(Value::Map(map)) => map,
            other => return Err(TestCaseError::fail(format!("expected a map, got {other:?}"))),
        };
        let keys: Vec<&String> = map.keys().collect();
        let expected: Vec<&String> = entries.iter().map(|(key, _)| key).collect();
        prop_assert_eq!(keys, expected);
    }

    /// A keyed `race` over delays resumes with every key present and the
    /// shortest delay as the only winner.
    #[test]
    fn keyed_race_covers_every_key(delays in arb_delays()) {
        init_test_logging();
        let runtime = test_runtime();
        let entries: IndexMap<String, Yielded> = delays
            .iter()
            .enumerate()
            .map(|(i, ms)| (format!("t{i}"), Yielded::Effect(delay(*ms))))
            .collect();
        let key_count = entries.len();
        let task = runtime.run(yields_set(race(EffectSet::Map(entries))), Vec::new());
        let map = match runtime.block_on(&task) {
            Ok(Value::Map(map)) => map,
            other => return Err(TestCaseError::fail(format!("expected a map, got {other:?}"))),
        };
        prop_assert_eq!(map.len(), key_count);

        let shortest = delays.iter().enumerate().min_by_key(|(_, ms)| **ms);
        let (winner, _) = shortest.ok_or_else(|| TestCaseError::fail("empty race"))?;
        for (key, value) in &map {
            if key == &format!("t{winner}") {
                prop_assert_eq!(value, &Value::Unit);
            } else {
                prop_assert_eq!(value, &Value::Absent);
            }
        }
    }

    /// Only the first settlement of a shared promise is observed; later
    /// attempts in either direction are ignored.
    #[test]
    fn settlement_is_first_wins(resolve_first in any::<bool>(), extra in 0usize..4) {
        init_test_logging();
        let (promise, settle) = Promise::pending();
        if resolve_first {
            settle.resolve(Value::Int(1));
        } else {
            settle.reject(coeffect::RuntimeError::fault("first"));
        }
        for _ in 0..extra {
            settle.resolve(Value::Int(2));
            settle.reject(coeffect::RuntimeError::fault("late"));
        }
        let expected = if resolve_first {
            Ok(Value::Int(1))
        } else {
            Err(coeffect::RuntimeError::fault("first"))
        };
        prop_assert_eq!(promise.peek(), Some(expected));
    }
}
