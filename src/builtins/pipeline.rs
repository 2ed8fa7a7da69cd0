//! The handful of builtins that need to re-enter the VM to evaluate a
//! thunk argument per element: `groupBy`'s key thunk, `all`/`any`'s
//! predicate. `filter`/`map`/`reduce` do NOT live here — they compile to
//! their own dedicated opcodes (§6.3) and are handled directly by the VM's
//! dispatch loop, never by `Builtin::call`.

use crate::error::{ErrorKind, RunError};
use crate::value::{SliceMap, Value};
use crate::vm::Vm;

fn want_slice<'a>(v: &'a Value, who: &str) -> Result<&'a [Value], RunError> {
    match v {
        Value::Slice(elements, _) => Ok(elements),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("{who}() expects a slice, got '{}'", v.type_name()),
        )),
    }
}

/// `groupBy(coll, keyThunk)`: buckets elements by the string form of
/// `keyThunk`'s result (Open Question 2: an explicit key-producing thunk,
/// not truthiness-based grouping). Bucket order follows first-occurrence
/// order of each key, matching `Value::Map`'s insertion-ordered backing.
pub fn builtin_group_by(vm: &mut Vm, coll: &Value, key_thunk: &Value) -> Result<Value, RunError> {
    let elements = want_slice(coll, "groupBy")?;
    let mut buckets: SliceMap = SliceMap::default();
    for el in elements {
        let key = vm.eval_thunk(key_thunk, el.clone())?;
        let key = key.to_string();
        match buckets.get_mut(&key) {
            Some(Value::Slice(existing, _)) => {
                let mut grown = existing.as_ref().clone();
                grown.push(el.clone());
                buckets.insert(key, Value::slice(grown));
            }
            _ => {
                buckets.insert(key, Value::slice(vec![el.clone()]));
            }
        }
    }
    Ok(Value::map(buckets))
}

/// `all(coll, predicateThunk)`: true iff every element's predicate result
/// is truthy. Short-circuits on the first falsy result.
pub fn builtin_all(vm: &mut Vm, coll: &Value, predicate_thunk: &Value) -> Result<Value, RunError> {
    let elements = want_slice(coll, "all")?;
    for el in elements {
        if !vm.eval_thunk(predicate_thunk, el.clone())?.truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// `any(coll, predicateThunk)`: true iff at least one element's predicate
/// result is truthy. Short-circuits on the first truthy result.
pub fn builtin_any(vm: &mut Vm, coll: &Value, predicate_thunk: &Value) -> Result<Value, RunError> {
    let elements = want_slice(coll, "any")?;
    for el in elements {
        if vm.eval_thunk(predicate_thunk, el.clone())?.truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}
