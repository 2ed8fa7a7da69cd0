//! Collection free builtins: `len, contains, indexOf, flatten, sort,
//! reverse, take, skip, unique, first, last, keys`.

use crate::error::{ErrorKind, RunError};
use crate::value::Value;

pub fn builtin_len(v: &Value) -> Result<Value, RunError> {
    let n = match v {
        Value::String(s) => s.chars().count(),
        Value::Slice(elements, _) => elements.len(),
        Value::Map(entries, _, _) => entries.len(),
        _ => {
            return Err(RunError::new(
                ErrorKind::TypeMismatch,
                None,
                format!("object of type '{}' has no len()", v.type_name()),
            ))
        }
    };
    Ok(Value::Int(n as i64))
}

pub fn builtin_contains(coll: &Value, needle: &Value) -> Result<Value, RunError> {
    let found = match coll {
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_ref()),
            _ => {
                return Err(RunError::new(
                    ErrorKind::TypeMismatch,
                    None,
                    "contains() on a string expects a string needle",
                ))
            }
        },
        Value::Slice(elements, _) => elements.iter().any(|e| e.value_eq(needle)),
        Value::Map(entries, _, _) => match needle {
            Value::String(k) => entries.contains_key(k.as_ref()),
            _ => false,
        },
        _ => {
            return Err(RunError::new(
                ErrorKind::TypeMismatch,
                None,
                format!("contains() expects a string, slice, or map, got '{}'", coll.type_name()),
            ))
        }
    };
    Ok(Value::Bool(found))
}

pub fn builtin_index_of(coll: &Value, needle: &Value) -> Result<Value, RunError> {
    match coll {
        Value::String(s) => {
            let Value::String(n) = needle else {
                return Err(RunError::new(ErrorKind::TypeMismatch, None, "indexOf() on a string expects a string needle"));
            };
            let idx = s.find(n.as_ref()).map_or(-1, |byte_idx| s[..byte_idx].chars().count() as i64);
            Ok(Value::Int(idx))
        }
        Value::Slice(elements, _) => {
            let idx = elements.iter().position(|e| e.value_eq(needle)).map_or(-1, |i| i as i64);
            Ok(Value::Int(idx))
        }
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("indexOf() expects a string or slice, got '{}'", coll.type_name()),
        )),
    }
}

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

pub fn builtin_flatten(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "flatten")?;
    let mut out = Vec::with_capacity(elements.len());
    for el in elements {
        match el {
            Value::Slice(inner, _) => out.extend(inner.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::slice(out))
}

pub fn builtin_sort(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "sort")?;
    let mut out = elements.to_vec();
    let mut err = None;
    out.sort_by(|a, b| match a.compare(b) {
        Ok(ord) => ord,
        Err(e) => {
            if err.is_none() {
                err = Some(e);
            }
            std::cmp::Ordering::Equal
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(Value::slice(out))
}

pub fn builtin_reverse(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "reverse")?;
    let mut out = elements.to_vec();
    out.reverse();
    Ok(Value::slice(out))
}

fn want_count(v: &Value, who: &str) -> Result<usize, RunError> {
    match v {
        Value::Int(i) if *i >= 0 => Ok(*i as usize),
        Value::Int(_) => Ok(0),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("{who}() expects a non-negative integer count, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_take(v: &Value, n: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "take")?;
    let n = want_count(n, "take")?.min(elements.len());
    Ok(Value::slice(elements[..n].to_vec()))
}

pub fn builtin_skip(v: &Value, n: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "skip")?;
    let n = want_count(n, "skip")?.min(elements.len());
    Ok(Value::slice(elements[n..].to_vec()))
}

/// Preserves first occurrence order, per the ordering guarantees (§5).
pub fn builtin_unique(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "unique")?;
    let mut out: Vec<Value> = Vec::with_capacity(elements.len());
    for el in elements {
        if !out.iter().any(|seen| seen.value_eq(el)) {
            out.push(el.clone());
        }
    }
    Ok(Value::slice(out))
}

pub fn builtin_first(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "first")?;
    elements.first().cloned().ok_or_else(|| RunError::new(ErrorKind::IndexOutOfRange, None, "first() of an empty slice"))
}

pub fn builtin_last(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "last")?;
    elements.last().cloned().ok_or_else(|| RunError::new(ErrorKind::IndexOutOfRange, None, "last() of an empty slice"))
}

pub fn builtin_keys(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Map(entries, ..) => Ok(Value::slice(entries.keys().map(Value::string).collect())),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("keys() expects a map, got '{}'", v.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_preserves_first_occurrence_order() {
        let v = Value::slice(vec![Value::Int(3), Value::Int(1), Value::Int(3), Value::Int(2), Value::Int(1)]);
        let got = builtin_unique(&v).unwrap();
        assert_eq!(got, Value::slice(vec![Value::Int(3), Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn index_of_missing_returns_negative_one() {
        let v = Value::slice(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(builtin_index_of(&v, &Value::Int(9)).unwrap(), Value::Int(-1));
    }

    #[test]
    fn flatten_one_level() {
        let v = Value::slice(vec![
            Value::slice(vec![Value::Int(1), Value::Int(2)]),
            Value::Int(3),
            Value::slice(vec![Value::Int(4)]),
        ]);
        assert_eq!(
            builtin_flatten(&v).unwrap(),
            Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])
        );
    }
}
