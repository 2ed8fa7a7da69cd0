//! Per-type methods (§4.7): `value.method(args...)` syntax, modeled by the
//! parser as `Call{callee: Member{object, property}, args}` rather than a
//! dedicated AST node (§4.2). Unlike free builtins, which opcode is emitted
//! for a method call isn't known until the receiver's runtime type is
//! known, so the compiler emits a generic `Member` + `Call` pair and the
//! VM resolves the method name against the receiver's kind at call time.
//!
//! Most methods here are simply the same free-function behavior as the
//! builtin of the same name, reachable from an instance receiver instead
//! of a first positional argument; they are implemented by delegating to
//! the category modules rather than duplicating logic.

use std::fmt;

use crate::error::{ErrorKind, RunError};
use crate::types::TypeKind;
use crate::value::Value;

use super::{collection, conv, numeric, stringy};

/// A per-type method, resolved by name against a receiver's `TypeKind`.
/// Unlike [`super::Builtin`], this is not a wire contract — method
/// dispatch happens purely by name lookup at call time, so there is no
/// fixed ordering requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeMethod {
    Length,
    Upper,
    Lower,
    Trim,
    StartsWith,
    EndsWith,
    Replace,
    Substring,
    Split,
    Contains,
    IndexOf,
    First,
    Last,
    Reverse,
    Sort,
    Take,
    Skip,
    Unique,
    Flatten,
    Keys,
    Values,
    Get,
    Size,
    Has,
    ToString,
    ToInt,
    ToFloat,
    Abs,
    Sign,
    Round,
    Ceil,
    Floor,
    IsNaN,
    IsInf,
    Clamp,
    Factorial,
    IsPrime,
    IsEven,
    IsOdd,
    Not,
    And,
    Or,
}

impl fmt::Display for TypeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Looks up `name` as a method available on receivers of `kind`. Returns
/// `None` for an unknown name or one not defined for that type, letting
/// the caller raise `NoSuchMethod` with the receiver's own type in the
/// message.
#[must_use]
pub fn type_method(kind: TypeKind, name: &str) -> Option<TypeMethod> {
    use TypeKind::*;
    use TypeMethod::*;
    let m = match name {
        "length" => Length,
        "upper" if kind == String => Upper,
        "lower" if kind == String => Lower,
        "trim" if kind == String => Trim,
        "startsWith" if kind == String => StartsWith,
        "endsWith" if kind == String => EndsWith,
        "replace" if kind == String => Replace,
        "substring" if kind == String => Substring,
        "split" if kind == String => Split,
        "contains" if matches!(kind, String | Slice | Map) => Contains,
        "indexOf" if matches!(kind, String | Slice) => IndexOf,
        "first" if kind == Slice => First,
        "last" if kind == Slice => Last,
        "reverse" if kind == Slice => Reverse,
        "sort" if kind == Slice => Sort,
        "take" if kind == Slice => Take,
        "skip" if kind == Slice => Skip,
        "unique" if kind == Slice => Unique,
        "flatten" if kind == Slice => Flatten,
        "keys" if kind == Map => Keys,
        "values" if kind == Map => Values,
        "get" if kind == Map => Get,
        "size" if kind == Map => Size,
        "has" if matches!(kind, Map | Slice | String) => Has,
        "toString" => ToString,
        "toInt" if matches!(kind, Int | Float | Bool | String) => ToInt,
        "toFloat" if matches!(kind, Int | Float | Bool | String) => ToFloat,
        "abs" if matches!(kind, Int | Float) => Abs,
        "sign" if matches!(kind, Int | Float) => Sign,
        "round" if matches!(kind, Int | Float) => Round,
        "ceil" if matches!(kind, Int | Float) => Ceil,
        "floor" if matches!(kind, Int | Float) => Floor,
        "isNaN" if kind == Float => IsNaN,
        "isInf" if kind == Float => IsInf,
        "clamp" if matches!(kind, Int | Float) => Clamp,
        "factorial" if kind == Int => Factorial,
        "isPrime" if kind == Int => IsPrime,
        "isEven" if kind == Int => IsEven,
        "isOdd" if kind == Int => IsOdd,
        "not" if kind == Bool => Not,
        "and" if kind == Bool => And,
        "or" if kind == Bool => Or,
        _ => return None,
    };
    // `length` is only meaningful on the container/text types.
    if matches!(m, Length) && !matches!(kind, String | Slice | Map) {
        return None;
    }
    Some(m)
}

impl TypeMethod {
    pub fn call(self, receiver: &Value, args: &[Value]) -> Result<Value, RunError> {
        let arity_err = |want: usize| {
            RunError::new(
                ErrorKind::ArityError,
                None,
                format!("{self}() takes {want} argument(s), got {}", args.len()),
            )
        };
        use TypeMethod::*;
        match self {
            Length => collection::builtin_len(receiver),
            Upper => stringy::builtin_upper(receiver),
            Lower => stringy::builtin_lower(receiver),
            Trim => stringy::builtin_trim(receiver),
            StartsWith => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                stringy::builtin_starts_with(receiver, &args[0])
            }
            EndsWith => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                stringy::builtin_ends_with(receiver, &args[0])
            }
            Replace => {
                if args.len() != 2 {
                    return Err(arity_err(2));
                }
                stringy::builtin_replace(receiver, &args[0], &args[1])
            }
            Substring => {
                if args.len() != 2 {
                    return Err(arity_err(2));
                }
                stringy::builtin_substring(receiver, &args[0], &args[1])
            }
            Split => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                stringy::builtin_split(receiver, &args[0])
            }
            Contains => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                collection::builtin_contains(receiver, &args[0])
            }
            IndexOf => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                collection::builtin_index_of(receiver, &args[0])
            }
            First => collection::builtin_first(receiver),
            Last => collection::builtin_last(receiver),
            Reverse => collection::builtin_reverse(receiver),
            Sort => collection::builtin_sort(receiver),
            Take => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                collection::builtin_take(receiver, &args[0])
            }
            Skip => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                collection::builtin_skip(receiver, &args[0])
            }
            Unique => collection::builtin_unique(receiver),
            Flatten => collection::builtin_flatten(receiver),
            Keys => collection::builtin_keys(receiver),
            Values => match receiver {
                Value::Map(entries, ..) => Ok(Value::slice(entries.values().cloned().collect())),
                _ => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("values() expects a map, got '{}'", receiver.type_name()))),
            },
            Get => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                match (receiver, &args[0]) {
                    (Value::Map(entries, ..), Value::String(k)) => Ok(entries.get(k.as_ref()).cloned().unwrap_or(Value::Nil)),
                    (Value::Map(..), _) => Err(RunError::new(ErrorKind::TypeMismatch, None, "get() expects a string key")),
                    _ => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("get() expects a map, got '{}'", receiver.type_name()))),
                }
            }
            Size => collection::builtin_len(receiver),
            Has => match receiver {
                Value::Map(..) | Value::Slice(..) | Value::String(_) => {
                    if args.len() != 1 {
                        return Err(arity_err(1));
                    }
                    collection::builtin_contains(receiver, &args[0])
                }
                _ => Err(RunError::new(
                    ErrorKind::NoSuchMethod,
                    None,
                    format!("'{}' has no method has()", receiver.type_name()),
                )),
            },
            ToString => conv::builtin_string(receiver),
            ToInt => conv::builtin_int(receiver),
            ToFloat => conv::builtin_float(receiver),
            Abs => numeric::builtin_abs(receiver),
            Round => numeric::builtin_round(receiver),
            Ceil => numeric::builtin_ceil(receiver),
            Floor => numeric::builtin_floor(receiver),
            Sign => numeric::builtin_sign(receiver),
            IsNaN => numeric::builtin_is_nan(receiver),
            IsInf => numeric::builtin_is_inf(receiver),
            Clamp => {
                if args.len() != 2 {
                    return Err(arity_err(2));
                }
                numeric::builtin_clamp(receiver, &args[0], &args[1])
            }
            Factorial => numeric::builtin_factorial(receiver),
            IsPrime => numeric::builtin_is_prime(receiver),
            IsEven => numeric::builtin_is_even(receiver),
            IsOdd => numeric::builtin_is_odd(receiver),
            Not => match receiver {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                _ => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("not() expects a bool, got '{}'", receiver.type_name()))),
            },
            And => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                match (receiver, &args[0]) {
                    (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
                    _ => Err(RunError::new(ErrorKind::TypeMismatch, None, "and() expects a bool argument")),
                }
            }
            Or => {
                if args.len() != 1 {
                    return Err(arity_err(1));
                }
                match (receiver, &args[0]) {
                    (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
                    _ => Err(RunError::new(ErrorKind::TypeMismatch, None, "or() expects a bool argument")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_resolves_on_string_slice_map_only() {
        assert_eq!(type_method(TypeKind::String, "length"), Some(TypeMethod::Length));
        assert_eq!(type_method(TypeKind::Int, "length"), None);
    }

    #[test]
    fn upper_only_resolves_on_string() {
        assert_eq!(type_method(TypeKind::String, "upper"), Some(TypeMethod::Upper));
        assert_eq!(type_method(TypeKind::Slice, "upper"), None);
    }

    #[test]
    fn clamp_call_clamps_receiver() {
        let got = TypeMethod::Clamp.call(&Value::Int(10), &[Value::Int(0), Value::Int(5)]).unwrap();
        assert_eq!(got, Value::Int(5));
    }

    #[test]
    fn bool_and_or_not_methods() {
        assert_eq!(TypeMethod::Not.call(&Value::Bool(true), &[]).unwrap(), Value::Bool(false));
        assert_eq!(TypeMethod::And.call(&Value::Bool(true), &[Value::Bool(false)]).unwrap(), Value::Bool(false));
        assert_eq!(TypeMethod::Or.call(&Value::Bool(false), &[Value::Bool(true)]).unwrap(), Value::Bool(true));
    }
}
