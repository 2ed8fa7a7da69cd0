//! Numeric free builtins: `abs, max, min, ceil, floor, round, sqrt, pow,
//! now, sum, avg`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ErrorKind, RunError};
use crate::value::Value;

fn want_numeric(v: &Value, who: &str) -> Result<f64, RunError> {
    v.as_f64().ok_or_else(|| {
        RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("{who}() expects a numeric argument, got '{}'", v.type_name()),
        )
    })
}

pub fn builtin_abs(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("abs() expects a numeric argument, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_max(args: &[Value]) -> Result<Value, RunError> {
    extremum(args, |o| o == std::cmp::Ordering::Greater)
}

pub fn builtin_min(args: &[Value]) -> Result<Value, RunError> {
    extremum(args, |o| o == std::cmp::Ordering::Less)
}

/// `max`/`min` accept either a single slice argument or a variadic list of
/// scalar arguments, so both `max(1, 2, 3)` and `[1,2,3] | max` work.
fn extremum(args: &[Value], keep_if: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, RunError> {
    let items: Vec<Value> = if args.len() == 1 {
        match &args[0] {
            Value::Slice(elements, _) => elements.as_ref().clone(),
            other => vec![other.clone()],
        }
    } else {
        args.to_vec()
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(RunError::new(ErrorKind::ArityError, None, "max()/min() requires at least one element"));
    };
    for item in iter {
        if keep_if(item.compare(&best)?) {
            best = item;
        }
    }
    Ok(best)
}

pub fn builtin_ceil(v: &Value) -> Result<Value, RunError> {
    Ok(Value::Int(want_numeric(v, "ceil")?.ceil() as i64))
}

pub fn builtin_floor(v: &Value) -> Result<Value, RunError> {
    Ok(Value::Int(want_numeric(v, "floor")?.floor() as i64))
}

pub fn builtin_round(v: &Value) -> Result<Value, RunError> {
    Ok(Value::Int(want_numeric(v, "round")?.round() as i64))
}

pub fn builtin_sqrt(v: &Value) -> Result<Value, RunError> {
    Ok(Value::Float(want_numeric(v, "sqrt")?.sqrt()))
}

pub fn builtin_pow(base: &Value, exp: &Value) -> Result<Value, RunError> {
    base.pow(exp)
}

pub fn builtin_now() -> Result<Value, RunError> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RunError::new(ErrorKind::TypeMismatch, None, "system clock before UNIX epoch"))?
        .as_secs_f64();
    Ok(Value::Float(secs))
}

/// Open Question (1): `sum` is numeric-only, promoting to `Float` when any
/// element is a `Float`. No dual registration with differing semantics.
pub fn builtin_sum(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "sum")?;
    let mut int_acc: i64 = 0;
    let mut float_acc: f64 = 0.0;
    let mut saw_float = false;
    for el in elements.iter() {
        match el {
            Value::Int(i) => {
                int_acc = int_acc.wrapping_add(*i);
                float_acc += *i as f64;
            }
            Value::Float(f) => {
                saw_float = true;
                float_acc += f;
            }
            _ => {
                return Err(RunError::new(
                    ErrorKind::TypeMismatch,
                    None,
                    format!("sum() expects a slice of numbers, found '{}'", el.type_name()),
                ))
            }
        }
    }
    Ok(if saw_float { Value::Float(float_acc) } else { Value::Int(int_acc) })
}

pub fn builtin_avg(v: &Value) -> Result<Value, RunError> {
    let elements = want_slice(v, "avg")?;
    if elements.is_empty() {
        return Err(RunError::new(ErrorKind::DivisionByZero, None, "avg() of an empty slice"));
    }
    let sum = builtin_sum(v)?;
    let n = elements.len() as f64;
    match sum {
        Value::Int(i) => Ok(Value::Float(i as f64 / n)),
        Value::Float(f) => Ok(Value::Float(f / n)),
        _ => unreachable!("builtin_sum only returns Int or Float"),
    }
}

/// `sign()` type method (§4.7's per-type numeric methods): -1/0/1 for an
/// int, preserving float-ness for a float receiver.
pub fn builtin_sign(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.signum())),
        Value::Float(f) => Ok(Value::Float(if *f > 0.0 {
            1.0
        } else if *f < 0.0 {
            -1.0
        } else {
            0.0
        })),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("sign() expects a numeric argument, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_is_nan(v: &Value) -> Result<Value, RunError> {
    Ok(Value::Bool(want_numeric(v, "isNaN")?.is_nan()))
}

pub fn builtin_is_inf(v: &Value) -> Result<Value, RunError> {
    Ok(Value::Bool(want_numeric(v, "isInf")?.is_infinite()))
}

/// `clamp(lo, hi)`: receiver and both bounds must be numeric; float-promotes
/// if any of the three is a `Float`, matching arithmetic promotion elsewhere.
pub fn builtin_clamp(v: &Value, lo: &Value, hi: &Value) -> Result<Value, RunError> {
    let x = want_numeric(v, "clamp")?;
    let lo_f = want_numeric(lo, "clamp")?;
    let hi_f = want_numeric(hi, "clamp")?;
    let clamped = x.clamp(lo_f, hi_f);
    if matches!(v, Value::Float(_)) || matches!(lo, Value::Float(_)) || matches!(hi, Value::Float(_)) {
        Ok(Value::Float(clamped))
    } else {
        Ok(Value::Int(clamped as i64))
    }
}

pub fn builtin_factorial(v: &Value) -> Result<Value, RunError> {
    let Value::Int(n) = v else {
        return Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("factorial() expects an int, got '{}'", v.type_name()),
        ));
    };
    if *n < 0 {
        return Err(RunError::new(ErrorKind::TypeMismatch, None, "factorial() of a negative number"));
    }
    let mut acc: i64 = 1;
    for i in 2..=*n {
        acc = acc.checked_mul(i).ok_or_else(|| RunError::new(ErrorKind::TypeMismatch, None, "factorial() overflow"))?;
    }
    Ok(Value::Int(acc))
}

pub fn builtin_is_prime(v: &Value) -> Result<Value, RunError> {
    let Value::Int(n) = v else {
        return Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("isPrime() expects an int, got '{}'", v.type_name()),
        ));
    };
    let n = *n;
    if n < 2 {
        return Ok(Value::Bool(false));
    }
    let mut d = 2i64;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            return Ok(Value::Bool(false));
        }
        d += 1;
    }
    Ok(Value::Bool(true))
}

pub fn builtin_is_even(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Int(i) => Ok(Value::Bool(i % 2 == 0)),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("isEven() expects an int, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_is_odd(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Int(i) => Ok(Value::Bool(i % 2 != 0)),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("isOdd() expects an int, got '{}'", v.type_name()),
        )),
    }
}

fn want_slice<'a>(v: &'a Value, who: &str) -> Result<&'a std::rc::Rc<Vec<Value>>, RunError> {
    match v {
        Value::Slice(elements, _) => Ok(elements),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("{who}() expects a slice, got '{}'", v.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_promotes_to_float_when_any_float_present() {
        let v = Value::slice(vec![Value::Int(1), Value::Float(2.5), Value::Int(3)]);
        assert_eq!(builtin_sum(&v).unwrap(), Value::Float(6.5));
    }

    #[test]
    fn sum_stays_int_when_all_int() {
        let v = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(builtin_sum(&v).unwrap(), Value::Int(6));
    }

    #[test]
    fn max_over_variadic_args() {
        let got = builtin_max(&[Value::Int(3), Value::Int(9), Value::Int(5)]).unwrap();
        assert_eq!(got, Value::Int(9));
    }

    #[test]
    fn factorial_of_small_int() {
        assert_eq!(builtin_factorial(&Value::Int(5)).unwrap(), Value::Int(120));
    }

    #[test]
    fn is_prime_basic_cases() {
        assert_eq!(builtin_is_prime(&Value::Int(7)).unwrap(), Value::Bool(true));
        assert_eq!(builtin_is_prime(&Value::Int(1)).unwrap(), Value::Bool(false));
        assert_eq!(builtin_is_prime(&Value::Int(9)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn clamp_promotes_to_float_if_any_bound_is_float() {
        let got = builtin_clamp(&Value::Int(5), &Value::Int(0), &Value::Float(3.0)).unwrap();
        assert_eq!(got, Value::Float(3.0));
    }
}
