//! Conversion and introspection free builtins: `string, int, float, bool,
//! type, debug`.

use crate::error::{ErrorKind, RunError};
use crate::value::Value;

pub fn builtin_string(v: &Value) -> Result<Value, RunError> {
    Ok(Value::string(v.to_string()))
}

pub fn builtin_int(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| RunError::new(ErrorKind::TypeMismatch, None, format!("int(): cannot parse {s:?} as int"))),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("int() expects a numeric, bool, or string argument, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_float(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RunError::new(ErrorKind::TypeMismatch, None, format!("float(): cannot parse {s:?} as float"))),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("float() expects a numeric, bool, or string argument, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_bool(v: &Value) -> Result<Value, RunError> {
    match v {
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("bool(): cannot parse {s:?} as bool"))),
        },
        other => Ok(Value::Bool(other.truthy())),
    }
}

pub fn builtin_type(v: &Value) -> Result<Value, RunError> {
    Ok(Value::string(v.type_name()))
}

pub fn builtin_debug(v: &Value) -> Result<Value, RunError> {
    eprintln!("debug: {}", v.repr());
    Ok(v.clone())
}
