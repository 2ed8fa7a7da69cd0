//! The runtime value model.
//!
//! `Value` is a flat tagged union (per the design notes' guidance to prefer
//! this over a heap-allocated, interface-dispatched representation): small
//! variants are inline, the variants that own unbounded data (`String`,
//! `Slice`, `Map`) share their backing storage behind an `Rc` so cloning a
//! `Value` is always O(1). There is no object graph here that can form a
//! cycle — slices and maps only ever own values, never a parent — so unlike
//! a general-purpose interpreter this needs no heap arena or manual
//! reference counting to stay leak-free; `Rc`'s ordinary drop glue suffices.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Node;
use crate::error::{ErrorKind, RunError};
use crate::types::{TypeInfo, TypeKind};

pub type SliceMap = IndexMap<String, Value, ahash::RandomState>;

/// The expected-result-type coercion applied after `run`/`eval` (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Coercion {
    AsInt,
    AsString,
    AsFloat,
    AsBool,
    AsAny,
}

/// The central sum type evaluated by the VM.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Slice(Rc<Vec<Value>>, Rc<TypeInfo>),
    Map(Rc<SliceMap>, Rc<TypeInfo>, Rc<TypeInfo>),
    /// A lambda literal: `(x, y) => body`, or a pipeline-callback thunk
    /// captured from an argument mentioning `#`. Never first-class from
    /// user syntax — only ever produced by the compiler as a constant.
    Func(Rc<Vec<String>>, Rc<Node>),
    /// The pipeline current-element marker. Never appears as a real
    /// runtime value outside of `#` desugaring in the AST; kept as a
    /// variant so `Value` stays the single currency the VM deals in.
    Placeholder,
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    #[must_use]
    pub fn slice(elements: Vec<Value>) -> Self {
        let elem_type = infer_elem_type(&elements);
        Self::Slice(Rc::new(elements), Rc::new(elem_type))
    }

    #[must_use]
    pub fn map(entries: SliceMap) -> Self {
        let key_type = TypeInfo::string();
        let val_type = infer_val_type(&entries);
        Self::Map(Rc::new(entries), Rc::new(key_type), Rc::new(val_type))
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Nil => TypeKind::Nil,
            Self::Bool(_) => TypeKind::Bool,
            Self::Int(_) => TypeKind::Int,
            Self::Float(_) => TypeKind::Float,
            Self::String(_) => TypeKind::String,
            Self::Slice(..) => TypeKind::Slice,
            Self::Map(..) => TypeKind::Map,
            Self::Func(..) => TypeKind::Func,
            Self::Placeholder => TypeKind::Any,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Slice(..) => "slice",
            Self::Map(..) => "map",
            Self::Func(..) => "func",
            Self::Placeholder => "placeholder",
        }
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Python/Go-style truthiness used by `if`-less constructs such as
    /// `filter`'s predicate result and `&&`/`||`/`!` operands (which the
    /// checker restricts to `bool`, but builtins accept any truthy value
    /// for the predicate thunk's result).
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Slice(s, _) => !s.is_empty(),
            Self::Map(m, _, _) => !m.is_empty(),
            Self::Func(..) | Self::Placeholder => true,
        }
    }

    fn type_mismatch(op: &str, a: &Value, b: &Value) -> RunError {
        RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("unsupported operand types for {op}: '{}' and '{}'", a.type_name(), b.type_name()),
        )
    }

    pub fn add(&self, other: &Value) -> Result<Value, RunError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::String(a), Value::String(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::string(s))
            }
            _ => Err(Self::type_mismatch("+", self, other)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, RunError> {
        self.numeric_op(other, "-", |a, b| a.checked_sub(b).map(Value::Int).unwrap_or(Value::Float(a as f64 - b as f64)), |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value, RunError> {
        self.numeric_op(other, "*", |a, b| Value::Int(a.wrapping_mul(b)), |a, b| a * b)
    }

    pub fn div(&self, other: &Value) -> Result<Value, RunError> {
        if other.is_zero() {
            return Err(RunError::new(ErrorKind::DivisionByZero, None, "division by zero"));
        }
        self.numeric_op(
            other,
            "/",
            |a, b| {
                if a % b == 0 {
                    Value::Int(a / b)
                } else {
                    Value::Float(a as f64 / b as f64)
                }
            },
            |a, b| a / b,
        )
    }

    pub fn modulo(&self, other: &Value) -> Result<Value, RunError> {
        if other.is_zero() {
            return Err(RunError::new(ErrorKind::DivisionByZero, None, "modulo by zero"));
        }
        self.numeric_op(other, "%", |a, b| Value::Int(a.rem_euclid(b)), |a, b| a % b)
    }

    pub fn pow(&self, other: &Value) -> Result<Value, RunError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => Ok(Value::Int(a.pow(*b as u32))),
            _ => {
                let a = self.as_f64().ok_or_else(|| Self::type_mismatch("**", self, other))?;
                let b = other.as_f64().ok_or_else(|| Self::type_mismatch("**", self, other))?;
                Ok(Value::Float(a.powf(b)))
            }
        }
    }

    pub fn neg(&self) -> Result<Value, RunError> {
        match self {
            Value::Int(a) => Ok(Value::Int(-a)),
            Value::Float(a) => Ok(Value::Float(-a)),
            _ => Err(RunError::new(
                ErrorKind::TypeMismatch,
                None,
                format!("bad operand type for unary -: '{}'", self.type_name()),
            )),
        }
    }

    pub fn not(&self) -> Result<Value, RunError> {
        match self {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(RunError::new(
                ErrorKind::TypeMismatch,
                None,
                format!("bad operand type for !: '{}'", self.type_name()),
            )),
        }
    }

    pub fn bit_not(&self) -> Result<Value, RunError> {
        match self {
            Value::Int(a) => Ok(Value::Int(!a)),
            _ => Err(RunError::new(
                ErrorKind::TypeMismatch,
                None,
                format!("bad operand type for ~: '{}'", self.type_name()),
            )),
        }
    }

    fn numeric_op(
        &self,
        other: &Value,
        op: &str,
        int_op: impl FnOnce(i64, i64) -> Value,
        float_op: impl FnOnce(f64, f64) -> Value,
    ) -> Result<Value, RunError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(int_op(*a, *b)),
            (Value::Float(a), Value::Float(b)) => Ok(float_op(*a, *b)),
            (Value::Int(a), Value::Float(b)) => Ok(float_op(*a as f64, *b)),
            (Value::Float(a), Value::Int(b)) => Ok(float_op(*a, *b as f64)),
            _ => Err(Self::type_mismatch(op, self, other)),
        }
    }

    fn is_zero(&self) -> bool {
        matches!(self, Value::Int(0)) || matches!(self, Value::Float(f) if *f == 0.0)
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Applies an expected-result-type coercion after `run`/`eval` returns
    /// (§6.1: `AsInt|AsString|AsFloat|AsBool|AsAny`). Unlike the `ToInt`/
    /// `ToFloat`/`ToBool`/`ToString` opcodes (which this mirrors), this
    /// runs once at the public API boundary rather than mid-program.
    pub fn coerce(self, to: Coercion) -> Result<Value, RunError> {
        match to {
            Coercion::AsAny => Ok(self),
            Coercion::AsInt => match self {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Int(f as i64)),
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| RunError::new(ErrorKind::TypeMismatch, None, format!("cannot coerce {s:?} to int"))),
                other => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("cannot coerce '{}' to int", other.type_name()))),
            },
            Coercion::AsFloat => match self {
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| RunError::new(ErrorKind::TypeMismatch, None, format!("cannot coerce {s:?} to float"))),
                other => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("cannot coerce '{}' to float", other.type_name()))),
            },
            Coercion::AsBool => match &self {
                Value::String(s) => match s.to_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(RunError::new(ErrorKind::TypeMismatch, None, format!("cannot coerce {s:?} to bool"))),
                },
                other => Ok(Value::Bool(other.truthy())),
            },
            Coercion::AsString => Ok(Value::string(self.to_string())),
        }
    }

    /// Structural equality per §3.1: same-variant structural equality,
    /// plus the two explicit cross-variant exceptions. This is what the
    /// `Equal`/`NotEqual` opcodes use, and what `contains`/`unique`/
    /// `groupBy` key comparisons use.
    #[must_use]
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Slice(a, _), Value::Slice(b, _)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Value::Map(a, _, _), Value::Map(b, _, _)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| v.value_eq(bv)))
            }
            _ => false,
        }
    }

    /// Ordering for `GreaterThan`/`GreaterEqual`. Numeric pairs use
    /// promotion; strings compare lexicographically; anything else is a
    /// `TypeMismatch`.
    pub fn compare(&self, other: &Value) -> Result<Ordering, RunError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| Self::type_mismatch("compare", self, other)),
                _ => Err(Self::type_mismatch("compare", self, other)),
            },
        }
    }
}

/// Descriptive-hint inference for freshly built slices/maps (elem_type is
/// not a constraint — see §3.1 — so this is best-effort and only used for
/// `type()`/display purposes, never to reject a heterogeneous collection).
fn infer_elem_type(elements: &[Value]) -> TypeInfo {
    let mut iter = elements.iter();
    let Some(first) = iter.next() else {
        return TypeInfo::any();
    };
    let mut kind = first.kind();
    for el in iter {
        if el.kind() != kind {
            kind = TypeKind::Any;
            break;
        }
    }
    TypeInfo::simple(kind)
}

fn infer_val_type(entries: &SliceMap) -> TypeInfo {
    let mut iter = entries.values();
    let Some(first) = iter.next() else {
        return TypeInfo::any();
    };
    let mut kind = first.kind();
    for v in iter {
        if v.kind() != kind {
            kind = TypeKind::Any;
            break;
        }
    }
    TypeInfo::simple(kind)
}

/// Strict structural equality (same-variant only, bitwise for floats) used
/// internally by the constant pool to de-duplicate literals. This is
/// deliberately stricter than [`Value::value_eq`]: `Int(5)` and `Float(5.0)`
/// must NOT collapse into one constant pool slot even though they compare
/// equal under the language's `==` operator.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Placeholder, Value::Placeholder) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Slice(a, _), Value::Slice(b, _)) => a == b,
            (Value::Map(a, _, _), Value::Map(b, _, _)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Func(a, ab), Value::Func(b, bb)) => a == b && Rc::ptr_eq(ab, bb),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil | Value::Placeholder => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Slice(elements, _) => {
                for e in elements.iter() {
                    e.hash(state);
                }
            }
            Value::Map(entries, _, _) => {
                // Order-independent: fold entry hashes instead of feeding
                // them in sequence, since map equality ignores order.
                let mut acc: u64 = 0;
                for (k, v) in entries.iter() {
                    let mut h = ahash::AHasher::default();
                    k.hash(&mut h);
                    v.hash(&mut h);
                    acc ^= h.finish();
                }
                acc.hash(state);
            }
            Value::Func(params, body) => {
                params.hash(state);
                (Rc::as_ptr(body) as usize).hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Slice(elements, _) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e.repr())?;
                }
                write!(f, "]")
            }
            Value::Map(entries, _, _) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {}", v.repr())?;
                }
                write!(f, "}}")
            }
            Value::Func(params, _) => write!(f, "<func({})>", params.join(", ")),
            Value::Placeholder => write!(f, "#"),
        }
    }
}

impl Value {
    /// Display form used when a `Value` is itself nested inside another
    /// `Value`'s `Display` impl (strings get quoted).
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_as_int_parses_trimmed_string() {
        let got = Value::string("  42 ").coerce(Coercion::AsInt).unwrap();
        assert_eq!(got, Value::Int(42));
    }

    #[test]
    fn coerce_as_float_truncates_to_int() {
        let got = Value::Float(3.9).coerce(Coercion::AsInt).unwrap();
        assert_eq!(got, Value::Int(3));
    }

    #[test]
    fn coerce_as_bool_rejects_non_true_false_string() {
        assert!(Value::string("maybe").coerce(Coercion::AsBool).is_err());
        assert_eq!(Value::string("true").coerce(Coercion::AsBool).unwrap(), Value::Bool(true));
    }

    #[test]
    fn coerce_as_any_is_identity() {
        let v = Value::Int(7);
        assert_eq!(v.clone().coerce(Coercion::AsAny).unwrap(), v);
    }
}
