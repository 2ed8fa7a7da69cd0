//! Type descriptors used by the checker and the adapter.
//!
//! `TypeInfo` is a compile-time-only artifact: the VM never inspects it,
//! only the runtime variant tag of a [`crate::value::Value`]. It exists so
//! the checker can reject ill-typed programs before a single opcode runs.

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TypeKind {
    Any,
    Nil,
    Bool,
    Int,
    Float,
    String,
    Slice,
    Map,
    Func,
}

/// A field on a struct-shaped adapter-provided type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeInfo,
}

/// A type descriptor: kind plus whatever structural detail the checker
/// needs to validate indexing, member access, and operator use.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub elem_type: Option<Rc<TypeInfo>>,
    pub key_type: Option<Rc<TypeInfo>>,
    pub val_type: Option<Rc<TypeInfo>>,
    pub fields: Option<Rc<Vec<Field>>>,
}

impl TypeInfo {
    #[must_use]
    pub fn simple(kind: TypeKind) -> Self {
        Self {
            kind,
            elem_type: None,
            key_type: None,
            val_type: None,
            fields: None,
        }
    }

    #[must_use]
    pub fn any() -> Self {
        Self::simple(TypeKind::Any)
    }

    #[must_use]
    pub fn nil() -> Self {
        Self::simple(TypeKind::Nil)
    }

    #[must_use]
    pub fn bool() -> Self {
        Self::simple(TypeKind::Bool)
    }

    #[must_use]
    pub fn int() -> Self {
        Self::simple(TypeKind::Int)
    }

    #[must_use]
    pub fn float() -> Self {
        Self::simple(TypeKind::Float)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::simple(TypeKind::String)
    }

    #[must_use]
    pub fn slice(elem_type: TypeInfo) -> Self {
        Self {
            kind: TypeKind::Slice,
            elem_type: Some(Rc::new(elem_type)),
            key_type: None,
            val_type: None,
            fields: None,
        }
    }

    #[must_use]
    pub fn map(key_type: TypeInfo, val_type: TypeInfo) -> Self {
        Self {
            kind: TypeKind::Map,
            elem_type: None,
            key_type: Some(Rc::new(key_type)),
            val_type: Some(Rc::new(val_type)),
            fields: None,
        }
    }

    #[must_use]
    pub fn func() -> Self {
        Self::simple(TypeKind::Func)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Float)
    }

    #[must_use]
    pub fn is_integer(&self) -> bool {
        self.kind == TypeKind::Int
    }

    #[must_use]
    pub fn is_float(&self) -> bool {
        self.kind == TypeKind::Float
    }

    #[must_use]
    pub fn is_ordered(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Float | TypeKind::String | TypeKind::Any)
    }

    #[must_use]
    pub fn is_comparable(&self) -> bool {
        !matches!(self.kind, TypeKind::Func)
    }

    /// True if a value of `other` can be used where `self` is expected.
    #[must_use]
    pub fn assignable_from(&self, other: &TypeInfo) -> bool {
        self.kind == TypeKind::Any || other.kind == TypeKind::Any || self.compatible_with(other)
    }

    /// True if the two types can appear together in a binary operation
    /// without the checker rejecting it outright (numeric promotion is the
    /// common case; otherwise kinds must match exactly).
    #[must_use]
    pub fn compatible_with(&self, other: &TypeInfo) -> bool {
        if self.kind == TypeKind::Any || other.kind == TypeKind::Any {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        self.kind == other.kind
    }

    /// The type both branches of a ternary/`??` widen to when they are not
    /// identical: `any` is the universal fallback, matching an interface
    /// type in a statically typed host language.
    #[must_use]
    pub fn widen(&self, other: &TypeInfo) -> TypeInfo {
        if self == other {
            self.clone()
        } else if self.is_numeric() && other.is_numeric() {
            TypeInfo::float()
        } else {
            TypeInfo::any()
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Slice => match &self.elem_type {
                Some(e) => write!(f, "slice<{e}>"),
                None => write!(f, "slice"),
            },
            TypeKind::Map => match (&self.key_type, &self.val_type) {
                (Some(k), Some(v)) => write!(f, "map<{k}, {v}>"),
                _ => write!(f, "map"),
            },
            other => write!(f, "{}", other.to_string().to_lowercase()),
        }
    }
}
