//! The environment adapter contract (§6.2) and the module registry /
//! debugger hook interfaces that sit alongside it (§1 "Out of scope":
//! these are interfaces this crate defines and consumes, not things it
//! implements on behalf of a host).
//!
//! An [`Adapter`] is consulted twice per name: once by the checker (to
//! learn a [`TypeInfo`] before a single opcode runs) and once by the VM
//! (to convert the live host value to a [`Value`] at `GetVar` time). The
//! two queries are deliberately separate methods rather than one that
//! returns both, since a host's type metadata is usually static while its
//! values change on every call.

use crate::types::TypeInfo;
use crate::value::{SliceMap, Value};

/// Converts host data into this crate's [`Value`] model (and tells the
/// checker what to expect before runtime).
///
/// Implementors are responsible for depth-first conversion of nested host
/// structures (§6.2): a host record containing a list of records must
/// recursively adapt every element, not just the top level.
pub trait Adapter {
    /// The static type of `name`, consulted by the checker. `None` means
    /// undefined; the checker's behavior on that depends on the
    /// `AllowUndefinedVariables` compile option (§6.1).
    fn type_of(&self, name: &str) -> Option<TypeInfo>;

    /// The runtime value of `name`, consulted by the VM. Returning
    /// `Value::Nil` for a name the checker didn't know about is the
    /// correct behavior under `AllowUndefinedVariables`.
    fn get(&self, name: &str) -> Value;
}

/// A default [`Adapter`] backed by a flat `Value::Map`-shaped environment,
/// sufficient for the common case of a host handing over a JSON-like
/// object. `TypeInfo` is inferred per-entry the same way slice/map literal
/// construction infers its descriptive `elem_type`/`val_type` (§3.1: a
/// hint, never enforced).
#[derive(Debug, Clone, Default)]
pub struct MapAdapter {
    entries: SliceMap,
}

impl MapAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries(entries: SliceMap) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }
}

impl Adapter for MapAdapter {
    fn type_of(&self, name: &str) -> Option<TypeInfo> {
        self.entries.get(name).map(value_type_info)
    }

    fn get(&self, name: &str) -> Value {
        self.entries.get(name).cloned().unwrap_or(Value::Nil)
    }
}

/// Derives a descriptive `TypeInfo` from a live `Value`, used by
/// [`MapAdapter`] and available to other `Adapter` implementations that
/// want the same inference behavior rather than hand-building `TypeInfo`.
#[must_use]
pub fn value_type_info(value: &Value) -> TypeInfo {
    match value {
        Value::Nil => TypeInfo::nil(),
        Value::Bool(_) => TypeInfo::bool(),
        Value::Int(_) => TypeInfo::int(),
        Value::Float(_) => TypeInfo::float(),
        Value::String(_) => TypeInfo::string(),
        Value::Slice(elements, elem_type) => {
            TypeInfo::slice(elements.first().map(value_type_info).unwrap_or_else(|| (**elem_type).clone()))
        }
        Value::Map(entries, key_type, val_type) => {
            let val = entries.values().next().map(value_type_info).unwrap_or_else(|| (**val_type).clone());
            TypeInfo::map((**key_type).clone(), val)
        }
        Value::Func(..) => TypeInfo::func(),
        Value::Placeholder => TypeInfo::any(),
    }
}

/// The module registry lookup contract (§1 "Out of scope: module registry
/// for host-defined function modules"): a host provides qualified-name
/// lookup (`"math.clamp"`) to a pure function value; this crate only
/// consumes the contract, it does not ship a module implementation.
pub trait ModuleRegistry {
    /// Resolves `module.name` to a callable, or `None` if no such module
    /// function is registered. The callable receives already-evaluated
    /// arguments and must be pure (§5: no I/O, no suspension).
    fn resolve(&self, module: &str, name: &str) -> Option<ModuleFn>;
}

/// A host-registered module function: a plain `fn` pointer rather than a
/// boxed closure, since module functions are meant to be free functions
/// registered once at startup, not environment-capturing closures.
pub type ModuleFn = fn(&[Value]) -> Result<Value, crate::error::RunError>;

/// A `ModuleRegistry` with nothing registered; the default when a host
/// doesn't use module-qualified calls at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyModuleRegistry;

impl ModuleRegistry for EmptyModuleRegistry {
    fn resolve(&self, _module: &str, _name: &str) -> Option<ModuleFn> {
        None
    }
}
