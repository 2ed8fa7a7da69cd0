//! The checker's compile-time scope chain.
//!
//! [`TypeScope`] maps names to [`TypeInfo`] and threads through a lambda or
//! pipeline callback body's own nested scope (§3.5). There is no parallel
//! storage-location table here the way a bytecode compiler with runtime
//! closures would keep one: this language has no first-class user
//! functions or runtime closures
//! (§2 Non-goals), so a variable is either a global resolved through the
//! host `Adapter` or a lambda/pipeline parameter bound fresh on each
//! re-interpretation of its AST thunk (`vm::Vm::eval_thunk`) — there is
//! never a local slot, a free-variable capture, or a builtin symbol to
//! track at compile time.

use std::collections::HashMap;

use crate::types::TypeInfo;

/// The checker's scope chain: name to `TypeInfo`.
#[derive(Debug, Default)]
pub struct TypeScope {
    vars: HashMap<String, TypeInfo>,
    outer: Option<Box<TypeScope>>,
}

impl TypeScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enclosed(outer: TypeScope) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pop(self) -> TypeScope {
        *self.outer.expect("pop on the outermost type scope")
    }

    pub fn define(&mut self, name: &str, ty: TypeInfo) {
        self.vars.insert(name.to_string(), ty);
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<TypeInfo> {
        if let Some(ty) = self.vars.get(name) {
            return Some(ty.clone());
        }
        self.outer.as_ref()?.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosed_scope_falls_back_to_outer() {
        let mut outer = TypeScope::new();
        outer.define("x", TypeInfo::int());
        let inner = TypeScope::enclosed(outer);
        assert!(inner.lookup("x").is_some());
        assert!(inner.lookup("y").is_none());
    }

    #[test]
    fn inner_definition_shadows_outer() {
        let mut outer = TypeScope::new();
        outer.define("x", TypeInfo::int());
        let mut inner = TypeScope::enclosed(outer);
        inner.define("x", TypeInfo::string());
        assert_eq!(inner.lookup("x").unwrap().kind(), crate::types::TypeKind::String);
    }
}
