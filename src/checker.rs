//! The static type checker (§4.3): walks the AST once, annotating every
//! node's `TypeInfo` via [`Node::set_type`] and accumulating [`Diagnostic`]s
//! rather than failing on the first one, so a caller sees every problem in
//! a program at once.

use crate::adapter::Adapter;
use crate::ast::{InfixOp, Node, NodeKind, PrefixOp};
use crate::builtins::{type_method, Builtin};
use crate::error::{Diagnostic, ErrorKind};
use crate::scope::TypeScope;
use crate::types::{TypeInfo, TypeKind};

/// Runs the checker over `root`, consulting `env` for free-variable types.
/// `allow_undefined` mirrors the `AllowUndefinedVariables` compile option
/// (§6.1): an unresolved identifier becomes `TypeInfo::any()` instead of a
/// hard `UndefinedSymbol` diagnostic. `host_fn_names` are names registered
/// via `CompileOptions::with_builtin`/`with_operator`: known callables the
/// adapter never hears about, so they're seeded into the outermost scope
/// as `TypeInfo::func()` rather than tripping `UndefinedSymbol`.
pub fn check(root: &Node, env: &dyn Adapter, allow_undefined: bool, host_fn_names: &[String]) -> Result<(), Vec<Diagnostic>> {
    let mut scope = TypeScope::new();
    for name in host_fn_names {
        scope.define(name, TypeInfo::func());
    }
    let mut checker = Checker {
        env,
        allow_undefined,
        scope,
        diagnostics: Vec::new(),
    };
    checker.visit(root);
    if checker.diagnostics.is_empty() {
        Ok(())
    } else {
        Err(checker.diagnostics)
    }
}

struct Checker<'a> {
    env: &'a dyn Adapter,
    allow_undefined: bool,
    scope: TypeScope,
    diagnostics: Vec<Diagnostic>,
}

impl Checker<'_> {
    fn error(&mut self, node: &Node, message: impl Into<String>) -> TypeInfo {
        self.diagnostics.push(Diagnostic::new(ErrorKind::TypeError, Some(node.pos), message));
        TypeInfo::any()
    }

    fn visit(&mut self, node: &Node) -> TypeInfo {
        let ty = self.visit_kind(node);
        node.set_type(ty.clone());
        ty
    }

    fn visit_kind(&mut self, node: &Node) -> TypeInfo {
        match &node.kind {
            NodeKind::Literal(v) => crate::adapter::value_type_info(v),
            NodeKind::Identifier(name) => self.visit_identifier(node, name),
            NodeKind::Placeholder => TypeInfo::any(),
            NodeKind::Prefix { op, expr } => self.visit_prefix(node, *op, expr),
            NodeKind::Infix { op, left, right } => self.visit_infix(node, *op, left, right),
            NodeKind::Call { callee, args } => self.visit_call(node, callee, args),
            NodeKind::BuiltinCall { builtin, args } => self.visit_builtin_call(node, *builtin, args, false),
            NodeKind::Member { object, property } => self.visit_member(node, object, property, false),
            NodeKind::OptionalMember { object, property } => self.visit_member(node, object, property, true),
            NodeKind::Index { object, index } => self.visit_index(node, object, index),
            NodeKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => self.visit_ternary(node, cond, then_branch, else_branch),
            NodeKind::ArrayLiteral(items) => self.visit_array_literal(items),
            NodeKind::MapLiteral(entries) => self.visit_map_literal(entries),
            NodeKind::Pipe { left, right } => self.visit_pipe(node, left, right),
            NodeKind::Lambda { params, body } => self.visit_lambda(params, body),
            NodeKind::NullCoalesce { left, right } => {
                let l = self.visit(left);
                let r = self.visit(right);
                l.widen(&r)
            }
        }
    }

    fn visit_identifier(&mut self, node: &Node, name: &str) -> TypeInfo {
        if let Some(ty) = self.scope.lookup(name) {
            return ty;
        }
        if let Some(builtin) = Builtin::lookup(name) {
            let _ = builtin;
            return TypeInfo::func();
        }
        if let Some(ty) = self.env.type_of(name) {
            return ty;
        }
        if self.allow_undefined {
            return TypeInfo::any();
        }
        self.diagnostics.push(Diagnostic::new(
            ErrorKind::UndefinedSymbol,
            Some(node.pos),
            format!("undefined variable '{name}'"),
        ));
        TypeInfo::any()
    }

    fn visit_prefix(&mut self, node: &Node, op: PrefixOp, expr: &Node) -> TypeInfo {
        let ty = self.visit(expr);
        match op {
            PrefixOp::Not => {
                if ty.kind != TypeKind::Bool && ty.kind != TypeKind::Any {
                    return self.error(node, format!("'!' requires bool, found '{ty}'"));
                }
                TypeInfo::bool()
            }
            PrefixOp::Neg => {
                if !ty.is_numeric() && ty.kind != TypeKind::Any {
                    return self.error(node, format!("unary '-' requires a numeric operand, found '{ty}'"));
                }
                ty
            }
            PrefixOp::BitNot => {
                if !ty.is_integer() && ty.kind != TypeKind::Any {
                    return self.error(node, format!("'~' requires an integer operand, found '{ty}'"));
                }
                TypeInfo::int()
            }
        }
    }

    fn visit_infix(&mut self, node: &Node, op: InfixOp, left: &Node, right: &Node) -> TypeInfo {
        let l = self.visit(left);
        let r = self.visit(right);
        match op {
            InfixOp::Add => {
                if l.kind == TypeKind::String || r.kind == TypeKind::String {
                    if l.kind == TypeKind::String && r.kind == TypeKind::String {
                        return TypeInfo::string();
                    }
                    if l.kind == TypeKind::Any || r.kind == TypeKind::Any {
                        return TypeInfo::any();
                    }
                    return self.error(node, format!("'+' between '{l}' and '{r}' is not allowed (string concatenation requires both operands to be string)"));
                }
                self.numeric_result(node, "+", &l, &r)
            }
            InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod | InfixOp::Pow => {
                self.numeric_result(node, &op.to_string(), &l, &r)
            }
            InfixOp::Eq | InfixOp::Ne => TypeInfo::bool(),
            InfixOp::Gt | InfixOp::Ge | InfixOp::Lt | InfixOp::Le => {
                if !l.compatible_with(&r) {
                    return self.error(node, format!("cannot compare '{l}' with '{r}'"));
                }
                TypeInfo::bool()
            }
            InfixOp::And | InfixOp::Or => {
                if (l.kind != TypeKind::Bool && l.kind != TypeKind::Any) || (r.kind != TypeKind::Bool && r.kind != TypeKind::Any) {
                    return self.error(node, format!("'{op}' requires bool operands, found '{l}' and '{r}'"));
                }
                TypeInfo::bool()
            }
            InfixOp::BitAnd | InfixOp::BitOr | InfixOp::BitXor | InfixOp::ShiftL | InfixOp::ShiftR => {
                if (!l.is_integer() && l.kind != TypeKind::Any) || (!r.is_integer() && r.kind != TypeKind::Any) {
                    return self.error(node, format!("'{op}' requires integer operands, found '{l}' and '{r}'"));
                }
                TypeInfo::int()
            }
            InfixOp::In => {
                let member_ok = match r.kind {
                    TypeKind::Slice => r.elem_type.as_deref().map_or(true, |e| e.assignable_from(&l)),
                    TypeKind::Map => r.key_type.as_deref().map_or(true, |k| k.assignable_from(&l)),
                    TypeKind::String => l.kind == TypeKind::String,
                    TypeKind::Any => true,
                    _ => false,
                };
                if !member_ok {
                    return self.error(node, format!("'in' right-hand side must be a slice, map, or string, found '{r}'"));
                }
                TypeInfo::bool()
            }
            InfixOp::Matches | InfixOp::Contains | InfixOp::StartsWith | InfixOp::EndsWith => {
                if (l.kind != TypeKind::String && l.kind != TypeKind::Any) || (r.kind != TypeKind::String && r.kind != TypeKind::Any)
                {
                    return self.error(node, format!("'{op}' requires string operands, found '{l}' and '{r}'"));
                }
                TypeInfo::bool()
            }
        }
    }

    fn numeric_result(&mut self, node: &Node, op: &str, l: &TypeInfo, r: &TypeInfo) -> TypeInfo {
        if l.kind == TypeKind::Any || r.kind == TypeKind::Any {
            return TypeInfo::any();
        }
        if !l.is_numeric() || !r.is_numeric() {
            return self.error(node, format!("'{op}' requires numeric operands, found '{l}' and '{r}'"));
        }
        if l.is_float() || r.is_float() {
            TypeInfo::float()
        } else {
            TypeInfo::int()
        }
    }

    fn visit_call(&mut self, node: &Node, callee: &Node, args: &[Node]) -> TypeInfo {
        // A `Call` node's callee is, per the grammar, either a `Member`
        // (method call dispatch) or some other callable-valued expression
        // (a lambda stored through a pipeline, or a module-qualified call
        // the compiler resolves later). The checker validates method calls
        // against the per-type method table; anything else is accepted as
        // `any` since this language has no first-class function types to
        // check a signature against (§1 Non-goals).
        if let NodeKind::Member { object, property } = &callee.kind {
            let receiver_ty = self.visit(object);
            for arg in args {
                self.visit(arg);
            }
            if receiver_ty.kind == TypeKind::Any {
                return TypeInfo::any();
            }
            return match type_method(receiver_ty.kind, property) {
                Some(_) => TypeInfo::any(),
                None => self.error(node, format!("'{receiver_ty}' has no method '{property}'")),
            };
        }
        if let NodeKind::OptionalMember { object, property } = &callee.kind {
            let receiver_ty = self.visit(object);
            for arg in args {
                self.visit(arg);
            }
            if receiver_ty.kind == TypeKind::Nil || receiver_ty.kind == TypeKind::Any {
                return TypeInfo::any();
            }
            return match type_method(receiver_ty.kind, property) {
                Some(_) => TypeInfo::any(),
                None => self.error(node, format!("'{receiver_ty}' has no method '{property}'")),
            };
        }
        self.visit(callee);
        for arg in args {
            self.visit(arg);
        }
        TypeInfo::any()
    }

    /// `prepended` is true when this call is a pipeline's right-hand side
    /// (`a | f(args)`): the compiler prepends `a` as `f`'s first argument
    /// (`compile_builtin_call`'s `total_args = args.len() + prepend.is_some()`),
    /// so the arity check here must count it too, or every pipeline into
    /// an arity-2+ builtin (`filter`/`map`/`reduce`/`groupBy`/`all`/`any`/
    /// `take`/`skip`) would spuriously fail with one argument short.
    fn visit_builtin_call(&mut self, node: &Node, builtin: Builtin, args: &[Node], prepended: bool) -> TypeInfo {
        let total_args = args.len() + usize::from(prepended);
        if !builtin.arity().accepts(total_args) {
            self.diagnostics.push(Diagnostic::new(
                ErrorKind::ArityError,
                Some(node.pos),
                format!("{builtin}() takes {} argument(s), got {}", builtin.arity(), total_args),
            ));
        }
        for arg in args {
            self.visit(arg);
        }
        match builtin {
            Builtin::Len | Builtin::Count => TypeInfo::int(),
            Builtin::String | Builtin::Upper | Builtin::Lower | Builtin::Trim | Builtin::Type | Builtin::Replace
            | Builtin::Substring | Builtin::Join => TypeInfo::string(),
            Builtin::Int => TypeInfo::int(),
            Builtin::Float | Builtin::Sqrt | Builtin::Now | Builtin::Avg => TypeInfo::float(),
            Builtin::Bool | Builtin::Contains | Builtin::StartsWith | Builtin::EndsWith | Builtin::Matches | Builtin::All
            | Builtin::Any => TypeInfo::bool(),
            Builtin::Split | Builtin::Sort | Builtin::Reverse | Builtin::Take | Builtin::Skip | Builtin::Unique
            | Builtin::Flatten | Builtin::Keys | Builtin::Filter | Builtin::Map => TypeInfo::slice(TypeInfo::any()),
            Builtin::GroupBy => TypeInfo::map(TypeInfo::string(), TypeInfo::any()),
            _ => TypeInfo::any(),
        }
    }

    fn visit_member(&mut self, node: &Node, object: &Node, property: &str, optional: bool) -> TypeInfo {
        let obj_ty = self.visit(object);
        if optional {
            // Optional chaining tolerates `Nil` on the left (§4.3); result
            // is the property type or `Nil`.
            if obj_ty.kind == TypeKind::Nil || obj_ty.kind == TypeKind::Any {
                return TypeInfo::any();
            }
        }
        if obj_ty.kind == TypeKind::Any {
            return TypeInfo::any();
        }
        if let Some(fields) = &obj_ty.fields {
            if let Some(field) = fields.iter().find(|f| f.name == property) {
                return field.ty.clone();
            }
        }
        // A bare member access with no trailing call is still required to
        // name either a struct field or an available type method (the
        // method itself, not its call result, in which case the checker
        // just reports `func`); `visit_call` handles the common
        // `obj.method(args)` shape directly over this same node kind.
        if type_method(obj_ty.kind, property).is_some() {
            return TypeInfo::func();
        }
        self.error(node, format!("'{obj_ty}' has no field or method '{property}'"))
    }

    fn visit_index(&mut self, node: &Node, object: &Node, index: &Node) -> TypeInfo {
        let obj_ty = self.visit(object);
        let idx_ty = self.visit(index);
        match obj_ty.kind {
            TypeKind::Slice => {
                if !idx_ty.is_integer() && idx_ty.kind != TypeKind::Any {
                    return self.error(node, format!("slice index must be int, found '{idx_ty}'"));
                }
                obj_ty.elem_type.as_deref().cloned().unwrap_or_else(TypeInfo::any)
            }
            TypeKind::Map => {
                if let Some(key_ty) = &obj_ty.key_type {
                    if !key_ty.assignable_from(&idx_ty) {
                        return self.error(node, format!("map key must be '{key_ty}', found '{idx_ty}'"));
                    }
                }
                obj_ty.val_type.as_deref().cloned().unwrap_or_else(TypeInfo::any)
            }
            TypeKind::String => {
                if !idx_ty.is_integer() && idx_ty.kind != TypeKind::Any {
                    return self.error(node, format!("string index must be int, found '{idx_ty}'"));
                }
                TypeInfo::string()
            }
            TypeKind::Any => TypeInfo::any(),
            _ => self.error(node, format!("'{obj_ty}' is not indexable")),
        }
    }

    fn visit_ternary(&mut self, _node: &Node, cond: &Node, then_branch: &Node, else_branch: &Node) -> TypeInfo {
        let cond_ty = self.visit(cond);
        if cond_ty.kind != TypeKind::Bool && cond_ty.kind != TypeKind::Any {
            self.diagnostics.push(Diagnostic::new(
                ErrorKind::TypeError,
                Some(cond.pos),
                format!("ternary condition must be bool, found '{cond_ty}'"),
            ));
        }
        let then_ty = self.visit(then_branch);
        let else_ty = self.visit(else_branch);
        then_ty.widen(&else_ty)
    }

    fn visit_array_literal(&mut self, items: &[Node]) -> TypeInfo {
        let mut elem = None;
        for item in items {
            let ty = self.visit(item);
            elem = Some(match elem {
                None => ty,
                Some(prev) => prev.widen(&ty),
            });
        }
        TypeInfo::slice(elem.unwrap_or_else(TypeInfo::any))
    }

    fn visit_map_literal(&mut self, entries: &[(String, Node)]) -> TypeInfo {
        let mut val = None;
        for (_, value) in entries {
            let ty = self.visit(value);
            val = Some(match val {
                None => ty,
                Some(prev) => prev.widen(&ty),
            });
        }
        TypeInfo::map(TypeInfo::string(), val.unwrap_or_else(TypeInfo::any))
    }

    fn visit_pipe(&mut self, node: &Node, left: &Node, right: &Node) -> TypeInfo {
        let left_ty = self.visit(left);
        // `a | f(args)`: the left value is logically prepended as `f`'s
        // first argument (§4.3). Validate `right` as whatever call shape
        // it already is, checking its explicit args only (the prepended
        // value's type doesn't currently narrow a builtin's own declared
        // arity/result, since builtins here are not individually typed
        // beyond their return kind in `visit_builtin_call`).
        match &right.kind {
            NodeKind::BuiltinCall { builtin, args } => self.visit_builtin_call(right, *builtin, args, true),
            NodeKind::Call { .. } => self.visit(right),
            NodeKind::Identifier(name) => {
                if Builtin::lookup(name).is_none() && self.scope.lookup(name).is_none() && self.env.type_of(name).is_none() {
                    return self.error(node, format!("pipeline right-hand side '{name}' is not a known builtin or callable"));
                }
                TypeInfo::any()
            }
            _ => {
                self.visit(right);
                self.error(node, "pipeline right-hand side must be a call expression")
            }
        };
        let _ = left_ty;
        TypeInfo::any()
    }

    fn visit_lambda(&mut self, params: &[crate::ast::VarDecl], body: &Node) -> TypeInfo {
        let outer = std::mem::take(&mut self.scope);
        self.scope = TypeScope::enclosed(outer);
        for p in params {
            self.scope.define(&p.name, TypeInfo::any());
        }
        self.visit(body);
        let outer = std::mem::take(&mut self.scope).pop();
        self.scope = outer;
        TypeInfo::func()
    }
}
