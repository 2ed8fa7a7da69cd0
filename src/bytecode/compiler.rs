//! AST → bytecode compiler (§4.4).
//!
//! A program here is a single expression, not a sequence of statements, so
//! there is exactly one compilation unit and no nested scopes to emit
//! bytecode for: a lambda or pipeline-callback body is never walked by this
//! module at all, only captured whole as an AST subtree into a `Value::Func`
//! constant (see `vm::Vm::eval_thunk`). What remains — the main expression
//! tree — still gets the full peephole treatment: constant folding,
//! comparison canonicalization, and jump-based short-circuiting.

use std::rc::Rc;

use crate::ast::{mentions_placeholder, InfixOp, Node, NodeKind, PrefixOp};
use crate::builtins::Builtin;
use crate::error::{ErrorKind, Position};
use crate::value::{SliceMap, Value};

use super::builder::BytecodeBuilder;
use super::code::Bytecode;
use super::op::Opcode;

/// The handful of builtins whose "predicate/transform" argument is
/// captured as an unevaluated thunk rather than compiled as an ordinary
/// eagerly-evaluated expression (§4.6).
const THUNK_TAKING_BUILTINS: &[Builtin] = &[
    Builtin::GroupBy,
    Builtin::Filter,
    Builtin::Map,
    Builtin::Reduce,
    Builtin::All,
    Builtin::Any,
];

/// A compile-time-only error: the checker is expected to have already
/// rejected anything that would reach here in a well-formed pipeline, so
/// this only fires on the (rare) shape the checker doesn't model, such as
/// a pipeline right-hand side that isn't call-shaped at all.
#[derive(Debug, Clone)]
pub struct CompileBytecodeError {
    pub kind: ErrorKind,
    pub position: Position,
    pub message: String,
}

/// Compiles a checked AST into a runnable [`Bytecode`]. Callers are
/// expected to have already run [`crate::checker::check`] over `root`;
/// this function does not re-validate types, only shapes bytecode.
pub fn compile_ast(root: &Node) -> Result<Bytecode, CompileBytecodeError> {
    compile_ast_with_host_fns(root, &[])
}

/// As [`compile_ast`], additionally recognizing a call to any name in
/// `host_fn_names` as a [`Opcode::HostCall`] against that name's position
/// in the table, rather than the generic [`Opcode::Call`] issued for an
/// unrecognized callee (§6.1: `CompileOptions::with_builtin`/`with_operator`
/// register host functions "indexed after the fixed [builtins]").
pub fn compile_ast_with_host_fns(root: &Node, host_fn_names: &[Rc<str>]) -> Result<Bytecode, CompileBytecodeError> {
    let mut compiler = Compiler::with_host_fns(host_fn_names);
    compiler.compile_expr(root)?;
    compiler.builder.emit(Opcode::Halt);
    Ok(compiler.builder.build())
}

struct Compiler {
    builder: BytecodeBuilder,
    host_fn_names: Vec<Rc<str>>,
}

impl Compiler {
    fn with_host_fns(host_fn_names: &[Rc<str>]) -> Self {
        Self {
            builder: BytecodeBuilder::new(),
            host_fn_names: host_fn_names.to_vec(),
        }
    }

    fn err(&self, node: &Node, kind: ErrorKind, message: impl Into<String>) -> CompileBytecodeError {
        CompileBytecodeError {
            kind,
            position: node.pos,
            message: message.into(),
        }
    }

    fn compile_expr(&mut self, node: &Node) -> Result<(), CompileBytecodeError> {
        self.builder.set_location(node.pos);
        match &node.kind {
            NodeKind::Literal(v) => self.emit_const(v.clone()),
            NodeKind::Identifier(name) => self.compile_identifier(name),
            NodeKind::Placeholder => self.builder.emit(Opcode::GetPlaceholder),
            NodeKind::Prefix { op, expr } => self.compile_prefix(node, *op, expr)?,
            NodeKind::Infix { op, left, right } => self.compile_infix(node, *op, left, right)?,
            NodeKind::Call { callee, args } => self.compile_call(node, callee, args)?,
            NodeKind::BuiltinCall { builtin, args } => self.compile_builtin_call(node, *builtin, args, None)?,
            NodeKind::Member { object, property } => self.compile_member(object, property)?,
            NodeKind::OptionalMember { object, property } => self.compile_optional_member(object, property)?,
            NodeKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.builder.emit(Opcode::Index);
            }
            NodeKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => self.compile_ternary(cond, then_branch, else_branch)?,
            NodeKind::ArrayLiteral(items) => self.compile_array_literal(items)?,
            NodeKind::MapLiteral(entries) => self.compile_map_literal(node, entries)?,
            NodeKind::Pipe { left, right } => self.compile_pipe(node, left, right)?,
            NodeKind::Lambda { params, body } => self.emit_const(lambda_value(params, body)),
            NodeKind::NullCoalesce { left, right } => self.compile_null_coalesce(left, right)?,
        }
        Ok(())
    }

    fn emit_const(&mut self, v: Value) {
        let idx = self.builder.add_const(v);
        self.builder.emit_u16(Opcode::Constant, idx);
    }

    fn compile_identifier(&mut self, name: &str) {
        let idx = self.builder.get_or_add_variable(name);
        self.builder.emit_u16(Opcode::GetVar, idx);
    }

    fn compile_prefix(&mut self, node: &Node, op: PrefixOp, expr: &Node) -> Result<(), CompileBytecodeError> {
        if let NodeKind::Literal(v) = &expr.kind {
            if let Some(folded) = fold_prefix(op, v) {
                self.emit_const(folded);
                return Ok(());
            }
        }
        self.compile_expr(expr)?;
        let opcode = match op {
            PrefixOp::Neg => Opcode::Neg,
            PrefixOp::Not => Opcode::Not,
            PrefixOp::BitNot => Opcode::BitNot,
        };
        self.builder.emit(opcode);
        let _ = node;
        Ok(())
    }

    fn compile_infix(&mut self, node: &Node, op: InfixOp, left: &Node, right: &Node) -> Result<(), CompileBytecodeError> {
        if let (NodeKind::Literal(a), NodeKind::Literal(b)) = (&left.kind, &right.kind) {
            if let Some(folded) = fold_infix(op, a, b) {
                self.emit_const(folded);
                return Ok(());
            }
        }
        match op {
            InfixOp::And => return self.compile_short_circuit(left, right, true),
            InfixOp::Or => return self.compile_short_circuit(left, right, false),
            _ => {}
        }
        // Comparison canonicalization (§4.4): `a < b` becomes `b > a`,
        // `a <= b` becomes `b >= a`.
        let (lhs, rhs, opcode) = match op {
            InfixOp::Lt => (right, left, Opcode::GreaterThan),
            InfixOp::Le => (right, left, Opcode::GreaterEqual),
            InfixOp::Gt => (left, right, Opcode::GreaterThan),
            InfixOp::Ge => (left, right, Opcode::GreaterEqual),
            InfixOp::Add => (left, right, Opcode::Add),
            InfixOp::Sub => (left, right, Opcode::Sub),
            InfixOp::Mul => (left, right, Opcode::Mul),
            InfixOp::Div => (left, right, Opcode::Div),
            InfixOp::Mod => (left, right, Opcode::Mod),
            InfixOp::Pow => (left, right, Opcode::Pow),
            InfixOp::Eq => (left, right, Opcode::Equal),
            InfixOp::Ne => (left, right, Opcode::NotEqual),
            InfixOp::BitAnd => (left, right, Opcode::BitAnd),
            InfixOp::BitOr => (left, right, Opcode::BitOr),
            InfixOp::BitXor => (left, right, Opcode::BitXor),
            InfixOp::ShiftL => (left, right, Opcode::ShiftL),
            InfixOp::ShiftR => (left, right, Opcode::ShiftR),
            InfixOp::In => (left, right, Opcode::In),
            InfixOp::Matches => (left, right, Opcode::Matches),
            InfixOp::Contains => (left, right, Opcode::Contains),
            InfixOp::StartsWith => (left, right, Opcode::StartsWith),
            InfixOp::EndsWith => (left, right, Opcode::EndsWith),
            InfixOp::And | InfixOp::Or => unreachable!("handled above"),
        };
        self.compile_expr(lhs)?;
        self.compile_expr(rhs)?;
        self.builder.emit(opcode);
        let _ = node;
        Ok(())
    }

    /// `&&`/`||` lower to jumps (§4.4) rather than the eager `And`/`Or`
    /// opcodes, so the right operand is never evaluated once the left
    /// operand already determines the result.
    fn compile_short_circuit(&mut self, left: &Node, right: &Node, is_and: bool) -> Result<(), CompileBytecodeError> {
        self.compile_expr(left)?;
        self.builder.emit(Opcode::Dup);
        let short_circuit = if is_and {
            self.builder.emit_jump(Opcode::JumpFalse)
        } else {
            self.builder.emit_jump(Opcode::JumpTrue)
        };
        self.builder.emit(Opcode::Pop);
        self.compile_expr(right)?;
        self.builder.patch_jump(short_circuit);
        Ok(())
    }

    fn compile_call(&mut self, node: &Node, callee: &Node, args: &[Node]) -> Result<(), CompileBytecodeError> {
        // `receiver.method(args)` is a typed dispatch (§4.7): push the
        // receiver, push the method name as a string constant, push each
        // argument, then `MethodCall argc`. Mirrors how the tree-walked
        // thunk evaluator recognizes a `Member` callee in `vm::Vm::eval_call`.
        if let NodeKind::Member { object, property } = &callee.kind {
            self.compile_expr(object)?;
            let name_idx = self.builder.add_const(Value::string(property.clone()));
            self.builder.emit_u16(Opcode::Constant, name_idx);
            for arg in args {
                self.compile_expr(arg)?;
            }
            let argc = u8::try_from(args.len())
                .map_err(|_| self.err(node, ErrorKind::ArityError, "method call exceeds the maximum supported argument count"))?;
            self.builder.emit_method_call(argc);
            return Ok(());
        }
        // `receiver?.method(args)` short-circuits the call itself rather
        // than resolving a method on `Nil` (§4.3) — same stack shape as the
        // `Member` case above, dispatched through `OptionalMethodCall`.
        if let NodeKind::OptionalMember { object, property } = &callee.kind {
            self.compile_expr(object)?;
            let name_idx = self.builder.add_const(Value::string(property.clone()));
            self.builder.emit_u16(Opcode::Constant, name_idx);
            for arg in args {
                self.compile_expr(arg)?;
            }
            let argc = u8::try_from(args.len())
                .map_err(|_| self.err(node, ErrorKind::ArityError, "method call exceeds the maximum supported argument count"))?;
            self.builder.emit_optional_method_call(argc);
            return Ok(());
        }
        // A call to a name registered as a host function (§6.1) dispatches
        // through `HostCall` against its fixed position in this program's
        // own host table, rather than the generic `Call` used for a
        // pipeline-bound lambda value.
        if let NodeKind::Identifier(name) = &callee.kind {
            if let Some(idx) = self.host_fn_names.iter().position(|n| n.as_ref() == name) {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let argc = u8::try_from(args.len())
                    .map_err(|_| self.err(node, ErrorKind::ArityError, "call exceeds the maximum supported argument count"))?;
                let host_index = u8::try_from(idx).map_err(|_| self.err(node, ErrorKind::ArityError, "too many registered host functions"))?;
                self.builder.emit_host_call(host_index, argc);
                return Ok(());
            }
        }
        self.compile_expr(callee)?;
        for arg in args {
            self.compile_expr(arg)?;
        }
        let argc = u8::try_from(args.len())
            .map_err(|_| self.err(node, ErrorKind::ArityError, "call exceeds the maximum supported argument count"))?;
        self.builder.emit_call(argc);
        Ok(())
    }

    fn compile_builtin_call(
        &mut self,
        node: &Node,
        builtin: Builtin,
        args: &[Node],
        prepend: Option<&Node>,
    ) -> Result<(), CompileBytecodeError> {
        let total_args = args.len() + usize::from(prepend.is_some());
        if !builtin.arity().accepts(total_args) {
            return Err(self.err(
                node,
                ErrorKind::ArityError,
                format!("{builtin}() takes {} argument(s), got {total_args}", builtin.arity()),
            ));
        }
        match builtin {
            Builtin::Filter => return self.compile_pipeline_opcode(node, Opcode::Filter, prepend, args),
            Builtin::Map => return self.compile_pipeline_opcode(node, Opcode::MapFunc, prepend, args),
            Builtin::Reduce => return self.compile_pipeline_opcode(node, Opcode::Reduce, prepend, args),
            _ => {}
        }
        if let Some(lhs) = prepend {
            self.compile_expr(lhs)?;
        }
        for (i, arg) in args.iter().enumerate() {
            if THUNK_TAKING_BUILTINS.contains(&builtin) && is_thunk_position(builtin, i) {
                self.emit_thunk_const(arg);
            } else {
                self.compile_expr(arg)?;
            }
        }
        self.builder.emit_builtin(builtin.index(), u8::try_from(total_args).expect("builtin arity is always small"));
        Ok(())
    }

    /// `filter`/`map`/`reduce` compile to dedicated opcodes (§6.3) taking
    /// `[coll, thunk]` off the stack, rather than going through the
    /// generic `Builtin(idx,argc)` instruction.
    fn compile_pipeline_opcode(
        &mut self,
        node: &Node,
        opcode: Opcode,
        prepend: Option<&Node>,
        args: &[Node],
    ) -> Result<(), CompileBytecodeError> {
        let (coll, thunk_arg) = match prepend {
            Some(lhs) => (lhs, args.first()),
            None => (args.first().ok_or_else(|| self.err(node, ErrorKind::ArityError, "expected a collection argument"))?, args.get(1)),
        };
        let thunk_arg = thunk_arg.ok_or_else(|| self.err(node, ErrorKind::ArityError, "expected a predicate/transform argument"))?;
        self.compile_expr(coll)?;
        self.emit_thunk_const(thunk_arg);
        self.builder.emit(opcode);
        Ok(())
    }

    /// Captures `node` as a `Value::Func` thunk constant (§4.4 "placeholder
    /// closure"): a lambda literal keeps its own parameter list; anything
    /// else (an expression mentioning `#`) becomes a zero-parameter thunk
    /// consulting the placeholder stack at runtime.
    fn emit_thunk_const(&mut self, node: &Node) {
        let thunk = match &node.kind {
            NodeKind::Lambda { params, body } => lambda_value(params, body),
            _ => {
                debug_assert!(
                    mentions_placeholder(node) || matches!(node.kind, NodeKind::Identifier(_)),
                    "thunk argument mentions neither a lambda parameter nor the placeholder"
                );
                Value::Func(Rc::new(Vec::new()), thunk_body(node))
            }
        };
        self.emit_const(thunk);
    }

    fn compile_member(&mut self, object: &Node, property: &str) -> Result<(), CompileBytecodeError> {
        self.compile_expr(object)?;
        let idx = self.builder.add_const(Value::string(property.to_string()));
        self.builder.emit_u16(Opcode::Constant, idx);
        self.builder.emit(Opcode::Member);
        Ok(())
    }

    fn compile_optional_member(&mut self, object: &Node, property: &str) -> Result<(), CompileBytecodeError> {
        self.compile_expr(object)?;
        let idx = self.builder.add_const(Value::string(property.to_string()));
        self.builder.emit_u16(Opcode::Constant, idx);
        self.builder.emit(Opcode::OptionalChain);
        Ok(())
    }

    fn compile_ternary(&mut self, cond: &Node, then_branch: &Node, else_branch: &Node) -> Result<(), CompileBytecodeError> {
        self.compile_expr(cond)?;
        let to_else = self.builder.emit_jump(Opcode::JumpFalse);
        self.compile_expr(then_branch)?;
        let to_end = self.builder.emit_jump(Opcode::Jump);
        self.builder.patch_jump(to_else);
        self.compile_expr(else_branch)?;
        self.builder.patch_jump(to_end);
        Ok(())
    }

    fn compile_array_literal(&mut self, items: &[Node]) -> Result<(), CompileBytecodeError> {
        for item in items {
            self.compile_expr(item)?;
        }
        let n = u16::try_from(items.len()).expect("array literal exceeds u16 element count");
        self.builder.emit_u16(Opcode::MakeSlice, n);
        Ok(())
    }

    fn compile_map_literal(&mut self, node: &Node, entries: &[(String, Node)]) -> Result<(), CompileBytecodeError> {
        // Constant-folds a map literal whose values are all themselves
        // literals, mirroring the array/infix folding above; otherwise
        // emits key/value pairs for `MakeMap` to assemble at runtime.
        if entries.iter().all(|(_, v)| matches!(v.kind, NodeKind::Literal(_))) {
            let mut map = SliceMap::default();
            for (k, v) in entries {
                let NodeKind::Literal(value) = &v.kind else { unreachable!() };
                map.insert(k.clone(), value.clone());
            }
            self.emit_const(Value::map(map));
            let _ = node;
            return Ok(());
        }
        for (key, value) in entries {
            let key_idx = self.builder.add_const(Value::string(key.clone()));
            self.builder.emit_u16(Opcode::Constant, key_idx);
            self.compile_expr(value)?;
        }
        let n = u16::try_from(entries.len()).expect("map literal exceeds u16 entry count");
        self.builder.emit_u16(Opcode::MakeMap, n);
        Ok(())
    }

    /// `a | f(args)` evaluates `a` then invokes `f` with `a` prepended
    /// (§4.6). The right-hand side must be call-shaped over a builtin or a
    /// named function; anything else is rejected here since the VM's
    /// bytecode path has no generic "call this adapter-provided value"
    /// pipeline opcode (that capability exists only in the tree-walked
    /// thunk evaluator, for pipelines nested inside a lambda body).
    fn compile_pipe(&mut self, node: &Node, left: &Node, right: &Node) -> Result<(), CompileBytecodeError> {
        match &right.kind {
            NodeKind::BuiltinCall { builtin, args } => self.compile_builtin_call(node, *builtin, args, Some(left)),
            NodeKind::Call { callee, args } if matches!(&callee.kind, NodeKind::Identifier(name) if self.host_fn_names.iter().any(|n| n.as_ref() == name.as_str())) => {
                let NodeKind::Identifier(name) = &callee.kind else { unreachable!() };
                let idx = self.host_fn_names.iter().position(|n| n.as_ref() == name.as_str()).expect("checked above");
                self.compile_expr(left)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let argc = u8::try_from(args.len() + 1)
                    .map_err(|_| self.err(node, ErrorKind::ArityError, "pipeline call exceeds the maximum supported argument count"))?;
                let host_index = u8::try_from(idx).map_err(|_| self.err(node, ErrorKind::ArityError, "too many registered host functions"))?;
                self.builder.emit_host_call(host_index, argc);
                Ok(())
            }
            NodeKind::Call { callee, args } if matches!(callee.kind, NodeKind::Identifier(_)) => {
                self.compile_expr(callee)?;
                self.compile_expr(left)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let argc = u8::try_from(args.len() + 1)
                    .map_err(|_| self.err(node, ErrorKind::ArityError, "pipeline call exceeds the maximum supported argument count"))?;
                // Stack is [callee, left, args...]; `Call` expects
                // [callee, args...] with the callee pushed first, so swap
                // the callee beneath the prepended left-hand value.
                self.builder.emit(Opcode::Swap);
                self.builder.emit_call(argc);
                Ok(())
            }
            _ => Err(self.err(node, ErrorKind::TypeError, "pipeline right-hand side must be a builtin or named function call")),
        }
    }

    fn compile_null_coalesce(&mut self, left: &Node, right: &Node) -> Result<(), CompileBytecodeError> {
        self.compile_expr(left)?;
        self.builder.emit(Opcode::Dup);
        // `JumpNil` peeks rather than pops and jumps only when the top is
        // NOT nil, so the fallthrough (nil) path below still has both
        // `Dup`-ed copies on the stack and must discard both of them
        // before evaluating `right` — leaving just one of `left`/`right`
        // on the stack on every path, never both.
        let has_value = self.builder.emit_jump(Opcode::JumpNil);
        self.builder.emit(Opcode::Pop);
        self.builder.emit(Opcode::Pop);
        self.compile_expr(right)?;
        let end = self.builder.emit_jump(Opcode::Jump);
        self.builder.patch_jump(has_value);
        self.builder.emit(Opcode::Pop);
        self.builder.patch_jump(end);
        Ok(())
    }
}

/// Which of `builtin`'s argument positions (after any pipeline prepend is
/// accounted for) is the predicate/transform thunk — always the first
/// explicit argument for the builtins in `THUNK_TAKING_BUILTINS` other
/// than `filter`/`map`/`reduce`, which take their own dedicated opcode
/// path instead.
fn is_thunk_position(builtin: Builtin, index: usize) -> bool {
    match builtin {
        Builtin::GroupBy | Builtin::All | Builtin::Any => index == 0,
        _ => false,
    }
}

fn lambda_value(params: &[crate::ast::VarDecl], body: &Rc<Node>) -> Value {
    let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    Value::Func(Rc::new(names), Rc::clone(body))
}

/// Lifts a borrowed placeholder-mentioning expression into an owned
/// `Rc<Node>` thunk body. `Node` deliberately has no `Clone` impl (see its
/// doc comment), so capturing an expression that lives inside a parent
/// `Vec<Node>` argument list requires a structural copy rather than a
/// refcount bump.
fn thunk_body(node: &Node) -> Rc<Node> {
    Rc::new(deep_copy(node))
}

fn deep_copy(node: &Node) -> Node {
    let kind = match &node.kind {
        NodeKind::Literal(v) => NodeKind::Literal(v.clone()),
        NodeKind::Identifier(s) => NodeKind::Identifier(s.clone()),
        NodeKind::Placeholder => NodeKind::Placeholder,
        NodeKind::Prefix { op, expr } => NodeKind::Prefix {
            op: *op,
            expr: Rc::new(deep_copy(expr)),
        },
        NodeKind::Infix { op, left, right } => NodeKind::Infix {
            op: *op,
            left: Rc::new(deep_copy(left)),
            right: Rc::new(deep_copy(right)),
        },
        NodeKind::Call { callee, args } => NodeKind::Call {
            callee: Rc::new(deep_copy(callee)),
            args: args.iter().map(deep_copy).collect(),
        },
        NodeKind::BuiltinCall { builtin, args } => NodeKind::BuiltinCall {
            builtin: *builtin,
            args: args.iter().map(deep_copy).collect(),
        },
        NodeKind::Member { object, property } => NodeKind::Member {
            object: Rc::new(deep_copy(object)),
            property: property.clone(),
        },
        NodeKind::OptionalMember { object, property } => NodeKind::OptionalMember {
            object: Rc::new(deep_copy(object)),
            property: property.clone(),
        },
        NodeKind::Index { object, index } => NodeKind::Index {
            object: Rc::new(deep_copy(object)),
            index: Rc::new(deep_copy(index)),
        },
        NodeKind::Ternary {
            cond,
            then_branch,
            else_branch,
        } => NodeKind::Ternary {
            cond: Rc::new(deep_copy(cond)),
            then_branch: Rc::new(deep_copy(then_branch)),
            else_branch: Rc::new(deep_copy(else_branch)),
        },
        NodeKind::ArrayLiteral(items) => NodeKind::ArrayLiteral(items.iter().map(deep_copy).collect()),
        NodeKind::MapLiteral(entries) => NodeKind::MapLiteral(entries.iter().map(|(k, v)| (k.clone(), deep_copy(v))).collect()),
        NodeKind::Pipe { left, right } => NodeKind::Pipe {
            left: Rc::new(deep_copy(left)),
            right: Rc::new(deep_copy(right)),
        },
        NodeKind::Lambda { params, body } => NodeKind::Lambda {
            params: params.clone(),
            body: Rc::new(deep_copy(body)),
        },
        NodeKind::NullCoalesce { left, right } => NodeKind::NullCoalesce {
            left: Rc::new(deep_copy(left)),
            right: Rc::new(deep_copy(right)),
        },
    };
    Node::new(kind, node.pos)
}

fn fold_prefix(op: PrefixOp, v: &Value) -> Option<Value> {
    match op {
        PrefixOp::Neg => v.neg().ok(),
        PrefixOp::Not => v.not().ok(),
        PrefixOp::BitNot => v.bit_not().ok(),
    }
}

fn fold_infix(op: InfixOp, a: &Value, b: &Value) -> Option<Value> {
    match op {
        InfixOp::Add => a.add(b).ok(),
        InfixOp::Sub => a.sub(b).ok(),
        InfixOp::Mul => a.mul(b).ok(),
        InfixOp::Div => a.div(b).ok(),
        InfixOp::Mod => a.modulo(b).ok(),
        InfixOp::Pow => a.pow(b).ok(),
        InfixOp::Eq => Some(Value::Bool(a.value_eq(b))),
        InfixOp::Ne => Some(Value::Bool(!a.value_eq(b))),
        InfixOp::Gt => a.compare(b).ok().map(|o| Value::Bool(o == std::cmp::Ordering::Greater)),
        InfixOp::Ge => a.compare(b).ok().map(|o| Value::Bool(o != std::cmp::Ordering::Less)),
        InfixOp::Lt => a.compare(b).ok().map(|o| Value::Bool(o == std::cmp::Ordering::Less)),
        InfixOp::Le => a.compare(b).ok().map(|o| Value::Bool(o != std::cmp::Ordering::Greater)),
        InfixOp::BitAnd | InfixOp::BitOr | InfixOp::BitXor | InfixOp::ShiftL | InfixOp::ShiftR => match (a, b) {
            (Value::Int(x), Value::Int(y)) => Some(Value::Int(match op {
                InfixOp::BitAnd => x & y,
                InfixOp::BitOr => x | y,
                InfixOp::BitXor => x ^ y,
                InfixOp::ShiftL => x.wrapping_shl(*y as u32),
                InfixOp::ShiftR => x.wrapping_shr(*y as u32),
                _ => unreachable!(),
            })),
            _ => None,
        },
        // `in`/`matches`/`contains`/`startsWith`/`endsWith`/`&&`/`||` are
        // left uncompiled here: the first four need the VM's collection
        // helpers rather than `Value`'s scalar arithmetic, and the logical
        // pair always lowers through `compile_short_circuit` instead.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MapAdapter;
    use crate::parser::parse;
    use crate::vm::Vm;

    fn run_source(src: &str) -> Value {
        let ast = parse(src).expect("parse");
        let bytecode = compile_ast(&ast).expect("compile");
        let adapter = MapAdapter::new();
        let mut vm = Vm::new(&bytecode, &adapter);
        vm.run().expect("run")
    }

    #[test]
    fn folds_constant_arithmetic() {
        let ast = parse("1 + 2 * 3").unwrap();
        let bytecode = compile_ast(&ast).unwrap();
        assert!(!bytecode.instructions().contains(&(Opcode::Add as u8)));
        assert_eq!(run_source("1 + 2 * 3"), Value::Int(7));
    }

    #[test]
    fn short_circuit_and_skips_right_side() {
        assert_eq!(run_source("false && (1 / 0 == 0)"), Value::Bool(false));
    }

    #[test]
    fn short_circuit_or_skips_right_side() {
        assert_eq!(run_source("true || (1 / 0 == 0)"), Value::Bool(true));
    }

    #[test]
    fn ternary_picks_correct_branch() {
        assert_eq!(run_source("1 < 2 ? 10 : 20"), Value::Int(10));
    }

    #[test]
    fn pipeline_filter_then_map() {
        assert_eq!(
            run_source("[1, 2, 3, 4] | filter(# % 2 == 0) | map(# * 10)"),
            Value::slice(vec![Value::Int(20), Value::Int(40)])
        );
    }

    #[test]
    fn pipeline_reduce_with_lambda() {
        assert_eq!(run_source("[1, 2, 3, 4] | reduce((acc, x) => acc + x)"), Value::Int(10));
    }

    #[test]
    fn null_coalesce_short_circuits_on_non_nil() {
        assert_eq!(run_source("5 ?? (1 / 0)"), Value::Int(5));
    }

    #[test]
    fn map_literal_index() {
        assert_eq!(run_source("{\"a\": 1, \"b\": 2}[\"b\"]"), Value::Int(2));
    }

    #[test]
    fn zero_arg_method_call_dispatches_by_type() {
        assert_eq!(run_source("\"hello\".upper()"), Value::string("HELLO"));
    }

    #[test]
    fn method_call_with_arguments_dispatches_by_type() {
        assert_eq!(run_source("\"hello\".startsWith(\"he\")"), Value::Bool(true));
    }
}
