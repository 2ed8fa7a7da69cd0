//! The register-less stack machine (§4.5).
//!
//! Two execution paths share this module: the main fetch-decode-execute
//! loop over compiled [`Bytecode`] (`Vm::run`), and a small tree-walking
//! evaluator over raw AST (`Vm::eval_thunk`/`Vm::call_func`) used for lambda
//! and pipeline-callback bodies, which are never compiled to their own
//! instruction stream (see `bytecode::code` module doc). Both paths share
//! the same operand stack, placeholder stack, and helper routines for
//! indexing/member access so the two notions of "value" never drift apart.

use std::rc::Rc;
use std::time::Instant;

use crate::adapter::{Adapter, EmptyModuleRegistry, ModuleRegistry};
use crate::ast::{InfixOp, Node, NodeKind, PrefixOp};
use crate::builtins::{type_method, Builtin};
use crate::bytecode::{Bytecode, Opcode};
use crate::debugger::{NoHook, VmHook};
use crate::error::{ErrorKind, RunError};
use crate::value::{SliceMap, Value};

/// One call frame for a tree-walked lambda/thunk body: the parameter
/// bindings active while evaluating its `body`. A `Vec` rather than a
/// `HashMap` since lambdas here take at most a handful of parameters and
/// lookup walks it linearly, innermost binding first.
type Frame = Vec<(Rc<str>, Value)>;

/// A host function registered through `CompileOptions::with_builtin` /
/// `with_operator` (§6.1): a plain `fn` pointer, matching
/// `adapter::ModuleFn`'s "free functions registered once at startup"
/// convention rather than a capturing closure.
pub type HostFn = fn(&[Value]) -> Result<Value, RunError>;

pub struct Vm<'a> {
    bytecode: &'a Bytecode,
    adapter: &'a dyn Adapter,
    modules: &'a dyn ModuleRegistry,
    hook: Box<dyn VmHook>,
    host_fns: &'a [HostFn],
    stack: Vec<Value>,
    globals: Vec<Value>,
    ip: usize,
    deadline: Option<Instant>,
    iter_budget: Option<u64>,
    placeholder_stack: Vec<Value>,
    frames: Vec<Frame>,
}

/// Soft sizing hints from §4.5; `Vec` grows past these if a program
/// genuinely needs to (there is no dedicated `StackOverflow` error kind),
/// but pre-reserving them avoids reallocation on the common path.
const STACK_CAPACITY_HINT: usize = 2048;
const GLOBALS_CAPACITY_HINT: usize = 65536;

static EMPTY_MODULES: EmptyModuleRegistry = EmptyModuleRegistry;

impl<'a> Vm<'a> {
    #[must_use]
    pub fn new(bytecode: &'a Bytecode, adapter: &'a dyn Adapter) -> Self {
        let globals = bytecode
            .variable_order()
            .iter()
            .map(|name| adapter.get(name))
            .collect();
        Self {
            bytecode,
            adapter,
            modules: &EMPTY_MODULES,
            hook: Box::new(NoHook),
            host_fns: &[],
            stack: Vec::with_capacity(STACK_CAPACITY_HINT.min(256)),
            globals,
            ip: 0,
            deadline: None,
            iter_budget: None,
            placeholder_stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: impl VmHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    #[must_use]
    pub fn with_modules(mut self, modules: &'a dyn ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    /// Attaches the host function table a compiled program's `HostCall`
    /// instructions index into. Must be the same table (same order) that
    /// was passed to `bytecode::compile_ast_with_host_fns` when `bytecode`
    /// was compiled, or `HostCall` will dispatch to the wrong function.
    #[must_use]
    pub fn with_host_fns(mut self, host_fns: &'a [HostFn]) -> Self {
        self.host_fns = host_fns;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_iter_budget(mut self, n: u64) -> Self {
        self.iter_budget = Some(n);
        self
    }

    /// Resets the used prefix of `stack`/`globals` for reuse across runs on
    /// the same instance (§5: "a targeted reset of ~256 stack slots and
    /// ~64 globals is sufficient"; clearing full capacity is a disallowed
    /// regression). Leaves configuration (hook/modules/limits) untouched.
    pub fn reset(&mut self) {
        let stack_reset = self.stack.len().min(256);
        self.stack.truncate(self.stack.len() - stack_reset);
        self.stack.clear();
        let globals_reset = self.globals.len().min(64);
        for slot in &mut self.globals[..globals_reset] {
            *slot = Value::Nil;
        }
        for (name, slot) in self.bytecode.variable_order().iter().zip(self.globals.iter_mut()) {
            *slot = self.adapter.get(name);
        }
        self.ip = 0;
        self.placeholder_stack.clear();
        self.frames.clear();
    }

    fn err(&self, kind: ErrorKind, message: impl Into<String>) -> RunError {
        RunError::new(kind, self.bytecode.location_for_offset(self.ip), message.into())
    }

    /// Runs from `ip = 0` to `Halt`, returning the final stack top (`Nil`
    /// if the program never pushed anything, which should not happen for
    /// a program that passed the checker, but is not itself an error here).
    pub fn run(&mut self) -> Result<Value, RunError> {
        let result = self.run_inner();
        if let Err(e) = &result {
            self.hook.on_error(e);
        }
        result
    }

    fn run_inner(&mut self) -> Result<Value, RunError> {
        loop {
            let instructions = self.bytecode.instructions();
            if self.ip >= instructions.len() {
                return Ok(self.stack.pop().unwrap_or(Value::Nil));
            }
            let op_byte = instructions[self.ip];
            let op = Opcode::from_repr(op_byte).ok_or_else(|| {
                RunError::new(
                    ErrorKind::BadInstruction,
                    self.bytecode.location_for_offset(self.ip),
                    format!("illegal opcode byte {op_byte}"),
                )
            })?;
            if !self.hook.on_instruction(self.ip, op) {
                return Ok(self.stack.pop().unwrap_or(Value::Nil));
            }
            self.ip += 1;
            if op == Opcode::Halt {
                return Ok(self.stack.pop().unwrap_or(Value::Nil));
            }
            self.step(op)?;
        }
    }

    fn read_u8(&mut self) -> u8 {
        let b = self.bytecode.instructions()[self.ip];
        self.ip += 1;
        b
    }

    fn read_u16(&mut self) -> u16 {
        let bytes = self.bytecode.instructions();
        let hi = bytes[self.ip];
        let lo = bytes[self.ip + 1];
        self.ip += 2;
        u16::from_be_bytes([hi, lo])
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<Value, RunError> {
        self.stack.pop().ok_or_else(|| self.err(ErrorKind::BadInstruction, "operand stack underflow"))
    }

    /// Backward-jump / loop-entry accounting (§4.9): the only points where
    /// timeout and iteration budget are tested, to bound the worst case
    /// without paying a per-opcode cost.
    fn check_limits(&self) -> Result<(), RunError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(self.err(ErrorKind::Timeout, "evaluation exceeded its configured timeout"));
            }
        }
        Ok(())
    }

    fn tick_iteration(&mut self) -> Result<(), RunError> {
        if let Some(budget) = &mut self.iter_budget {
            if *budget == 0 {
                return Err(RunError::new(
                    ErrorKind::IterationLimit,
                    self.bytecode.location_for_offset(self.ip),
                    "evaluation exceeded its configured iteration budget",
                ));
            }
            *budget -= 1;
        }
        self.check_limits()
    }

    fn jump_checked(&mut self, target: u16) -> Result<(), RunError> {
        let target = target as usize;
        if target <= self.ip {
            self.tick_iteration()?;
        }
        self.ip = target;
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, op: Opcode) -> Result<(), RunError> {
        use Opcode::*;
        match op {
            Constant => {
                let idx = self.read_u16();
                self.push(self.bytecode.constant(idx).clone());
            }
            Pop => {
                self.pop()?;
            }
            Dup => {
                let top = self.stack.last().ok_or_else(|| self.err(ErrorKind::BadInstruction, "Dup on empty stack"))?.clone();
                self.push(top);
            }
            Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(self.err(ErrorKind::BadInstruction, "Swap with fewer than two operands"));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Add | AddInt | AddFloat | AddString => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.add(&b)?);
            }
            Sub | SubInt | SubFloat => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.sub(&b)?);
            }
            Mul | MulInt | MulFloat => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.mul(&b)?);
            }
            Div => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.div(&b)?);
            }
            Mod => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.modulo(&b)?);
            }
            Pow => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.pow(&b)?);
            }
            Neg => {
                let a = self.pop()?;
                self.push(a.neg()?);
            }
            Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.value_eq(&b)));
            }
            NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(!a.value_eq(&b)));
            }
            GreaterThan => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.compare(&b)? == std::cmp::Ordering::Greater));
            }
            GreaterEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.compare(&b)? != std::cmp::Ordering::Less));
            }
            And => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.eager_bool_op(&a, &b, "&&", |x, y| x && y)?);
            }
            Or => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.eager_bool_op(&a, &b, "||", |x, y| x || y)?);
            }
            Not => {
                let a = self.pop()?;
                self.push(a.not()?);
            }
            BitAnd => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.int_op(&a, &b, "&", |x, y| x & y)?);
            }
            BitOr => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.int_op(&a, &b, "|", |x, y| x | y)?);
            }
            BitXor => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.int_op(&a, &b, "^", |x, y| x ^ y)?);
            }
            BitNot => {
                let a = self.pop()?;
                self.push(a.bit_not()?);
            }
            ShiftL => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.int_op(&a, &b, "<<", |x, y| x.wrapping_shl(y as u32))?);
            }
            ShiftR => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(self.int_op(&a, &b, ">>", |x, y| x.wrapping_shr(y as u32))?);
            }
            GetVar => {
                let idx = self.read_u16() as usize;
                let v = self.globals.get(idx).cloned().ok_or_else(|| self.err(ErrorKind::BadInstruction, "GetVar index out of range"))?;
                self.push(v);
            }
            SetVar => {
                let idx = self.read_u16() as usize;
                let v = self.pop()?;
                if idx >= self.globals.len() {
                    return Err(self.err(ErrorKind::BadInstruction, "SetVar index out of range"));
                }
                self.globals[idx] = v.clone();
                self.push(v);
            }
            Call => {
                let argc = self.read_u8() as usize;
                if self.stack.len() < argc + 1 {
                    return Err(self.err(ErrorKind::BadInstruction, "Call with too few operands on the stack"));
                }
                let args = self.stack.split_off(self.stack.len() - argc);
                let callee = self.pop()?;
                self.hook.on_call("<call>", &args);
                let result = self.call_func_args(&callee, &args)?;
                self.push(result);
            }
            Return => {
                // A thunk/lambda body tree-walked by `eval_node` never
                // emits bytecode, so `Return` only appears if a host
                // extension wires a compiled function body through this
                // opcode; treat it as "stop interpreting, current stack
                // top is the result" by jumping straight to the end.
                self.ip = self.bytecode.instructions().len();
            }
            Builtin => {
                let idx = self.read_u8();
                let argc = self.read_u8() as usize;
                let builtin = crate::builtins::Builtin::from_index(idx).ok_or_else(|| self.err(ErrorKind::BadInstruction, "unknown builtin index"))?;
                if self.stack.len() < argc {
                    return Err(self.err(ErrorKind::BadInstruction, "Builtin with too few operands on the stack"));
                }
                let args = self.stack.split_off(self.stack.len() - argc);
                self.hook.on_call(builtin.into(), &args);
                let result = builtin.call(self, args)?;
                self.push(result);
            }
            MethodCall => {
                let argc = self.read_u8() as usize;
                if self.stack.len() < argc + 2 {
                    return Err(self.err(ErrorKind::BadInstruction, "MethodCall with too few operands on the stack"));
                }
                let args = self.stack.split_off(self.stack.len() - argc);
                let name = self.pop()?;
                let receiver = self.pop()?;
                let Value::String(name) = name else {
                    return Err(self.err(ErrorKind::BadInstruction, "MethodCall method-name operand was not a string"));
                };
                self.hook.on_call(&name, &args);
                let result = match type_method(receiver.kind(), &name) {
                    Some(method) => method.call(&receiver, &args).map_err(|e| self.err(e.kind, e.message))?,
                    None => {
                        return Err(self.err(ErrorKind::NoSuchMethod, format!("'{}' has no method '{name}'", receiver.type_name())));
                    }
                };
                self.push(result);
            }
            OptionalMethodCall => {
                let argc = self.read_u8() as usize;
                if self.stack.len() < argc + 2 {
                    return Err(self.err(ErrorKind::BadInstruction, "OptionalMethodCall with too few operands on the stack"));
                }
                let args = self.stack.split_off(self.stack.len() - argc);
                let name = self.pop()?;
                let receiver = self.pop()?;
                let Value::String(name) = name else {
                    return Err(self.err(ErrorKind::BadInstruction, "OptionalMethodCall method-name operand was not a string"));
                };
                if receiver.is_nil() {
                    self.push(Value::Nil);
                } else {
                    self.hook.on_call(&name, &args);
                    let result = match type_method(receiver.kind(), &name) {
                        Some(method) => method.call(&receiver, &args).map_err(|e| self.err(e.kind, e.message))?,
                        None => {
                            return Err(self.err(ErrorKind::NoSuchMethod, format!("'{}' has no method '{name}'", receiver.type_name())));
                        }
                    };
                    self.push(result);
                }
            }
            HostCall => {
                let idx = self.read_u8() as usize;
                let argc = self.read_u8() as usize;
                let host_fn = *self
                    .host_fns
                    .get(idx)
                    .ok_or_else(|| self.err(ErrorKind::BadInstruction, "unknown host function index"))?;
                if self.stack.len() < argc {
                    return Err(self.err(ErrorKind::BadInstruction, "HostCall with too few operands on the stack"));
                }
                let args = self.stack.split_off(self.stack.len() - argc);
                self.hook.on_call("<host>", &args);
                let result = host_fn(&args).map_err(|e| self.err(e.kind, e.message))?;
                self.push(result);
            }
            Index => {
                let idx = self.pop()?;
                let obj = self.pop()?;
                self.push(self.index_value(&obj, &idx)?);
            }
            Member => {
                let name = self.pop()?;
                let obj = self.pop()?;
                let Value::String(name) = name else {
                    return Err(self.err(ErrorKind::BadInstruction, "Member property name operand was not a string"));
                };
                self.push(self.member_value(&obj, &name)?);
            }
            MakeSlice => {
                let n = self.read_u16() as usize;
                if self.stack.len() < n {
                    return Err(self.err(ErrorKind::BadInstruction, "MakeSlice with too few operands"));
                }
                let elements = self.stack.split_off(self.stack.len() - n);
                self.push(Value::slice(elements));
            }
            MakeMap => {
                let n = self.read_u16() as usize;
                if self.stack.len() < 2 * n {
                    return Err(self.err(ErrorKind::BadInstruction, "MakeMap with too few operands"));
                }
                let pairs = self.stack.split_off(self.stack.len() - 2 * n);
                let mut entries = SliceMap::default();
                for pair in pairs.chunks_exact(2) {
                    let Value::String(key) = &pair[0] else {
                        return Err(self.err(ErrorKind::BadInstruction, "MakeMap key operand was not a string"));
                    };
                    entries.insert(key.to_string(), pair[1].clone());
                }
                self.push(Value::map(entries));
            }
            In => {
                let haystack = self.pop()?;
                let needle = self.pop()?;
                self.push(self.in_value(&needle, &haystack)?);
            }
            Jump => {
                let target = self.read_u16();
                self.jump_checked(target)?;
            }
            JumpTrue => {
                let target = self.read_u16();
                let cond = self.pop()?;
                if cond.truthy() {
                    self.jump_checked(target)?;
                }
            }
            JumpFalse => {
                let target = self.read_u16();
                let cond = self.pop()?;
                if !cond.truthy() {
                    self.jump_checked(target)?;
                }
            }
            JumpNil => {
                let target = self.read_u16();
                let is_nil = self.stack.last().map(Value::is_nil).unwrap_or(false);
                if !is_nil {
                    self.jump_checked(target)?;
                }
            }
            Concat => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::string(format!("{a}{b}")));
            }
            Matches => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::Matches.call(self, vec![a, b])?);
            }
            Contains => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::Contains.call(self, vec![a, b])?);
            }
            StartsWith => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::StartsWith.call(self, vec![a, b])?);
            }
            EndsWith => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::EndsWith.call(self, vec![a, b])?);
            }
            ToString => {
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::String.call(self, vec![a])?);
            }
            ToInt => {
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::Int.call(self, vec![a])?);
            }
            ToFloat => {
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::Float.call(self, vec![a])?);
            }
            ToBool => {
                let a = self.pop()?;
                self.push(crate::builtins::Builtin::Bool.call(self, vec![a])?);
            }
            Pipe => {
                let callee = self.pop()?;
                let left = self.pop()?;
                self.push(self.call_func_args(&callee, std::slice::from_ref(&left))?);
            }
            Filter => {
                let thunk = self.pop()?;
                let coll = self.pop()?;
                self.push(self.run_filter(&coll, &thunk)?);
            }
            MapFunc => {
                let thunk = self.pop()?;
                let coll = self.pop()?;
                self.push(self.run_map(&coll, &thunk)?);
            }
            Reduce => {
                let thunk = self.pop()?;
                let coll = self.pop()?;
                self.push(self.run_reduce(&coll, &thunk)?);
            }
            GetPlaceholder => {
                let v = self
                    .placeholder_stack
                    .last()
                    .cloned()
                    .ok_or_else(|| self.err(ErrorKind::BadInstruction, "GetPlaceholder with no active pipeline element"))?;
                self.push(v);
            }
            OptionalChain => {
                let name = self.pop()?;
                let obj = self.pop()?;
                if obj.is_nil() {
                    self.push(Value::Nil);
                } else {
                    let Value::String(name) = name else {
                        return Err(self.err(ErrorKind::BadInstruction, "OptionalChain property name operand was not a string"));
                    };
                    self.push(self.member_value(&obj, &name)?);
                }
            }
            NullCoalesce => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(if left.is_nil() { right } else { left });
            }
            Halt | Noop => {}
        }
        Ok(())
    }

    fn eager_bool_op(&self, a: &Value, b: &Value, op: &str, f: impl Fn(bool, bool) -> bool) -> Result<Value, RunError> {
        match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(f(*x, *y))),
            _ => Err(self.err(
                ErrorKind::TypeMismatch,
                format!("unsupported operand types for {op}: '{}' and '{}'", a.type_name(), b.type_name()),
            )),
        }
    }

    fn int_op(&self, a: &Value, b: &Value, op: &str, f: impl Fn(i64, i64) -> i64) -> Result<Value, RunError> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(f(*x, *y))),
            _ => Err(self.err(
                ErrorKind::TypeMismatch,
                format!("unsupported operand types for {op}: '{}' and '{}'", a.type_name(), b.type_name()),
            )),
        }
    }

    fn index_value(&self, obj: &Value, idx: &Value) -> Result<Value, RunError> {
        match (obj, idx) {
            (Value::Slice(elements, _), Value::Int(i)) => {
                let resolved = resolve_index(*i, elements.len());
                elements
                    .get(resolved)
                    .cloned()
                    .ok_or_else(|| self.err(ErrorKind::IndexOutOfRange, format!("slice index {i} out of range")))
            }
            (Value::String(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let resolved = resolve_index(*i, chars.len());
                chars
                    .get(resolved)
                    .map(|c| Value::string(c.to_string()))
                    .ok_or_else(|| self.err(ErrorKind::IndexOutOfRange, format!("string index {i} out of range")))
            }
            (Value::Map(entries, ..), Value::String(k)) => Ok(entries.get(k.as_ref()).cloned().unwrap_or(Value::Nil)),
            _ => Err(self.err(
                ErrorKind::TypeMismatch,
                format!("'{}' is not indexable by '{}'", obj.type_name(), idx.type_name()),
            )),
        }
    }

    fn member_value(&mut self, obj: &Value, name: &str) -> Result<Value, RunError> {
        if let Value::Map(entries, ..) = obj {
            if let Some(v) = entries.get(name) {
                return Ok(v.clone());
            }
        }
        match type_method(obj.kind(), name) {
            Some(method) => method.call(obj, &[]).map_err(|e| self.err(e.kind, e.message)),
            None => Err(self.err(ErrorKind::NoSuchMethod, format!("'{}' has no field or method '{name}'", obj.type_name()))),
        }
    }

    fn in_value(&self, needle: &Value, haystack: &Value) -> Result<Value, RunError> {
        let found = match haystack {
            Value::Slice(elements, _) => elements.iter().any(|e| e.value_eq(needle)),
            Value::Map(entries, ..) => match needle {
                Value::String(k) => entries.contains_key(k.as_ref()),
                _ => false,
            },
            Value::String(s) => match needle {
                Value::String(n) => s.contains(n.as_ref()),
                _ => false,
            },
            _ => {
                return Err(self.err(
                    ErrorKind::TypeMismatch,
                    format!("'in' right-hand side must be a slice, map, or string, found '{}'", haystack.type_name()),
                ))
            }
        };
        Ok(Value::Bool(found))
    }

    fn run_filter(&mut self, coll: &Value, thunk: &Value) -> Result<Value, RunError> {
        let elements = want_slice(coll, "filter")?;
        let mut kept = Vec::with_capacity(elements.len());
        for el in elements {
            self.tick_iteration()?;
            if self.eval_thunk(thunk, el.clone())?.truthy() {
                kept.push(el.clone());
            }
        }
        Ok(Value::slice(kept))
    }

    fn run_map(&mut self, coll: &Value, thunk: &Value) -> Result<Value, RunError> {
        let elements = want_slice(coll, "map")?;
        let mut mapped = Vec::with_capacity(elements.len());
        for el in elements {
            self.tick_iteration()?;
            mapped.push(self.eval_thunk(thunk, el.clone())?);
        }
        Ok(Value::slice(mapped))
    }

    fn run_reduce(&mut self, coll: &Value, thunk: &Value) -> Result<Value, RunError> {
        let elements = want_slice(coll, "reduce")?;
        let mut iter = elements.iter();
        let Some(first) = iter.next() else {
            return Err(self.err(ErrorKind::TypeMismatch, "reduce() of an empty slice requires at least one element"));
        };
        let mut acc = first.clone();
        for el in iter {
            self.tick_iteration()?;
            acc = self.call_func_args(thunk, &[acc, el.clone()])?;
        }
        Ok(acc)
    }

    /// Evaluates `func` (a `Value::Func` thunk) with `current` supplied as
    /// its sole input: bound to the thunk's one named parameter if it has
    /// one, or made available through `GetPlaceholder`/`#` if it has none
    /// (§4.6: both styles are accepted as a pipeline callback).
    pub fn eval_thunk(&mut self, func: &Value, current: Value) -> Result<Value, RunError> {
        self.check_limits()?;
        let Value::Func(params, body) = func else {
            return Err(self.err(ErrorKind::TypeMismatch, format!("expected a callable thunk, found '{}'", func.type_name())));
        };
        if params.is_empty() {
            self.placeholder_stack.push(current);
            let result = self.eval_node(body);
            self.placeholder_stack.pop();
            result
        } else {
            self.call_func_args(func, std::slice::from_ref(&current))
        }
    }

    /// Calls any callable `Value` with already-evaluated `args`, binding
    /// named parameters positionally in a fresh frame.
    fn call_func_args(&mut self, func: &Value, args: &[Value]) -> Result<Value, RunError> {
        let Value::Func(params, body) = func else {
            return Err(self.err(ErrorKind::TypeMismatch, format!("'{}' is not callable", func.type_name())));
        };
        if params.len() != args.len() {
            return Err(self.err(
                ErrorKind::ArityError,
                format!("lambda takes {} argument(s), got {}", params.len(), args.len()),
            ));
        }
        let frame: Frame = params.iter().map(|p| Rc::from(p.as_str())).zip(args.iter().cloned()).collect();
        self.frames.push(frame);
        let result = self.eval_node(body);
        self.frames.pop();
        result
    }

    /// The tree-walking evaluator for a thunk/lambda body (§4.5, see the
    /// module doc on `Bytecode`): identical operator semantics to the
    /// compiled dispatch loop above, but driven directly off the AST since
    /// lambda bodies are never compiled to their own instruction stream.
    fn eval_node(&mut self, node: &Node) -> Result<Value, RunError> {
        match &node.kind {
            NodeKind::Literal(v) => Ok(v.clone()),
            NodeKind::Identifier(name) => Ok(self.resolve_identifier(name)),
            NodeKind::Placeholder => Ok(self.placeholder_stack.last().cloned().unwrap_or(Value::Nil)),
            NodeKind::Prefix { op, expr } => {
                let v = self.eval_node(expr)?;
                match op {
                    PrefixOp::Neg => v.neg(),
                    PrefixOp::Not => v.not(),
                    PrefixOp::BitNot => v.bit_not(),
                }
            }
            NodeKind::Infix { op, left, right } => self.eval_infix(*op, left, right),
            NodeKind::Call { callee, args } => self.eval_call(callee, args),
            NodeKind::BuiltinCall { builtin, args } => {
                let values = args.iter().map(|a| self.eval_node(a)).collect::<Result<Vec<_>, _>>()?;
                builtin.call(self, values)
            }
            NodeKind::Member { object, property } => {
                let obj = self.eval_node(object)?;
                self.member_value(&obj, property)
            }
            NodeKind::OptionalMember { object, property } => {
                let obj = self.eval_node(object)?;
                if obj.is_nil() {
                    Ok(Value::Nil)
                } else {
                    self.member_value(&obj, property)
                }
            }
            NodeKind::Index { object, index } => {
                let obj = self.eval_node(object)?;
                let idx = self.eval_node(index)?;
                self.index_value(&obj, &idx)
            }
            NodeKind::Ternary { cond, then_branch, else_branch } => {
                if self.eval_node(cond)?.truthy() {
                    self.eval_node(then_branch)
                } else {
                    self.eval_node(else_branch)
                }
            }
            NodeKind::ArrayLiteral(items) => {
                let values = items.iter().map(|i| self.eval_node(i)).collect::<Result<Vec<_>, _>>()?;
                Ok(Value::slice(values))
            }
            NodeKind::MapLiteral(entries) => {
                let mut map = SliceMap::default();
                for (k, v) in entries {
                    map.insert(k.clone(), self.eval_node(v)?);
                }
                Ok(Value::map(map))
            }
            NodeKind::Pipe { left, right } => {
                let left_val = self.eval_node(left)?;
                self.eval_pipe_rhs(left_val, right)
            }
            NodeKind::Lambda { params, body } => {
                let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
                Ok(Value::Func(Rc::new(names), body.clone()))
            }
            NodeKind::NullCoalesce { left, right } => {
                let l = self.eval_node(left)?;
                if l.is_nil() {
                    self.eval_node(right)
                } else {
                    Ok(l)
                }
            }
        }
    }

    fn resolve_identifier(&self, name: &str) -> Value {
        for frame in self.frames.iter().rev() {
            if let Some((_, v)) = frame.iter().rev().find(|(n, _)| n.as_ref() == name) {
                return v.clone();
            }
        }
        self.adapter.get(name)
    }

    fn eval_infix(&mut self, op: InfixOp, left: &Node, right: &Node) -> Result<Value, RunError> {
        // `&&`/`||` short-circuit even in the tree-walked path, matching
        // the compiled path's jump-based lowering (§4.4).
        match op {
            InfixOp::And => {
                let l = self.eval_node(left)?;
                if !l.truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval_node(right)?.truthy()));
            }
            InfixOp::Or => {
                let l = self.eval_node(left)?;
                if l.truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval_node(right)?.truthy()));
            }
            _ => {}
        }
        let a = self.eval_node(left)?;
        let b = self.eval_node(right)?;
        match op {
            InfixOp::Add => a.add(&b),
            InfixOp::Sub => a.sub(&b),
            InfixOp::Mul => a.mul(&b),
            InfixOp::Div => a.div(&b),
            InfixOp::Mod => a.modulo(&b),
            InfixOp::Pow => a.pow(&b),
            InfixOp::Eq => Ok(Value::Bool(a.value_eq(&b))),
            InfixOp::Ne => Ok(Value::Bool(!a.value_eq(&b))),
            InfixOp::Gt => Ok(Value::Bool(a.compare(&b)? == std::cmp::Ordering::Greater)),
            InfixOp::Ge => Ok(Value::Bool(a.compare(&b)? != std::cmp::Ordering::Less)),
            InfixOp::Lt => Ok(Value::Bool(a.compare(&b)? == std::cmp::Ordering::Less)),
            InfixOp::Le => Ok(Value::Bool(a.compare(&b)? != std::cmp::Ordering::Greater)),
            InfixOp::BitAnd => self.int_op(&a, &b, "&", |x, y| x & y),
            InfixOp::BitOr => self.int_op(&a, &b, "|", |x, y| x | y),
            InfixOp::BitXor => self.int_op(&a, &b, "^", |x, y| x ^ y),
            InfixOp::ShiftL => self.int_op(&a, &b, "<<", |x, y| x.wrapping_shl(y as u32)),
            InfixOp::ShiftR => self.int_op(&a, &b, ">>", |x, y| x.wrapping_shr(y as u32)),
            InfixOp::In => self.in_value(&a, &b),
            InfixOp::Matches => Builtin::Matches.call(self, vec![a, b]),
            InfixOp::Contains => Builtin::Contains.call(self, vec![a, b]),
            InfixOp::StartsWith => Builtin::StartsWith.call(self, vec![a, b]),
            InfixOp::EndsWith => Builtin::EndsWith.call(self, vec![a, b]),
            InfixOp::And | InfixOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_call(&mut self, callee: &Node, args: &[Node]) -> Result<Value, RunError> {
        if let NodeKind::Member { object, property } = &callee.kind {
            let receiver = self.eval_node(object)?;
            let values = args.iter().map(|a| self.eval_node(a)).collect::<Result<Vec<_>, _>>()?;
            return match type_method(receiver.kind(), property) {
                Some(method) => method.call(&receiver, &values).map_err(|e| self.err(e.kind, e.message)),
                None => Err(self.err(ErrorKind::NoSuchMethod, format!("'{}' has no method '{property}'", receiver.type_name()))),
            };
        }
        if let NodeKind::OptionalMember { object, property } = &callee.kind {
            let receiver = self.eval_node(object)?;
            if receiver.is_nil() {
                return Ok(Value::Nil);
            }
            let values = args.iter().map(|a| self.eval_node(a)).collect::<Result<Vec<_>, _>>()?;
            return match type_method(receiver.kind(), property) {
                Some(method) => method.call(&receiver, &values).map_err(|e| self.err(e.kind, e.message)),
                None => Err(self.err(ErrorKind::NoSuchMethod, format!("'{}' has no method '{property}'", receiver.type_name()))),
            };
        }
        let func = self.eval_node(callee)?;
        let values = args.iter().map(|a| self.eval_node(a)).collect::<Result<Vec<_>, _>>()?;
        self.call_func_args(&func, &values)
    }

    /// Handles `left | right` where `right` is whatever call-shaped
    /// expression the parser accepted (§4.6): prepend `left` as the first
    /// argument of a builtin or general call. `filter`/`map`/`reduce` get
    /// their per-element placeholder-thunk treatment directly here since a
    /// pipeline nested inside a thunk body is tree-walked, not compiled.
    fn eval_pipe_rhs(&mut self, left: Value, right: &Node) -> Result<Value, RunError> {
        match &right.kind {
            NodeKind::BuiltinCall { builtin, args } => match builtin {
                Builtin::Filter | Builtin::Map | Builtin::Reduce => {
                    let thunk = self.thunk_from_node(&args[0])?;
                    match builtin {
                        Builtin::Filter => self.run_filter(&left, &thunk),
                        Builtin::Map => self.run_map(&left, &thunk),
                        Builtin::Reduce => self.run_reduce(&left, &thunk),
                        _ => unreachable!(),
                    }
                }
                _ => {
                    let mut values = vec![left];
                    for a in args {
                        values.push(self.eval_node(a)?);
                    }
                    builtin.call(self, values)
                }
            },
            NodeKind::Call { callee, args } => {
                let func = self.eval_node(callee)?;
                let mut values = vec![left];
                for a in args {
                    values.push(self.eval_node(a)?);
                }
                self.call_func_args(&func, &values)
            }
            NodeKind::Identifier(name) => {
                let func = self.resolve_identifier(name);
                self.call_func_args(&func, &[left])
            }
            _ => Err(self.err(ErrorKind::BadInstruction, "pipeline right-hand side is not call-shaped")),
        }
    }

    /// Wraps `node` as a zero-parameter `Value::Func` thunk consulting the
    /// placeholder stack, the representation `eval_thunk`/`run_filter`/
    /// `run_map`/`run_reduce` expect.
    fn thunk_from_node(&self, node: &Node) -> Result<Value, RunError> {
        Ok(Value::Func(Rc::new(Vec::new()), Rc::new(clone_node(node))))
    }
}

/// Negative indices count from the end (`-1` is the last element), matching
/// the slice/string indexing convention used throughout the builtins.
fn resolve_index(i: i64, len: usize) -> usize {
    if i < 0 {
        (len as i64 + i).max(-1) as usize
    } else {
        i as usize
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

/// A structural deep clone of an AST subtree, needed only to lift a
/// borrowed `&Node` (owned by its parent tree) into a freestanding
/// `Rc<Node>` thunk; `Node` itself deliberately doesn't derive `Clone`
/// (see its doc comment) since nothing else in the compiler ever needs to
/// duplicate a subtree.
fn clone_node(node: &Node) -> Node {
    let kind = match &node.kind {
        NodeKind::Literal(v) => NodeKind::Literal(v.clone()),
        NodeKind::Identifier(s) => NodeKind::Identifier(s.clone()),
        NodeKind::Placeholder => NodeKind::Placeholder,
        NodeKind::Prefix { op, expr } => NodeKind::Prefix {
            op: *op,
            expr: Rc::new(clone_node(expr)),
        },
        NodeKind::Infix { op, left, right } => NodeKind::Infix {
            op: *op,
            left: Rc::new(clone_node(left)),
            right: Rc::new(clone_node(right)),
        },
        NodeKind::Call { callee, args } => NodeKind::Call {
            callee: Rc::new(clone_node(callee)),
            args: args.iter().map(clone_node).collect(),
        },
        NodeKind::BuiltinCall { builtin, args } => NodeKind::BuiltinCall {
            builtin: *builtin,
            args: args.iter().map(clone_node).collect(),
        },
        NodeKind::Member { object, property } => NodeKind::Member {
            object: Rc::new(clone_node(object)),
            property: property.clone(),
        },
        NodeKind::OptionalMember { object, property } => NodeKind::OptionalMember {
            object: Rc::new(clone_node(object)),
            property: property.clone(),
        },
        NodeKind::Index { object, index } => NodeKind::Index {
            object: Rc::new(clone_node(object)),
            index: Rc::new(clone_node(index)),
        },
        NodeKind::Ternary { cond, then_branch, else_branch } => NodeKind::Ternary {
            cond: Rc::new(clone_node(cond)),
            then_branch: Rc::new(clone_node(then_branch)),
            else_branch: Rc::new(clone_node(else_branch)),
        },
        NodeKind::ArrayLiteral(items) => NodeKind::ArrayLiteral(items.iter().map(clone_node).collect()),
        NodeKind::MapLiteral(entries) => {
            NodeKind::MapLiteral(entries.iter().map(|(k, v)| (k.clone(), clone_node(v))).collect())
        }
        NodeKind::Pipe { left, right } => NodeKind::Pipe {
            left: Rc::new(clone_node(left)),
            right: Rc::new(clone_node(right)),
        },
        NodeKind::Lambda { params, body } => NodeKind::Lambda {
            params: params.clone(),
            body: Rc::new(clone_node(body)),
        },
        NodeKind::NullCoalesce { left, right } => NodeKind::NullCoalesce {
            left: Rc::new(clone_node(left)),
            right: Rc::new(clone_node(right)),
        },
    };
    Node::new(kind, node.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MapAdapter;
    use crate::bytecode::BytecodeBuilder;

    fn run_program(build: impl FnOnce(&mut BytecodeBuilder)) -> Value {
        let mut builder = BytecodeBuilder::new();
        build(&mut builder);
        builder.emit(Opcode::Halt);
        let bytecode = builder.build();
        let adapter = MapAdapter::new();
        let mut vm = Vm::new(&bytecode, &adapter);
        vm.run().unwrap()
    }

    #[test]
    fn constant_arithmetic() {
        let v = run_program(|b| {
            let one = b.add_const(Value::Int(1));
            let two = b.add_const(Value::Int(2));
            b.emit_u16(Opcode::Constant, one);
            b.emit_u16(Opcode::Constant, two);
            b.emit(Opcode::Add);
        });
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn forward_jump_skips_instructions() {
        let v = run_program(|b| {
            let one = b.add_const(Value::Int(1));
            let two = b.add_const(Value::Int(2));
            b.emit_u16(Opcode::Constant, one);
            let label = b.emit_jump(Opcode::Jump);
            b.emit_u16(Opcode::Constant, two);
            b.patch_jump(label);
        });
        assert_eq!(v, Value::Int(1));
    }

    #[test]
    fn make_slice_and_index() {
        let v = run_program(|b| {
            let one = b.add_const(Value::Int(10));
            let two = b.add_const(Value::Int(20));
            let zero_idx = b.add_const(Value::Int(1));
            b.emit_u16(Opcode::Constant, one);
            b.emit_u16(Opcode::Constant, two);
            b.emit_u16(Opcode::MakeSlice, 2);
            b.emit_u16(Opcode::Constant, zero_idx);
            b.emit(Opcode::Index);
        });
        assert_eq!(v, Value::Int(20));
    }

    #[test]
    fn division_by_zero_errors() {
        let mut builder = BytecodeBuilder::new();
        let one = builder.add_const(Value::Int(1));
        let zero = builder.add_const(Value::Int(0));
        builder.emit_u16(Opcode::Constant, one);
        builder.emit_u16(Opcode::Constant, zero);
        builder.emit(Opcode::Div);
        builder.emit(Opcode::Halt);
        let bytecode = builder.build();
        let adapter = MapAdapter::new();
        let mut vm = Vm::new(&bytecode, &adapter);
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn get_var_reads_from_adapter() {
        let mut adapter = MapAdapter::new();
        adapter.insert("x", Value::Int(42));
        let mut builder = BytecodeBuilder::new();
        let idx = builder.get_or_add_variable("x");
        builder.emit_u16(Opcode::GetVar, idx);
        builder.emit(Opcode::Halt);
        let bytecode = builder.build();
        let mut vm = Vm::new(&bytecode, &adapter);
        assert_eq!(vm.run().unwrap(), Value::Int(42));
    }

    #[test]
    fn iteration_budget_halts_a_backward_jump_loop() {
        let mut builder = BytecodeBuilder::new();
        let target = builder.current_offset();
        builder.emit_jump_to(Opcode::Jump, target);
        let bytecode = builder.build();
        let adapter = MapAdapter::new();
        let mut vm = Vm::new(&bytecode, &adapter).with_iter_budget(3);
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, ErrorKind::IterationLimit);
    }
}
