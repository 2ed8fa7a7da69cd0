//! The public entry points (§6.1): `compile`/`run`/`eval`, the
//! `CompileOptions` builder, and the compiled `Program` artifact they
//! produce.
//!
//! `compile` takes no environment — a `Program` is meant to be compiled
//! once and run against many different [`Adapter`]s, so it cannot bind to
//! one host's variable shapes up front. That means the type checker
//! (§4.3), which needs a live `Adapter` to resolve free-variable types,
//! cannot run during `compile`; it instead runs at the start of `run`,
//! which does receive one. A `Program` therefore keeps the parsed AST
//! alongside its compiled [`Bytecode`] so `run` can check-then-execute
//! in one call. A caller who re-runs the same `Program` against the same
//! `Adapter` repeatedly pays that check cost every time — acceptable here
//! since the whole point of a fixed `Program` is running it against
//! *different* environments, so the check can't be hoisted out for good.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::adapter::Adapter;
use crate::ast::Node;
use crate::bytecode::{self, Bytecode};
use crate::checker;
use crate::error::{CompileError, Diagnostic, EvalError, RunError};
use crate::parser;
use crate::value::Value;
use crate::vm::{HostFn, Vm};

/// Descriptive metadata for a `CompileOptions::with_operator` registration.
/// `symbol` and `precedence` are not consumed by this engine's own fixed
/// grammar (see the module doc on [`CompileOptions::with_operator`]); a
/// host that wants to expose its own infix surface syntax around the
/// registered function can read these back via [`CompileOptions::operators`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomOperator {
    pub symbol: String,
    pub precedence: u8,
}

/// Builder for the options accepted by [`compile`] and [`eval`] (§6.1).
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    timeout: Option<Duration>,
    max_iterations: Option<u64>,
    allow_undefined: bool,
    host_fns: Vec<(String, HostFn)>,
    operators: Vec<CustomOperator>,
}

impl CompileOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a wall-clock deadline, tested on every backward jump and
    /// pipeline-callback iteration (§5). Expiry fails `Run` with `Timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Caps total executed backward-jump iterations (§5). Expiry fails
    /// `Run` with `IterationLimit`.
    #[must_use]
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Registers `name` as a callable host function, indexed after the
    /// fixed builtin table (§4.7) in a table private to this `Program`.
    /// Calling `name(args...)` or piping into it (`a | name(args...)`)
    /// dispatches straight to `f` rather than going through the fixed
    /// `Builtin` table or the tree-walked thunk evaluator.
    #[must_use]
    pub fn with_builtin(mut self, name: impl Into<String>, f: HostFn) -> Self {
        self.host_fns.push((name.into(), f));
        self
    }

    /// Registers a custom infix operator that lowers to a host function
    /// call (§6.1). `f` is reachable exactly like a `with_builtin`
    /// registration under the name `symbol` — `precedence` is retained
    /// purely as descriptive metadata (see [`CompileOptions::operators`])
    /// rather than taught to the parser's fixed grammar: this engine's
    /// token set and precedence table are fixed ahead of time so the
    /// checker can reason about shapes statically, and growing new
    /// punctuation-level infix tokens per `Program` would undermine that.
    #[must_use]
    pub fn with_operator(mut self, symbol: impl Into<String>, precedence: u8, f: HostFn) -> Self {
        let symbol = symbol.into();
        self.operators.push(CustomOperator {
            symbol: symbol.clone(),
            precedence,
        });
        self.host_fns.push((symbol, f));
        self
    }

    /// When true, an identifier that resolves to nothing (not a scope
    /// binding, a fixed or host builtin, or an `Adapter`-known variable)
    /// checks as `Nil` instead of raising `UndefinedSymbol` (§6.1).
    #[must_use]
    pub fn allow_undefined_variables(mut self, allow: bool) -> Self {
        self.allow_undefined = allow;
        self
    }

    /// The custom operators registered so far, in registration order.
    #[must_use]
    pub fn operators(&self) -> &[CustomOperator] {
        &self.operators
    }

    fn host_fn_names(&self) -> Vec<String> {
        self.host_fns.iter().map(|(name, _)| name.clone()).collect()
    }

    fn host_fn_table(&self) -> Vec<HostFn> {
        self.host_fns.iter().map(|(_, f)| *f).collect()
    }
}

/// A compiled program: parsed AST plus assembled bytecode, ready to
/// [`run`] against any [`Adapter`]. Not `Clone`/`Debug`: `Node` carries
/// neither (see its doc comment), and a `Program` is meant to be built
/// once by `compile` and then run repeatedly by reference, not copied.
pub struct Program {
    ast: Node,
    bytecode: Bytecode,
    host_fn_names: Vec<String>,
    host_fns: Vec<HostFn>,
    allow_undefined_variables: bool,
    timeout: Option<Duration>,
    max_iterations: Option<u64>,
}

impl Program {
    /// The compiled bytecode, for a caller that wants to inspect or
    /// disassemble it directly rather than only running it.
    #[must_use]
    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }
}

/// Lexes, parses, and compiles `source` to bytecode (§6.1). Does not
/// consult an environment — see the module doc for why type checking is
/// deferred to [`run`].
pub fn compile(source: &str, opts: &CompileOptions) -> Result<Program, CompileError> {
    let ast = parser::parse(source).map_err(CompileError::single)?;
    let host_fn_names = opts.host_fn_names();
    let host_fn_name_rcs: Vec<Rc<str>> = host_fn_names.iter().map(|n| Rc::from(n.as_str())).collect();
    let bytecode = bytecode::compile_ast_with_host_fns(&ast, &host_fn_name_rcs)
        .map_err(|e| CompileError::single(Diagnostic::new(e.kind, Some(e.position), e.message)))?;
    Ok(Program {
        ast,
        bytecode,
        host_fn_names,
        host_fns: opts.host_fn_table(),
        allow_undefined_variables: opts.allow_undefined,
        timeout: opts.timeout,
        max_iterations: opts.max_iterations,
    })
}

/// Type-checks `program` against `env`, then executes it (§6.1).
pub fn run(program: &Program, env: &dyn Adapter) -> Result<Value, RunError> {
    checker::check(&program.ast, env, program.allow_undefined_variables, &program.host_fn_names).map_err(|diagnostics| {
        let first = diagnostics.into_iter().next().expect("check() only Errs with at least one diagnostic");
        RunError::new(first.kind, first.position, first.message)
    })?;
    let mut vm = Vm::new(&program.bytecode, env).with_host_fns(&program.host_fns);
    if let Some(timeout) = program.timeout {
        vm = vm.with_deadline(Instant::now() + timeout);
    }
    if let Some(n) = program.max_iterations {
        vm = vm.with_iter_budget(n);
    }
    vm.run()
}

/// `compile` followed by `run` — a convenience for the common case of
/// compiling and executing a source string once (§6.1).
pub fn eval(source: &str, env: &dyn Adapter, opts: &CompileOptions) -> Result<Value, EvalError> {
    let program = compile(source, opts)?;
    Ok(run(&program, env)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MapAdapter;
    use crate::error::ErrorKind;

    #[test]
    fn eval_simple_arithmetic() {
        let env = MapAdapter::new();
        let got = eval("1 + 2 * 3", &env, &CompileOptions::new()).unwrap();
        assert_eq!(got, Value::Int(7));
    }

    #[test]
    fn eval_resolves_adapter_variable() {
        let mut env = MapAdapter::new();
        env.insert("x", Value::Int(10));
        let got = eval("x * 2", &env, &CompileOptions::new()).unwrap();
        assert_eq!(got, Value::Int(20));
    }

    #[test]
    fn undefined_variable_fails_by_default() {
        let env = MapAdapter::new();
        let err = eval("missing + 1", &env, &CompileOptions::new()).unwrap_err();
        match err {
            EvalError::Run(e) => assert_eq!(e.kind, ErrorKind::UndefinedSymbol),
            other => panic!("expected a Run(UndefinedSymbol), got {other:?}"),
        }
    }

    #[test]
    fn allow_undefined_variables_downgrades_to_nil() {
        let env = MapAdapter::new();
        let opts = CompileOptions::new().allow_undefined_variables(true);
        let got = eval("missing", &env, &opts).unwrap();
        assert_eq!(got, Value::Nil);
    }

    fn double_it(args: &[Value]) -> Result<Value, RunError> {
        match args.first().and_then(Value::as_f64) {
            Some(n) => Ok(Value::Float(n * 2.0)),
            None => Err(RunError::new(ErrorKind::TypeMismatch, None, "double() expects a numeric argument")),
        }
    }

    #[test]
    fn with_builtin_registers_a_callable_host_function() {
        let env = MapAdapter::new();
        let opts = CompileOptions::new().with_builtin("double", double_it);
        let got = eval("double(21)", &env, &opts).unwrap();
        assert_eq!(got, Value::Float(42.0));
    }

    #[test]
    fn with_builtin_is_reachable_through_a_pipeline() {
        let env = MapAdapter::new();
        let opts = CompileOptions::new().with_builtin("double", double_it);
        let got = eval("21 | double()", &env, &opts).unwrap();
        assert_eq!(got, Value::Float(42.0));
    }

    #[test]
    fn with_operator_records_descriptive_precedence_metadata() {
        let opts = CompileOptions::new().with_operator("cross", 7, double_it);
        assert_eq!(opts.operators(), &[CustomOperator { symbol: "cross".into(), precedence: 7 }]);
    }

    #[test]
    fn coerce_applies_after_eval_returns() {
        let env = MapAdapter::new();
        let got = eval("\"3\"", &env, &CompileOptions::new()).unwrap();
        assert_eq!(got.coerce(crate::value::Coercion::AsInt).unwrap(), Value::Int(3));
    }

    #[test]
    fn program_can_be_reused_across_different_adapters() {
        let opts = CompileOptions::new();
        let program = compile("x + 1", &opts).unwrap();
        let mut first = MapAdapter::new();
        first.insert("x", Value::Int(1));
        let mut second = MapAdapter::new();
        second.insert("x", Value::Int(100));
        assert_eq!(run(&program, &first).unwrap(), Value::Int(2));
        assert_eq!(run(&program, &second).unwrap(), Value::Int(101));
    }
}
