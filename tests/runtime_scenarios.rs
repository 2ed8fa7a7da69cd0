//! End-to-end `eval`/`run` scenarios covering the pipeline/lambda runtime,
//! type methods, optional chaining, and adapter-driven variable resolution.

use sluice::{compile, eval, run, CompileOptions, ErrorKind, EvalError, MapAdapter, RunError, Value};

fn env_with(entries: &[(&str, Value)]) -> MapAdapter {
    let mut env = MapAdapter::new();
    for (k, v) in entries {
        env.insert(*k, v.clone());
    }
    env
}

#[test]
fn filter_then_map_pipeline() {
    let env = MapAdapter::new();
    let got = eval("[1, 2, 3, 4, 5, 6] | filter(# % 2 == 0) | map(# * 10)", &env, &CompileOptions::new()).unwrap();
    assert_eq!(got, Value::slice(vec![Value::Int(20), Value::Int(40), Value::Int(60)]));
}

#[test]
fn reduce_with_a_named_lambda_accumulator() {
    let env = MapAdapter::new();
    let got = eval("[1, 2, 3, 4] | reduce((acc, x) => acc + x)", &env, &CompileOptions::new()).unwrap();
    assert_eq!(got, Value::Int(10));
}

#[test]
fn nested_pipelines_keep_their_own_placeholder_binding() {
    // The inner pipeline's `#` must bind to its own element, not leak the
    // outer pipeline's current element.
    let env = MapAdapter::new();
    let src = "[[1, 2], [3, 4]] | map(# | map(# * 2))";
    let got = eval(src, &env, &CompileOptions::new()).unwrap();
    assert_eq!(
        got,
        Value::slice(vec![
            Value::slice(vec![Value::Int(2), Value::Int(4)]),
            Value::slice(vec![Value::Int(6), Value::Int(8)]),
        ])
    );
}

#[test]
fn string_type_methods_dispatch_correctly() {
    let env = MapAdapter::new();
    assert_eq!(eval("\"Hello\".upper()", &env, &CompileOptions::new()).unwrap(), Value::string("HELLO"));
    assert_eq!(eval("\"Hello\".startsWith(\"He\")", &env, &CompileOptions::new()).unwrap(), Value::Bool(true));
    assert_eq!(eval("\"  hi  \".trim()", &env, &CompileOptions::new()).unwrap(), Value::string("hi"));
}

#[test]
fn slice_type_methods_dispatch_correctly() {
    let env = MapAdapter::new();
    assert_eq!(eval("[3, 1, 2].first()", &env, &CompileOptions::new()).unwrap(), Value::Int(3));
    assert_eq!(eval("[3, 1, 2].last()", &env, &CompileOptions::new()).unwrap(), Value::Int(2));
    assert_eq!(eval("[1, 2, 3].contains(2)", &env, &CompileOptions::new()).unwrap(), Value::Bool(true));
}

#[test]
fn method_call_on_a_statically_known_kind_with_no_such_method_fails_at_check_time() {
    // `true`'s type is known at check time, so the missing method is a
    // `TypeError` raised by the checker inside `run`, not a runtime
    // `NoSuchMethod` from the dispatch table.
    let env = MapAdapter::new();
    let err = eval("true.upper()", &env, &CompileOptions::new()).unwrap_err();
    match err {
        EvalError::Run(e) => assert_eq!(e.kind, ErrorKind::TypeError),
        other => panic!("expected Run(TypeError), got {other:?}"),
    }
}

#[test]
fn method_call_on_a_dynamically_typed_receiver_with_no_such_method_fails_at_run_time() {
    // An `allow_undefined_variables` receiver checks as `Any`, so the
    // missing-method check can only happen once the VM sees the real
    // value — here `Nil`, since `missing` resolves to nothing.
    let env = MapAdapter::new();
    let opts = CompileOptions::new().allow_undefined_variables(true);
    let err = eval("missing.upper()", &env, &opts).unwrap_err();
    match err {
        EvalError::Run(e) => assert_eq!(e.kind, ErrorKind::NoSuchMethod),
        other => panic!("expected Run(NoSuchMethod), got {other:?}"),
    }
}

#[test]
fn optional_chaining_short_circuits_on_nil() {
    let env = env_with(&[]);
    let got = eval("missing?.length()", &env, &CompileOptions::new().allow_undefined_variables(true)).unwrap();
    assert_eq!(got, Value::Nil);
}

#[test]
fn null_coalesce_falls_back_on_nil() {
    let env = env_with(&[]);
    let got = eval(
        "missing ?? \"fallback\"",
        &env,
        &CompileOptions::new().allow_undefined_variables(true),
    )
    .unwrap();
    assert_eq!(got, Value::string("fallback"));
}

#[test]
fn adapter_variables_and_map_indexing() {
    let mut user_fields = sluice::SliceMap::default();
    user_fields.insert("name".to_string(), Value::string("Ada"));
    user_fields.insert("age".to_string(), Value::Int(36));
    let env = env_with(&[("user", Value::map(user_fields))]);
    assert_eq!(eval("user[\"name\"]", &env, &CompileOptions::new()).unwrap(), Value::string("Ada"));
    assert_eq!(eval("user[\"age\"]", &env, &CompileOptions::new()).unwrap(), Value::Int(36));
    assert_eq!(eval("user.size()", &env, &CompileOptions::new()).unwrap(), Value::Int(2));
    assert_eq!(eval("user.has(\"age\")", &env, &CompileOptions::new()).unwrap(), Value::Bool(true));
}

#[test]
fn undefined_symbol_fails_the_checker_at_run_time_by_default() {
    let env = MapAdapter::new();
    let program = compile("totally_unknown + 1", &CompileOptions::new()).unwrap();
    let err = run(&program, &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedSymbol);
}

#[test]
fn a_single_program_type_checks_independently_against_each_adapter() {
    let program = compile("x + 1", &CompileOptions::new()).unwrap();
    let numeric_env = env_with(&[("x", Value::Int(41))]);
    assert_eq!(run(&program, &numeric_env).unwrap(), Value::Int(42));

    let string_env = env_with(&[("x", Value::string("not a number"))]);
    let err = run(&program, &string_env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn with_operator_is_callable_by_name_and_via_pipe() {
    fn cross(args: &[Value]) -> Result<Value, RunError> {
        match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b + 1)),
            _ => Err(RunError::new(ErrorKind::TypeMismatch, None, "cross() expects two ints")),
        }
    }
    let env = MapAdapter::new();
    let opts = CompileOptions::new().with_operator("cross", 5, cross);
    assert_eq!(eval("cross(2, 3)", &env, &opts).unwrap(), Value::Int(7));
    assert_eq!(eval("2 | cross(3)", &env, &opts).unwrap(), Value::Int(7));
}

#[test]
fn coercion_applies_after_a_successful_eval() {
    let env = MapAdapter::new();
    let got = eval("\"7\"", &env, &CompileOptions::new()).unwrap();
    assert_eq!(got.coerce(sluice::Coercion::AsInt).unwrap(), Value::Int(7));
}
