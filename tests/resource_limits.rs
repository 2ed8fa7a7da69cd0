//! Timeout and iteration-budget soundness (§5, §8): a deadline already in
//! the past must fail with `Timeout` and never return a partial value, and
//! a loop that would otherwise run forever is bounded by `MaxIterations`.

use std::time::Duration;

use sluice::{eval, CompileOptions, ErrorKind, EvalError, MapAdapter, Value};

fn synthetic_range(n: i64) -> Value {
    Value::slice((0..n).map(Value::Int).collect())
}

#[test]
fn expired_deadline_fails_with_timeout_not_a_partial_value() {
    let mut env = MapAdapter::new();
    env.insert("numbers", synthetic_range(1_000_000));
    // A nested pipeline over a large synthetic range (§8 scenario 5); an
    // already-past deadline must reject it before any element is produced.
    let src = "numbers | filter(# % 2 == 0) | map(# * 2) | sum";
    let opts = CompileOptions::new().with_timeout(Duration::from_nanos(1));
    std::thread::sleep(Duration::from_millis(1));
    let err = eval(src, &env, &opts).unwrap_err();
    match err {
        EvalError::Run(e) => assert_eq!(e.kind, ErrorKind::Timeout),
        other => panic!("expected a Run(Timeout), got {other:?}"),
    }
}

#[test]
fn max_iterations_bounds_a_pipeline_over_a_large_collection() {
    let mut env = MapAdapter::new();
    env.insert("numbers", synthetic_range(1_000_000));
    let src = "numbers | filter(# % 2 == 0) | map(# * 2) | sum";
    let opts = CompileOptions::new().with_max_iterations(10);
    let err = eval(src, &env, &opts).unwrap_err();
    match err {
        EvalError::Run(e) => assert_eq!(e.kind, ErrorKind::IterationLimit),
        other => panic!("expected a Run(IterationLimit), got {other:?}"),
    }
}
