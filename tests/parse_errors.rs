//! Compile-time diagnostics raised by lexing and parsing. `compile` has no
//! `Adapter` to consult (see `sluice::compile`'s doc comment), so type
//! errors and undefined-symbol checks only surface later, from `run`/`eval`
//! — see `runtime_scenarios.rs` for those.

use sluice::{compile, CompileOptions, ErrorKind};

fn compile_err(src: &str) -> Vec<ErrorKind> {
    let err = compile(src, &CompileOptions::new()).expect_err("expected a CompileError");
    err.diagnostics().iter().map(|d| d.kind).collect()
}

#[test]
fn unterminated_string_is_a_lexical_error() {
    assert_eq!(compile_err("\"unterminated"), vec![ErrorKind::LexicalError]);
}

#[test]
fn illegal_character_is_a_lexical_error() {
    assert_eq!(compile_err("1 @ 2"), vec![ErrorKind::LexicalError]);
}

#[test]
fn unbalanced_parens_is_a_parse_error() {
    assert_eq!(compile_err("(1 + 2"), vec![ErrorKind::ParseError]);
}

#[test]
fn missing_operand_is_a_parse_error() {
    assert_eq!(compile_err("1 +"), vec![ErrorKind::ParseError]);
}

#[test]
fn trailing_tokens_after_a_complete_expression_are_a_parse_error() {
    assert_eq!(compile_err("1 + 1 2"), vec![ErrorKind::ParseError]);
}

#[test]
fn a_well_formed_expression_compiles_cleanly() {
    assert!(compile("1 + 2 * (3 - 4) / 5", &CompileOptions::new()).is_ok());
}

#[test]
fn a_parse_failure_yields_exactly_one_diagnostic() {
    // The parser fails fast at its first syntax error rather than
    // recovering and accumulating further ones, so `CompileError` here
    // always carries a single entry.
    let err = compile("(1 +) + (2 *)", &CompileOptions::new()).expect_err("expected a CompileError");
    assert_eq!(err.diagnostics().len(), 1);
}
