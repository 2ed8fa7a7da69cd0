//! Byte-exact checks on the compiled artifact: constant folding collapses
//! to a single `Constant` load, and `<`/`<=` canonicalize to the same
//! instructions as their `>`/`>=` operand-swapped forms (§4.4, §8).

use sluice::{compile, CompileOptions};

fn instructions(src: &str) -> Vec<u8> {
    compile(src, &CompileOptions::new()).unwrap().bytecode().instructions().to_vec()
}

#[test]
fn folded_literal_expression_compiles_to_one_constant_load() {
    // `Constant(idx16)` is one opcode byte + 2 operand bytes, followed by
    // `Halt`: four bytes total, regardless of how many literals and
    // operators made up the source expression.
    let bytes = instructions("1 + 2 * 3 - (4 / 2)");
    assert_eq!(bytes.len(), 4, "expected a single folded Constant + Halt, got {bytes:?}");
}

#[test]
fn less_than_canonicalizes_to_swapped_greater_than() {
    assert_eq!(instructions("a < b"), instructions("b > a"));
}

#[test]
fn less_equal_canonicalizes_to_swapped_greater_equal() {
    assert_eq!(instructions("a <= b"), instructions("b >= a"));
}

#[test]
fn non_literal_addition_is_not_folded() {
    // With a free variable involved, the compiler cannot fold at compile
    // time, so this must be longer than the folded four-byte form above.
    let bytes = instructions("a + 1");
    assert!(bytes.len() > 4, "expected unfolded bytecode, got {bytes:?}");
}
