//! An embeddable expression language: a tagged-value model, a lexer,
//! parser, static type checker, ahead-of-time bytecode compiler, and a
//! register-less virtual machine, fronted by a small [`compile`]/[`run`]/
//! [`eval`] API.
//!
//! A host embeds this by implementing [`Adapter`] to expose its own
//! variables and methods, then compiling source once with [`compile`] and
//! running the resulting [`Program`] as many times as it likes, against
//! as many different `Adapter`s as it likes.

mod api;
mod ast;
mod adapter;
mod builtins;
mod bytecode;
mod checker;
mod debugger;
mod error;
mod lexer;
mod parser;
mod scope;
mod types;
mod value;
mod vm;

pub use crate::{
    adapter::{Adapter, MapAdapter},
    api::{compile, eval, run, CompileOptions, CustomOperator, Program},
    bytecode::{Bytecode, Opcode},
    debugger::{NoHook, StatsHook, VmHook},
    error::{CompileError, Diagnostic, ErrorKind, EvalError, Position, RunError},
    value::{Coercion, SliceMap, Value},
    vm::HostFn,
};
