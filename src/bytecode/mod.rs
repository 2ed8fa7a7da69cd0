//! The compiled artifact and the pieces that build it.

pub mod builder;
pub mod code;
pub mod compiler;
pub mod op;

pub use builder::BytecodeBuilder;
pub use code::Bytecode;
pub use compiler::{compile_ast, compile_ast_with_host_fns};
pub use op::Opcode;
