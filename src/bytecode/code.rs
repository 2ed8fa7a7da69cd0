//! The compiled artifact: a flat instruction stream plus metadata, handed
//! from the compiler to the VM.
//!
//! There is exactly one [`Bytecode`] per compiled program here, not one
//! per function — this language has no first-class user functions (§2
//! Non-goals), so there is nothing to give its own compiled object to.
//! Lambda and pipeline-callback bodies are kept
//! as AST thunks (`Value::Func`) rather than compiled into a second
//! instruction stream; see `vm::Vm::eval_thunk`.

use std::rc::Rc;

use crate::error::Position;
use crate::value::Value;

/// Compiled bytecode for a whole program: instructions, constant pool, and
/// a location table for mapping a faulted instruction back to source
/// position in a [`crate::error::RunError`].
///
/// Immutable once built: compile once, run many times from many `Vm`
/// instances (§5). Not `Send`/`Sync` itself since constants are `Rc`-backed
/// (§3.1); share a compiled program across threads by recompiling per
/// thread or wrapping it at the call site if that's ever needed.
#[derive(Debug, Clone)]
pub struct Bytecode {
    instructions: Vec<u8>,
    constants: Vec<Value>,
    location_table: Vec<LocationEntry>,
    /// Names referenced as free variables (resolved against the host's
    /// [`crate::adapter::Adapter`] at `GetVar` time), in first-reference
    /// order. The operand to `GetVar`/`SetVar` is an index into this table.
    variable_order: Vec<Rc<str>>,
}

impl Bytecode {
    #[must_use]
    pub fn new(
        instructions: Vec<u8>,
        constants: Vec<Value>,
        location_table: Vec<LocationEntry>,
        variable_order: Vec<Rc<str>>,
    ) -> Self {
        Self {
            instructions,
            constants,
            location_table,
            variable_order,
        }
    }

    #[must_use]
    pub fn instructions(&self) -> &[u8] {
        &self.instructions
    }

    #[must_use]
    pub fn constant(&self, index: u16) -> &Value {
        &self.constants[index as usize]
    }

    #[must_use]
    pub fn variable_name(&self, index: u16) -> &str {
        &self.variable_order[index as usize]
    }

    #[must_use]
    pub fn variable_order(&self) -> &[Rc<str>] {
        &self.variable_order
    }

    /// Finds the most recent location entry at or before `offset`. Entries
    /// are recorded in increasing offset order, so a reverse linear scan
    /// finds the right one; programs are small enough that this never
    /// shows up in a profile.
    #[must_use]
    pub fn location_for_offset(&self, offset: usize) -> Option<Position> {
        let offset = offset as u32;
        self.location_table.iter().rev().find(|e| e.offset <= offset).map(|e| e.position)
    }
}

/// Maps a bytecode offset to the source position that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationEntry {
    pub offset: u32,
    pub position: Position,
}

impl LocationEntry {
    #[must_use]
    pub fn new(offset: u32, position: Position) -> Self {
        Self { offset, position }
    }
}
