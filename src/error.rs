//! Error taxonomy shared by the compiler and the VM.
//!
//! A single [`ErrorKind`] enumerates every category a caller can act on
//! (lexical/parse/type errors at compile time; arity/type/bounds/timeout
//! failures at run time). Compile-time errors are collected into a
//! [`CompileError`] list; a runtime error is singular, since the first one
//! halts execution.

use std::fmt;

/// A location in the source text, 1-indexed (matches editor conventions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error taxonomy from the error handling design.
///
/// `LexicalError`, `ParseError`, `TypeError`, and the non-`AllowUndefinedVariables`
/// case of `UndefinedSymbol` only ever occur at compile time. The remainder are
/// runtime-only; `ArityError` occurs at both (a builtin call with a statically
/// known wrong arity is rejected during compilation, an adapter-provided host
/// function with a dynamic arity is rejected at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    LexicalError,
    ParseError,
    TypeError,
    UndefinedSymbol,
    ArityError,
    TypeMismatch,
    DivisionByZero,
    IndexOutOfRange,
    NoSuchMethod,
    Timeout,
    IterationLimit,
    BadInstruction,
}

/// One accumulated compile-time error entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub position: Option<Position>,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: ErrorKind, position: Option<Position>, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at {}: {}", self.kind, pos, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Non-empty list of compile-time diagnostics. Compilation fails iff one
/// of these is produced; the lexer/parser/checker all accumulate into it
/// rather than bailing on the first problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    /// # Panics
    /// Panics if `diagnostics` is empty: a `CompileError` asserts failure.
    #[must_use]
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        assert!(!diagnostics.is_empty(), "CompileError requires at least one diagnostic");
        Self { diagnostics }
    }

    #[must_use]
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// A single runtime failure. The first one halts `Run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: ErrorKind,
    pub position: Option<Position>,
    pub message: String,
}

impl RunError {
    #[must_use]
    pub fn new(kind: ErrorKind, position: Option<Position>, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at {}: {}", self.kind, pos, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RunError {}

/// `Eval` is Compile+Run; its error type is the union of both halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    Compile(CompileError),
    Run(RunError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(e) => write!(f, "{e}"),
            Self::Run(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<CompileError> for EvalError {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<RunError> for EvalError {
    fn from(e: RunError) -> Self {
        Self::Run(e)
    }
}

/// Shorthand used throughout the compiler for a single fatal diagnostic
/// raised outside the accumulating paths (e.g. a hard internal-limit panic
/// path that should instead surface as a proper error).
pub type CompileResult<T> = Result<T, Diagnostic>;

/// Shorthand used throughout the VM and builtins.
pub type RunResult<T> = Result<T, RunError>;
