//! Free builtin functions.
//!
//! Organized into a handful of category submodules rather than one file per
//! builtin (a one-file-per-builtin convention does not
//! scale cleanly to this language's ~48 builtins without a lot of one-line
//! files; grouping by concern keeps the dispatch-table idiom while staying
//! readable). [`Builtin`] is the fixed-order enum that is also the wire
//! contract between the compiler and the VM (§6.3/§4.7): its `#[repr(u8)]`
//! discriminant IS the builtin index baked into `Builtin(idx8, argc8)`
//! instructions, so variants must never be reordered, only appended to
//! (before any user-registered builtins via `WithBuiltin`, which are
//! indexed starting at `Builtin::COUNT`).

mod collection;
mod conv;
mod methods;
mod numeric;
mod pipeline;
mod stringy;

pub use methods::{type_method, TypeMethod};

use std::fmt;

use strum::{EnumCount, FromRepr, IntoStaticStr};

use crate::error::{ErrorKind, RunError};
use crate::value::Value;
use crate::vm::Vm;

/// The fixed-order free builtin table (§4.7). Order is a wire contract:
/// never reorder, only append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, FromRepr, IntoStaticStr, EnumCount)]
#[strum(serialize_all = "camelCase")]
#[repr(u8)]
pub enum Builtin {
    Len,
    String,
    Int,
    Float,
    Bool,
    Abs,
    Max,
    Min,
    Contains,
    StartsWith,
    EndsWith,
    Upper,
    Lower,
    Trim,
    Type,
    Replace,
    Substring,
    IndexOf,
    Ceil,
    Floor,
    Round,
    Sqrt,
    Pow,
    Now,
    Flatten,
    GroupBy,
    Filter,
    Map,
    Reduce,
    Sort,
    Reverse,
    Take,
    Skip,
    Unique,
    Count,
    Sum,
    Avg,
    Split,
    Join,
    Match,
    Debug,
    Pipe,
    Matches,
    All,
    Any,
    First,
    Last,
    Keys,
}

/// Arity contract for a builtin: a fixed count, or variadic with a minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    #[must_use]
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
        }
    }
}

impl Builtin {
    /// Looks up a builtin by its surface-syntax name. Used by the parser
    /// to decide whether a call over a bare identifier becomes a
    /// `BuiltinCall` node (§4.2) and by the compiler's pre-populated
    /// global symbol table (§4.4).
    #[must_use]
    pub fn lookup(name: &str) -> Option<Builtin> {
        use std::str::FromStr;
        Builtin::from_str(name).ok()
    }

    /// The builtin's wire index (§6.3's fixed builtin index table).
    #[must_use]
    pub fn index(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_index(idx: u8) -> Option<Builtin> {
        Builtin::from_repr(idx)
    }

    #[must_use]
    pub fn arity(self) -> Arity {
        use Builtin::*;
        match self {
            Len | String | Int | Float | Bool | Upper | Lower | Trim | Type | Ceil | Floor | Round | Sqrt
            | Flatten | Reverse | Unique | Count | Sum | Avg | Debug | First | Last | Keys | Abs => Arity::Exact(1),
            Contains | StartsWith | EndsWith | IndexOf | Pow | GroupBy | Filter | Map | Reduce | Split | Join
            | Match | Matches | All | Any | Take | Skip => Arity::Exact(2),
            Replace => Arity::Exact(3),
            Substring => Arity::Exact(3),
            Max | Min | Sort | Pipe => Arity::AtLeast(1),
            Now => Arity::Exact(0),
        }
    }

    /// True for the handful of builtins that may need to re-enter the VM
    /// to evaluate a placeholder thunk argument (`groupBy`'s key thunk,
    /// `all`/`any`'s predicate). `filter`/`map`/`reduce` are NOT in this
    /// set: they compile to their own dedicated opcodes (§6.3) rather than
    /// the generic `Builtin(idx8, argc8)` instruction.
    #[must_use]
    pub fn takes_thunk(self) -> bool {
        matches!(self, Builtin::GroupBy | Builtin::All | Builtin::Any)
    }

    pub fn call(self, vm: &mut Vm, args: Vec<Value>) -> Result<Value, RunError> {
        if !self.arity().accepts(args.len()) {
            return Err(RunError::new(
                ErrorKind::ArityError,
                None,
                format!("{self}() takes {} argument(s), got {}", self.arity(), args.len()),
            ));
        }
        use Builtin::*;
        match self {
            Len => collection::builtin_len(&args[0]),
            String => conv::builtin_string(&args[0]),
            Int => conv::builtin_int(&args[0]),
            Float => conv::builtin_float(&args[0]),
            Bool => conv::builtin_bool(&args[0]),
            Abs => numeric::builtin_abs(&args[0]),
            Max => numeric::builtin_max(&args),
            Min => numeric::builtin_min(&args),
            Contains => collection::builtin_contains(&args[0], &args[1]),
            StartsWith => stringy::builtin_starts_with(&args[0], &args[1]),
            EndsWith => stringy::builtin_ends_with(&args[0], &args[1]),
            Upper => stringy::builtin_upper(&args[0]),
            Lower => stringy::builtin_lower(&args[0]),
            Trim => stringy::builtin_trim(&args[0]),
            Type => conv::builtin_type(&args[0]),
            Replace => stringy::builtin_replace(&args[0], &args[1], &args[2]),
            Substring => stringy::builtin_substring(&args[0], &args[1], &args[2]),
            IndexOf => collection::builtin_index_of(&args[0], &args[1]),
            Ceil => numeric::builtin_ceil(&args[0]),
            Floor => numeric::builtin_floor(&args[0]),
            Round => numeric::builtin_round(&args[0]),
            Sqrt => numeric::builtin_sqrt(&args[0]),
            Pow => numeric::builtin_pow(&args[0], &args[1]),
            Now => numeric::builtin_now(),
            Flatten => collection::builtin_flatten(&args[0]),
            GroupBy => pipeline::builtin_group_by(vm, &args[0], &args[1]),
            Filter | Map | Reduce => unreachable!("{self} compiles to a dedicated opcode, never Builtin(idx,argc)"),
            Sort => collection::builtin_sort(&args[0]),
            Reverse => collection::builtin_reverse(&args[0]),
            Take => collection::builtin_take(&args[0], &args[1]),
            Skip => collection::builtin_skip(&args[0], &args[1]),
            Unique => collection::builtin_unique(&args[0]),
            Count => collection::builtin_len(&args[0]),
            Sum => numeric::builtin_sum(&args[0]),
            Avg => numeric::builtin_avg(&args[0]),
            Split => stringy::builtin_split(&args[0], &args[1]),
            Join => stringy::builtin_join(&args[0], &args[1]),
            Match => stringy::builtin_match(&args[0], &args[1]),
            Debug => conv::builtin_debug(&args[0]),
            Pipe => Ok(args.into_iter().next().expect("Pipe arity is AtLeast(1)")),
            Matches => stringy::builtin_matches(&args[0], &args[1]),
            All => pipeline::builtin_all(vm, &args[0], &args[1]),
            Any => pipeline::builtin_any(vm, &args[0], &args[1]),
            First => collection::builtin_first(&args[0]),
            Last => collection::builtin_last(&args[0]),
            Keys => collection::builtin_keys(&args[0]),
        }
    }
}
