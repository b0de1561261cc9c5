use aminstr::{error::CodeError, tier::Tier, value::ValueKind};
use strum::EnumIs;
use thiserror::Error;

use crate::bindings::Role;

/// Rejected sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("`buffer_size` must be greater than zero")]
    ZeroBufferSize,

    #[error("`num_threads` must be at least one")]
    ZeroThreads,
}

/// Failed source/sink binding or resolution.
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, Error)]
pub enum BindError {
    /// The name is already bound; the existing binding is left intact.
    #[error("`{name}` is already bound as a {role}")]
    AlreadyBound { name: String, role: Role },

    /// The bound array does not cover the configured array size.
    #[error("array bound to `{name}` holds {len} elements but the engine processes {expected}")]
    TooShort {
        name: String,
        len: usize,
        expected: usize,
    },

    /// No sequential variable carries the bound name.
    #[error("`{name}` does not name any sequential variable")]
    NoSuchSlot { name: String },

    /// The array's element type disagrees with the slot's declared kind.
    #[error("`{name}` is bound to a {bound} array but the sequential slot holds {slot} values")]
    KindMismatch {
        name: String,
        bound: ValueKind,
        slot: ValueKind,
    },
}

/// Accessor index outside the currently configured tier bounds. Fatal to the
/// calling compilation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("index {index} out of range for the {tier} tier (size {len})")]
    OutOfRange {
        tier: Tier,
        index: usize,
        len: usize,
    },

    #[error("{tier} tier entry {index} was resized into existence but never assigned")]
    Vacant { tier: Tier, index: usize },

    #[error("thread index {thread} out of range ({num_threads} worker threads)")]
    ThreadOutOfRange { thread: usize, num_threads: usize },
}

/// Runtime failure of a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("`{op}` evaluated outside its domain")]
    Domain { op: &'static str },

    /// An operand or destination did not resolve inside the executing
    /// frame. Pre-run validation makes this unreachable for checked
    /// programs; it is kept total rather than trusted.
    #[error("slot {index} of the {tier} tier lies outside the executing frame")]
    BadSlot { tier: Tier, index: usize },
}

/// Any failure the engine can report.
///
/// Evaluation failures carry the originating tier and the failing
/// instruction's source line so the caller can map them back through the
/// original expression text.
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Code(#[from] CodeError),

    #[error("evaluation failed in the {tier} tier at line {line}: {source}")]
    Eval {
        tier: Tier,
        line: u32,
        source: EvalError,
    },
}

impl EngineError {
    /// Line of the failing instruction, when the failure happened during
    /// evaluation.
    pub fn error_line(&self) -> Option<u32> {
        match self {
            EngineError::Eval { line, .. } => Some(*line),
            _ => None,
        }
    }
}
