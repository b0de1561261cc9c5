use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

/// Element type of a variable slot.
///
/// Booleans are stored as `f64` 0/1 in scratch memory and interoperate with
/// numeric instructions; the declared kind governs conversion at the
/// source/sink boundary only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueKind {
    Bool,
    Float,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Float => write!(f, "float"),
        }
    }
}

/// A named storage slot of a compiled program.
///
/// The name ties the slot to source/sink bindings; the kind is fixed at
/// compile time and never reinterpreted. Where the slot's cells live is
/// decided by the engine's buffer layout, not recorded here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Variable {
    pub name: String,
    pub kind: ValueKind,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Shared handle to a [`Variable`], held both by the engine's tier tables and
/// by the compiler that created it.
pub type VariableHandle = Arc<Variable>;
