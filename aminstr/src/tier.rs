use enum_map::Enum;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

/// Evaluation tier of a compiled program.
///
/// A program is split into three independent variable/instruction sets by how
/// often they must be evaluated. Later tiers may read the results of earlier
/// ones; the reverse is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Enum, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Tier {
    /// Evaluated exactly once per program lifetime, independent of chunking.
    Const,
    /// Evaluated exactly once per run invocation, after the const tier,
    /// shared across all chunks and threads.
    Single,
    /// Evaluated once per chunk per worker thread; the main per-element
    /// computation.
    Sequential,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Const => write!(f, "const"),
            Tier::Single => write!(f, "single"),
            Tier::Sequential => write!(f, "sequential"),
        }
    }
}
