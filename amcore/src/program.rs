//! Opaque handle to the upstream compiler's output.
use std::sync::Arc;

use uuid::Uuid;

/// Reference to the compiled expression this engine was assembled from.
///
/// Stored purely for bookkeeping and diagnostics (re-deriving source text
/// for error messages, correlating engines with compiler output). The
/// engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserProgram {
    uuid: Uuid,
    source: String,
}

impl ParserProgram {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            source: source.into(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The expression text the program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Shared, reference-counted program handle.
pub type ParserProgramHandle = Arc<ParserProgram>;
