//! Source and sink array bindings.
//!
//! Sources are external input arrays copied into sequential variable slots
//! at the start of each chunk; sinks are output arrays the matching slots
//! are copied back into at the end. Bindings are borrowed, never copied:
//! the caller owns the arrays, and the engine's lifetime parameter holds
//! them borrowed for as long as the engine may run.
use aminstr::value::ValueKind;
use either::Either;
use strum::EnumIs;

/// Binding role of a name. A name is either a source or a sink, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Sink,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Sink => write!(f, "sink"),
        }
    }
}

/// Borrowed input array.
#[derive(Debug, Clone, Copy, EnumIs)]
pub enum SourceArray<'a> {
    Bool(&'a [bool]),
    Float(&'a [f64]),
}

impl<'a> SourceArray<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            SourceArray::Bool(_) => ValueKind::Bool,
            SourceArray::Float(_) => ValueKind::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SourceArray::Bool(cells) => cells.len(),
            SourceArray::Float(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chunk the first `len` elements into pieces of at most `size`.
    pub(crate) fn chunked(
        &self,
        len: usize,
        size: usize,
    ) -> impl Iterator<Item = SourceArray<'a>> {
        match *self {
            SourceArray::Bool(cells) => {
                Either::Left(cells[..len].chunks(size).map(SourceArray::Bool))
            }
            SourceArray::Float(cells) => {
                Either::Right(cells[..len].chunks(size).map(SourceArray::Float))
            }
        }
    }
}

impl<'a> From<&'a [bool]> for SourceArray<'a> {
    fn from(cells: &'a [bool]) -> Self {
        SourceArray::Bool(cells)
    }
}

impl<'a> From<&'a [f64]> for SourceArray<'a> {
    fn from(cells: &'a [f64]) -> Self {
        SourceArray::Float(cells)
    }
}

/// Borrowed output array.
#[derive(Debug, EnumIs)]
pub enum SinkArray<'a> {
    Bool(&'a mut [bool]),
    Float(&'a mut [f64]),
}

impl<'a> SinkArray<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            SinkArray::Bool(_) => ValueKind::Bool,
            SinkArray::Float(_) => ValueKind::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SinkArray::Bool(cells) => cells.len(),
            SinkArray::Float(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chunk the first `len` elements into disjoint mutable pieces of at
    /// most `size`. Exclusivity of each piece is what lets worker threads
    /// write their chunks without synchronization.
    pub(crate) fn chunked_mut(
        &mut self,
        len: usize,
        size: usize,
    ) -> impl Iterator<Item = SinkArray<'_>> {
        match self {
            SinkArray::Bool(cells) => {
                Either::Left(cells[..len].chunks_mut(size).map(SinkArray::Bool))
            }
            SinkArray::Float(cells) => {
                Either::Right(cells[..len].chunks_mut(size).map(SinkArray::Float))
            }
        }
    }
}

impl<'a> From<&'a mut [bool]> for SinkArray<'a> {
    fn from(cells: &'a mut [bool]) -> Self {
        SinkArray::Bool(cells)
    }
}

impl<'a> From<&'a mut [f64]> for SinkArray<'a> {
    fn from(cells: &'a mut [f64]) -> Self {
        SinkArray::Float(cells)
    }
}
