//! Engine sizing parameters.
use std::num::NonZeroUsize;
use std::thread;

use crate::error::ConfigError;

/// Default number of elements processed per chunk.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Sizing parameters of an engine.
///
/// `buffer_size` and `num_threads` are fixed once the engine is created;
/// changing them would invalidate the allocated buffer layout. `array_size`
/// may change between runs, since chunk partitioning is computed fresh per
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total number of elements to process.
    pub(crate) array_size: usize,
    /// Elements per chunk; bounds temporary memory.
    pub(crate) buffer_size: usize,
    /// Degree of parallelism for the sequential tier.
    pub(crate) num_threads: usize,
}

impl EngineConfig {
    /// Validate explicit sizing parameters.
    ///
    /// `num_threads = None` auto-detects the host's available parallelism.
    pub fn new(
        array_size: usize,
        buffer_size: usize,
        num_threads: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        let num_threads = match num_threads {
            Some(0) => return Err(ConfigError::ZeroThreads),
            Some(n) => n,
            None => detect_threads(),
        };
        Ok(Self {
            array_size,
            buffer_size,
            num_threads,
        })
    }

    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            array_size: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
            num_threads: detect_threads(),
        }
    }
}

fn detect_threads() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
