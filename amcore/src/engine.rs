//! The program object: tier storage, binding, buffer management, and the
//! three run stages.
use std::collections::BTreeMap;

use aminstr::{
    code::{self, CodeStep},
    tier::Tier,
    value::{ValueKind, VariableHandle},
};
use enum_map::enum_map;
use log::debug;
use smallvec::SmallVec;

use crate::{
    bindings::{SinkArray, SourceArray},
    buffer::{BufferLayout, ScratchBuffer},
    config::EngineConfig,
    error::{BindError, EngineError, IndexError},
    exec::{self, Frame},
    parallel::{self, ChunkTask, WorkerTask},
    program::ParserProgramHandle,
};

/// A compiled array-expression program together with the machinery to
/// execute it.
///
/// The engine is populated by an upstream expression compiler: tier tables
/// are sized with the `resize_*` methods, filled through the indexed
/// accessors, and named arrays are attached with [`add_source`] /
/// [`add_sink`]. It is then driven through [`run_const`], [`run_single`]
/// and [`run_sequential`], in that order; a stage must not be invoked after
/// an earlier one failed. The engine may be re-run many times.
///
/// The lifetime parameter `'arr` holds the bound arrays borrowed: sources
/// shared, sinks exclusive. The borrow ends when the engine is dropped, so
/// the arrays are guaranteed to outlive every run.
///
/// [`add_source`]: Engine::add_source
/// [`add_sink`]: Engine::add_sink
/// [`run_const`]: Engine::run_const
/// [`run_single`]: Engine::run_single
/// [`run_sequential`]: Engine::run_sequential
#[derive(Debug)]
pub struct Engine<'arr> {
    config: EngineConfig,
    sources: BTreeMap<String, SourceArray<'arr>>,
    sinks: BTreeMap<String, SinkArray<'arr>>,
    const_vars: Vec<Option<VariableHandle>>,
    single_vars: Vec<Option<VariableHandle>>,
    /// Per-thread instances of the sequential variable table, `[thread][slot]`.
    sequential_vars: Vec<Vec<Option<VariableHandle>>>,
    const_code: Vec<Option<CodeStep>>,
    single_code: Vec<Option<CodeStep>>,
    /// Per-thread instances of the sequential code, `[thread][step]`.
    sequential_code: Vec<Vec<Option<CodeStep>>>,
    buffer: ScratchBuffer,
    parser_program: Option<ParserProgramHandle>,
}

impl<'arr> Engine<'arr> {
    pub fn new(config: EngineConfig) -> Self {
        let threads = config.num_threads;
        Self {
            config,
            sources: BTreeMap::new(),
            sinks: BTreeMap::new(),
            const_vars: Vec::new(),
            single_vars: Vec::new(),
            sequential_vars: vec![Vec::new(); threads],
            const_code: Vec::new(),
            single_code: Vec::new(),
            sequential_code: vec![Vec::new(); threads],
            buffer: ScratchBuffer::default(),
            parser_program: None,
        }
    }

    /// Construct with explicit sizing; `num_threads = None` auto-detects
    /// the host's available parallelism.
    pub fn with_sizes(
        array_size: usize,
        buffer_size: usize,
        num_threads: Option<usize>,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(EngineConfig::new(
            array_size,
            buffer_size,
            num_threads,
        )?))
    }

    /// Elements processed per chunk. Fixed at construction.
    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Worker threads used by the sequential tier. Fixed at construction.
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    pub fn array_size(&self) -> usize {
        self.config.array_size
    }

    /// Change the number of elements to process. Chunk partitioning is
    /// recomputed on the next run; tier storage is unaffected.
    pub fn set_array_size(&mut self, array_size: usize) {
        self.config.array_size = array_size;
    }

    /// `ceil(array_size / buffer_size)`.
    pub fn num_chunks(&self) -> usize {
        parallel::num_chunks(self.config.array_size, self.config.buffer_size)
    }

    // --- source/sink binding -------------------------------------------------

    /// Bind a named input array. Fails if the name is already bound in
    /// either role; the existing binding is left intact.
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        array: impl Into<SourceArray<'arr>>,
    ) -> Result<(), BindError> {
        let name = name.into();
        self.check_unbound(&name)?;
        self.sources.insert(name, array.into());
        Ok(())
    }

    /// Bind a named output array. Same contract as [`Engine::add_source`].
    pub fn add_sink(
        &mut self,
        name: impl Into<String>,
        array: impl Into<SinkArray<'arr>>,
    ) -> Result<(), BindError> {
        let name = name.into();
        self.check_unbound(&name)?;
        self.sinks.insert(name, array.into());
        Ok(())
    }

    pub fn find_source(&self, name: &str) -> Option<&SourceArray<'arr>> {
        self.sources.get(name)
    }

    pub fn find_sink(&self, name: &str) -> Option<&SinkArray<'arr>> {
        self.sinks.get(name)
    }

    /// Drop a binding so the name can be bound to a different array between
    /// runs. Cannot be called mid-run since the run methods take `&mut self`.
    pub fn remove_source(&mut self, name: &str) -> Option<SourceArray<'arr>> {
        self.sources.remove(name)
    }

    pub fn remove_sink(&mut self, name: &str) -> Option<SinkArray<'arr>> {
        self.sinks.remove(name)
    }

    fn check_unbound(&self, name: &str) -> Result<(), BindError> {
        if self.sources.contains_key(name) {
            return Err(BindError::AlreadyBound {
                name: name.to_owned(),
                role: crate::bindings::Role::Source,
            });
        }
        if self.sinks.contains_key(name) {
            return Err(BindError::AlreadyBound {
                name: name.to_owned(),
                role: crate::bindings::Role::Sink,
            });
        }
        Ok(())
    }

    // --- tier storage --------------------------------------------------------

    pub fn resize_const_variables(&mut self, len: usize) {
        self.const_vars.resize(len, None);
    }

    pub fn resize_single_variables(&mut self, len: usize) {
        self.single_vars.resize(len, None);
    }

    /// Resize every worker thread's sequential variable table.
    pub fn resize_sequential_variables(&mut self, len: usize) {
        for table in &mut self.sequential_vars {
            table.resize(len, None);
        }
    }

    pub fn resize_const_program(&mut self, len: usize) {
        self.const_code.resize(len, None);
    }

    pub fn resize_single_program(&mut self, len: usize) {
        self.single_code.resize(len, None);
    }

    /// Resize every worker thread's sequential code sequence.
    pub fn resize_sequential_program(&mut self, len: usize) {
        for table in &mut self.sequential_code {
            table.resize(len, None);
        }
    }

    pub fn set_const_variable(
        &mut self,
        index: usize,
        handle: VariableHandle,
    ) -> Result<(), IndexError> {
        Self::put(&mut self.const_vars, Tier::Const, index, handle)
    }

    pub fn get_const_variable(&self, index: usize) -> Result<&VariableHandle, IndexError> {
        Self::fetch(&self.const_vars, Tier::Const, index)
    }

    pub fn set_single_variable(
        &mut self,
        index: usize,
        handle: VariableHandle,
    ) -> Result<(), IndexError> {
        Self::put(&mut self.single_vars, Tier::Single, index, handle)
    }

    pub fn get_single_variable(&self, index: usize) -> Result<&VariableHandle, IndexError> {
        Self::fetch(&self.single_vars, Tier::Single, index)
    }

    pub fn set_sequential_variable(
        &mut self,
        index: usize,
        thread: usize,
        handle: VariableHandle,
    ) -> Result<(), IndexError> {
        let num_threads = self.config.num_threads;
        let table = self
            .sequential_vars
            .get_mut(thread)
            .ok_or(IndexError::ThreadOutOfRange {
                thread,
                num_threads,
            })?;
        Self::put(table, Tier::Sequential, index, handle)
    }

    pub fn get_sequential_variable(
        &self,
        index: usize,
        thread: usize,
    ) -> Result<&VariableHandle, IndexError> {
        let num_threads = self.config.num_threads;
        let table = self
            .sequential_vars
            .get(thread)
            .ok_or(IndexError::ThreadOutOfRange {
                thread,
                num_threads,
            })?;
        Self::fetch(table, Tier::Sequential, index)
    }

    pub fn set_const_program_code(
        &mut self,
        index: usize,
        step: CodeStep,
    ) -> Result<(), IndexError> {
        Self::put(&mut self.const_code, Tier::Const, index, step)
    }

    pub fn set_single_program_code(
        &mut self,
        index: usize,
        step: CodeStep,
    ) -> Result<(), IndexError> {
        Self::put(&mut self.single_code, Tier::Single, index, step)
    }

    pub fn set_sequential_program_code(
        &mut self,
        index: usize,
        thread: usize,
        step: CodeStep,
    ) -> Result<(), IndexError> {
        let num_threads = self.config.num_threads;
        let table = self
            .sequential_code
            .get_mut(thread)
            .ok_or(IndexError::ThreadOutOfRange {
                thread,
                num_threads,
            })?;
        Self::put(table, Tier::Sequential, index, step)
    }

    fn put<T>(
        table: &mut Vec<Option<T>>,
        tier: Tier,
        index: usize,
        value: T,
    ) -> Result<(), IndexError> {
        let len = table.len();
        match table.get_mut(index) {
            Some(entry) => {
                *entry = Some(value);
                Ok(())
            }
            None => Err(IndexError::OutOfRange { tier, index, len }),
        }
    }

    fn fetch<T>(table: &[Option<T>], tier: Tier, index: usize) -> Result<&T, IndexError> {
        match table.get(index) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(IndexError::Vacant { tier, index }),
            None => Err(IndexError::OutOfRange {
                tier,
                index,
                len: table.len(),
            }),
        }
    }

    // --- program handle ------------------------------------------------------

    pub fn set_parser_program(&mut self, handle: ParserProgramHandle) {
        self.parser_program = Some(handle);
    }

    pub fn parser_program(&self) -> Option<&ParserProgramHandle> {
        self.parser_program.as_ref()
    }

    // --- execution -----------------------------------------------------------

    /// Execute the constant tier: single-threaded, no chunking, once per
    /// program lifetime. Stops at the first failing instruction; later
    /// constant instructions are not attempted.
    pub fn run_const(&mut self) -> Result<(), EngineError> {
        let layout = self.layout();
        Self::check_tier_code(&self.const_code, Tier::Const, &layout)?;
        self.buffer.ensure(&layout);

        let (owned, _) = self.buffer.scalar_areas(&layout);
        let mut frame = Frame {
            tier: Tier::Const,
            consts: &[],
            singles: &[],
            owned,
            stride: 1,
            len: 1,
        };
        for step in self.const_code.iter().flatten() {
            exec::execute(step, &mut frame).map_err(|source| EngineError::Eval {
                tier: Tier::Const,
                line: step.line,
                source,
            })?;
        }
        Ok(())
    }

    /// Execute the single tier: once per run invocation, after a successful
    /// [`Engine::run_const`]. May read const-tier results. Same fail-fast
    /// contract as the const tier.
    pub fn run_single(&mut self) -> Result<(), EngineError> {
        let layout = self.layout();
        Self::check_tier_code(&self.single_code, Tier::Single, &layout)?;
        self.buffer.ensure(&layout);

        let (consts, owned) = self.buffer.scalar_areas(&layout);
        let mut frame = Frame {
            tier: Tier::Single,
            consts,
            singles: &[],
            owned,
            stride: 1,
            len: 1,
        };
        for step in self.single_code.iter().flatten() {
            exec::execute(step, &mut frame).map_err(|source| EngineError::Eval {
                tier: Tier::Single,
                line: step.line,
                source,
            })?;
        }
        Ok(())
    }

    /// Execute the sequential tier over `[0, array_size)` in parallel.
    ///
    /// Chunks of at most `buffer_size` elements are assigned round-robin to
    /// `num_threads` workers. Each worker, per owned chunk, copies the
    /// bound sources into its private slots, runs its code sequence, and
    /// copies sink-bound slots back out. On a failure the owning worker
    /// records the line, raises the stop flag and abandons its remaining
    /// chunks; other workers finish their in-flight chunk, so sink writes
    /// of completed chunks persist and are not rolled back. The reported
    /// error is the smallest failing line across threads.
    pub fn run_sequential(&mut self) -> Result<(), EngineError> {
        let layout = self.layout();
        for table in &self.sequential_code {
            Self::check_tier_code(table, Tier::Sequential, &layout)?;
        }

        let array_size = self.config.array_size;
        let buffer_size = self.config.buffer_size;
        let num_threads = self.config.num_threads;

        let source_slots = self.resolve_sources()?;
        let sink_slots = self.resolve_sinks()?;

        // Dense per-thread snapshot of the code; vacancy was checked above.
        let code: Vec<Vec<CodeStep>> = self
            .sequential_code
            .iter()
            .map(|table| table.iter().flatten().copied().collect())
            .collect();

        debug!(
            "dispatching {} chunks of at most {buffer_size} elements across {num_threads} workers",
            parallel::num_chunks(array_size, buffer_size)
        );

        let mut tasks: Vec<ChunkTask<'_>> = parallel::chunks(array_size, buffer_size)
            .map(|chunk| ChunkTask {
                chunk,
                sources: SmallVec::new(),
                sinks: SmallVec::new(),
            })
            .collect();
        for ((_, array), slot) in self.sources.iter().zip(&source_slots) {
            for (task, piece) in tasks
                .iter_mut()
                .zip(array.chunked(array_size, buffer_size))
            {
                task.sources.push((*slot, piece));
            }
        }
        for ((_, array), slot) in self.sinks.iter_mut().zip(&sink_slots) {
            for (task, piece) in tasks
                .iter_mut()
                .zip(array.chunked_mut(array_size, buffer_size))
            {
                task.sinks.push((*slot, piece));
            }
        }

        self.buffer.ensure(&layout);
        let (consts, singles, regions) = self.buffer.sequential_areas(&layout);

        let mut per_thread: Vec<Vec<ChunkTask<'_>>> =
            (0..num_threads).map(|_| Vec::new()).collect();
        for task in tasks {
            per_thread[task.chunk.index % num_threads].push(task);
        }

        let workers: Vec<WorkerTask<'_>> = regions
            .into_iter()
            .zip(per_thread)
            .zip(&code)
            .enumerate()
            .map(|(thread, ((region, tasks), code))| WorkerTask {
                thread,
                code: code.as_slice(),
                region,
                tasks,
            })
            .collect();

        parallel::run_workers(consts, singles, buffer_size, workers).map_err(|(line, source)| {
            EngineError::Eval {
                tier: Tier::Sequential,
                line,
                source,
            }
        })
    }

    // --- internals -----------------------------------------------------------

    /// Compute the buffer layout from the current tier sizes. Called at the
    /// start of every run stage, so resizes issued after an earlier run are
    /// picked up (and re-validated) before anything executes.
    fn layout(&self) -> BufferLayout {
        BufferLayout::new(
            enum_map! {
                Tier::Const => self.const_vars.len(),
                Tier::Single => self.single_vars.len(),
                Tier::Sequential => self.sequential_vars.first().map_or(0, Vec::len),
            },
            self.config.buffer_size,
            self.config.num_threads,
        )
    }

    fn check_tier_code(
        table: &[Option<CodeStep>],
        tier: Tier,
        layout: &BufferLayout,
    ) -> Result<(), EngineError> {
        for (index, step) in table.iter().enumerate() {
            if step.is_none() {
                return Err(IndexError::Vacant { tier, index }.into());
            }
        }
        code::check_code(tier, table.iter().flatten(), layout.counts())?;
        Ok(())
    }

    fn resolve_sources(&self) -> Result<Vec<usize>, EngineError> {
        let expected = self.config.array_size;
        let mut slots = Vec::with_capacity(self.sources.len());
        for (name, array) in &self.sources {
            slots.push(self.resolve_binding(name, array.kind(), array.len(), expected)?);
        }
        Ok(slots)
    }

    fn resolve_sinks(&self) -> Result<Vec<usize>, EngineError> {
        let expected = self.config.array_size;
        let mut slots = Vec::with_capacity(self.sinks.len());
        for (name, array) in &self.sinks {
            slots.push(self.resolve_binding(name, array.kind(), array.len(), expected)?);
        }
        Ok(slots)
    }

    fn resolve_binding(
        &self,
        name: &str,
        kind: ValueKind,
        len: usize,
        expected: usize,
    ) -> Result<usize, BindError> {
        let (slot, declared) = self
            .sequential_slot(name)
            .ok_or_else(|| BindError::NoSuchSlot {
                name: name.to_owned(),
            })?;
        if declared != kind {
            return Err(BindError::KindMismatch {
                name: name.to_owned(),
                bound: kind,
                slot: declared,
            });
        }
        if len < expected {
            return Err(BindError::TooShort {
                name: name.to_owned(),
                len,
                expected,
            });
        }
        Ok(slot)
    }

    /// Look a binding name up in the sequential variable tables. Thread 0
    /// is authoritative; the tables are per-thread instances of one layout.
    fn sequential_slot(&self, name: &str) -> Option<(usize, ValueKind)> {
        self.sequential_vars
            .first()?
            .iter()
            .enumerate()
            .find_map(|(index, var)| {
                var.as_ref()
                    .filter(|var| var.name == name)
                    .map(|var| (index, var.kind))
            })
    }
}

impl Default for Engine<'_> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
