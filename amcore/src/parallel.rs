//! Parallel chunk dispatch.
//!
//! `run_sequential`'s protocol lives here. The element range is partitioned
//! into chunks of at most `buffer_size` elements; chunks are assigned to
//! workers round-robin by chunk index before any thread starts, together
//! with the exclusive sink slices of each chunk. Workers share nothing but
//! the read-only scalar areas, a stop flag, and a barrier; each one writes
//! failures only into its own cache-padded status slot. On failure a worker
//! raises the stop flag and abandons its remaining chunks, while in-flight
//! chunks on other workers complete, which is why sink writes of finished
//! chunks persist (at-least-partial-effect semantics).
use std::sync::{
    Barrier,
    atomic::{AtomicBool, Ordering},
};

use aminstr::{code::CodeStep, tier::Tier};
use crossbeam::utils::CachePadded;
use log::{debug, trace};
use smallvec::SmallVec;

use crate::{
    bindings::{SinkArray, SourceArray},
    error::EvalError,
    exec::{self, Frame},
};

/// Contiguous element range processed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub index: usize,
    pub start: usize,
    pub len: usize,
}

pub(crate) fn num_chunks(array_size: usize, buffer_size: usize) -> usize {
    array_size.div_ceil(buffer_size)
}

/// Partition `[0, array_size)` into chunks of at most `buffer_size`
/// elements. Covers every index exactly once; the last chunk may be short.
pub(crate) fn chunks(array_size: usize, buffer_size: usize) -> impl Iterator<Item = Chunk> {
    (0..num_chunks(array_size, buffer_size)).map(move |index| {
        let start = index * buffer_size;
        Chunk {
            index,
            start,
            len: buffer_size.min(array_size - start),
        }
    })
}

/// One chunk's work order: the element range plus the source/sink slices of
/// that range, moved into the owning worker before any thread is spawned.
pub(crate) struct ChunkTask<'a> {
    pub chunk: Chunk,
    /// `(sequential slot index, chunk-sized slice)` pairs.
    pub sources: SmallVec<(usize, SourceArray<'a>), 4>,
    pub sinks: SmallVec<(usize, SinkArray<'a>), 4>,
}

/// Everything one worker thread owns for the duration of a run.
pub(crate) struct WorkerTask<'a> {
    pub thread: usize,
    pub code: &'a [CodeStep],
    /// This thread's exclusive sequential region of the scratch buffer.
    pub region: &'a mut [f64],
    pub tasks: Vec<ChunkTask<'a>>,
}

/// Error slot owned by exactly one worker; padded so neighbouring slots do
/// not share a cache line.
#[derive(Debug, Default)]
struct ThreadStatus {
    failure: Option<(u32, EvalError)>,
}

/// Fan the workers out, join them, and aggregate per-thread failures.
///
/// Returns the failure with the smallest line number; between equal lines
/// the lowest thread index wins. Both choices keep the reported error
/// independent of scheduling.
pub(crate) fn run_workers(
    consts: &[f64],
    singles: &[f64],
    stride: usize,
    workers: Vec<WorkerTask<'_>>,
) -> Result<(), (u32, EvalError)> {
    let barrier = Barrier::new(workers.len());
    let stop = AtomicBool::new(false);
    let mut statuses: Vec<CachePadded<ThreadStatus>> = workers
        .iter()
        .map(|_| CachePadded::new(ThreadStatus::default()))
        .collect();

    let joined = crossbeam::thread::scope(|scope| {
        for (worker, status) in workers.into_iter().zip(statuses.iter_mut()) {
            let barrier = &barrier;
            let stop = &stop;
            scope.spawn(move |_| run_worker(worker, consts, singles, stride, barrier, stop, status));
        }
    });
    if let Err(payload) = joined {
        std::panic::resume_unwind(payload);
    }

    let mut first: Option<(u32, usize, EvalError)> = None;
    for (thread, status) in statuses.iter().enumerate() {
        if let Some((line, error)) = status.failure {
            let better = match first {
                None => true,
                Some((best_line, ..)) => line < best_line,
            };
            if better {
                first = Some((line, thread, error));
            }
        }
    }
    match first {
        Some((line, thread, error)) => {
            debug!("sequential run failed at line {line}, first reported by worker {thread}");
            Err((line, error))
        }
        None => Ok(()),
    }
}

fn run_worker(
    worker: WorkerTask<'_>,
    consts: &[f64],
    singles: &[f64],
    stride: usize,
    barrier: &Barrier,
    stop: &AtomicBool,
    status: &mut ThreadStatus,
) {
    let WorkerTask {
        thread,
        code,
        region,
        tasks,
    } = worker;

    'chunks: for task in tasks {
        if stop.load(Ordering::Relaxed) {
            trace!("worker {thread} observed stop flag, abandoning chunk {}", task.chunk.index);
            break;
        }
        trace!(
            "worker {thread} processing chunk {} ({} elements at {})",
            task.chunk.index, task.chunk.len, task.chunk.start
        );

        let mut frame = Frame {
            tier: Tier::Sequential,
            consts,
            singles,
            owned: &mut *region,
            stride,
            len: task.chunk.len,
        };
        copy_in(&task.sources, &mut frame);
        for step in code {
            if let Err(error) = exec::execute(step, &mut frame) {
                status.failure = Some((step.line, error));
                stop.store(true, Ordering::Relaxed);
                break 'chunks;
            }
        }
        copy_out(task.sinks, &frame);
    }

    barrier.wait();
}

/// Copy each bound source's chunk slice into its sequential slot,
/// converting booleans to 0/1 cells.
fn copy_in(sources: &[(usize, SourceArray<'_>)], frame: &mut Frame<'_>) {
    for &(slot, piece) in sources {
        let base = slot * frame.stride;
        let cells = &mut frame.owned[base..base + piece.len()];
        match piece {
            SourceArray::Bool(values) => {
                for (cell, value) in cells.iter_mut().zip(values) {
                    *cell = if *value { 1.0 } else { 0.0 };
                }
            }
            SourceArray::Float(values) => cells.copy_from_slice(values),
        }
    }
}

/// Copy sequential slots back out into the bound sinks' chunk slices.
fn copy_out(sinks: SmallVec<(usize, SinkArray<'_>), 4>, frame: &Frame<'_>) {
    for (slot, piece) in sinks {
        let base = slot * frame.stride;
        match piece {
            SinkArray::Bool(values) => {
                let cells = &frame.owned[base..base + values.len()];
                for (value, cell) in values.iter_mut().zip(cells) {
                    *value = *cell != 0.0;
                }
            }
            SinkArray::Float(values) => {
                values.copy_from_slice(&frame.owned[base..base + values.len()]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_index_exactly_once() {
        let mut seen = vec![0u32; 1000];
        for chunk in chunks(1000, 128) {
            for i in chunk.start..chunk.start + chunk.len {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn chunk_count_is_ceil_of_the_ratio() {
        assert_eq!(num_chunks(1000, 128), 8);
        assert_eq!(num_chunks(1024, 128), 8);
        assert_eq!(num_chunks(1, 128), 1);
        assert_eq!(num_chunks(0, 128), 0);
    }

    #[test]
    fn last_chunk_is_short() {
        let all: Vec<Chunk> = chunks(1000, 128).collect();
        assert_eq!(all.len(), 8);
        assert!(all[..7].iter().all(|c| c.len == 128));
        assert_eq!(all[7].len, 104);
        assert_eq!(all[7].start, 896);
    }
}
