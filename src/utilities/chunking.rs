//! Splits a rolling computation into independent output chunks.
//!
//! Each chunk re-reads up to `window - 1` samples before its first output
//! position to warm its own window state, so chunks share nothing but the
//! read-only input and write disjoint parts of the output.

use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

/// Lower bound on the output length of one chunk.
pub const CHUNK_FLOOR: usize = 10_000;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("invalid worker count: n_jobs = {n_jobs} (use -1 for all cores)")]
    InvalidWorkerCount { n_jobs: isize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    /// First input position fed to the chunk's window.
    pub warm_start: usize,
    /// First output position of the chunk.
    pub start: usize,
    /// One past the last output position.
    pub end: usize,
}

impl Chunk {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Clone, Debug)]
pub struct ChunkPlan {
    pub chunk_len: usize,
    pub chunks: Vec<Chunk>,
}

pub fn plan_chunks(len: usize, window: usize) -> ChunkPlan {
    if len == 0 {
        return ChunkPlan {
            chunk_len: 0,
            chunks: Vec::new(),
        };
    }
    let groups = len.div_ceil(window.max(CHUNK_FLOOR));
    let chunk_len = len.div_ceil(groups);
    let lookback = window.saturating_sub(1);
    let chunks = (0..len)
        .step_by(chunk_len)
        .map(|start| Chunk {
            warm_start: start.saturating_sub(lookback),
            start,
            end: (start + chunk_len).min(len),
        })
        .collect();
    ChunkPlan { chunk_len, chunks }
}

/// Number of workers for `n_jobs`; negative means every available core.
pub fn resolve_workers(n_jobs: isize) -> Result<usize, ChunkError> {
    match n_jobs {
        0 => Err(ChunkError::InvalidWorkerCount { n_jobs }),
        n if n < 0 => Ok(available_workers()),
        n => Ok(n as usize),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn available_workers() -> usize {
    rayon::current_num_threads()
}

#[cfg(target_arch = "wasm32")]
fn available_workers() -> usize {
    1
}

/// Runs `run(chunk, dst)` for every chunk of `out`, where `dst` is the part of
/// `out` covering `chunk.start..chunk.end`. Returns once every chunk is done.
///
/// A positive `n_jobs` that differs from the global pool size builds a new
/// `rayon::ThreadPool` for this call and drops it on return.
pub fn for_each_chunk<F>(
    out: &mut [f64],
    window: usize,
    n_jobs: isize,
    run: F,
) -> Result<(), ChunkError>
where
    F: Fn(Chunk, &mut [f64]) + Send + Sync,
{
    let workers = resolve_workers(n_jobs)?;
    let len = out.len();
    if len == 0 {
        return Ok(());
    }
    let plan = plan_chunks(len, window);
    if plan.chunks.len() < 2 || workers == 1 {
        tracing::debug!(len, window, workers, "running single chunk");
        run(
            Chunk {
                warm_start: 0,
                start: 0,
                end: len,
            },
            out,
        );
        return Ok(());
    }

    tracing::debug!(
        len,
        window,
        groups = plan.chunks.len(),
        chunk_len = plan.chunk_len,
        workers,
        "dispatching chunks"
    );

    #[cfg(not(target_arch = "wasm32"))]
    {
        let dispatch = |out: &mut [f64]| {
            out.par_chunks_mut(plan.chunk_len)
                .zip(plan.chunks.par_iter())
                .for_each(|(dst, &chunk)| run(chunk, dst));
        };
        if n_jobs < 0 || workers == rayon::current_num_threads() {
            dispatch(out);
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| ChunkError::ThreadPool(e.to_string()))?;
            pool.install(|| dispatch(out));
        }
    }

    #[cfg(target_arch = "wasm32")]
    for (dst, &chunk) in out.chunks_mut(plan.chunk_len).zip(plan.chunks.iter()) {
        run(chunk, dst);
    }

    Ok(())
}
