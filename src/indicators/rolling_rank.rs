#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::utilities::block_cache::BlockRankCache;
use crate::utilities::chunking::{for_each_chunk, Chunk, ChunkError};
use crate::utilities::enums::{Kernel, ParseEnumError, PctMode, RankBounds, RankMethod};
use crate::utilities::helpers::{alloc_with_nan_prefix, detect_best_kernel};
use crate::utilities::order_stats::OrderStatTree;
use crate::utilities::sample::RankValue;

use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

pub const DEFAULT_WINDOW: usize = 20;

impl<'a, T> AsRef<[T]> for RollingRankInput<'a, T> {
    #[inline(always)]
    fn as_ref(&self) -> &[T] {
        self.data
    }
}

#[derive(Debug, Clone)]
pub struct RollingRankOutput {
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RollingRankParams {
    pub window: Option<usize>,
    pub method: Option<RankMethod>,
    pub pct: Option<bool>,
    pub pct_mode: Option<PctMode>,
    /// Worker threads; negative uses every core of the global rayon pool.
    /// A positive count other than the global pool size builds a fresh
    /// `rayon::ThreadPool` on every call, batch calls included, so repeated
    /// calls on short series should prefer `-1` or `1`.
    pub n_jobs: Option<isize>,
}

impl Default for RollingRankParams {
    fn default() -> Self {
        Self {
            window: Some(DEFAULT_WINDOW),
            method: Some(RankMethod::Average),
            pct: Some(false),
            pct_mode: Some(PctMode::Pandas),
            n_jobs: Some(-1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollingRankInput<'a, T = f64> {
    pub data: &'a [T],
    pub params: RollingRankParams,
}

impl<'a, T: RankValue> RollingRankInput<'a, T> {
    #[inline]
    pub fn from_slice(sl: &'a [T], p: RollingRankParams) -> Self {
        Self {
            data: sl,
            params: p,
        }
    }

    #[inline]
    pub fn with_default_slice(sl: &'a [T]) -> Self {
        Self::from_slice(sl, RollingRankParams::default())
    }

    #[inline]
    pub fn get_window(&self) -> usize {
        self.params.window.unwrap_or(DEFAULT_WINDOW)
    }

    #[inline]
    pub fn get_method(&self) -> RankMethod {
        self.params.method.unwrap_or_default()
    }

    #[inline]
    pub fn get_pct(&self) -> bool {
        self.params.pct.unwrap_or(false)
    }

    #[inline]
    pub fn get_pct_mode(&self) -> PctMode {
        self.params.pct_mode.unwrap_or_default()
    }

    #[inline]
    pub fn get_n_jobs(&self) -> isize {
        self.params.n_jobs.unwrap_or(-1)
    }
}

#[derive(Debug, Error)]
pub enum RollingRankError {
    #[error("rolling_rank: Invalid window: window = {window}")]
    InvalidWindow { window: usize },

    #[error("rolling_rank: Output length mismatch: expected {expected}, got {got}")]
    OutputLengthMismatch { expected: usize, got: usize },

    #[error("rolling_rank: Invalid range: start={start}, end={end}, step={step}")]
    InvalidRange {
        start: String,
        end: String,
        step: String,
    },

    #[error("rolling_rank: {0}")]
    UnknownOption(#[from] ParseEnumError),

    #[error("rolling_rank: {0}")]
    Chunking(#[from] ChunkError),
}

/// Parameters resolved once at the API boundary.
#[derive(Copy, Clone, Debug, PartialEq)]
struct RankConfig {
    window: usize,
    method: RankMethod,
    pct: Option<PctMode>,
}

impl RankConfig {
    fn from_input<T: RankValue>(input: &RollingRankInput<T>) -> Result<Self, RollingRankError> {
        let window = input.get_window();
        if window == 0 {
            return Err(RollingRankError::InvalidWindow { window });
        }
        let pct = if input.get_pct() {
            Some(input.get_pct_mode())
        } else {
            None
        };
        Ok(Self {
            window,
            method: input.get_method(),
            pct,
        })
    }

    /// `count` is the number of orderable samples in the window.
    #[inline(always)]
    fn finish(self, bounds: RankBounds, count: usize) -> f64 {
        let rank = self.method.rank(bounds);
        match self.pct {
            Some(mode) => mode.normalize(rank, count),
            None => rank,
        }
    }
}

#[inline(always)]
fn rr_prepare<'a, T: RankValue>(
    input: &RollingRankInput<'a, T>,
    kernel: Kernel,
) -> Result<(&'a [T], RankConfig, isize, Kernel), RollingRankError> {
    let data = input.data;
    let cfg = RankConfig::from_input(input)?;
    let chosen = match kernel {
        Kernel::Auto => detect_best_kernel(cfg.window),
        k => k,
    };
    Ok((data, cfg, input.get_n_jobs(), chosen))
}

fn rr_compute_into<T: RankValue>(
    data: &[T],
    cfg: RankConfig,
    n_jobs: isize,
    kernel: Kernel,
    out: &mut [f64],
) -> Result<(), RollingRankError> {
    for_each_chunk(out, cfg.window, n_jobs, |chunk, dst| {
        rr_compute_chunk(data, cfg, kernel, chunk, dst)
    })?;
    Ok(())
}

#[inline(always)]
fn rr_compute_chunk<T: RankValue>(
    data: &[T],
    cfg: RankConfig,
    kernel: Kernel,
    chunk: Chunk,
    dst: &mut [f64],
) {
    match kernel {
        Kernel::Blocks => {
            rr_blocks_chunk(data, cfg, chunk, dst);
        }
        Kernel::Tree | Kernel::Auto => rr_tree_chunk(data, cfg, chunk, dst),
    }
}

fn rr_tree_chunk<T: RankValue>(data: &[T], cfg: RankConfig, chunk: Chunk, dst: &mut [f64]) {
    let mut stream = RollingRankStream::with_config(cfg);
    for &v in &data[chunk.warm_start..chunk.start] {
        let _ = stream.update(v);
    }
    for (o, &v) in dst.iter_mut().zip(&data[chunk.start..chunk.end]) {
        *o = stream.update(v).unwrap_or(f64::NAN);
    }
}

/// Returns the largest number of cached blocks held at once.
fn rr_blocks_chunk<T: RankValue>(
    data: &[T],
    cfg: RankConfig,
    chunk: Chunk,
    dst: &mut [f64],
) -> usize {
    let window = cfg.window;
    let mut cache = BlockRankCache::new(data);
    let mut missing = 0usize;
    let mut peak = 0usize;

    for i in chunk.warm_start..chunk.end {
        let v = data[i];
        if v.is_missing() {
            missing += 1;
        }
        if i >= chunk.warm_start + window && data[i - window].is_missing() {
            missing -= 1;
        }
        if i < chunk.start {
            continue;
        }

        let o = &mut dst[i - chunk.start];
        if i + 1 < window || v.is_missing() {
            *o = f64::NAN;
            continue;
        }

        let lo = i + 1 - window;
        if lo % window == 0 {
            cache.remove_cache_before(lo);
        }
        // the query itself sits at `i`, so both counts run over the older samples
        let less = cache.count_less(lo, i, v);
        let at_most = cache.count_at_most(lo, i, v) + 1;
        let bounds = RankBounds {
            less,
            at_most,
            first: at_most - 1,
        };
        *o = cfg.finish(bounds, window - missing);
        peak = peak.max(cache.block_count());
    }
    peak
}

#[inline]
pub fn rolling_rank<T: RankValue>(
    input: &RollingRankInput<T>,
) -> Result<RollingRankOutput, RollingRankError> {
    rolling_rank_with_kernel(input, Kernel::Auto)
}

pub fn rolling_rank_with_kernel<T: RankValue>(
    input: &RollingRankInput<T>,
    kernel: Kernel,
) -> Result<RollingRankOutput, RollingRankError> {
    let (data, cfg, n_jobs, chosen) = rr_prepare(input, kernel)?;
    let mut out = alloc_with_nan_prefix(data.len(), cfg.window - 1);
    rr_compute_into(data, cfg, n_jobs, chosen, &mut out)?;
    Ok(RollingRankOutput { values: out })
}

#[inline]
pub fn rolling_rank_into<T: RankValue>(
    input: &RollingRankInput<T>,
    out: &mut [f64],
) -> Result<(), RollingRankError> {
    rolling_rank_into_slice(out, input, Kernel::Auto)
}

pub fn rolling_rank_into_slice<T: RankValue>(
    dst: &mut [f64],
    input: &RollingRankInput<T>,
    kernel: Kernel,
) -> Result<(), RollingRankError> {
    let (data, cfg, n_jobs, chosen) = rr_prepare(input, kernel)?;
    if dst.len() != data.len() {
        return Err(RollingRankError::OutputLengthMismatch {
            expected: data.len(),
            got: dst.len(),
        });
    }
    rr_compute_into(data, cfg, n_jobs, chosen, dst)
}

#[derive(Copy, Clone, Debug)]
pub struct RollingRankBuilder {
    window: Option<usize>,
    method: Option<RankMethod>,
    pct: Option<bool>,
    pct_mode: Option<PctMode>,
    n_jobs: Option<isize>,
    kernel: Kernel,
}

impl Default for RollingRankBuilder {
    fn default() -> Self {
        Self {
            window: None,
            method: None,
            pct: None,
            pct_mode: None,
            n_jobs: None,
            kernel: Kernel::Auto,
        }
    }
}

impl RollingRankBuilder {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn window(mut self, n: usize) -> Self {
        self.window = Some(n);
        self
    }

    #[inline(always)]
    pub fn method(mut self, m: RankMethod) -> Self {
        self.method = Some(m);
        self
    }

    /// Parses a pandas method name; unknown names are rejected.
    pub fn method_name(self, name: &str) -> Result<Self, RollingRankError> {
        Ok(self.method(name.parse()?))
    }

    #[inline(always)]
    pub fn pct(mut self, on: bool) -> Self {
        self.pct = Some(on);
        self
    }

    #[inline(always)]
    pub fn pct_mode(mut self, m: PctMode) -> Self {
        self.pct_mode = Some(m);
        self
    }

    pub fn pct_mode_name(self, name: &str) -> Result<Self, RollingRankError> {
        Ok(self.pct_mode(name.parse()?))
    }

    #[inline(always)]
    pub fn n_jobs(mut self, n: isize) -> Self {
        self.n_jobs = Some(n);
        self
    }

    #[inline(always)]
    pub fn kernel(mut self, k: Kernel) -> Self {
        self.kernel = k;
        self
    }

    fn params(&self) -> RollingRankParams {
        RollingRankParams {
            window: self.window,
            method: self.method,
            pct: self.pct,
            pct_mode: self.pct_mode,
            n_jobs: self.n_jobs,
        }
    }

    #[inline(always)]
    pub fn apply_slice<T: RankValue>(
        self,
        d: &[T],
    ) -> Result<RollingRankOutput, RollingRankError> {
        let i = RollingRankInput::from_slice(d, self.params());
        rolling_rank_with_kernel(&i, self.kernel)
    }

    #[inline(always)]
    pub fn into_stream<T: RankValue>(self) -> Result<RollingRankStream<T>, RollingRankError> {
        RollingRankStream::try_new(self.params())
    }

    pub fn with_default_slice<T: RankValue>(
        data: &[T],
        k: Kernel,
    ) -> Result<RollingRankOutput, RollingRankError> {
        Self::new().kernel(k).apply_slice(data)
    }
}

/// Incremental rolling rank over an order-statistics tree.
///
/// `update` returns `None` until `window` samples have been fed, then the
/// rank of each new sample among the last `window` samples (`NaN` when the
/// sample itself is missing). The oldest sample is evicted after the query,
/// so every sample is ranked inside the closed window that ends at it.
#[derive(Debug, Clone)]
pub struct RollingRankStream<T = f64> {
    cfg: RankConfig,
    buffer: Vec<T>,
    seen: usize,
    missing: usize,
    tree: OrderStatTree<T>,
}

impl<T: RankValue> RollingRankStream<T> {
    pub fn try_new(params: RollingRankParams) -> Result<Self, RollingRankError> {
        let input = RollingRankInput::<T>::from_slice(&[], params);
        Ok(Self::with_config(RankConfig::from_input(&input)?))
    }

    fn with_config(cfg: RankConfig) -> Self {
        Self {
            cfg,
            buffer: Vec::with_capacity(cfg.window),
            seen: 0,
            missing: 0,
            tree: OrderStatTree::with_capacity(cfg.window),
        }
    }

    #[inline(always)]
    pub fn window(&self) -> usize {
        self.cfg.window
    }

    #[inline(always)]
    pub fn is_filled(&self) -> bool {
        self.seen >= self.cfg.window
    }

    /// Missing samples among the ones currently held.
    #[inline(always)]
    pub fn missing_count(&self) -> usize {
        self.missing
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.seen = 0;
        self.missing = 0;
        self.tree.clear();
    }

    pub fn update(&mut self, value: T) -> Option<f64> {
        let window = self.cfg.window;
        let pos = self.seen;
        self.seen += 1;

        if self.buffer.len() < window {
            self.buffer.push(value);
        } else {
            self.buffer[pos % window] = value;
        }

        let missing = value.is_missing();
        if missing {
            self.missing += 1;
        } else {
            self.tree.insert(value, pos);
        }

        if self.seen < window {
            return None;
        }
        debug_assert_eq!(self.tree.len() + self.missing, window);

        let out = if missing {
            f64::NAN
        } else {
            let bounds = RankBounds {
                less: self.tree.rank_of_less_than(value),
                at_most: self.tree.rank_of_at_most(value),
                first: self.tree.rank_of(value, pos),
            };
            self.cfg.finish(bounds, self.tree.len())
        };

        let old_pos = self.seen - window;
        let old = self.buffer[old_pos % window];
        if old.is_missing() {
            self.missing -= 1;
        } else {
            let removed = self.tree.remove(old, old_pos);
            assert!(
                removed,
                "rolling_rank: sample at position {} missing from window",
                old_pos
            );
        }

        Some(out)
    }
}

#[derive(Clone, Debug)]
pub struct RollingRankBatchRange {
    pub window: (usize, usize, usize),
}

impl Default for RollingRankBatchRange {
    fn default() -> Self {
        Self {
            window: (10, 60, 10),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RollingRankBatchBuilder {
    range: RollingRankBatchRange,
    method: Option<RankMethod>,
    pct: Option<bool>,
    pct_mode: Option<PctMode>,
    kernel: Kernel,
}

impl RollingRankBatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel(mut self, k: Kernel) -> Self {
        self.kernel = k;
        self
    }

    pub fn window_range(mut self, start: usize, end: usize, step: usize) -> Self {
        self.range.window = (start, end, step);
        self
    }

    pub fn method(mut self, m: RankMethod) -> Self {
        self.method = Some(m);
        self
    }

    pub fn pct(mut self, on: bool) -> Self {
        self.pct = Some(on);
        self
    }

    pub fn pct_mode(mut self, m: PctMode) -> Self {
        self.pct_mode = Some(m);
        self
    }

    fn base(&self) -> RollingRankParams {
        RollingRankParams {
            window: None,
            method: self.method,
            pct: self.pct,
            pct_mode: self.pct_mode,
            n_jobs: Some(1),
        }
    }

    pub fn apply_slice<T: RankValue>(
        self,
        data: &[T],
    ) -> Result<RollingRankBatchOutput, RollingRankError> {
        rolling_rank_batch_slice(data, &self.range, &self.base(), self.kernel)
    }

    pub fn apply_slice_par<T: RankValue>(
        self,
        data: &[T],
    ) -> Result<RollingRankBatchOutput, RollingRankError> {
        rolling_rank_batch_par_slice(data, &self.range, &self.base(), self.kernel)
    }

    pub fn with_default_slice<T: RankValue>(
        data: &[T],
        k: Kernel,
    ) -> Result<RollingRankBatchOutput, RollingRankError> {
        RollingRankBatchBuilder::new().kernel(k).apply_slice(data)
    }
}

#[derive(Clone, Debug)]
pub struct RollingRankBatchOutput {
    pub values: Vec<f64>,
    pub combos: Vec<RollingRankParams>,
    pub rows: usize,
    pub cols: usize,
}

impl RollingRankBatchOutput {
    pub fn row_for_params(&self, p: &RollingRankParams) -> Option<usize> {
        self.combos
            .iter()
            .position(|c| {
                c.window.unwrap_or(DEFAULT_WINDOW) == p.window.unwrap_or(DEFAULT_WINDOW)
            })
    }

    pub fn values_for(&self, p: &RollingRankParams) -> Option<&[f64]> {
        self.row_for_params(p).map(|row| {
            let start = row * self.cols;
            &self.values[start..start + self.cols]
        })
    }
}

#[inline(always)]
fn expand_grid_rr(
    r: &RollingRankBatchRange,
    base: &RollingRankParams,
) -> Result<Vec<RollingRankParams>, RollingRankError> {
    fn axis_usize(
        (start, end, step): (usize, usize, usize),
    ) -> Result<Vec<usize>, RollingRankError> {
        if step == 0 || start == end {
            return Ok(vec![start]);
        }
        if start < end {
            return Ok((start..=end).step_by(step).collect());
        }

        let mut v = Vec::new();
        let mut x = start as isize;
        let end_i = end as isize;
        let st = step as isize;
        while x >= end_i {
            v.push(x as usize);
            x -= st;
        }
        if v.is_empty() {
            return Err(RollingRankError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
                step: step.to_string(),
            });
        }
        Ok(v)
    }

    let windows = axis_usize(r.window)?;
    if let Some(&w) = windows.iter().find(|&&w| w == 0) {
        return Err(RollingRankError::InvalidWindow { window: w });
    }
    Ok(windows
        .into_iter()
        .map(|w| RollingRankParams {
            window: Some(w),
            ..base.clone()
        })
        .collect())
}

#[inline(always)]
pub fn rolling_rank_batch_slice<T: RankValue>(
    data: &[T],
    sweep: &RollingRankBatchRange,
    base: &RollingRankParams,
    k: Kernel,
) -> Result<RollingRankBatchOutput, RollingRankError> {
    rr_batch_inner(data, sweep, base, k, false)
}

#[inline(always)]
pub fn rolling_rank_batch_par_slice<T: RankValue>(
    data: &[T],
    sweep: &RollingRankBatchRange,
    base: &RollingRankParams,
    k: Kernel,
) -> Result<RollingRankBatchOutput, RollingRankError> {
    rr_batch_inner(data, sweep, base, k, true)
}

fn rr_batch_inner<T: RankValue>(
    data: &[T],
    sweep: &RollingRankBatchRange,
    base: &RollingRankParams,
    kern: Kernel,
    parallel: bool,
) -> Result<RollingRankBatchOutput, RollingRankError> {
    let combos = expand_grid_rr(sweep, base)?;
    let configs = combos
        .iter()
        .map(|c| RankConfig::from_input(&RollingRankInput::from_slice(data, c.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = combos.len();
    let cols = data.len();
    let total = rows
        .checked_mul(cols)
        .ok_or_else(|| RollingRankError::InvalidRange {
            start: rows.to_string(),
            end: cols.to_string(),
            step: "rows*cols".into(),
        })?;

    let mut values = vec![f64::NAN; total];
    if cols == 0 {
        return Ok(RollingRankBatchOutput {
            values,
            combos,
            rows,
            cols,
        });
    }

    let do_row = |row: usize, dst_row: &mut [f64]| {
        let cfg = configs[row];
        let chosen = match kern {
            Kernel::Auto => detect_best_kernel(cfg.window),
            k => k,
        };
        let chunk = Chunk {
            warm_start: 0,
            start: 0,
            end: cols,
        };
        rr_compute_chunk(data, cfg, chosen, chunk, dst_row);
    };

    if parallel {
        #[cfg(not(target_arch = "wasm32"))]
        {
            values
                .par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, s)| do_row(row, s));
        }
        #[cfg(target_arch = "wasm32")]
        for (row, s) in values.chunks_mut(cols).enumerate() {
            do_row(row, s);
        }
    } else {
        for (row, s) in values.chunks_mut(cols).enumerate() {
            do_row(row, s);
        }
    }

    Ok(RollingRankBatchOutput {
        values,
        combos,
        rows,
        cols,
    })
}
