//! Rank Correlation Index.
//!
//! For every window the value is Spearman's rho between the sample positions
//! and the average-tie ranks of the orderable samples, in `[-1, 1]`. The
//! stream keeps `Σt`, `Σt²`, `Σt·2r` and the tie correction `Σ(c³ - c)` as
//! exact integers, updating them from the tree's position sums on every admit
//! and evict, so a step costs O(log W) whatever the tie structure.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::utilities::chunking::{for_each_chunk, Chunk, ChunkError};
use crate::utilities::helpers::alloc_with_nan_prefix;
use crate::utilities::order_stats::OrderStatTree;
use crate::utilities::sample::RankValue;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct RciOutput {
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RciParams {
    pub window: Option<usize>,
    /// Same meaning and pool cost as `RollingRankParams::n_jobs`.
    pub n_jobs: Option<isize>,
}

impl Default for RciParams {
    fn default() -> Self {
        Self {
            window: Some(9),
            n_jobs: Some(-1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RciInput<'a, T = f64> {
    pub data: &'a [T],
    pub params: RciParams,
}

impl<'a, T: RankValue> RciInput<'a, T> {
    #[inline]
    pub fn from_slice(sl: &'a [T], p: RciParams) -> Self {
        Self {
            data: sl,
            params: p,
        }
    }

    #[inline]
    pub fn with_default_slice(sl: &'a [T]) -> Self {
        Self::from_slice(sl, RciParams::default())
    }

    #[inline]
    pub fn get_window(&self) -> usize {
        self.params.window.unwrap_or(9)
    }

    #[inline]
    pub fn get_n_jobs(&self) -> isize {
        self.params.n_jobs.unwrap_or(-1)
    }
}

#[derive(Debug, Error)]
pub enum RciError {
    #[error("rci: Invalid window: window = {window}")]
    InvalidWindow { window: usize },

    #[error("rci: Output length mismatch: expected {expected}, got {got}")]
    OutputLengthMismatch { expected: usize, got: usize },

    #[error("rci: {0}")]
    Chunking(#[from] ChunkError),
}

#[inline]
pub fn rci<T: RankValue>(input: &RciInput<T>) -> Result<RciOutput, RciError> {
    let window = input.get_window();
    if window == 0 {
        return Err(RciError::InvalidWindow { window });
    }
    let mut out = alloc_with_nan_prefix(input.data.len(), window - 1);
    rci_compute_into(input.data, window, input.get_n_jobs(), &mut out)?;
    Ok(RciOutput { values: out })
}

pub fn rci_into_slice<T: RankValue>(dst: &mut [f64], input: &RciInput<T>) -> Result<(), RciError> {
    let window = input.get_window();
    if window == 0 {
        return Err(RciError::InvalidWindow { window });
    }
    if dst.len() != input.data.len() {
        return Err(RciError::OutputLengthMismatch {
            expected: input.data.len(),
            got: dst.len(),
        });
    }
    rci_compute_into(input.data, window, input.get_n_jobs(), dst)
}

fn rci_compute_into<T: RankValue>(
    data: &[T],
    window: usize,
    n_jobs: isize,
    out: &mut [f64],
) -> Result<(), RciError> {
    for_each_chunk(out, window, n_jobs, |chunk: Chunk, dst: &mut [f64]| {
        let mut stream = RciStream::with_window(window);
        for &v in &data[chunk.warm_start..chunk.start] {
            let _ = stream.update(v);
        }
        for (o, &v) in dst.iter_mut().zip(&data[chunk.start..chunk.end]) {
            *o = stream.update(v).unwrap_or(f64::NAN);
        }
    })?;
    Ok(())
}

#[derive(Copy, Clone, Debug, Default)]
pub struct RciBuilder {
    window: Option<usize>,
    n_jobs: Option<isize>,
}

impl RciBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, n: usize) -> Self {
        self.window = Some(n);
        self
    }

    pub fn n_jobs(mut self, n: isize) -> Self {
        self.n_jobs = Some(n);
        self
    }

    fn params(&self) -> RciParams {
        RciParams {
            window: self.window,
            n_jobs: self.n_jobs,
        }
    }

    pub fn apply_slice<T: RankValue>(self, d: &[T]) -> Result<RciOutput, RciError> {
        rci(&RciInput::from_slice(d, self.params()))
    }

    pub fn into_stream<T: RankValue>(self) -> Result<RciStream<T>, RciError> {
        RciStream::try_new(self.params())
    }
}

#[inline(always)]
fn tie_term(c: i128) -> i128 {
    c * c * c - c
}

/// Order statistics of one sample against the samples held by the tree.
struct Standing {
    less: i128,
    equal: i128,
    sum_less: i128,
    sum_at_most: i128,
}

#[derive(Debug, Clone)]
pub struct RciStream<T = f64> {
    window: usize,
    buffer: Vec<T>,
    seen: usize,
    tree: OrderStatTree<T>,
    sum_t: i128,
    sum_tt: i128,
    // positions weighted by doubled average ranks, which are always integers
    sum_tr: i128,
    ties: i128,
}

impl<T: RankValue> RciStream<T> {
    pub fn try_new(params: RciParams) -> Result<Self, RciError> {
        let window = params.window.unwrap_or(9);
        if window == 0 {
            return Err(RciError::InvalidWindow { window });
        }
        Ok(Self::with_window(window))
    }

    fn with_window(window: usize) -> Self {
        Self {
            window,
            buffer: Vec::with_capacity(window),
            seen: 0,
            tree: OrderStatTree::with_capacity(window),
            sum_t: 0,
            sum_tt: 0,
            sum_tr: 0,
            ties: 0,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.seen = 0;
        self.tree.clear();
        self.sum_t = 0;
        self.sum_tt = 0;
        self.sum_tr = 0;
        self.ties = 0;
    }

    #[inline(always)]
    pub fn is_filled(&self) -> bool {
        self.seen >= self.window
    }

    pub fn update(&mut self, value: T) -> Option<f64> {
        let window = self.window;
        let pos = self.seen;
        self.seen += 1;

        if self.buffer.len() < window {
            self.buffer.push(value);
        } else {
            self.buffer[pos % window] = value;
        }
        if !value.is_missing() {
            self.admit(value, pos);
        }

        if self.seen < window {
            return None;
        }

        let out = if value.is_missing() {
            f64::NAN
        } else {
            self.correlation()
        };

        let old_pos = self.seen - window;
        let old = self.buffer[old_pos % window];
        if !old.is_missing() {
            self.evict(old, old_pos);
        }
        Some(out)
    }

    fn standing(&self, value: T) -> Standing {
        let less = self.tree.rank_of_less_than(value) as i128;
        let at_most = self.tree.rank_of_at_most(value) as i128;
        Standing {
            less,
            equal: at_most - less,
            sum_less: self.tree.position_sum_less_than(value) as i128,
            sum_at_most: self.tree.position_sum_at_most(value) as i128,
        }
    }

    fn admit(&mut self, value: T, pos: usize) {
        let s = self.standing(value);
        let t = pos as i128;
        // greater samples move up two half-ranks, tied ones move up one
        self.sum_tr += 2 * (self.sum_t - s.sum_at_most)
            + (s.sum_at_most - s.sum_less)
            + t * (2 * s.less + 2 + s.equal);
        self.ties += tie_term(s.equal + 1) - tie_term(s.equal);
        self.sum_t += t;
        self.sum_tt += t * t;
        self.tree.insert(value, pos);
    }

    fn evict(&mut self, value: T, pos: usize) {
        let s = self.standing(value);
        let t = pos as i128;
        self.sum_tr -= 2 * (self.sum_t - s.sum_at_most)
            + (s.sum_at_most - s.sum_less - t)
            + t * (2 * s.less + 1 + s.equal);
        self.ties += tie_term(s.equal - 1) - tie_term(s.equal);
        self.sum_t -= t;
        self.sum_tt -= t * t;
        let removed = self.tree.remove(value, pos);
        assert!(
            removed,
            "rci: sample at position {} missing from window",
            pos
        );
    }

    fn correlation(&self) -> f64 {
        let n = self.tree.len() as i128;
        if n < 2 {
            return 0.0;
        }
        let sum_r = n * (n + 1);
        let sum_rr = (2 * n * (n + 1) * (2 * n + 1) - self.ties) / 3;
        let cov = n * self.sum_tr - self.sum_t * sum_r;
        let var_t = n * self.sum_tt - self.sum_t * self.sum_t;
        let var_r = n * sum_rr - sum_r * sum_r;
        if var_t == 0 || var_r == 0 {
            return 0.0;
        }
        cov as f64 / ((var_t as f64).sqrt() * (var_r as f64).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::helpers::test_series;
    use std::error::Error;

    const NAN: f64 = f64::NAN;

    fn average_ranks(values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .map(|&v| {
                let less = values.iter().filter(|&&x| x < v).count() as f64;
                let equal = values.iter().filter(|&&x| x == v).count() as f64;
                less + (equal + 1.0) / 2.0
            })
            .collect()
    }

    fn naive_rci(data: &[f64], window: usize) -> Vec<f64> {
        (0..data.len())
            .map(|i| {
                if i + 1 < window || data[i].is_nan() {
                    return NAN;
                }
                let (t, v): (Vec<f64>, Vec<f64>) = (i + 1 - window..=i)
                    .filter(|&k| !data[k].is_nan())
                    .map(|k| (k as f64, data[k]))
                    .unzip();
                let n = t.len() as f64;
                if t.len() < 2 {
                    return 0.0;
                }
                let r = average_ranks(&v);
                let mt = t.iter().sum::<f64>() / n;
                let mr = r.iter().sum::<f64>() / n;
                let cov: f64 = t.iter().zip(&r).map(|(a, b)| (a - mt) * (b - mr)).sum();
                let vt: f64 = t.iter().map(|a| (a - mt) * (a - mt)).sum();
                let vr: f64 = r.iter().map(|b| (b - mr) * (b - mr)).sum();
                if vr == 0.0 {
                    0.0
                } else {
                    cov / (vt.sqrt() * vr.sqrt())
                }
            })
            .collect()
    }

    fn assert_close(test_name: &str, got: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(got.len(), expected.len(), "[{}] length", test_name);
        for (i, (&a, &b)) in got.iter().zip(expected).enumerate() {
            let ok = (a.is_nan() && b.is_nan()) || (a - b).abs() <= tol;
            assert!(ok, "[{}] idx {}: got {} expected {}", test_name, i, a, b);
        }
    }

    fn run(data: &[f64], window: usize) -> Result<Vec<f64>, RciError> {
        Ok(RciBuilder::new().window(window).apply_slice(data)?.values)
    }

    #[test]
    fn test_rci_ties_give_zero() -> Result<(), Box<dyn Error>> {
        assert_close("ties", &run(&[0.1, 0.1], 2)?, &[NAN, 0.0], 0.0);
        Ok(())
    }

    #[test]
    fn test_rci_monotone() -> Result<(), Box<dyn Error>> {
        let up: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let down: Vec<f64> = up.iter().rev().copied().collect();
        let y = run(&up, 5)?;
        assert!(y[4..].iter().all(|&v| (v - 1.0).abs() < 1e-12));
        let y = run(&down, 5)?;
        assert!(y[4..].iter().all(|&v| (v + 1.0).abs() < 1e-12));
        Ok(())
    }

    #[test]
    fn test_rci_missing_samples() -> Result<(), Box<dyn Error>> {
        let x = [1.0, NAN, 2.0, NAN, 3.0];
        assert_close("nan", &run(&x, 3)?, &[NAN, NAN, 1.0, NAN, 1.0], 1e-12);
        assert_close("w1", &run(&[1.0, NAN, 2.0], 1)?, &[0.0, NAN, 0.0], 0.0);
        Ok(())
    }

    #[test]
    fn test_rci_window_edges() -> Result<(), Box<dyn Error>> {
        let x = [0.1, 0.2, 0.3, 0.25, 0.1, 0.2, 0.3];
        assert!(run(&x, 1)?.iter().all(|&v| v == 0.0));
        assert!(run(&x, 8)?.iter().all(|v| v.is_nan()));
        assert!(matches!(
            run(&x, 0),
            Err(RciError::InvalidWindow { window: 0 })
        ));
        let mut short = [0.0; 3];
        let input = RciInput::with_default_slice(&x);
        assert!(matches!(
            rci_into_slice(&mut short, &input),
            Err(RciError::OutputLengthMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_rci_matches_naive() -> Result<(), Box<dyn Error>> {
        let x = test_series(2_000, 5, 15, 8);
        for window in [2, 3, 9, 26, 101] {
            assert_close("naive", &run(&x, window)?, &naive_rci(&x, window), 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_rci_parallel_is_deterministic() -> Result<(), Box<dyn Error>> {
        let x = test_series(50_000, 9, 40, 17);
        let single = RciBuilder::new().window(37).n_jobs(1).apply_slice(&x)?.values;
        for jobs in [3, -1] {
            let par = RciBuilder::new().window(37).n_jobs(jobs).apply_slice(&x)?.values;
            assert!(single
                .iter()
                .zip(&par)
                .all(|(a, b)| a.to_bits() == b.to_bits()));
        }
        Ok(())
    }

    #[test]
    fn test_rci_stream_matches_batch() -> Result<(), Box<dyn Error>> {
        let x = test_series(500, 13, 6, 5);
        let b = RciBuilder::new().window(12);
        let batch = b.apply_slice(&x)?.values;
        let mut s = b.into_stream::<f64>()?;
        let streamed: Vec<f64> = x.iter().map(|&v| s.update(v).unwrap_or(NAN)).collect();
        assert_close("stream", &streamed, &batch, 0.0);
        s.reset();
        assert!(!s.is_filled());
        Ok(())
    }

    #[test]
    fn test_rci_integer_input() -> Result<(), Box<dyn Error>> {
        let x = test_series(300, 21, 10, 0);
        let xi: Vec<i64> = x.iter().map(|&v| (v * 4.0) as i64).collect();
        let a = RciBuilder::new().window(14).apply_slice(&x)?.values;
        let b = RciBuilder::new().window(14).apply_slice(&xi)?.values;
        assert_close("int", &b, &a, 0.0);
        Ok(())
    }

    #[test]
    fn test_tie_term() {
        assert_eq!(tie_term(0), 0);
        assert_eq!(tie_term(1), 0);
        assert_eq!(tie_term(2), 6);
        assert_eq!(tie_term(3), 24);
    }
}
