use crate::utilities::enums::Kernel;
#[cfg(test)]
use crate::utilities::enums::{PctMode, RankMethod};

/// Windows at least this long default to the block kernel.
pub const BLOCK_KERNEL_MIN_WINDOW: usize = 2048;

/// Bit pattern written past the NaN prefix in debug builds so tests can
/// detect output slots that were never filled.
pub const POISON_BITS: u64 = 0x11111111_11111111;

#[inline(always)]
pub fn detect_best_kernel(window: usize) -> Kernel {
    let k = if window >= BLOCK_KERNEL_MIN_WINDOW {
        Kernel::Blocks
    } else {
        Kernel::Tree
    };
    tracing::debug!(window, kernel = ?k, "auto kernel selection");
    k
}

/// Output buffer whose first `warm` slots are NaN.
pub fn alloc_with_nan_prefix(len: usize, warm: usize) -> Vec<f64> {
    let warm = warm.min(len);
    let mut v = Vec::with_capacity(len);
    v.resize(warm, f64::NAN);
    #[cfg(debug_assertions)]
    v.resize(len, f64::from_bits(POISON_BITS));
    #[cfg(not(debug_assertions))]
    v.resize(len, 0.0);
    v
}

/// Deterministic series of multiples of 0.25 with a NaN every `nan_every` samples.
#[cfg(test)]
pub(crate) fn test_series(n: usize, seed: u64, levels: u64, nan_every: usize) -> Vec<f64> {
    let mut s = seed;
    (0..n)
        .map(|i| {
            s = s
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            if nan_every > 0 && i % nan_every == nan_every - 1 {
                f64::NAN
            } else {
                ((s >> 33) % levels) as f64 * 0.25
            }
        })
        .collect()
}

/// Brute-force rolling rank over each closed window.
#[cfg(test)]
pub(crate) fn naive_rank(
    data: &[f64],
    window: usize,
    method: RankMethod,
    pct: Option<PctMode>,
) -> Vec<f64> {
    (0..data.len())
        .map(|i| {
            let v = data[i];
            if i + 1 < window || v.is_nan() {
                return f64::NAN;
            }
            let win = &data[i + 1 - window..=i];
            let valid: Vec<(usize, f64)> = win
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, x)| !x.is_nan())
                .collect();
            let less = valid.iter().filter(|(_, x)| *x < v).count();
            let equal = valid.iter().filter(|(_, x)| *x == v).count();
            let earlier = valid
                .iter()
                .filter(|&&(k, x)| x == v && k + 1 < window)
                .count();
            let rank = match method {
                RankMethod::Min => (less + 1) as f64,
                RankMethod::Max => (less + equal) as f64,
                RankMethod::Average => less as f64 + (equal as f64 + 1.0) / 2.0,
                RankMethod::First => (less + earlier + 1) as f64,
            };
            let c = valid.len();
            match pct {
                None => rank,
                Some(PctMode::Pandas) => rank / c as f64,
                Some(PctMode::Closed) if c == 1 => 0.5,
                Some(PctMode::Closed) => (rank - 1.0) / (c - 1) as f64,
            }
        })
        .collect()
}
