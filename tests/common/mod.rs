//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use rolling_rank::{PctMode, RankMethod};

/// Deterministic series with repeated values and periodic gaps.
pub struct TestData {
    pub values: Vec<f64>,
}

impl TestData {
    /// `levels` distinct values spaced 0.5 apart; every `nan_every`-th sample is NaN.
    pub fn generate(len: usize, seed: u64, levels: u64, nan_every: usize) -> Self {
        let mut state = seed.max(1);
        let values = (0..len)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                if nan_every > 0 && i % nan_every == nan_every - 1 {
                    f64::NAN
                } else {
                    (state % levels) as f64 * 0.5 - 10.0
                }
            })
            .collect();
        TestData { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Values doubled and cast, NaN mapped to `fill`.
    pub fn as_i64(&self, fill: i64) -> Vec<i64> {
        self.values
            .iter()
            .map(|&v| if v.is_nan() { fill } else { (v * 2.0) as i64 })
            .collect()
    }
}

/// Brute-force rolling rank over each closed window.
pub fn reference_rank(data: &[f64], window: usize, method: RankMethod, pct: Option<PctMode>) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    for i in 0..data.len() {
        if i + 1 < window || data[i].is_nan() {
            continue;
        }
        let v = data[i];
        let win: Vec<f64> = data[i + 1 - window..=i]
            .iter()
            .copied()
            .filter(|x| !x.is_nan())
            .collect();
        let less = win.iter().filter(|&&x| x < v).count();
        let equal = win.iter().filter(|&&x| x == v).count();
        let rank = match method {
            RankMethod::Min => (less + 1) as f64,
            RankMethod::Max => (less + equal) as f64,
            RankMethod::Average => less as f64 + (equal as f64 + 1.0) / 2.0,
            // the query is the newest of its ties
            RankMethod::First => (less + equal) as f64,
        };
        let c = win.len();
        out[i] = match pct {
            None => rank,
            Some(PctMode::Pandas) => rank / c as f64,
            Some(PctMode::Closed) if c == 1 => 0.5,
            Some(PctMode::Closed) => (rank - 1.0) / (c - 1) as f64,
        };
    }
    out
}

/// Compare two arrays with a tolerance
pub fn assert_array_close(actual: &[f64], expected: &[f64], rtol: f64, atol: f64, name: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{}: Length mismatch: actual {} vs expected {}",
        name,
        actual.len(),
        expected.len()
    );

    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        if a.is_nan() && e.is_nan() {
            continue;
        }

        let diff = (a - e).abs();
        let tol = atol + rtol * e.abs();

        assert!(
            diff <= tol,
            "{}: Value mismatch at index {}: actual {} vs expected {} (diff: {}, tol: {})",
            name,
            i,
            a,
            e,
            diff,
            tol
        );
    }
}
