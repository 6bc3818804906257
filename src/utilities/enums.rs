use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine used to answer the per-position rank queries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kernel {
    Auto,
    /// Order-statistics tree updated one sample at a time.
    Tree,
    /// Sorted power-of-two blocks over the static input.
    Blocks,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Auto
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`, expected one of: {expected}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Raw order statistics of a query value inside its window.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RankBounds {
    /// Orderable samples with a value strictly below the query.
    pub less: usize,
    /// Orderable samples with a value at most the query, the query included.
    pub at_most: usize,
    /// Samples ordered before the query by `(value, position)`.
    pub first: usize,
}

/// Tie-break policy, same names as `pandas.Series.rank(method=...)`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum RankMethod {
    #[default]
    Average,
    Min,
    Max,
    First,
}

impl RankMethod {
    pub const ALL: [RankMethod; 4] = [
        RankMethod::Average,
        RankMethod::Min,
        RankMethod::Max,
        RankMethod::First,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            RankMethod::Average => "average",
            RankMethod::Min => "min",
            RankMethod::Max => "max",
            RankMethod::First => "first",
        }
    }

    /// 1-based rank of the query.
    #[inline(always)]
    pub fn rank(self, b: RankBounds) -> f64 {
        match self {
            RankMethod::Average => 0.5 * ((b.less + 1) as f64 + b.at_most as f64),
            RankMethod::Min => (b.less + 1) as f64,
            RankMethod::Max => b.at_most as f64,
            RankMethod::First => (b.first + 1) as f64,
        }
    }
}

impl fmt::Display for RankMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(RankMethod::Average),
            "min" => Ok(RankMethod::Min),
            "max" => Ok(RankMethod::Max),
            "first" => Ok(RankMethod::First),
            other => Err(ParseEnumError {
                kind: "rank method",
                value: other.to_string(),
                expected: "average, min, max, first",
            }),
        }
    }
}

/// Percentile normalization convention.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum PctMode {
    /// `rank / count`, as pandas does with `pct=True`.
    #[default]
    Pandas,
    /// `(rank - 1) / (count - 1)`, mapping the lowest rank to 0 and the highest to 1.
    Closed,
}

impl PctMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            PctMode::Pandas => "pandas",
            PctMode::Closed => "closed",
        }
    }

    /// `count` is the number of orderable samples in the window, query included.
    #[inline(always)]
    pub fn normalize(self, rank: f64, count: usize) -> f64 {
        match self {
            PctMode::Pandas => rank / count as f64,
            PctMode::Closed => {
                if count == 1 {
                    0.5
                } else {
                    (rank - 1.0) / (count - 1) as f64
                }
            }
        }
    }
}

impl fmt::Display for PctMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PctMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pandas" => Ok(PctMode::Pandas),
            "closed" => Ok(PctMode::Closed),
            other => Err(ParseEnumError {
                kind: "pct mode",
                value: other.to_string(),
                expected: "pandas, closed",
            }),
        }
    }
}
