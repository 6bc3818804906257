#![allow(clippy::needless_range_loop)]

pub mod indicators;
pub mod utilities;

pub use indicators::rolling_rank::{
    rolling_rank, RollingRankBuilder, RollingRankError, RollingRankInput, RollingRankOutput,
    RollingRankParams, RollingRankStream,
};
pub use utilities::enums::{Kernel, ParseEnumError, PctMode, RankMethod};
pub use utilities::sample::RankValue;
