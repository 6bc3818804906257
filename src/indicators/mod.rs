pub mod rci;
pub mod rolling_rank;

pub use rci::{rci, RciBuilder, RciError, RciInput, RciOutput, RciParams, RciStream};
pub use rolling_rank::{
    rolling_rank, rolling_rank_batch_par_slice, rolling_rank_batch_slice, rolling_rank_into,
    rolling_rank_into_slice, rolling_rank_with_kernel, RollingRankBatchBuilder,
    RollingRankBatchOutput, RollingRankBatchRange, RollingRankBuilder, RollingRankError,
    RollingRankInput, RollingRankOutput, RollingRankParams, RollingRankStream,
};
