pub mod block_cache;
pub mod chunking;
pub mod enums;
pub mod helpers;
pub mod order_stats;
pub mod sample;
