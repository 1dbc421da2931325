pub mod ordpool_stats_repository;

pub use ordpool_stats_repository::OrdpoolStatsRepository;

use async_trait::async_trait;
use bitcoincore_rpc::bitcoin::BlockHash;

use crate::domain::models::{BlockCursor, OrdpoolStats};
use crate::infrastructure::persistence::error::DbError;

/// Result of persisting the stats of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    /// A row for the block hash existed already; nothing was written
    AlreadyIndexed,
}

/// Storage of per-block statistics
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Lowest block at or above `min_height` without a stats row
    async fn next_unindexed_block(&self, min_height: u64) -> Result<Option<BlockCursor>, DbError>;

    /// Write the aggregate row and the activity rows of one block
    async fn save_stats(
        &self,
        cursor: &BlockCursor,
        stats: &OrdpoolStats,
    ) -> Result<SaveOutcome, DbError>;

    /// Stats of a block, `None` when missing or never analysed
    async fn load_stats(&self, block: &BlockHash) -> Result<Option<OrdpoolStats>, DbError>;
}

/// Collection of all repositories
pub struct Repositories {
    /// Repository for ordpool stats operations
    pub ordpool_stats: OrdpoolStatsRepository,
}

impl Repositories {
    /// Create a new Repositories instance
    pub fn new(ordpool_stats: OrdpoolStatsRepository) -> Self {
        Self { ordpool_stats }
    }
}
