//! Fetch → analyse → persist, one block at a time, with primary/fallback failover

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{Backend, FailoverState};
use crate::domain::errors::{AnalyserError, BlockProcessorError};
use crate::domain::models::BlockCursor;
use crate::domain::services::Analyser;
use crate::infrastructure::bitcoin::TransactionSource;
use crate::infrastructure::persistence::{SaveOutcome, StatsStore};
use crate::utils::clock::Clock;
use crate::utils::logging;

/// Work unit driven by the scheduler
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Index up to `max_blocks` blocks, lowest height first.
    ///
    /// The result means "more work may remain", not "at least one block was
    /// processed". Returns `true` when all `max_blocks` blocks were processed.
    /// Returns `false` as soon as no unindexed block is left, even if earlier
    /// blocks of the same batch were indexed: a batch that ran dry sends the
    /// scheduler to rest, and its duration is not used for batch sizing.
    async fn process_batch(&self, max_blocks: usize) -> Result<bool, BlockProcessorError>;
}

/// Indexes blocks lacking statistics
pub struct BlockProcessor {
    primary: Arc<dyn TransactionSource>,
    fallback: Arc<dyn TransactionSource>,
    analyser: Arc<dyn Analyser>,
    store: Arc<dyn StatsStore>,
    clock: Arc<dyn Clock>,
    failover_cooldown: Duration,
    min_height: u64,
    failover: Mutex<FailoverState>,
}

impl std::fmt::Debug for BlockProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockProcessor")
            .field("primary", &self.primary.provider_name())
            .field("fallback", &self.fallback.provider_name())
            .field("failover_cooldown", &self.failover_cooldown)
            .field("min_height", &self.min_height)
            .finish_non_exhaustive()
    }
}

impl BlockProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: Arc<dyn TransactionSource>,
        fallback: Arc<dyn TransactionSource>,
        analyser: Arc<dyn Analyser>,
        store: Arc<dyn StatsStore>,
        clock: Arc<dyn Clock>,
        failover_cooldown: Duration,
        min_height: u64,
    ) -> Self {
        Self {
            primary,
            fallback,
            analyser,
            store,
            clock,
            failover_cooldown,
            min_height,
            failover: Mutex::new(FailoverState::default()),
        }
    }

    /// Current failover state
    pub async fn failover_state(&self) -> FailoverState {
        *self.failover.lock().await
    }

    /// Index one block; returns the backend that delivered its transactions
    pub async fn process_block(&self, cursor: &BlockCursor) -> Result<Backend, BlockProcessorError> {
        let backend = self
            .failover
            .lock()
            .await
            .select(self.clock.now(), self.failover_cooldown);

        let source = match backend {
            Backend::Primary => &self.primary,
            Backend::Fallback => &self.fallback,
        };

        let transactions = match source.get_block_transactions(cursor).await {
            Ok(transactions) => transactions,
            Err(source_error) => {
                self.failover
                    .lock()
                    .await
                    .on_failure(backend, self.clock.now());
                logging::log_error(&format!(
                    "❌ Fetching block {} via {} failed: {}",
                    cursor.height,
                    source.provider_name(),
                    source_error
                ));
                return Err(BlockProcessorError::Fetch {
                    backend,
                    source: source_error,
                });
            }
        };

        let analyser = Arc::clone(&self.analyser);
        let analysed_cursor = cursor.clone();
        let stats = tokio::task::spawn_blocking(move || {
            analyser.analyse(&analysed_cursor, &transactions)
        })
        .await
        .map_err(|e| AnalyserError::Aborted(e.to_string()))??;

        match self.store.save_stats(cursor, &stats).await? {
            SaveOutcome::Inserted => logging::log_info(&format!(
                "✅ Processed ordpool stats for block #{} via {} backend",
                cursor.height, backend
            )),
            SaveOutcome::AlreadyIndexed => logging::log_debug(&format!(
                "Block #{} was indexed concurrently, skipped",
                cursor.height
            )),
        }

        Ok(backend)
    }
}

#[async_trait]
impl BatchProcessor for BlockProcessor {
    async fn process_batch(&self, max_blocks: usize) -> Result<bool, BlockProcessorError> {
        for _ in 0..max_blocks {
            let Some(cursor) = self.store.next_unindexed_block(self.min_height).await? else {
                logging::log_info("No more blocks to process for ordpool stats");
                return Ok(false);
            };
            self.process_block(&cursor).await?;
        }
        Ok(true)
    }
}
