use async_trait::async_trait;
use bitcoincore_rpc::bitcoin::hashes::Hash;
use bitcoincore_rpc::bitcoin::{BlockHash, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ordpool_indexer::application::indexer::{BlockProcessor, FailoverState, RunReason, Scheduler};
use ordpool_indexer::config::{FailoverConfig, SchedulerConfig};
use ordpool_indexer::domain::models::{BlockCursor, OrdpoolStats};
use ordpool_indexer::domain::services::{EnvelopeAnalyser, ANALYSER_VERSION};
use ordpool_indexer::infrastructure::bitcoin::{BitcoinClientError, TransactionSource};
use ordpool_indexer::infrastructure::persistence::{DbError, SaveOutcome, StatsStore};
use ordpool_indexer::utils::clock::{Clock, ManualClock};

const FIRST_HEIGHT: u64 = 100;

#[derive(Debug, Default)]
struct TestSource {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl TestSource {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSource for TestSource {
    fn provider_name(&self) -> String {
        "test".to_string()
    }

    async fn get_block_transactions(
        &self,
        _cursor: &BlockCursor,
    ) -> Result<Vec<Transaction>, BitcoinClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BitcoinClientError::ConnectionError(
                "connection refused".to_string(),
            ));
        }
        Ok(Vec::new())
    }
}

/// Block table plus stats table, recording every cursor it hands out
#[derive(Default)]
struct TestStore {
    blocks: Mutex<Vec<BlockCursor>>,
    stats: Mutex<HashMap<BlockHash, OrdpoolStats>>,
    served: Mutex<Vec<u64>>,
}

impl TestStore {
    fn add_block(&self, height: u64) {
        let hash = BlockHash::from_slice(&[height as u8; 32]).unwrap();
        self.blocks
            .lock()
            .unwrap()
            .push(BlockCursor::new(hash, height, 1_700_000_000));
    }

    fn indexed_heights(&self) -> Vec<u64> {
        let stats = self.stats.lock().unwrap();
        let mut heights: Vec<u64> = self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|block| stats.contains_key(&block.id))
            .map(|block| block.height)
            .collect();
        heights.sort_unstable();
        heights
    }

    fn served(&self) -> Vec<u64> {
        self.served.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatsStore for TestStore {
    async fn next_unindexed_block(&self, min_height: u64) -> Result<Option<BlockCursor>, DbError> {
        let stats = self.stats.lock().unwrap();
        let next = self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|block| block.height >= min_height && !stats.contains_key(&block.id))
            .min_by_key(|block| block.height)
            .cloned();
        if let Some(cursor) = &next {
            self.served.lock().unwrap().push(cursor.height);
        }
        Ok(next)
    }

    async fn save_stats(
        &self,
        cursor: &BlockCursor,
        stats: &OrdpoolStats,
    ) -> Result<SaveOutcome, DbError> {
        let mut saved = self.stats.lock().unwrap();
        if saved.contains_key(&cursor.id) {
            return Ok(SaveOutcome::AlreadyIndexed);
        }
        saved.insert(cursor.id, stats.clone());
        Ok(SaveOutcome::Inserted)
    }

    async fn load_stats(&self, block: &BlockHash) -> Result<Option<OrdpoolStats>, DbError> {
        Ok(self
            .stats
            .lock()
            .unwrap()
            .get(block)
            .filter(|stats| stats.version != 0)
            .cloned())
    }
}

struct Harness {
    primary: Arc<TestSource>,
    fallback: Arc<TestSource>,
    store: Arc<TestStore>,
    clock: Arc<ManualClock>,
    processor: Arc<BlockProcessor>,
    scheduler: Scheduler,
}

fn harness(heights: &[u64]) -> Harness {
    let primary = Arc::new(TestSource::default());
    let fallback = Arc::new(TestSource::default());
    let store = Arc::new(TestStore::default());
    for height in heights {
        store.add_block(*height);
    }
    let clock = Arc::new(ManualClock::at_epoch());

    let processor = Arc::new(BlockProcessor::new(
        primary.clone(),
        fallback.clone(),
        Arc::new(EnvelopeAnalyser::new()),
        store.clone(),
        clock.clone(),
        FailoverConfig::default().cooldown,
        FIRST_HEIGHT,
    ));
    let scheduler = Scheduler::new(processor.clone(), clock.clone(), SchedulerConfig::default());

    Harness {
        primary,
        fallback,
        store,
        clock,
        processor,
        scheduler,
    }
}

#[tokio::test]
async fn test_backfill_indexes_every_eligible_block_then_rests() {
    let h = harness(&[103, 99, 100, 102, 101]);

    let outcome = h.scheduler.run().await;
    assert_eq!(outcome.reason, RunReason::Exhausted);
    assert_eq!(h.store.indexed_heights(), vec![100, 101, 102, 103]);

    let state = h.scheduler.state().await;
    assert_eq!(state.failure_count, 0);
    assert!(state.sleep_until.is_some());

    let hash = BlockHash::from_slice(&[100u8; 32]).unwrap();
    let stats = h.store.load_stats(&hash).await.unwrap().unwrap();
    assert_eq!(stats.version, ANALYSER_VERSION);

    assert_eq!(h.scheduler.run().await.reason, RunReason::Resting);
    assert_eq!(h.primary.calls(), 4);
}

#[tokio::test]
async fn test_cursor_never_returns_an_indexed_block() {
    let h = harness(&[100, 101, 102]);

    h.scheduler.run().await;
    h.store.add_block(103);
    h.clock.advance(Duration::from_secs(10 * 60));
    h.scheduler.run().await;

    let served = h.store.served();
    assert_eq!(served, vec![100, 101, 102, 103]);
    assert!(served.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_failover_spans_scheduler_runs() {
    let h = harness(&[100, 101]);
    h.primary.failing.store(true, Ordering::SeqCst);

    let failed = h.scheduler.run().await;
    assert_eq!(failed.reason, RunReason::Failed);
    assert!(h.store.indexed_heights().is_empty());
    assert!(h.processor.failover_state().await.is_fallback());

    h.clock.advance(failed.next_run_in);
    let recovered = h.scheduler.run().await;
    assert_eq!(recovered.reason, RunReason::Exhausted);
    assert_eq!(h.store.indexed_heights(), vec![100, 101]);
    assert_eq!(h.fallback.calls(), 2);
    assert_eq!(h.primary.calls(), 1);

    h.primary.failing.store(false, Ordering::SeqCst);
    h.store.add_block(102);
    h.clock.advance(Duration::from_secs(10 * 60));

    h.scheduler.run().await;
    assert_eq!(h.store.indexed_heights(), vec![100, 101, 102]);
    assert_eq!(h.primary.calls(), 2);
    assert_eq!(h.processor.failover_state().await, FailoverState::Primary);
}

#[tokio::test]
async fn test_repeated_failures_cool_down_the_scheduler() {
    let h = harness(&[100]);
    h.primary.failing.store(true, Ordering::SeqCst);
    h.fallback.failing.store(true, Ordering::SeqCst);

    let mut reasons = Vec::new();
    for _ in 0..5 {
        let outcome = h.scheduler.run().await;
        reasons.push(outcome.reason);
        h.clock.advance(outcome.next_run_in);
    }
    assert_eq!(reasons.last(), Some(&RunReason::CooldownStarted));

    let calls = h.primary.calls() + h.fallback.calls();
    assert_eq!(h.scheduler.run().await.reason, RunReason::CoolingDown);
    assert_eq!(h.primary.calls() + h.fallback.calls(), calls);

    let state = h.scheduler.state().await;
    assert!(state.cooldown_until.unwrap() > h.clock.now());
    assert_eq!(state.batch_size, 1);
}
