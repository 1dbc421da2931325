//! Adaptive indexing scheduler.
//!
//! Each [`Scheduler::run`] call executes at most one batch and returns the delay
//! before the next call. Batch size grows by half (at most doubling) after fast
//! cycles and halves after slow or failed ones. After `max_failures` consecutive
//! failures the scheduler cools down; when the store runs out of blocks it rests.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::BatchProcessor;
use crate::config::SchedulerConfig;
use crate::utils::clock::{deadline, remaining, Clock, Sleeper};
use crate::utils::logging;

/// Mutable scheduler bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    pub batch_size: usize,
    pub failure_count: u32,
    /// No batch before this instant after the store ran dry
    pub sleep_until: Option<DateTime<Utc>>,
    /// No batch before this instant after too many failures
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl SchedulerState {
    fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            failure_count: 0,
            sleep_until: None,
            cooldown_until: None,
        }
    }
}

/// Why a cycle ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReason {
    /// Another cycle holds the state
    AlreadyRunning,
    /// Skipped, resting after the store ran dry
    Resting,
    /// Skipped, cooling down after repeated failures
    CoolingDown,
    /// A full batch was processed
    Processed,
    /// The store ran out of unindexed blocks
    Exhausted,
    /// The batch failed; retry after backoff
    Failed,
    /// The batch failed and the failure limit was reached
    CooldownStarted,
}

/// Result of one scheduler cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub reason: RunReason,
    /// Delay before `run` should be called again
    pub next_run_in: Duration,
}

/// Drives the block processor in adaptively sized batches
pub struct Scheduler {
    processor: Arc<dyn BatchProcessor>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        processor: Arc<dyn BatchProcessor>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let state = SchedulerState::new(config.initial_batch_size);
        Self {
            processor,
            clock,
            config,
            state: Mutex::new(state),
        }
    }

    /// Snapshot of the current state; waits for a running cycle to finish
    pub async fn state(&self) -> SchedulerState {
        self.state.lock().await.clone()
    }

    /// Execute one scheduling cycle
    pub async fn run(&self) -> RunOutcome {
        let Ok(mut state) = self.state.try_lock() else {
            logging::log_info("Ordpool stats task is already running, skipping this run");
            return RunOutcome {
                reason: RunReason::AlreadyRunning,
                next_run_in: self.config.poll_interval,
            };
        };

        let now = self.clock.now();
        if let Some(outcome) = self.paused(&state, now) {
            return outcome;
        }

        let start = self.clock.now();
        let result = self.processor.process_batch(state.batch_size).await;
        let end = self.clock.now();

        match result {
            Ok(true) => {
                state.failure_count = 0;
                let duration = remaining(start, end);
                state.batch_size = self.adjust_batch_size(state.batch_size, duration);
                RunOutcome {
                    reason: RunReason::Processed,
                    next_run_in: self.config.poll_interval,
                }
            }
            Ok(false) => {
                state.sleep_until = Some(deadline(end, self.config.rest_interval));
                logging::log_info(&format!(
                    "💤 All blocks indexed, resting for {}s",
                    self.config.rest_interval.as_secs()
                ));
                RunOutcome {
                    reason: RunReason::Exhausted,
                    next_run_in: self.config.rest_interval.min(self.config.poll_interval),
                }
            }
            Err(e) => {
                state.failure_count = state.failure_count.saturating_add(1);
                let shrunk = shrink(state.batch_size);
                logging::log_error(&format!(
                    "Error while processing ordpool stats (failure {}/{}): {}. Decreasing batch size from {} to {}",
                    state.failure_count, self.config.max_failures, e, state.batch_size, shrunk
                ));
                state.batch_size = shrunk;

                if state.failure_count >= self.config.max_failures {
                    let until = deadline(end, self.config.cooldown);
                    state.cooldown_until = Some(until);
                    logging::log_warning(&format!(
                        "🧊 Too many consecutive failures, cooling down until {}",
                        until.to_rfc3339()
                    ));
                    RunOutcome {
                        reason: RunReason::CooldownStarted,
                        next_run_in: self.config.cooldown.min(self.config.poll_interval),
                    }
                } else {
                    RunOutcome {
                        reason: RunReason::Failed,
                        next_run_in: self.backoff(state.failure_count),
                    }
                }
            }
        }
    }

    /// Call [`Scheduler::run`] until `shutdown` turns true or its sender is dropped
    pub async fn run_forever(&self, sleeper: &dyn Sleeper, mut shutdown: watch::Receiver<bool>) {
        logging::log_info("🚀 Ordpool stats indexer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run().await;
            logging::log_debug(&format!(
                "Cycle finished ({:?}), next run in {}ms",
                outcome.reason,
                outcome.next_run_in.as_millis()
            ));

            tokio::select! {
                _ = sleeper.sleep(outcome.next_run_in) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        logging::log_info("Ordpool stats indexer stopped");
    }

    fn paused(&self, state: &SchedulerState, now: DateTime<Utc>) -> Option<RunOutcome> {
        let (reason, until) = match (state.cooldown_until, state.sleep_until) {
            (Some(until), _) if now < until => (RunReason::CoolingDown, until),
            (_, Some(until)) if now < until => (RunReason::Resting, until),
            _ => return None,
        };
        Some(RunOutcome {
            reason,
            next_run_in: remaining(now, until).min(self.config.poll_interval),
        })
    }

    fn adjust_batch_size(&self, batch_size: usize, duration: Duration) -> usize {
        if duration < self.config.min_duration {
            let grown = grow(batch_size);
            logging::log_info(&format!(
                "📈 Increasing batch size from {} to {} (cycle took {}s)",
                batch_size,
                grown,
                duration.as_secs()
            ));
            grown
        } else if duration > self.config.max_duration {
            let shrunk = shrink(batch_size);
            logging::log_info(&format!(
                "📉 Decreasing batch size from {} to {} (cycle took {}s)",
                batch_size,
                shrunk,
                duration.as_secs()
            ));
            shrunk
        } else {
            logging::log_info(&format!(
                "Maintaining batch size {} (cycle took {}s)",
                batch_size,
                duration.as_secs()
            ));
            batch_size
        }
    }

    /// `min(base * 2^failures, cap)`
    fn backoff(&self, failure_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(failure_count);
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(self.config.backoff_cap)
    }
}

/// Grow by half, capped at doubling
fn grow(batch_size: usize) -> usize {
    let half = (batch_size + 1) / 2;
    batch_size
        .saturating_add(half)
        .min(batch_size.saturating_mul(2))
        .max(1)
}

/// Halve, never below one
fn shrink(batch_size: usize) -> usize {
    ((batch_size + 1) / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::BlockProcessorError;
    use crate::infrastructure::persistence::DbError;
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// One scripted step per `process_batch` call
    #[derive(Debug, Clone, Copy)]
    enum Step {
        Work { took: Duration },
        NoMoreWork,
        Fail,
    }

    struct ScriptedProcessor {
        clock: Arc<ManualClock>,
        steps: StdMutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedProcessor {
        fn new(clock: Arc<ManualClock>, steps: Vec<Step>) -> Self {
            Self {
                clock,
                steps: StdMutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BatchProcessor for ScriptedProcessor {
        async fn process_batch(&self, _max_blocks: usize) -> Result<bool, BlockProcessorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::NoMoreWork);
            match step {
                Step::Work { took } => {
                    self.clock.advance(took);
                    Ok(true)
                }
                Step::NoMoreWork => Ok(false),
                Step::Fail => Err(BlockProcessorError::Db(DbError::QueryError(
                    "connection refused".to_string(),
                ))),
            }
        }
    }

    fn scheduler(steps: Vec<Step>) -> (Scheduler, Arc<ScriptedProcessor>, Arc<ManualClock>) {
        scheduler_with(SchedulerConfig::default(), steps)
    }

    fn scheduler_with(
        config: SchedulerConfig,
        steps: Vec<Step>,
    ) -> (Scheduler, Arc<ScriptedProcessor>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let processor = Arc::new(ScriptedProcessor::new(clock.clone(), steps));
        let scheduler = Scheduler::new(processor.clone(), clock.clone(), config);
        (scheduler, processor, clock)
    }

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[tokio::test]
    async fn test_fast_cycle_grows_batch() {
        let (scheduler, _, _) = scheduler(vec![Step::Work { took: minutes(1) }]);

        let outcome = scheduler.run().await;
        assert_eq!(outcome.reason, RunReason::Processed);
        assert_eq!(outcome.next_run_in, Duration::from_secs(10));
        assert_eq!(scheduler.state().await.batch_size, 15);
    }

    #[tokio::test]
    async fn test_slow_cycle_shrinks_batch() {
        let (scheduler, _, _) = scheduler(vec![Step::Work { took: minutes(16) }]);
        scheduler.run().await;
        assert_eq!(scheduler.state().await.batch_size, 5);
    }

    #[tokio::test]
    async fn test_medium_cycle_keeps_batch() {
        let (scheduler, _, _) = scheduler(vec![Step::Work { took: minutes(10) }]);
        scheduler.run().await;
        assert_eq!(scheduler.state().await.batch_size, 10);
    }

    #[tokio::test]
    async fn test_failure_halves_batch_and_backs_off() {
        let (scheduler, _, _) = scheduler(vec![Step::Fail, Step::Fail]);

        let first = scheduler.run().await;
        let state = scheduler.state().await;
        assert_eq!(state.batch_size, 5);
        assert_eq!(state.failure_count, 1);
        assert_eq!(first.reason, RunReason::Failed);
        assert_eq!(first.next_run_in, Duration::from_secs(2));

        let second = scheduler.run().await;
        assert_eq!(second.next_run_in, Duration::from_secs(4));
        assert_eq!(scheduler.state().await.batch_size, 3);
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let (scheduler, _, _) = scheduler(vec![Step::Fail, Step::Work { took: minutes(1) }]);
        scheduler.run().await;
        scheduler.run().await;
        let state = scheduler.state().await;
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.batch_size, 8);
    }

    #[tokio::test]
    async fn test_five_failures_start_cooldown_and_sixth_run_skips() {
        let (scheduler, processor, clock) = scheduler(vec![Step::Fail; 6]);

        for _ in 0..4 {
            assert_eq!(scheduler.run().await.reason, RunReason::Failed);
        }
        let fifth = scheduler.run().await;
        assert_eq!(fifth.reason, RunReason::CooldownStarted);
        assert_eq!(fifth.next_run_in, Duration::from_secs(10));

        let state = scheduler.state().await;
        assert!(state.cooldown_until.unwrap() > clock.now());
        assert_eq!(processor.calls(), 5);

        let sixth = scheduler.run().await;
        assert_eq!(sixth.reason, RunReason::CoolingDown);
        assert_eq!(processor.calls(), 5);

        clock.advance(minutes(2));
        scheduler.run().await;
        assert_eq!(processor.calls(), 6);
    }

    #[tokio::test]
    async fn test_no_more_work_rests_without_touching_failures() {
        let (scheduler, processor, clock) = scheduler(vec![Step::Fail, Step::NoMoreWork]);
        scheduler.run().await;

        let outcome = scheduler.run().await;
        assert_eq!(outcome.reason, RunReason::Exhausted);

        let state = scheduler.state().await;
        assert_eq!(state.sleep_until, Some(deadline(clock.now(), minutes(10))));
        assert_eq!(state.failure_count, 1);
        assert_eq!(state.batch_size, 5);

        clock.advance(minutes(9));
        let resting = scheduler.run().await;
        assert_eq!(resting.reason, RunReason::Resting);
        assert_eq!(resting.next_run_in, Duration::from_secs(10));
        assert_eq!(processor.calls(), 2);
    }

    #[tokio::test]
    async fn test_rest_rearm_is_bounded_by_remaining_time() {
        let (scheduler, _, clock) = scheduler(vec![Step::NoMoreWork]);
        scheduler.run().await;

        clock.advance(minutes(10) - Duration::from_secs(3));
        let outcome = scheduler.run().await;
        assert_eq!(outcome.next_run_in, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let (scheduler, processor, _) = scheduler(vec![]);
        let guard = scheduler.state.lock().await;

        let outcome = scheduler.run().await;
        assert_eq!(outcome.reason, RunReason::AlreadyRunning);
        assert_eq!(processor.calls(), 0);
        drop(guard);
    }

    #[test]
    fn test_batch_size_never_drops_below_one() {
        let mut batch_size = 1;
        for _ in 0..10 {
            batch_size = shrink(batch_size);
            assert!(batch_size >= 1);
        }
        assert_eq!(grow(1), 2);
        assert_eq!(grow(2), 3);
        assert_eq!(grow(10), 15);
        assert_eq!(shrink(10), 5);
        assert_eq!(shrink(5), 3);
    }

    #[tokio::test]
    async fn test_batch_size_trail_from_one() {
        let config = SchedulerConfig {
            initial_batch_size: 1,
            ..SchedulerConfig::default()
        };
        let (scheduler, _, _) = scheduler_with(
            config,
            vec![
                Step::Fail,
                Step::Work { took: minutes(1) },
                Step::Work { took: minutes(1) },
                Step::Work { took: minutes(16) },
                Step::Fail,
                Step::Work { took: minutes(1) },
                Step::Work { took: minutes(10) },
            ],
        );

        let mut trail = Vec::new();
        for _ in 0..7 {
            scheduler.run().await;
            trail.push(scheduler.state().await.batch_size);
        }
        assert_eq!(trail, vec![1, 2, 3, 2, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_batch_size_stays_positive_under_mixed_cycles() {
        let config = SchedulerConfig {
            initial_batch_size: 1,
            ..SchedulerConfig::default()
        };
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let steps: Vec<Step> = (0..200)
            .map(|_| {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                match (seed >> 33) % 4 {
                    0 => Step::Fail,
                    1 => Step::Work { took: minutes(1) },
                    2 => Step::Work { took: minutes(10) },
                    _ => Step::Work { took: minutes(16) },
                }
            })
            .collect();
        let (scheduler, processor, clock) = scheduler_with(config, steps);

        while processor.calls() < 200 {
            let outcome = scheduler.run().await;
            assert!(scheduler.state().await.batch_size >= 1);
            clock.advance(outcome.next_run_in);
        }
    }

    #[tokio::test]
    async fn test_huge_rest_interval_saturates_instead_of_panicking() {
        let config = SchedulerConfig {
            rest_interval: Duration::from_secs(u64::MAX),
            ..SchedulerConfig::default()
        };
        let (scheduler, _, _) = scheduler_with(config, vec![Step::NoMoreWork]);

        let outcome = scheduler.run().await;
        assert_eq!(outcome.reason, RunReason::Exhausted);
        assert_eq!(outcome.next_run_in, Duration::from_secs(10));
        assert_eq!(
            scheduler.state().await.sleep_until,
            Some(DateTime::<Utc>::MAX_UTC)
        );
        assert_eq!(scheduler.run().await.reason, RunReason::Resting);
    }

    #[tokio::test]
    async fn test_huge_cooldown_saturates_instead_of_panicking() {
        let config = SchedulerConfig {
            cooldown: Duration::from_secs(u64::MAX),
            max_failures: 1,
            ..SchedulerConfig::default()
        };
        let (scheduler, _, _) = scheduler_with(config, vec![Step::Fail]);

        let outcome = scheduler.run().await;
        assert_eq!(outcome.reason, RunReason::CooldownStarted);
        assert_eq!(
            scheduler.state().await.cooldown_until,
            Some(DateTime::<Utc>::MAX_UTC)
        );
        assert_eq!(scheduler.run().await.reason, RunReason::CoolingDown);
    }

    #[tokio::test]
    async fn test_run_forever_stops_on_shutdown() {
        struct CountingSleeper {
            sleeps: AtomicUsize,
            shutdown: watch::Sender<bool>,
        }

        #[async_trait]
        impl Sleeper for CountingSleeper {
            async fn sleep(&self, _duration: Duration) {
                if self.sleeps.fetch_add(1, Ordering::SeqCst) == 2 {
                    let _ = self.shutdown.send(true);
                }
            }
        }

        let (scheduler, processor, _) = scheduler(vec![
            Step::Work { took: minutes(1) },
            Step::Work { took: minutes(1) },
            Step::Work { took: minutes(1) },
        ]);
        let (tx, rx) = watch::channel(false);
        let sleeper = CountingSleeper {
            sleeps: AtomicUsize::new(0),
            shutdown: tx,
        };

        scheduler.run_forever(&sleeper, rx).await;
        assert_eq!(processor.calls(), 3);
        assert_eq!(scheduler.state().await.batch_size, 35);
    }
}
