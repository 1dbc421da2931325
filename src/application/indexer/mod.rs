//! Backfill indexer
//!
//! The [`Scheduler`] drives batches through the [`BlockProcessor`], which fetches
//! each block from the primary or the fallback backend, analyses it and stores
//! the statistics.

pub mod block_processor;
pub mod failover;
pub mod scheduler;

pub use block_processor::{BatchProcessor, BlockProcessor};
pub use failover::FailoverState;
pub use scheduler::{RunOutcome, RunReason, Scheduler, SchedulerState};

use std::fmt;

/// Transaction backend used for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Bitcoin Core node
    Primary,
    /// Esplora REST endpoint
    Fallback,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Primary => write!(f, "primary"),
            Backend::Fallback => write!(f, "fallback"),
        }
    }
}
