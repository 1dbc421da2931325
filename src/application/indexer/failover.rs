//! Two-state backend selection.
//!
//! Transitions:
//! - `Primary` → `Fallback`: a fetch through the primary backend failed
//! - `Fallback` → `Primary`: `cooldown` elapsed since the switch, checked before each fetch
//!
//! A failing fallback leaves the state untouched.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::Backend;
use crate::utils::clock::to_time_delta;
use crate::utils::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailoverState {
    #[default]
    Primary,
    Fallback {
        /// When the primary was abandoned
        since: DateTime<Utc>,
    },
}

impl FailoverState {
    /// Backend for the next fetch, re-probing the primary once the cooldown is over
    pub fn select(&mut self, now: DateTime<Utc>, cooldown: Duration) -> Backend {
        if let FailoverState::Fallback { since } = *self {
            if now - since >= to_time_delta(cooldown) {
                logging::log_info("🔄 Failover cooldown elapsed, switching back to primary backend");
                *self = FailoverState::Primary;
            }
        }
        self.backend()
    }

    /// Record a failed fetch through `backend`
    pub fn on_failure(&mut self, backend: Backend, now: DateTime<Utc>) {
        if backend == Backend::Primary && *self == FailoverState::Primary {
            logging::log_warning("⚠️ Primary backend failed, switching to fallback backend");
            *self = FailoverState::Fallback { since: now };
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            FailoverState::Primary => Backend::Primary,
            FailoverState::Fallback { .. } => Backend::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FailoverState::Fallback { .. })
    }

    /// Time of the last switch to the fallback, while it is in use
    pub fn last_switch_time(&self) -> Option<DateTime<Utc>> {
        match self {
            FailoverState::Primary => None,
            FailoverState::Fallback { since } => Some(*since),
        }
    }
}
