//! Settle strategies: what to do between a command send and the next action.
//!
//! The default reproduces the observed behavior of the appliances in scope:
//! a fixed, unconditional wait per step, accepted flakiness included. The
//! prompt variant waits for a configurable prompt regex instead, for targets
//! whose shells do present a usable prompt.

use std::time::Duration;

use regex::bytes::Regex;

use crate::error::SessionError;

/// Strategy applied after each command send.
#[derive(Debug, Clone)]
pub enum SettleStrategy {
    /// Sleep for the step's settle delay. No readiness probe.
    FixedDelay,

    /// Read until the prompt pattern matches (or the timeout elapses,
    /// which is logged and tolerated like any other read timeout).
    Prompt {
        /// Prompt pattern to wait for.
        pattern: Regex,
        /// Per-step wait bound.
        timeout: Duration,
    },
}

impl SettleStrategy {
    /// Build a prompt strategy from a pattern string.
    pub fn prompt(pattern: &str, timeout: Duration) -> Result<Self, SessionError> {
        Ok(Self::Prompt {
            pattern: Regex::new(pattern)?,
            timeout,
        })
    }
}

impl Default for SettleStrategy {
    fn default() -> Self {
        Self::FixedDelay
    }
}
