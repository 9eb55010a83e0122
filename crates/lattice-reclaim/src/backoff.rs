//! Exponential backoff with jitter between retry rounds
//!
//! The orchestrator retries failed deletions in later rounds rather than in
//! a tight loop around a single call. When a round is about to re-attempt
//! resources that already failed, it waits according to this policy so a
//! throttled provider is not hammered.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff policy applied before rounds that retry failed resources
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(rename = "initialDelayMs", with = "crate::options::duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    #[serde(rename = "maxDelayMs", with = "crate::options::duration_ms")]
    pub max_delay: Duration,
    /// Multiplier applied per failed attempt
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// A policy that never waits (tests, dry runs)
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay without jitter before retry number `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before retry number `attempt`, with 0.5x to 1.5x jitter, capped at `max_delay`
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64((base.as_secs_f64() * jitter).min(self.max_delay.as_secs_f64()))
    }
}
