//! Options for a reclamation run
//!
//! Deserializable from YAML/JSON (camelCase keys, every field optional) so the
//! CLI can load them from a config file, with `with_*` builders for callers
//! constructing them in code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::error::ReclaimError;
use crate::graph::BuildMode;

/// Default number of failed attempts before a resource is given up on
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default timeout for a single list or delete call
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of deletions in flight within a round
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Options for [`crate::Reclaimer::reclaim`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReclaimOptions {
    /// Compute the plan, delete nothing
    pub dry_run: bool,
    /// Stop after this many deletion rounds
    pub max_rounds: Option<u32>,
    /// Failed attempts before a resource is marked fatally failed
    pub max_attempts: u32,
    /// Timeout for each list or delete call
    #[serde(rename = "operationTimeoutSecs", with = "duration_secs")]
    pub operation_timeout: Duration,
    /// Deadline for the whole run, listing included
    #[serde(rename = "timeoutSecs", with = "option_duration_secs")]
    pub timeout: Option<Duration>,
    /// Deletions in flight within a round
    pub concurrency: usize,
    /// Fail the run on duplicate resource keys instead of keeping the last
    pub strict: bool,
    /// Wait policy before rounds that retry failures
    pub backoff: BackoffConfig,
}

impl Default for ReclaimOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_rounds: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            timeout: None,
            concurrency: DEFAULT_CONCURRENCY,
            strict: false,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ReclaimOptions {
    /// Set dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the round budget
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Set the per-resource attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the per-operation timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the whole-run deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set deletion concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enable strict duplicate-key checking
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the retry backoff policy
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Graph build mode implied by `strict`
    pub fn build_mode(&self) -> BuildMode {
        if self.strict {
            BuildMode::Strict
        } else {
            BuildMode::Tolerant
        }
    }

    /// Reject options the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ReclaimError> {
        if self.max_attempts == 0 {
            return Err(ReclaimError::InvalidOptions(
                "maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ReclaimError::InvalidOptions(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(ReclaimError::InvalidOptions(
                "operationTimeoutSecs must be positive".to_string(),
            ));
        }
        if self.max_rounds == Some(0) {
            return Err(ReclaimError::InvalidOptions(
                "maxRounds must be at least 1 when set".to_string(),
            ));
        }
        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
            return Err(ReclaimError::InvalidOptions(
                "backoff multiplier must be a finite number >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde helpers for durations stored as whole seconds
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Serde helpers for optional durations stored as whole seconds
pub(crate) mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|secs| secs.map(Duration::from_secs))
    }
}

/// Serde helpers for durations stored as milliseconds
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
