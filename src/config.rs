// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestrator configuration
//!
//! Poll cadence, retry policies and the aggregate provisioning deadline.
//! Every knob has a default; environment variables prefixed `SLICE_` or a
//! partial JSON document may override any of them.
//!
//! | Variable                         | Default |
//! |----------------------------------|---------|
//! | `SLICE_POLL_INTERVAL_MS`         | 2000    |
//! | `SLICE_POLL_BACKOFF_FACTOR`      | 2.0     |
//! | `SLICE_POLL_MAX_INTERVAL_MS`     | 30000   |
//! | `SLICE_POLL_ROUND_TIMEOUT_MS`    | 15000   |
//! | `SLICE_PROVISIONING_TIMEOUT_SECS`| 1800    |
//! | `SLICE_CONNECT_ATTEMPTS`         | 3       |
//! | `SLICE_CONNECT_BASE_MS`          | 500     |
//! | `SLICE_CONNECT_FACTOR`           | 2.0     |
//! | `SLICE_CONNECT_JITTER`           | 0.20    |
//! | `SLICE_CONNECT_MAX_MS`           | 10000   |
//! | `SLICE_CONNECT_TIMEOUT_MS`       | 10000   |
//! | `SLICE_SUBMIT_ATTEMPTS`          | 3       |
//! | `SLICE_SUBMIT_BASE_MS`           | 1000    |

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{SliceError, SliceResult};

/// Longest configurable provisioning deadline (30 days)
pub const MAX_PROVISIONING_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Control-plane polling cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Growth of the interval after consecutive transient poll failures
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
    /// Deadline for a single status request
    pub round_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            backoff_factor: 2.0,
            max_interval_ms: 30_000,
            round_timeout_ms: 15_000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    /// Delay before the next poll after `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let delay = (self.interval_ms as f64 * self.backoff_factor.powi(exponent))
            .min(self.max_interval_ms as f64);
        Duration::from_millis(delay as u64)
    }
}

/// Retry policy for management-network connection attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub factor: f64,
    /// Jitter as a fraction of the computed delay, applied ±
    pub jitter_percent: f64,
    pub max_ms: u64,
    /// Deadline for a single attempt
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 500,
            factor: 2.0,
            jitter_percent: 0.20,
            max_ms: 10_000,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given zero-based attempt, with jitter
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (self.base_ms as f64 * self.factor.powi(exponent)).min(self.max_ms as f64);

        let jitter_range = base * self.jitter_percent;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((base + jitter).max(0.0) as u64)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Retry policy for submitting a slice request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    pub max_attempts: u32,
    pub base_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 1_000,
        }
    }
}

impl SubmitConfig {
    /// Doubling delay after a failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll: PollConfig,
    pub connect: RetryPolicy,
    pub submit: SubmitConfig,
    pub provisioning_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            connect: RetryPolicy::default(),
            submit: SubmitConfig::default(),
            provisioning_timeout_secs: 1_800,
        }
    }
}

fn overlay<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> SliceResult<()> {
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| SliceError::Configuration(format!("{key}: cannot parse {raw:?}")))?;
    }
    Ok(())
}

impl OrchestratorConfig {
    pub fn provisioning_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioning_timeout_secs)
    }

    /// Defaults overlaid with `SLICE_*` environment variables
    pub fn from_env() -> SliceResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SliceResult<Self> {
        let mut config = Self::default();

        overlay(&lookup, "SLICE_POLL_INTERVAL_MS", &mut config.poll.interval_ms)?;
        overlay(&lookup, "SLICE_POLL_BACKOFF_FACTOR", &mut config.poll.backoff_factor)?;
        overlay(&lookup, "SLICE_POLL_MAX_INTERVAL_MS", &mut config.poll.max_interval_ms)?;
        overlay(&lookup, "SLICE_POLL_ROUND_TIMEOUT_MS", &mut config.poll.round_timeout_ms)?;
        overlay(
            &lookup,
            "SLICE_PROVISIONING_TIMEOUT_SECS",
            &mut config.provisioning_timeout_secs,
        )?;
        overlay(&lookup, "SLICE_CONNECT_ATTEMPTS", &mut config.connect.max_attempts)?;
        overlay(&lookup, "SLICE_CONNECT_BASE_MS", &mut config.connect.base_ms)?;
        overlay(&lookup, "SLICE_CONNECT_FACTOR", &mut config.connect.factor)?;
        overlay(&lookup, "SLICE_CONNECT_JITTER", &mut config.connect.jitter_percent)?;
        overlay(&lookup, "SLICE_CONNECT_MAX_MS", &mut config.connect.max_ms)?;
        overlay(&lookup, "SLICE_CONNECT_TIMEOUT_MS", &mut config.connect.attempt_timeout_ms)?;
        overlay(&lookup, "SLICE_SUBMIT_ATTEMPTS", &mut config.submit.max_attempts)?;
        overlay(&lookup, "SLICE_SUBMIT_BASE_MS", &mut config.submit.base_ms)?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a possibly partial JSON document; missing fields take defaults
    pub fn from_json(document: &str) -> SliceResult<Self> {
        let config: Self = serde_json::from_str(document)
            .map_err(|e| SliceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SliceResult<()> {
        let fail = |msg: &str| Err(SliceError::Configuration(msg.to_string()));

        if self.poll.interval_ms == 0 || self.poll.round_timeout_ms == 0 {
            return fail("poll interval and round timeout must be positive");
        }
        if self.poll.max_interval_ms < self.poll.interval_ms {
            return fail("poll max interval is below the base interval");
        }
        if self.poll.backoff_factor < 1.0 {
            return fail("poll backoff factor must be at least 1.0");
        }
        if self.provisioning_timeout_secs == 0 {
            return fail("provisioning timeout must be positive");
        }
        if self.provisioning_timeout_secs > MAX_PROVISIONING_TIMEOUT_SECS {
            return fail("provisioning timeout exceeds 30 days");
        }
        if self.connect.max_attempts == 0 || self.submit.max_attempts == 0 {
            return fail("attempt counts must be at least 1");
        }
        if self.connect.max_ms < self.connect.base_ms {
            return fail("connect max backoff is below the base backoff");
        }
        if self.connect.factor < 1.0 {
            return fail("connect backoff factor must be at least 1.0");
        }
        if !(0.0..1.0).contains(&self.connect.jitter_percent) {
            return fail("connect jitter must be within [0, 1)");
        }
        if self.connect.attempt_timeout_ms == 0 {
            return fail("connect attempt timeout must be positive");
        }
        Ok(())
    }
}
