use crate::{ConfigError, ConfigErrorResult};

use std::time::Duration;

use serde::Deserialize;

// Grace period constraints
pub const MIN_GRACE_PERIOD_MS: u64 = 50;
pub const MAX_GRACE_PERIOD_MS: u64 = 60_000;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2_000;

// Stop timeout constraints
pub const MIN_STOP_TIMEOUT_MS: u64 = 100;
pub const MAX_STOP_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;

// Availability probe constraints
pub const MIN_PROBE_TIMEOUT_MS: u64 = 100;
pub const MAX_PROBE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

// Drain settle constraints
pub const MAX_DRAIN_SETTLE_MS: u64 = 10_000;
pub const DEFAULT_DRAIN_SETTLE_MS: u64 = 500;

// Output tail constraints
pub const MAX_OUTPUT_TAIL_LINES: usize = 1_000;
pub const DEFAULT_OUTPUT_TAIL_LINES: usize = 20;

/// Timing and buffering knobs for the process supervisor.
///
/// All durations are stored in milliseconds so they can be overridden
/// from environment variables without a duration parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay after launch before liveness is confirmed
    pub grace_period_ms: u64,
    /// How long a stop waits for voluntary exit before forcing termination
    pub stop_timeout_ms: u64,
    /// Upper bound for the `which`/`where` availability probe
    pub probe_timeout_ms: u64,
    /// How long the exit watcher lets the output drain catch up after exit
    pub drain_settle_ms: u64,
    /// Number of trailing output lines kept for crash diagnostics
    pub output_tail_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            drain_settle_ms: DEFAULT_DRAIN_SETTLE_MS,
            output_tail_lines: DEFAULT_OUTPUT_TAIL_LINES,
        }
    }
}

impl SupervisorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn drain_settle(&self) -> Duration {
        Duration::from_millis(self.drain_settle_ms)
    }

    pub fn validate(&self) -> ConfigErrorResult<()> {
        if self.grace_period_ms < MIN_GRACE_PERIOD_MS || self.grace_period_ms > MAX_GRACE_PERIOD_MS
        {
            return Err(ConfigError::supervisor(format!(
                "supervisor.grace_period_ms must be {}-{}, got {}",
                MIN_GRACE_PERIOD_MS, MAX_GRACE_PERIOD_MS, self.grace_period_ms
            )));
        }

        if self.stop_timeout_ms < MIN_STOP_TIMEOUT_MS || self.stop_timeout_ms > MAX_STOP_TIMEOUT_MS
        {
            return Err(ConfigError::supervisor(format!(
                "supervisor.stop_timeout_ms must be {}-{}, got {}",
                MIN_STOP_TIMEOUT_MS, MAX_STOP_TIMEOUT_MS, self.stop_timeout_ms
            )));
        }

        if self.probe_timeout_ms < MIN_PROBE_TIMEOUT_MS
            || self.probe_timeout_ms > MAX_PROBE_TIMEOUT_MS
        {
            return Err(ConfigError::supervisor(format!(
                "supervisor.probe_timeout_ms must be {}-{}, got {}",
                MIN_PROBE_TIMEOUT_MS, MAX_PROBE_TIMEOUT_MS, self.probe_timeout_ms
            )));
        }

        if self.drain_settle_ms > MAX_DRAIN_SETTLE_MS {
            return Err(ConfigError::supervisor(format!(
                "supervisor.drain_settle_ms must be at most {}, got {}",
                MAX_DRAIN_SETTLE_MS, self.drain_settle_ms
            )));
        }

        if self.output_tail_lines > MAX_OUTPUT_TAIL_LINES {
            return Err(ConfigError::supervisor(format!(
                "supervisor.output_tail_lines must be at most {}, got {}",
                MAX_OUTPUT_TAIL_LINES, self.output_tail_lines
            )));
        }

        Ok(())
    }
}
