use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Audio service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sink descriptions to exclude from output-device selection.
    ///
    /// Matched by exact equality against the sink's human-readable
    /// description, not its internal name.
    pub ignored_sinks: Vec<String>,

    /// Reconnection behavior after the server connection is lost.
    pub reconnect: ReconnectConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ignored_sinks: Vec::new(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Backoff parameters for re-establishing a lost server connection.
///
/// The delay doubles on each consecutive failed attempt, starting at
/// `initial_delay_ms` and never exceeding `max_delay_ms`. The attempt
/// counter resets once a connection reaches the ready state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on the delay between attempts, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait before the given reconnection attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}
