//! Configuration types for the bridge
//!
//! Defaults mirror observed radio behavior: a 100-entry message history,
//! a 10 second telemetry round-trip deadline, and indefinite reconnection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum text payload size for a radio packet, in bytes
pub const TEXT_PAYLOAD_MAX: usize = 237;

/// Default message history capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default telemetry round-trip deadline
pub const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default age under which cached telemetry is served without a round trip
pub const DEFAULT_TELEMETRY_MAX_AGE: Duration = Duration::from_secs(300);

/// Default TCP port radios expose their packet stream on
pub const DEFAULT_RADIO_PORT: u16 = 4403;

/// Main configuration for the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Message history capacity (FIFO eviction past this)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Deadline for a telemetry request/response round trip
    #[serde(with = "humantime_serde", default = "default_telemetry_timeout")]
    pub telemetry_timeout: Duration,

    /// Cached telemetry younger than this is served without a round trip
    #[serde(with = "humantime_serde", default = "default_telemetry_max_age")]
    pub telemetry_max_age: Duration,

    /// Depth of the outbound send queue into the listener
    #[serde(default = "default_send_queue_size")]
    pub send_queue_size: usize,

    /// Reconnection settings
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_telemetry_timeout() -> Duration {
    DEFAULT_TELEMETRY_TIMEOUT
}

fn default_telemetry_max_age() -> Duration {
    DEFAULT_TELEMETRY_MAX_AGE
}

fn default_send_queue_size() -> usize {
    64
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            telemetry_timeout: DEFAULT_TELEMETRY_TIMEOUT,
            telemetry_max_age: DEFAULT_TELEMETRY_MAX_AGE,
            send_queue_size: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnection behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Initial delay before the first retry after a failed attempt
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (backoff doubles up to this)
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Maximum number of consecutive failed attempts (0 = infinite)
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 0, // Infinite
        }
    }
}

/// Builder for [`BridgeConfig`]
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message history capacity
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity.max(1);
        self
    }

    /// Set the telemetry round-trip deadline
    pub fn telemetry_timeout(mut self, timeout: Duration) -> Self {
        self.config.telemetry_timeout = timeout;
        self
    }

    /// Set the cached-telemetry freshness window
    pub fn telemetry_max_age(mut self, max_age: Duration) -> Self {
        self.config.telemetry_max_age = max_age;
        self
    }

    /// Set the reconnect backoff window
    pub fn reconnect_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect.initial_delay = initial;
        self.config.reconnect.max_delay = max;
        self
    }

    /// Limit consecutive reconnect attempts (0 = infinite)
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.reconnect.max_attempts = attempts;
        self
    }

    /// Build the configuration
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.telemetry_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect.max_attempts, 0);
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfigBuilder::new()
            .history_capacity(50)
            .telemetry_timeout(Duration::from_secs(5))
            .max_reconnect_attempts(3)
            .build();

        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.telemetry_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_capacity_floor() {
        let config = BridgeConfigBuilder::new().history_capacity(0).build();
        assert_eq!(config.history_capacity, 1);
    }

    #[test]
    fn test_duration_serde_round_trip() {
        let config = BridgeConfigBuilder::new()
            .telemetry_timeout(Duration::from_secs(15))
            .build();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("15s"));
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.telemetry_timeout, Duration::from_secs(15));
    }
}
