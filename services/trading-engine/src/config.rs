//! Trading engine configuration

use std::time::Duration;

/// Queue the trading engine consumes client requests from
pub const DEFAULT_TES_QUEUE: &str = "tes_requests";
/// Queue the matching service consumes on
pub const DEFAULT_OBS_QUEUE: &str = "obs_requests";

const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Trading engine settings
#[derive(Debug, Clone)]
pub struct TesConfig {
    /// Client-facing request queue
    pub request_queue: String,
    /// Matching service request queue
    pub matching_queue: String,
    /// Per-attempt wait for a matching service response
    pub call_timeout: Duration,
    /// Attempts per downstream call, each with a fresh correlation id
    pub max_attempts: u32,
    /// Per-attempt wait for the startup handshake
    pub handshake_timeout: Duration,
    /// Handshake attempts before the engine refuses to start
    pub handshake_attempts: u32,
}

impl Default for TesConfig {
    fn default() -> Self {
        Self {
            request_queue: DEFAULT_TES_QUEUE.to_string(),
            matching_queue: DEFAULT_OBS_QUEUE.to_string(),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            handshake_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            handshake_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl TesConfig {
    /// Build from environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_queue: std::env::var("TES_REQUEST_QUEUE")
                .unwrap_or(defaults.request_queue),
            matching_queue: std::env::var("OBS_REQUEST_QUEUE")
                .unwrap_or(defaults.matching_queue),
            call_timeout: env_millis("TES_CALL_TIMEOUT_MS", defaults.call_timeout),
            max_attempts: env_u32("TES_MAX_ATTEMPTS", defaults.max_attempts),
            handshake_timeout: env_millis("TES_HANDSHAKE_TIMEOUT_MS", defaults.handshake_timeout),
            handshake_attempts: env_u32("TES_HANDSHAKE_ATTEMPTS", defaults.handshake_attempts),
        }
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TesConfig::default();
        assert_eq!(config.request_queue, "tes_requests");
        assert_eq!(config.matching_queue, "obs_requests");
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 3);
    }
}
