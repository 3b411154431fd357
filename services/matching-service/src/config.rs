//! Matching service configuration

/// Queue the matching service consumes requests from
pub const DEFAULT_OBS_QUEUE: &str = "obs_requests";

/// Matching service settings
#[derive(Debug, Clone)]
pub struct ObsConfig {
    /// Request queue name
    pub request_queue: String,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            request_queue: DEFAULT_OBS_QUEUE.to_string(),
        }
    }
}

impl ObsConfig {
    /// Build from environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            request_queue: std::env::var("OBS_REQUEST_QUEUE")
                .unwrap_or_else(|_| DEFAULT_OBS_QUEUE.to_string()),
        }
    }
}
