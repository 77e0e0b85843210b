//! Trade service client configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the trade service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeServiceConfig {
    /// Base URL of the trade service, e.g. `http://localhost:9090`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// End-to-end timeout for one bulk call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TradeServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:9090".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_connect_timeout_ms() -> u64 {
    2_000
}
