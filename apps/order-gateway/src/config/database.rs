//! Order store configuration.

use serde::{Deserialize, Serialize};

/// Database configuration.
///
/// The pool is sized above the admission gate so submission traffic can
/// never exhaust it; other callers always find a free connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
        }
    }
}

pub(crate) fn default_url() -> String {
    "sqlite://orders.db?mode=rwc".to_string()
}

pub(crate) const fn default_max_connections() -> u32 {
    30
}
