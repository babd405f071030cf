use std::time::Duration;

use serde::Deserialize;

fn default_navigation_timeout() -> u64 {
    15
}

fn default_selector_timeout() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("finscout/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration for source extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    /// Upper bound on loading a page, in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    /// Upper bound on waiting for the content selector to appear, in seconds.
    #[serde(default = "default_selector_timeout")]
    pub selector_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Permit loopback and private-network hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl ExtractConfig {
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    #[must_use]
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout(),
            selector_timeout_secs: default_selector_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            max_body_bytes: default_max_body_bytes(),
            max_file_size: default_max_file_size(),
            user_agent: default_user_agent(),
            allow_private_hosts: false,
        }
    }
}
