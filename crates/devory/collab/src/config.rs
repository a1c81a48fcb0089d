//! Allocator configuration

use devory_types::RateLimitPolicy;
use serde::{Deserialize, Serialize};

/// Tunables for the collaboration allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Join requests a user may submit inside one window
    #[serde(default = "default_join_requests_per_window")]
    pub join_requests_per_window: u32,

    /// Rolling window length in seconds
    #[serde(default = "default_join_window_secs")]
    pub join_window_secs: u64,

    /// Upper bound on a post row lock wait in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            join_requests_per_window: default_join_requests_per_window(),
            join_window_secs: default_join_window_secs(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl AllocatorConfig {
    pub fn join_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.join_requests_per_window,
            chrono::Duration::seconds(self.join_window_secs as i64),
        )
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_join_requests_per_window() -> u32 {
    10
}

fn default_join_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}
