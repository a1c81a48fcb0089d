use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Actions subject to a rolling submission quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    JoinRequest,
}

impl RateLimitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RateLimitAction::JoinRequest => "join_request",
        }
    }
}

/// At most `limit` actions inside any rolling `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Default join-request quota: 10 per rolling 24 hours.
    pub fn join_requests() -> Self {
        Self::new(10, Duration::hours(24))
    }
}
