use crate::{PostId, RequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Join request lifecycle. Transitions are forward-only out of `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl JoinRequestStatus {
    pub fn can_transition_to(self, to: JoinRequestStatus) -> bool {
        matches!(
            (self, to),
            (JoinRequestStatus::Pending, JoinRequestStatus::Accepted)
                | (JoinRequestStatus::Pending, JoinRequestStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Accepted => "accepted",
            JoinRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JoinRequestStatus::Pending),
            "accepted" => Some(JoinRequestStatus::Accepted),
            "rejected" => Some(JoinRequestStatus::Rejected),
            _ => None,
        }
    }
}

/// A user's request to fill one slot on a collaboration post.
///
/// At most one request exists per `(post_id, requester_id)` pair, whatever
/// its status. Requests are never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: RequestId,
    pub post_id: PostId,
    pub requester_id: UserId,
    pub status: JoinRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JoinRequest {
    pub fn pending(
        post_id: PostId,
        requester_id: UserId,
        message: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            post_id,
            requester_id,
            status: JoinRequestStatus::Pending,
            message,
            created_at,
            updated_at: created_at,
        }
    }
}
