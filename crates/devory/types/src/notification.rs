use crate::{PostId, RequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    CollabRequest,
    CollabAccept,
    CollabReject,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::CollabRequest => "COLLAB_REQUEST",
            NotificationKind::CollabAccept => "COLLAB_ACCEPT",
            NotificationKind::CollabReject => "COLLAB_REJECT",
        }
    }
}

/// Notification emitted after an allocation decision commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub actor_id: UserId,
    pub post_id: PostId,
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
}
