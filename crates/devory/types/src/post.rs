use crate::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Community post type. Only collaboration posts carry slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostKind {
    Idea,
    Collaboration,
}

impl PostKind {
    pub fn supports_collaboration(self) -> bool {
        matches!(self, PostKind::Collaboration)
    }
}

/// Collaboration post status. `Closed` is terminal for new requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Open,
    Closed,
}

/// A community post that other users may request to join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationPost {
    pub id: PostId,
    pub owner_id: UserId,
    pub kind: PostKind,
    pub title: String,
    pub status: PostStatus,
    /// `None` means unlimited capacity.
    pub required_slots: Option<u32>,
    pub filled_slots: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollaborationPost {
    pub fn is_open(&self) -> bool {
        self.status == PostStatus::Open
    }

    /// True while at least one slot is free (always true for unlimited posts).
    pub fn has_capacity(&self) -> bool {
        match self.required_slots {
            Some(required) => self.filled_slots < required,
            None => true,
        }
    }

    pub fn remaining_slots(&self) -> Option<u32> {
        self.required_slots
            .map(|required| required.saturating_sub(self.filled_slots))
    }

    /// Consume one slot, closing the post when the last slot is taken.
    ///
    /// Callers must have verified `has_capacity()` on a locked row first.
    /// The counter saturates on unlimited posts.
    pub fn fill_slot(&mut self, at: DateTime<Utc>) {
        self.filled_slots = self.filled_slots.saturating_add(1);
        if let Some(required) = self.required_slots {
            if self.filled_slots >= required {
                self.status = PostStatus::Closed;
            }
        }
        self.updated_at = at;
    }
}

/// Input for creating a collaboration post.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewCollaborationPost {
    pub owner_id: UserId,
    #[serde(default = "default_kind")]
    pub kind: PostKind,
    pub title: String,
    #[serde(default)]
    pub required_slots: Option<u32>,
}

fn default_kind() -> PostKind {
    PostKind::Collaboration
}

impl NewCollaborationPost {
    pub fn collaboration(
        owner_id: UserId,
        title: impl Into<String>,
        required_slots: Option<u32>,
    ) -> Self {
        Self {
            owner_id,
            kind: PostKind::Collaboration,
            title: title.into(),
            required_slots,
        }
    }

    pub fn idea(owner_id: UserId, title: impl Into<String>) -> Self {
        Self {
            owner_id,
            kind: PostKind::Idea,
            title: title.into(),
            required_slots: None,
        }
    }

    pub fn into_post(self, id: PostId, created_at: DateTime<Utc>) -> CollaborationPost {
        CollaborationPost {
            id,
            owner_id: self.owner_id,
            kind: self.kind,
            title: self.title,
            status: PostStatus::Open,
            required_slots: self.required_slots,
            filled_slots: 0,
            created_at,
            updated_at: created_at,
        }
    }
}
