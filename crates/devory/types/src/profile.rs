use crate::UserId;
use serde::{Deserialize, Serialize};

pub const POST_WEIGHT: u64 = 5;
pub const LIKE_WEIGHT: u64 = 2;
pub const COLLABORATION_WEIGHT: u64 = 10;

/// Derived reputation: `posts*5 + likes*2 + collaborations*10`.
pub fn reputation_score(total_posts: u64, total_likes_received: u64, collaborations: u64) -> u64 {
    total_posts * POST_WEIGHT
        + total_likes_received * LIKE_WEIGHT
        + collaborations * COLLABORATION_WEIGHT
}

/// Per-user counters feeding the reputation score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub user_id: UserId,
    pub total_posts: u64,
    pub total_likes_received: u64,
    pub collaborations_accepted: u64,
    pub reputation_score: u64,
}

impl ProfileStats {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_posts: 0,
            total_likes_received: 0,
            collaborations_accepted: 0,
            reputation_score: 0,
        }
    }

    /// Recompute the score from the stored counters.
    pub fn recompute(&mut self) {
        self.reputation_score = reputation_score(
            self.total_posts,
            self.total_likes_received,
            self.collaborations_accepted,
        );
    }

    pub fn record_post(&mut self) {
        self.total_posts += 1;
        self.recompute();
    }

    pub fn record_like(&mut self) {
        self.total_likes_received += 1;
        self.recompute();
    }

    pub fn record_collaboration(&mut self) {
        self.collaborations_accepted += 1;
        self.recompute();
    }
}
