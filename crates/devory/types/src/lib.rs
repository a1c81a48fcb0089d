//! Devory collaboration domain types.
//!
//! Shared vocabulary for the collaboration slot-allocation core:
//! - identifiers for users, posts and join requests
//! - collaboration posts and their slot capacity
//! - join requests and their forward-only lifecycle
//! - per-user profile stats with the derived reputation score
//! - notification and rate-limit vocabulary used by side effects

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![warn(rust_2018_idioms)]

mod ids;
mod notification;
mod post;
mod profile;
mod rate_limit;
mod request;

pub use ids::{PostId, RequestId, UserId};
pub use notification::{Notification, NotificationKind};
pub use post::{CollaborationPost, NewCollaborationPost, PostKind, PostStatus};
pub use profile::{
    reputation_score, ProfileStats, COLLABORATION_WEIGHT, LIKE_WEIGHT, POST_WEIGHT,
};
pub use rate_limit::{RateLimitAction, RateLimitPolicy};
pub use request::{JoinRequest, JoinRequestStatus};
