//! Devory collaboration allocator.
//!
//! Coordinates join requests against capacity-limited collaboration posts
//! on top of `devory-storage`. The allocator itself is stateless: storage,
//! the submission quota counter and the notification sink are injected.

#![deny(unsafe_code)]

mod allocator;
mod config;
mod effects;
mod error;
mod notify;

pub use allocator::{Acceptance, CollaborationAllocator, MAX_MESSAGE_LEN};
pub use config::AllocatorConfig;
pub use error::{AllocationError, AllocationResult};
pub use notify::{InMemoryNotificationFeed, NotificationSink, NotifyError, TracingNotificationSink};
