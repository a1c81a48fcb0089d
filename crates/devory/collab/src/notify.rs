//! Notification sinks.
//!
//! Delivery is best-effort and happens only after the allocation decision
//! has committed. A failing sink never rolls anything back.

use async_trait::async_trait;
use devory_types::{Notification, UserId};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Receiver of post-commit notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Sink that only records notifications in the log.
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient_id,
            actor = %notification.actor_id,
            post_id = %notification.post_id,
            request_id = %notification.request_id,
            kind = notification.kind.as_str(),
            "notification emitted"
        );
        Ok(())
    }
}

/// Per-recipient notification inbox kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryNotificationFeed {
    inbox: RwLock<HashMap<UserId, Vec<Notification>>>,
}

impl InMemoryNotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications for one user, newest first.
    pub fn list_for(&self, user_id: &UserId) -> Vec<Notification> {
        let guard = match self.inbox.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut items = guard.get(user_id).cloned().unwrap_or_default();
        items.reverse();
        items
    }

    pub fn total(&self) -> usize {
        let guard = match self.inbox.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationFeed {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut guard = self
            .inbox
            .write()
            .map_err(|_| NotifyError::Delivery("notification inbox lock poisoned".to_string()))?;
        tracing::debug!(
            recipient = %notification.recipient_id,
            kind = notification.kind.as_str(),
            "notification stored"
        );
        guard
            .entry(notification.recipient_id.clone())
            .or_default()
            .push(notification);
        Ok(())
    }
}
