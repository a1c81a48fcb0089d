use crate::notify::NotificationSink;
use devory_types::Notification;

/// Side effects collected while a decision is made and released only after
/// the decision is durable.
#[derive(Debug, Default)]
#[must_use = "effects do nothing until dispatched"]
pub(crate) struct PostCommitEffects {
    notifications: Vec<Notification>,
}

impl PostCommitEffects {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Deliver every effect. Failures are logged and swallowed.
    pub(crate) async fn dispatch(self, sink: &dyn NotificationSink) {
        for notification in self.notifications {
            let recipient = notification.recipient_id.clone();
            let kind = notification.kind;
            if let Err(err) = sink.notify(notification).await {
                tracing::warn!(
                    recipient = %recipient,
                    kind = kind.as_str(),
                    error = %err,
                    "post-commit notification failed"
                );
            }
        }
    }
}
