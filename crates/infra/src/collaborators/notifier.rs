use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// An outbound message, addressed at delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("recipient rejected: {0}")]
    Rejected(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivery is best effort: callers log failures and carry on.
pub trait Notifier: Send + Sync {
    fn notify(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError>;
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError> {
        (**self).notify(recipient, notification)
    }
}

/// Writes each notification to the tracing log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            to = %recipient,
            subject = %notification.subject,
            attachments = notification.attachments.len(),
            "notification"
        );
        Ok(())
    }
}

/// A notification as handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub to: String,
    pub notification: Notification,
}

#[derive(Debug, Default)]
struct Outbox {
    sent: Vec<Delivered>,
    failing: bool,
}

/// Keeps sent notifications in memory. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    inner: Mutex<Outbox>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut outbox) = self.inner.lock() {
            outbox.failing = failing;
        }
    }

    pub fn sent(&self) -> Vec<Delivered> {
        self.inner
            .lock()
            .map(|outbox| outbox.sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError> {
        let mut outbox = self
            .inner
            .lock()
            .map_err(|_| NotifyError::Delivery("outbox lock poisoned".to_string()))?;
        if outbox.failing {
            return Err(NotifyError::Delivery(format!(
                "mail relay unavailable for {recipient}"
            )));
        }
        if recipient.trim().is_empty() {
            return Err(NotifyError::Rejected("empty recipient".to_string()));
        }
        outbox.sent.push(Delivered {
            to: recipient.to_string(),
            notification: notification.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_keeps_messages_until_it_fails() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify("shop@vision.fr", &Notification::new("Order R1", "Done"))
            .unwrap();

        notifier.set_failing(true);
        let err = notifier
            .notify("shop@vision.fr", &Notification::new("Order R2", "Done"))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "shop@vision.fr");
        assert_eq!(sent[0].notification.subject, "Order R1");
    }

    #[test]
    fn empty_recipient_is_rejected() {
        let err = RecordingNotifier::new()
            .notify(" ", &Notification::new("x", "y"))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(_)));
    }
}
