pub mod webhook;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::errors::Result;
use webhook::{RetryPolicy, WebhookClient, WebhookFlavor, build_payload, classify};

/// Subject prefix of the second attempt after a failed failure notification.
pub const FALLBACK_SUBJECT_PREFIX: &str = "Notification delivery failed: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    /// Short status word; its prefix selects the chat glyph.
    pub status: String,
    /// Free text detail; the generic payload's `description`.
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

pub struct WebhookNotifier {
    url: String,
    flavor: WebhookFlavor,
    client: WebhookClient,
}

impl WebhookNotifier {
    /// `None` for an empty URL.
    pub fn new(url: &str, policy: RetryPolicy) -> Result<Option<Self>> {
        let Some(flavor) = classify(url) else {
            return Ok(None);
        };
        Ok(Some(WebhookNotifier {
            url: url.trim().to_string(),
            flavor,
            client: WebhookClient::new(policy)?,
        }))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = build_payload(
            self.flavor,
            &notification.subject,
            &notification.status,
            &notification.body,
        );
        self.client.post_json(&self.url, &payload).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    /// No webhook configured.
    Skipped,
    Delivered,
    /// Primary send failed, the fallback went through.
    DeliveredFallback,
    Failed,
}

/// Sends `notification`; never fails the caller.
///
/// With `fallback` set, a failed primary send is followed by exactly one more
/// attempt whose subject says that delivery failed.
pub async fn notify(
    notifier: Option<&dyn Notifier>,
    notification: &Notification,
    fallback: bool,
) -> NotifyResult {
    let Some(notifier) = notifier else {
        info!("No webhook configured, skipping notification");
        return NotifyResult::Skipped;
    };

    info!("📣 Sending notification: {} ({})", notification.subject, notification.status);
    let err = match notifier.send(notification).await {
        Ok(()) => {
            info!("✅ Notification delivered");
            return NotifyResult::Delivered;
        }
        Err(e) => e,
    };

    if !fallback {
        warn!("Notification delivery failed: {}", err);
        return NotifyResult::Failed;
    }

    warn!("Notification delivery failed ({}), sending fallback", err);
    let retry = Notification {
        subject: format!("{}{}", FALLBACK_SUBJECT_PREFIX, notification.subject),
        ..notification.clone()
    };
    match notifier.send(&retry).await {
        Ok(()) => {
            info!("✅ Fallback notification delivered");
            NotifyResult::DeliveredFallback
        }
        Err(e) => {
            error!("❌ Fallback notification failed too, giving up: {}", e);
            NotifyResult::Failed
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::Mutex;

    /// Records every send; fails the first `failures` of them.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
        pub failures: usize,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<()> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(notification.clone());
            if sent.len() <= self.failures {
                return Err(AppError::InvalidInput("webhook down".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for std::sync::Arc<RecordingNotifier> {
        async fn send(&self, notification: &Notification) -> Result<()> {
            (**self).send(notification).await
        }
    }

    fn failure() -> Notification {
        Notification {
            subject: "Nightly: dump failed".to_string(),
            status: "Failure".to_string(),
            body: "pg_dump exited 1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_notifier_is_skipped() {
        assert_eq!(notify(None, &failure(), true).await, NotifyResult::Skipped);
    }

    #[tokio::test]
    async fn test_empty_url_builds_no_notifier() -> anyhow::Result<()> {
        assert!(WebhookNotifier::new("", RetryPolicy::default())?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_sent_once_with_prefixed_subject() {
        let notifier = RecordingNotifier {
            failures: 1,
            ..Default::default()
        };
        assert_eq!(
            notify(Some(&notifier), &failure(), true).await,
            NotifyResult::DeliveredFallback
        );
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].subject, "Notification delivery failed: Nightly: dump failed");
        assert_eq!(sent[1].status, "Failure");
    }

    #[tokio::test]
    async fn test_gives_up_after_fallback() {
        let notifier = RecordingNotifier {
            failures: 5,
            ..Default::default()
        };
        assert_eq!(notify(Some(&notifier), &failure(), true).await, NotifyResult::Failed);
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_fallback_for_regular_notifications() {
        let notifier = RecordingNotifier {
            failures: 1,
            ..Default::default()
        };
        assert_eq!(notify(Some(&notifier), &failure(), false).await, NotifyResult::Failed);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
