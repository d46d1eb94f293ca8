// backup-agent/src/notify/webhook.rs
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};

/// Label shown in the chat notification preview.
pub const CHAT_LABEL: &str = "Database backup notification";

const SUCCESS_GLYPH: &str = "✅";
const FAILURE_GLYPH: &str = "❌";
const INFO_GLYPH: &str = "ℹ️";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookFlavor {
    /// Slack incoming webhook: block-formatted message.
    Chat,
    /// Anything else: flat `{title, description, status}` object.
    Generic,
}

/// Picks the payload shape from the URL. An empty URL selects nothing.
pub fn classify(url: &str) -> Option<WebhookFlavor> {
    let url = url.trim();
    if url.is_empty() {
        None
    } else if url.contains("hooks.slack.com") || url.contains("slack.com/api/webhook") {
        Some(WebhookFlavor::Chat)
    } else {
        Some(WebhookFlavor::Generic)
    }
}

pub fn status_glyph(status: &str) -> &'static str {
    if status.starts_with("Success") {
        SUCCESS_GLYPH
    } else if status.starts_with("Failure") || status.starts_with("Failed") {
        FAILURE_GLYPH
    } else {
        INFO_GLYPH
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatText {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: ChatText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPayload {
    pub text: String,
    pub blocks: Vec<ChatBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenericPayload {
    pub title: String,
    pub description: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Chat(ChatPayload),
    Generic(GenericPayload),
}

/// Chat messages carry only the glyph and subject; `body` is used by the
/// generic flavor's description.
pub fn build_payload(flavor: WebhookFlavor, subject: &str, status: &str, body: &str) -> WebhookPayload {
    match flavor {
        WebhookFlavor::Chat => {
            let glyph = status_glyph(status);
            WebhookPayload::Chat(ChatPayload {
                text: format!("{} {}", glyph, CHAT_LABEL),
                blocks: vec![ChatBlock {
                    kind: "section",
                    text: ChatText {
                        kind: "mrkdwn",
                        text: format!("{} {}", glyph, subject),
                    },
                }],
            })
        }
        WebhookFlavor::Generic => WebhookPayload::Generic(GenericPayload {
            title: subject.to_string(),
            description: body.to_string(),
            status: status.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(30),
            retries: 2,
            delay: Duration::from_secs(5),
        }
    }
}

/// JSON POST with built-in retry on transport errors and 5xx responses.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl WebhookClient {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("backup-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(policy.timeout)
            .build()?;
        Ok(WebhookClient { client, policy })
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let mut attempt = 0;
        loop {
            let err = match self.client.post(url).json(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Webhook accepted with status {}", resp.status());
                    return Ok(());
                }
                Ok(resp) if resp.status().is_server_error() => AppError::WebhookStatus(resp.status()),
                Ok(resp) => return Err(AppError::WebhookStatus(resp.status())),
                Err(e) => AppError::Reqwest(e),
            };

            if attempt >= self.policy.retries {
                return Err(err);
            }
            attempt += 1;
            warn!(
                "Webhook delivery failed ({}), retry {}/{} in {:?}",
                err, attempt, self.policy.retries, self.policy.delay
            );
            tokio::time::sleep(self.policy.delay).await;
        }
    }
}
