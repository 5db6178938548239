//! Slack-compatible webhook notifier.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::job::ports::{JobNotifier, NotifyError, StatusUpdate};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts job status updates as `{"text": ...}` to an incoming webhook.
///
/// Without a URL every notification is skipped.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(url: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(NotifyError::transport)?;
        Ok(Self::with_client(client, url))
    }

    /// Creates a notifier sharing an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, url: Option<String>) -> Self {
        Self { client, url }
    }
}

/// Renders the chat message for a status update.
#[must_use]
pub fn render_message(update: &StatusUpdate) -> String {
    let metadata = update.metadata();
    let mut message = format!(
        "{} *Coda Update*\n*Task:* {}\n*Repo:* {}\n*Status:* {}",
        metadata.emoji,
        update.task.as_str(),
        update.repo.as_str(),
        metadata.label
    );
    if let Some(url) = &update.pr_url {
        message.push_str("\n*PR:* ");
        message.push_str(url);
    }
    message
}

#[async_trait]
impl JobNotifier for WebhookNotifier {
    async fn notify_status(&self, update: &StatusUpdate) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            tracing::debug!(status = %update.status, "no webhook configured, skipping notification");
            return Ok(());
        };

        let text = render_message(update);
        let response = self
            .client
            .post(url)
            .json(&WebhookMessage { text: &text })
            .send()
            .await
            .map_err(NotifyError::transport)?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
