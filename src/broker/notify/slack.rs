//! broker::notify::slack
//!
//! Slack notifier: posts the rendered message to `chat.postMessage`.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::broker::templates::{self, DEFAULT_MESSAGE};
use crate::core::types::{Outcome, Target, WorkItem};

use super::retry::{with_retry, RetryPolicy};
use super::{NotificationError, NotificationResult, Notifier};

/// Slack Web API endpoint for posting messages.
const DEFAULT_API_URL: &str = "https://slack.com/api/chat.postMessage";

/// Per-request timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Message payload for `chat.postMessage`.
#[derive(Serialize)]
struct SlackPayload<'a> {
    channel: &'a str,
    text: &'a str,
    as_user: bool,
    mrkdwn: bool,
}

/// Posts work-item outcomes to a Slack channel.
///
/// The channel comes from the work item's notification override, falling
/// back to the configured default. Delivery succeeds iff the API answers
/// HTTP 200; transient failures retry under the policy.
pub struct SlackNotifier {
    http: reqwest::Client,
    bot_token: String,
    default_channel: Option<String>,
    target: Target,
    retry: RetryPolicy,
    api_url: String,
}

impl SlackNotifier {
    /// Create a Slack notifier.
    pub fn new(bot_token: impl Into<String>, default_channel: Option<String>, target: Target) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            bot_token: bot_token.into(),
            default_channel,
            target,
            retry: RetryPolicy::default(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the API endpoint (tests, proxies).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError> {
        let channel = item
            .notifications
            .slack_channel
            .clone()
            .or_else(|| self.default_channel.clone())
            .ok_or_else(|| NotificationError::Misconfigured {
                channel: "slack".to_string(),
                reason: "no slack channel configured".to_string(),
            })?;

        let ctx = templates::context(&self.target, item, outcome);
        let text = templates::render(DEFAULT_MESSAGE, &ctx);

        with_retry(cancel, &self.retry, "slack", |_attempt| {
            let http = self.http.clone();
            let channel = channel.clone();
            let text = text.clone();
            async move {
                let payload = SlackPayload {
                    channel: &channel,
                    text: &text,
                    as_user: true,
                    mrkdwn: true,
                };
                let request = http
                    .post(&self.api_url)
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
                    .send();

                let response = tokio::select! {
                    response = request => response.map_err(|e| e.to_string())?,
                    _ = cancel.cancelled() => return Err("canceled".to_string()),
                };

                let status = response.status();
                if status.as_u16() == 200 {
                    Ok(())
                } else {
                    Err(format!("unexpected status {}", status.as_u16()))
                }
            }
        })
        .await?;

        Ok(NotificationResult {
            channel,
            message: text,
        })
    }
}
