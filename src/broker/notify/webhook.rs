//! broker::notify::webhook
//!
//! Generic webhook notifier: posts a small JSON summary to a configured
//! URL.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::broker::templates::{self, DEFAULT_MESSAGE};
use crate::core::types::{Outcome, Target, WorkItem};

use super::retry::{with_retry, RetryPolicy};
use super::{NotificationError, NotificationResult, Notifier};

/// Per-request timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Webhook payload.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    module: &'a str,
    repo: &'a str,
    status: &'a str,
}

/// Posts work-item outcomes to an arbitrary webhook.
///
/// The URL comes from the work item's notification override, falling back
/// to the configured default. Delivery succeeds iff the response status
/// is 2xx.
pub struct WebhookNotifier {
    http: reqwest::Client,
    default_url: Option<String>,
    target: Target,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    /// Create a webhook notifier.
    pub fn new(default_url: Option<String>, target: Target) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            default_url,
            target,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError> {
        let url = item
            .notifications
            .webhook_url
            .clone()
            .or_else(|| self.default_url.clone())
            .ok_or_else(|| NotificationError::Misconfigured {
                channel: "webhook".to_string(),
                reason: "no webhook url configured".to_string(),
            })?;

        let ctx = templates::context(&self.target, item, outcome);
        let text = templates::render(DEFAULT_MESSAGE, &ctx);
        let status = outcome.status().to_string();
        let repo = item.repo.to_string();

        with_retry(cancel, &self.retry, "webhook", |_attempt| {
            let http = self.http.clone();
            let url = url.clone();
            let text = text.clone();
            let status = status.clone();
            let repo = repo.clone();
            async move {
                let payload = WebhookPayload {
                    text: &text,
                    module: &self.target.module,
                    repo: &repo,
                    status: &status,
                };
                let request = http.post(&url).json(&payload).send();

                let response = tokio::select! {
                    response = request => response.map_err(|e| e.to_string())?,
                    _ = cancel.cancelled() => return Err("canceled".to_string()),
                };

                let code = response.status();
                if code.is_success() {
                    Ok(())
                } else {
                    Err(format!("unexpected status {}", code.as_u16()))
                }
            }
        })
        .await?;

        Ok(NotificationResult {
            channel: "webhook".to_string(),
            message: text,
        })
    }
}
