//! HTTP-level tests for the Slack and webhook notifiers, driven against
//! a local mock server.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cascade::broker::{Notifier, RetryPolicy, SlackNotifier, WebhookNotifier};
use cascade::core::types::{Outcome, RepoSlug, Status, Target, WorkItem};

fn target() -> Target {
    Target::new("github.com/acme/lib", "v2.0.0").unwrap()
}

fn item() -> WorkItem {
    let mut item = WorkItem::new(
        RepoSlug::parse("acme/svc").unwrap(),
        "github.com/acme/svc",
        "cascade-update-lib-v2-0-0",
    );
    item.commit_message = "chore: bump lib".to_string();
    item
}

fn completed() -> Outcome {
    Outcome {
        status: Some(Status::Completed),
        commit_hash: "deadbeefcafe".to_string(),
        ..Default::default()
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn slack_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new("xoxb-test", Some("#deps".to_string()), target())
        .with_retry(fast_retry(2))
        .with_api_url(format!("{}/api/chat.postMessage", server.uri()));

    let result = notifier
        .send(&CancellationToken::new(), &item(), &completed())
        .await
        .unwrap();

    assert_eq!(result.channel, "#deps");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn slack_sends_bearer_auth_and_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(body_partial_json(serde_json::json!({
            "channel": "#deps",
            "as_user": true,
            "mrkdwn": true,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new("xoxb-test", Some("#deps".to_string()), target())
        .with_api_url(format!("{}/api/chat.postMessage", server.uri()));

    notifier
        .send(&CancellationToken::new(), &item(), &completed())
        .await
        .unwrap();
}

#[tokio::test]
async fn slack_item_channel_override_wins() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"channel": "#svc-alerts"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new("xoxb-test", Some("#deps".to_string()), target())
        .with_api_url(server.uri());
    let mut item = item();
    item.notifications.slack_channel = Some("#svc-alerts".to_string());

    let result = notifier
        .send(&CancellationToken::new(), &item, &completed())
        .await
        .unwrap();
    assert_eq!(result.channel, "#svc-alerts");
}

#[tokio::test]
async fn slack_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new("xoxb-bad", Some("#deps".to_string()), target())
        .with_retry(fast_retry(3))
        .with_api_url(server.uri());

    let err = notifier
        .send(&CancellationToken::new(), &item(), &completed())
        .await
        .unwrap_err();

    // One call only, and the attempt count in the message matches it.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(err.to_string().contains("after 1 attempt"));
}

#[tokio::test]
async fn slack_exhausts_retry_budget_on_persistent_5xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new("xoxb-test", Some("#deps".to_string()), target())
        .with_retry(fast_retry(2))
        .with_api_url(server.uri());

    let err = notifier
        .send(&CancellationToken::new(), &item(), &completed())
        .await
        .unwrap_err();

    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(err.to_string().contains("after 3 attempt"));
    assert!(err.to_string().contains("status 503"));
}

#[tokio::test]
async fn webhook_posts_summary_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/deps"))
        .and(body_partial_json(serde_json::json!({
            "module": "github.com/acme/lib",
            "repo": "acme/svc",
            "status": "completed",
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(Some(format!("{}/hooks/deps", server.uri())), target());
    let result = notifier
        .send(&CancellationToken::new(), &item(), &completed())
        .await
        .unwrap();
    assert_eq!(result.channel, "webhook");
}

#[tokio::test]
async fn webhook_404_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(Some(server.uri()), target()).with_retry(fast_retry(3));

    let err = notifier
        .send(&CancellationToken::new(), &item(), &completed())
        .await
        .unwrap_err();

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(err.to_string().contains("status 404"));
}

#[tokio::test]
async fn webhook_item_url_override_wins() {
    let default_server = MockServer::start().await;
    let override_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&override_server)
        .await;

    let notifier = WebhookNotifier::new(Some(default_server.uri()), target());
    let mut item = item();
    item.notifications.webhook_url = Some(override_server.uri());

    notifier
        .send(&CancellationToken::new(), &item, &completed())
        .await
        .unwrap();

    assert!(default_server.received_requests().await.unwrap().is_empty());
}
