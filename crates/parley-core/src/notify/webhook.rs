//! Webhook delivery with retry
//!
//! POSTs the notification as JSON to `{webhookURI}/{conversation_id}` with
//! the shared secret in a header. Transport errors, timeouts and 5xx
//! responses are retried with exponential backoff; a 400 or any other
//! status is final.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use super::{Notification, NotificationSink};
use crate::config::WebhookSinkConfig;
use crate::error::{ParleyError, ParleyResult};

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "SYMBL-WEBHOOK-PLUGIN-SECRET";
/// Header carrying a unique id per delivery attempt.
pub const DELIVERY_HEADER: &str = "X-Parley-Delivery";

/// Webhook notification sink
pub struct WebhookSink {
    client: Client,
    config: WebhookSinkConfig,
    secret: SecretString,
}

impl WebhookSink {
    /// Create a webhook sink. `skipServerAuth` disables certificate
    /// verification.
    pub fn new(config: WebhookSinkConfig, secret: SecretString) -> ParleyResult<Self> {
        if config.skip_server_auth {
            tracing::warn!(uri = %config.webhook_uri, "Webhook server certificate verification disabled");
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.skip_server_auth)
            .build()
            .map_err(|e| ParleyError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            secret,
        })
    }

    pub fn config(&self) -> &WebhookSinkConfig {
        &self.config
    }

    /// Endpoint for one conversation.
    pub fn endpoint(&self, conversation_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.webhook_uri.trim_end_matches('/'),
            conversation_id
        )
    }

    async fn post_once(&self, uri: &str, body: &str) -> ParleyResult<()> {
        let response = self
            .client
            .post(uri)
            .header(SECRET_HEADER, self.secret.expose_secret())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header(DELIVERY_HEADER, uuid::Uuid::new_v4().to_string())
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ParleyError::delivery_timeout(self.config.timeout())
                } else {
                    ParleyError::delivery_transport(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::delivery_rejected(status.as_u16(), body));
        }
        Err(ParleyError::delivery_status(status.as_u16()))
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, conversation_id: &str, notification: &Notification) -> ParleyResult<()> {
        let uri = self.endpoint(conversation_id);
        let body = serde_json::to_string(notification)?;
        tracing::debug!(conversation_id = %conversation_id, uri = %uri, "Posting notification");

        let post = || async { self.post_once(&uri, &body).await };

        let policy = &self.config.retry;
        post.retry(
            ExponentialBuilder::default()
                .with_max_times(policy.max_retries as usize)
                .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
                .with_max_delay(Duration::from_millis(policy.max_delay_ms))
                .with_factor(policy.multiplier),
        )
        .when(ParleyError::is_retryable)
        .notify(|err, dur| {
            tracing::warn!(
                "Webhook delivery to {} failed, retrying in {:?}: {}",
                uri,
                dur,
                err
            );
        })
        .await
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::ErrorCode;
    use crate::lifecycle::AggregatedResult;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(server: &MockServer, retry: RetryPolicy) -> WebhookSink {
        let mut config = WebhookSinkConfig::new(format!("{}/v1/webhook", server.uri()));
        config.retry = RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            ..retry
        };
        WebhookSink::new(config, SecretString::from("s3cret".to_string())).unwrap()
    }

    fn notification() -> Notification {
        Notification {
            result: AggregatedResult::new("conv-1"),
            triggers: vec!["Question - I need a refund".to_string()],
        }
    }

    #[tokio::test]
    async fn test_delivery_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/webhook/conv-1"))
            .and(header(SECRET_HEADER, "s3cret"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "conversationId": "conv-1",
                "triggers": ["Question - I need a refund"]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server, RetryPolicy::default())
            .deliver("conv-1", &notification())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bad_request_surfaces_body_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("secret mismatch"))
            .expect(1)
            .mount(&server)
            .await;

        let err = sink(&server, RetryPolicy::default())
            .deliver("conv-1", &notification())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DlvRejected);
        assert_eq!(err.to_string(), "Delivery error: 400: secret mismatch");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = sink(&server, RetryPolicy::default())
            .deliver("conv-1", &notification())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Delivery { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_other_status_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = sink(&server, RetryPolicy::default())
            .deliver("conv-1", &notification())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown/Fatal Error"));
    }

    #[tokio::test]
    async fn test_timeout_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut config = WebhookSinkConfig::new(server.uri());
        config.timeout_secs = 1;
        config.retry = RetryPolicy::none();
        let sink = WebhookSink::new(config, SecretString::from("s3cret".to_string())).unwrap();

        let err = sink.deliver("conv-1", &notification()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetTimeout);
    }

    #[test]
    fn test_endpoint_joins_conversation_id() {
        let config = WebhookSinkConfig::new("https://hooks.example.com/v1/webhook/");
        let sink = WebhookSink::new(config, SecretString::from("x".to_string())).unwrap();
        assert_eq!(
            sink.endpoint("abc"),
            "https://hooks.example.com/v1/webhook/abc"
        );
    }
}
