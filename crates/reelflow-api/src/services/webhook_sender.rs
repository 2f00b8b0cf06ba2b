//! Background webhook transport.
//!
//! Polls pending deliveries, POSTs each payload signed with its endpoint's
//! secret and records the outcome: any 2xx is `succeeded`, everything else
//! (including timeouts and connection errors) is `failed`. Deliveries are
//! never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use reelflow_core::webhooks::{signature_header, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER};
use reelflow_core::{CoreError, WebhookDispatcher};
use reelflow_models::{DeliveryStatus, WebhookDelivery};

use crate::metrics;

/// Longest response body excerpt kept on a failed delivery.
const MAX_ERROR_LEN: usize = 512;

/// Webhook sender configuration.
#[derive(Debug, Clone)]
pub struct WebhookSenderConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub timeout: Duration,
    pub enabled: bool,
}

impl Default for WebhookSenderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 50,
            timeout: Duration::from_secs(10),
            enabled: true,
        }
    }
}

impl WebhookSenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: std::env::var("WEBHOOK_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size: std::env::var("WEBHOOK_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            timeout: std::env::var("WEBHOOK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            enabled: std::env::var("ENABLE_WEBHOOK_SENDER")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

/// Outcome of one POST.
#[derive(Debug, Clone, PartialEq)]
struct Outcome {
    status: DeliveryStatus,
    response_code: Option<u16>,
    error: Option<String>,
}

impl Outcome {
    fn failed(response_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            response_code,
            error: Some(error.into()),
        }
    }
}

/// Webhook sender service.
pub struct WebhookSender {
    dispatcher: Arc<WebhookDispatcher>,
    http: reqwest::Client,
    config: WebhookSenderConfig,
}

impl WebhookSender {
    pub fn new(dispatcher: Arc<WebhookDispatcher>, config: WebhookSenderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            dispatcher,
            http,
            config,
        })
    }

    /// Start the background delivery loop.
    ///
    /// Runs indefinitely; spawn it as a background task.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Webhook sender is disabled");
            return;
        }

        info!(
            "Starting webhook sender (interval: {:?}, batch: {})",
            self.config.poll_interval, self.config.batch_size
        );

        let mut ticker = interval(self.config.poll_interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.deliver_pending().await {
                error!("Webhook delivery cycle error: {}", e);
            }
        }
    }

    /// Send one batch of pending deliveries. Returns how many were attempted.
    pub async fn deliver_pending(&self) -> anyhow::Result<usize> {
        let pending = self.dispatcher.pending(self.config.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut succeeded = 0usize;
        for delivery in &pending {
            let outcome = self.deliver(delivery).await;
            if outcome.status == DeliveryStatus::Succeeded {
                succeeded += 1;
            }

            let recorded = self
                .dispatcher
                .record_delivery_result(
                    &delivery.id,
                    outcome.status,
                    outcome.response_code,
                    outcome.error,
                )
                .await;
            match recorded {
                Ok(_) => {}
                Err(CoreError::Conflict(reason)) => {
                    warn!(delivery_id = %delivery.id, "Delivery settled elsewhere: {}", reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            attempted = pending.len(),
            succeeded = succeeded,
            "Webhook delivery cycle complete"
        );
        Ok(pending.len())
    }

    async fn deliver(&self, delivery: &WebhookDelivery) -> Outcome {
        let endpoint = match self.dispatcher.endpoint(&delivery.endpoint_id).await {
            Ok(endpoint) if endpoint.active => endpoint,
            Ok(_) => return Outcome::failed(None, "endpoint deactivated"),
            Err(CoreError::NotFound(_)) => return Outcome::failed(None, "endpoint not found"),
            Err(e) => return Outcome::failed(None, format!("endpoint lookup failed: {}", e)),
        };

        let body = match serde_json::to_vec(&delivery.payload) {
            Ok(body) => body,
            Err(e) => return Outcome::failed(None, format!("payload encoding failed: {}", e)),
        };
        let signature = match signature_header(&endpoint.secret, &body) {
            Ok(signature) => signature,
            Err(e) => return Outcome::failed(None, format!("signing failed: {}", e)),
        };

        let start = Instant::now();
        let result = self
            .http
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, concat!("reelflow-webhooks/", env!("CARGO_PKG_VERSION")))
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, delivery.event_type.as_str())
            .header(DELIVERY_HEADER, delivery.id.as_str())
            .body(body)
            .send()
            .await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(response) if response.status().is_success() => {
                metrics::record_webhook_send("succeeded", elapsed);
                Outcome {
                    status: DeliveryStatus::Succeeded,
                    response_code: Some(response.status().as_u16()),
                    error: None,
                }
            }
            Ok(response) => {
                metrics::record_webhook_send("failed", elapsed);
                let code = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                warn!(
                    delivery_id = %delivery.id,
                    endpoint_id = %endpoint.id,
                    status = code,
                    "Webhook endpoint rejected delivery"
                );
                Outcome::failed(Some(code), truncate(&text, MAX_ERROR_LEN))
            }
            Err(e) => {
                metrics::record_webhook_send("error", elapsed);
                warn!(
                    delivery_id = %delivery.id,
                    endpoint_id = %endpoint.id,
                    error = %e,
                    "Webhook delivery failed"
                );
                Outcome::failed(None, e.to_string())
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use reelflow_core::{MemoryStore, WebhookStore};
    use reelflow_models::{TenantId, WebhookEventType};

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        dispatcher: Arc<WebhookDispatcher>,
        sender: WebhookSender,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(WebhookDispatcher::new(store.clone()));
        let config = WebhookSenderConfig {
            timeout: Duration::from_secs(2),
            ..WebhookSenderConfig::default()
        };
        let sender = WebhookSender::new(dispatcher.clone(), config).unwrap();
        Fixture {
            store,
            dispatcher,
            sender,
            tenant: TenantId::from("tenant-1"),
        }
    }

    fn job_updated() -> BTreeSet<WebhookEventType> {
        BTreeSet::from([WebhookEventType::JobUpdated])
    }

    #[tokio::test]
    async fn test_successful_delivery_is_signed_and_recorded() {
        let server = MockServer::start().await;
        let f = fixture();

        f.dispatcher
            .register(&f.tenant, &format!("{}/hook", server.uri()), "s3cret-signing-key", job_updated())
            .await
            .unwrap();
        let deliveries = f
            .dispatcher
            .publish(&f.tenant, WebhookEventType::JobUpdated, json!({"job": {"id": "j1"}}))
            .await
            .unwrap();
        let delivery = &deliveries[0];

        let body = serde_json::to_vec(&delivery.payload).unwrap();
        let expected = signature_header("s3cret-signing-key", &body).unwrap();

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header(SIGNATURE_HEADER, expected.as_str()))
            .and(header(EVENT_HEADER, "job.updated"))
            .and(header(DELIVERY_HEADER, delivery.id.as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(f.sender.deliver_pending().await.unwrap(), 1);

        let stored = f.store.get_delivery(&delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Succeeded);
        assert_eq!(stored.response_code, Some(204));
        assert!(f.dispatcher.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_2xx_is_failed_and_not_retried() {
        let server = MockServer::start().await;
        let f = fixture();

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        f.dispatcher
            .register(&f.tenant, &format!("{}/hook", server.uri()), "s3cret-signing-key", job_updated())
            .await
            .unwrap();
        let deliveries = f
            .dispatcher
            .publish(&f.tenant, WebhookEventType::JobUpdated, json!({}))
            .await
            .unwrap();

        assert_eq!(f.sender.deliver_pending().await.unwrap(), 1);
        assert_eq!(f.sender.deliver_pending().await.unwrap(), 0);

        let stored = f.store.get_delivery(&deliveries[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.response_code, Some(500));
        assert_eq!(stored.error.as_deref(), Some("upstream down"));
    }

    #[tokio::test]
    async fn test_deactivated_endpoint_fails_without_sending() {
        let server = MockServer::start().await;
        let f = fixture();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let endpoint = f
            .dispatcher
            .register(&f.tenant, &format!("{}/hook", server.uri()), "s3cret-signing-key", job_updated())
            .await
            .unwrap();
        let deliveries = f
            .dispatcher
            .publish(&f.tenant, WebhookEventType::JobUpdated, json!({}))
            .await
            .unwrap();
        f.dispatcher.deactivate(&f.tenant, &endpoint.id).await.unwrap();

        f.sender.deliver_pending().await.unwrap();

        let stored = f.store.get_delivery(&deliveries[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("endpoint deactivated"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo", 2), "h");
    }
}
