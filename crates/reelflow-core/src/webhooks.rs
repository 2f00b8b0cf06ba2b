//! Webhook endpoint registry and delivery fan-out.
//!
//! Publishing an event creates one pending delivery per active endpoint of
//! the tenant subscribed to it. Sending is done by a separate transport that
//! reports each outcome back through `record_delivery_result`; nothing here
//! retries.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info};

use reelflow_models::{
    DeliveryId, DeliveryStatus, EndpointId, TenantId, WebhookDelivery, WebhookEndpoint,
    WebhookEventType,
};

use crate::error::{CoreError, CoreResult};
use crate::metrics;
use crate::store::WebhookStore;

/// Header carrying `sha256=<base64 signature>` of the request body.
pub const SIGNATURE_HEADER: &str = "X-Reelflow-Signature";

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Reelflow-Event";

/// Header carrying the delivery id.
pub const DELIVERY_HEADER: &str = "X-Reelflow-Delivery";

type HmacSha256 = Hmac<Sha256>;

/// Body posted to endpoints.
pub fn envelope(
    tenant_id: &TenantId,
    event_type: WebhookEventType,
    data: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "type": event_type,
        "tenant_id": tenant_id,
        "data": data,
    })
}

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> CoreResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::validation(format!("Invalid signing secret: {}", e)))?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Value of the signature header for `body`.
pub fn signature_header(secret: &str, body: &[u8]) -> CoreResult<String> {
    Ok(format!("sha256={}", sign(secret, body)?))
}

/// Check a signature header value in constant time.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(encoded) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature) = STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Register an endpoint for a tenant.
    pub async fn register(
        &self,
        tenant_id: &TenantId,
        url: &str,
        secret: &str,
        events: BTreeSet<WebhookEventType>,
    ) -> CoreResult<WebhookEndpoint> {
        let url = WebhookEndpoint::validate_url(url).map_err(CoreError::Validation)?;
        if events.is_empty() {
            return Err(CoreError::validation("At least one event type is required"));
        }
        if secret.is_empty() {
            return Err(CoreError::validation("Signing secret must not be empty"));
        }

        let endpoint = WebhookEndpoint {
            id: EndpointId::new(),
            tenant_id: tenant_id.clone(),
            url: url.to_string(),
            secret: secret.to_string(),
            events,
            active: true,
            created_at: Utc::now(),
        };
        self.store.insert_endpoint(&endpoint).await?;

        info!(
            tenant_id = %tenant_id,
            endpoint_id = %endpoint.id,
            "Registered webhook endpoint"
        );
        Ok(endpoint)
    }

    pub async fn list(&self, tenant_id: &TenantId) -> CoreResult<Vec<WebhookEndpoint>> {
        Ok(self.store.list_endpoints(tenant_id).await?)
    }

    pub async fn deactivate(
        &self,
        tenant_id: &TenantId,
        id: &EndpointId,
    ) -> CoreResult<WebhookEndpoint> {
        let endpoint = self
            .store
            .deactivate_endpoint(tenant_id, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook endpoint {}", id)))?;

        info!(tenant_id = %tenant_id, endpoint_id = %id, "Deactivated webhook endpoint");
        Ok(endpoint)
    }

    /// Fetch an endpoint by id for the delivery transport.
    pub async fn endpoint(&self, id: &EndpointId) -> CoreResult<WebhookEndpoint> {
        self.store
            .get_endpoint(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook endpoint {}", id)))
    }

    /// Fan an event out to every active endpoint of the tenant subscribed to it.
    pub async fn publish(
        &self,
        tenant_id: &TenantId,
        event_type: WebhookEventType,
        data: serde_json::Value,
    ) -> CoreResult<Vec<WebhookDelivery>> {
        let payload = envelope(tenant_id, event_type, data);
        let now = Utc::now();

        let deliveries: Vec<WebhookDelivery> = self
            .store
            .list_endpoints(tenant_id)
            .await?
            .iter()
            .filter(|endpoint| endpoint.accepts(event_type))
            .map(|endpoint| WebhookDelivery::pending(endpoint, event_type, payload.clone(), now))
            .collect();

        if deliveries.is_empty() {
            return Ok(deliveries);
        }

        self.store.insert_deliveries(&deliveries).await?;
        metrics::record_deliveries_created(event_type.as_str(), deliveries.len());
        debug!(
            tenant_id = %tenant_id,
            event_type = %event_type,
            count = deliveries.len(),
            "Created webhook deliveries"
        );

        Ok(deliveries)
    }

    /// Record the transport outcome of a delivery.
    pub async fn record_delivery_result(
        &self,
        id: &DeliveryId,
        status: DeliveryStatus,
        response_code: Option<u16>,
        error: Option<String>,
    ) -> CoreResult<WebhookDelivery> {
        if status == DeliveryStatus::Pending {
            return Err(CoreError::validation(
                "Delivery result must be succeeded or failed",
            ));
        }

        let mut delivery = self
            .store
            .get_delivery(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook delivery {}", id)))?;

        if delivery.status != DeliveryStatus::Pending {
            return Err(CoreError::conflict(format!(
                "webhook delivery {} already {}",
                id, delivery.status
            )));
        }

        delivery.status = status;
        delivery.response_code = response_code;
        delivery.error = error;
        delivery.updated_at = Utc::now();
        self.store.update_delivery(&delivery).await?;

        metrics::record_delivery_result(status.as_str());
        debug!(
            delivery_id = %id,
            status = %status,
            response_code = ?response_code,
            "Recorded webhook delivery result"
        );

        Ok(delivery)
    }

    /// Oldest pending deliveries, for the transport.
    pub async fn pending(&self, limit: usize) -> CoreResult<Vec<WebhookDelivery>> {
        Ok(self.store.pending_deliveries(limit).await?)
    }
}
