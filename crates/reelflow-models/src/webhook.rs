//! Webhook endpoints and deliveries.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeliveryId, EndpointId, TenantId};

/// Event types an endpoint can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum WebhookEventType {
    #[serde(rename = "job.updated")]
    JobUpdated,
    #[serde(rename = "video.ingested")]
    VideoIngested,
    #[serde(rename = "video.transcoded")]
    VideoTranscoded,
    #[serde(rename = "transcript.ready")]
    TranscriptReady,
    #[serde(rename = "transcript.aligned")]
    TranscriptAligned,
    #[serde(rename = "clips.discovered")]
    ClipsDiscovered,
    #[serde(rename = "clip.styled")]
    ClipStyled,
    #[serde(rename = "clip.voiced")]
    ClipVoiced,
    #[serde(rename = "project.exported")]
    ProjectExported,
    #[serde(rename = "retell.completed")]
    RetellCompleted,
}

impl WebhookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::JobUpdated => "job.updated",
            WebhookEventType::VideoIngested => "video.ingested",
            WebhookEventType::VideoTranscoded => "video.transcoded",
            WebhookEventType::TranscriptReady => "transcript.ready",
            WebhookEventType::TranscriptAligned => "transcript.aligned",
            WebhookEventType::ClipsDiscovered => "clips.discovered",
            WebhookEventType::ClipStyled => "clip.styled",
            WebhookEventType::ClipVoiced => "clip.voiced",
            WebhookEventType::ProjectExported => "project.exported",
            WebhookEventType::RetellCompleted => "retell.completed",
        }
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tenant-scoped webhook registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookEndpoint {
    pub id: EndpointId,
    pub tenant_id: TenantId,
    pub url: String,
    /// HMAC signing secret
    pub secret: String,
    /// Subscribed event types (never empty)
    pub events: BTreeSet<WebhookEventType>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// Whether this endpoint should receive the given event.
    pub fn accepts(&self, event: WebhookEventType) -> bool {
        self.active && self.events.contains(&event)
    }

    /// Validate a target URL: absolute http(s) with a host.
    pub fn validate_url(raw: &str) -> Result<Url, String> {
        let url = Url::parse(raw.trim()).map_err(|e| format!("Invalid URL format: {}", e))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(format!(
                    "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                    scheme
                ))
            }
        }
        if url.host_str().is_none() {
            return Err("URL must have a valid host".to_string());
        }
        Ok(url)
    }
}

/// Delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Succeeded => "succeeded",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One (endpoint, event) delivery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub tenant_id: TenantId,
    pub endpoint_id: EndpointId,
    pub event_type: WebhookEventType,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// New pending delivery for an endpoint.
    pub fn pending(
        endpoint: &WebhookEndpoint,
        event_type: WebhookEventType,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            tenant_id: endpoint.tenant_id.clone(),
            endpoint_id: endpoint.id.clone(),
            event_type,
            payload,
            status: DeliveryStatus::Pending,
            response_code: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(active: bool) -> WebhookEndpoint {
        WebhookEndpoint {
            id: EndpointId::new(),
            tenant_id: TenantId::from("t1"),
            url: "https://hooks.example.com/reelflow".into(),
            secret: "s3cret".into(),
            events: BTreeSet::from([WebhookEventType::JobUpdated]),
            active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_accepts_requires_active_and_subscription() {
        assert!(endpoint(true).accepts(WebhookEventType::JobUpdated));
        assert!(!endpoint(true).accepts(WebhookEventType::ClipStyled));
        assert!(!endpoint(false).accepts(WebhookEventType::JobUpdated));
    }

    #[test]
    fn test_event_wire_names_match_as_str() {
        for event in [
            WebhookEventType::JobUpdated,
            WebhookEventType::ClipsDiscovered,
            WebhookEventType::RetellCompleted,
        ] {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(WebhookEndpoint::validate_url("https://example.com/hook").is_ok());
        assert!(WebhookEndpoint::validate_url("ftp://example.com/hook").is_err());
        assert!(WebhookEndpoint::validate_url("not a url").is_err());
    }
}
