//! Webhook endpoint management.

use std::collections::BTreeSet;

use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use reelflow_models::{EndpointId, WebhookEndpoint, WebhookEventType};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::guard::{guarded, Operation};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterWebhookRequest {
    #[validate(url(message = "url must be an absolute URL"))]
    pub url: String,

    #[validate(length(min = 1, message = "at least one event type is required"))]
    pub events: Vec<WebhookEventType>,

    /// Generated when omitted and returned once in the response.
    #[validate(length(min = 16, max = 256, message = "secret must be 16-256 characters"))]
    pub secret: Option<String>,
}

/// Endpoint as shown to its tenant. The secret is only present right after
/// registration.
#[derive(Debug, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: EndpointId,
    pub url: String,
    pub events: BTreeSet<WebhookEventType>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            events: endpoint.events,
            active: endpoint.active,
            created_at: endpoint.created_at,
            secret: None,
        }
    }
}

pub async fn register_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(request): Json<RegisterWebhookRequest>,
) -> ApiResult<Response> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let operation = Operation {
        policy: &state.config.guards.webhooks_manage,
        method: &method,
        path: uri.path(),
        success: StatusCode::CREATED,
    };

    let webhooks = state.webhooks.clone();
    let tenant_id = user.tenant_id.clone();
    let secret = request
        .secret
        .unwrap_or_else(|| format!("whsec_{}", Uuid::new_v4().simple()));
    let events: BTreeSet<_> = request.events.into_iter().collect();
    let url = request.url;

    guarded(&state, &user, &headers, operation, move || async move {
        let endpoint = webhooks
            .register(&tenant_id, &url, &secret, events)
            .await
            .map_err(ApiError::from)?;
        Ok::<_, ApiError>(WebhookEndpointResponse {
            secret: Some(endpoint.secret.clone()),
            ..WebhookEndpointResponse::from(endpoint)
        })
    })
    .await
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<WebhookEndpointResponse>>> {
    let endpoints = state.webhooks.list(&user.tenant_id).await?;
    Ok(Json(endpoints.into_iter().map(Into::into).collect()))
}

/// Deactivate an endpoint. Existing deliveries are kept.
pub async fn delete_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Path(endpoint_id): Path<String>,
) -> ApiResult<Response> {
    let operation = Operation {
        policy: &state.config.guards.webhooks_manage,
        method: &method,
        path: uri.path(),
        success: StatusCode::OK,
    };

    let webhooks = state.webhooks.clone();
    let tenant_id = user.tenant_id.clone();
    let id = EndpointId::from(endpoint_id);

    guarded(&state, &user, &headers, operation, move || async move {
        let endpoint = webhooks
            .deactivate(&tenant_id, &id)
            .await
            .map_err(ApiError::from)?;
        Ok::<_, ApiError>(WebhookEndpointResponse::from(endpoint))
    })
    .await
}
