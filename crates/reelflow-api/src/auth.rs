//! Caller and worker authentication.
//!
//! Callers present an HS256 bearer JWT whose claims carry `sub` and
//! `tenant_id`. Workers present the shared secret in `X-Worker-Secret`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use reelflow_models::TenantId;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the worker shared secret.
pub const WORKER_SECRET_HEADER: &str = "X-Worker-Secret";

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller id
    pub sub: String,
    pub tenant_id: String,
    /// Expiry (seconds since epoch)
    pub exp: usize,
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub tenant_id: TenantId,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: TenantId::from(claims.tenant_id),
        }
    }
}

/// Verify an HS256 token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            debug!(error = %e, "Token verification failed");
            ApiError::unauthorized("Invalid or expired token")
        })?;

    if data.claims.tenant_id.trim().is_empty() {
        return Err(ApiError::unauthorized("Token carries no tenant"));
    }
    Ok(data.claims)
}

/// Sign a token for a caller, valid for `ttl_secs`.
pub fn issue_token(
    secret: &str,
    user_id: &str,
    tenant_id: &TenantId,
    ttl_secs: i64,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id.to_string(),
        tenant_id: tenant_id.to_string(),
        exp: (Utc::now().timestamp() + ttl_secs).max(0) as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("Missing or invalid Authorization header"))?;

        let claims = verify_token(bearer.token(), &state.config.jwt_secret)?;
        Ok(claims.into())
    }
}

/// Marker for requests carrying a valid worker secret.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAuth;

#[axum::async_trait]
impl FromRequestParts<AppState> for WorkerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(WORKER_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing worker secret"))?;

        if !constant_time_eq(
            provided.as_bytes(),
            state.config.worker_shared_secret.as_bytes(),
        ) {
            warn!(path = %parts.uri.path(), "Rejected worker callback with bad secret");
            return Err(ApiError::unauthorized("Invalid worker secret"));
        }
        Ok(WorkerAuth)
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
