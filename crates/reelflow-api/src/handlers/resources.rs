//! Derived resource status.

use axum::extract::{Path, State};
use axum::Json;

use reelflow_models::{ResourceKind, ResourceRef, ResourceState};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /api/resources/{kind}/{id}`; `kind` accepts singular or plural.
pub async fn get_resource(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<ResourceState>> {
    let kind = ResourceKind::parse(&kind)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown resource kind '{}'", kind)))?;

    let resource = state
        .jobs
        .resource(&user.tenant_id, &ResourceRef::new(kind, id))
        .await?;
    Ok(Json(resource))
}
