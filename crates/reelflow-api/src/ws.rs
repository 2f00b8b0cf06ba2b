//! Live job status over WebSocket with backpressure support.
//!
//! `GET /ws/jobs/{id}?token=<jwt>` sends a snapshot of the job, then every
//! committed update. Callers without a valid token, or whose tenant does not
//! own the job, are closed with 1008 (policy violation).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use reelflow_core::CoreError;
use reelflow_models::{JobId, LiveMessage, TenantId};

use crate::auth::verify_token;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const ENDPOINT: &str = "jobs";

#[derive(Debug, Deserialize)]
pub struct WsJobQuery {
    pub token: Option<String>,
}

/// Send a live message, blocking only when the send buffer is full.
async fn send_ws_message(tx: &mpsc::Sender<Message>, msg: &LiveMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return false,
    };
    let sent = match tx.try_send(Message::Text(json)) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(message).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    };
    if sent {
        metrics::record_ws_message_sent(ENDPOINT, msg.type_name());
    }
    sent
}

async fn close_with_policy_violation(tx: &mpsc::Sender<Message>, reason: &'static str) {
    let _ = tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

/// Tenant of a valid token.
fn authorize(token: Option<&str>, secret: &str) -> Result<TenantId, &'static str> {
    let token = token.filter(|t| !t.is_empty()).ok_or("Missing token")?;
    verify_token(token, secret)
        .map(|claims| TenantId::from(claims.tenant_id))
        .map_err(|_| "Invalid or expired token")
}

/// Live status endpoint.
pub async fn ws_job(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<WsJobQuery>,
) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection(ENDPOINT);

    ws.on_upgrade(move |socket| async move {
        handle_job_socket(socket, state, JobId::from(job_id), query.token).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_job_socket(socket: WebSocket, state: AppState, job_id: JobId, token: Option<String>) {
    let (ws_sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let tenant_id = match authorize(token.as_deref(), &state.config.jwt_secret) {
        Ok(tenant_id) => tenant_id,
        Err(reason) => {
            debug!(job_id = %job_id, reason = reason, "Rejected live status subscriber");
            close_with_policy_violation(&tx, reason).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    // Subscribe before reading the snapshot so no commit falls in between.
    let mut updates = state.broker.subscribe(&job_id);

    let snapshot = match state.jobs.get(&tenant_id, &job_id).await {
        Ok(job) => job,
        Err(CoreError::NotFound(_)) => {
            warn!(job_id = %job_id, tenant_id = %tenant_id, "Live status requested for foreign or unknown job");
            close_with_policy_violation(&tx, "Not authorized for this job").await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Failed to load job snapshot");
            send_ws_message(&tx, &LiveMessage::error("Failed to load job")).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    info!(job_id = %job_id, tenant_id = %tenant_id, "Live status subscriber connected");
    let snapshot_version = snapshot.version;
    if !send_ws_message(&tx, &LiveMessage::snapshot(snapshot)).await {
        drop(tx);
        let _ = send_task.await;
        return;
    }

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            update = updates.next() => match update {
                // Already covered by the snapshot
                Some(LiveMessage::Update { job }) if job.version <= snapshot_version => {}
                Some(msg) => {
                    if !send_ws_message(&tx, &msg).await {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(job_id = %job_id, "Live status subscriber disconnected");
    drop(tx);
    let _ = send_task.await;
}
