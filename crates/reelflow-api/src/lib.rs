//! Axum HTTP/WS control plane.
//!
//! This crate provides:
//! - Job control, resource status and webhook management routes
//! - HS256 bearer authentication and worker shared-secret callbacks
//! - Live job status over WebSocket
//! - Idempotency and tenant rate limit guards on side-effecting routes
//! - The background webhook sender
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{WebhookSender, WebhookSenderConfig};
pub use state::AppState;
