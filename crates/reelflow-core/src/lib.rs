//! Reelflow job orchestration engine.
//!
//! This crate provides:
//! - The job lifecycle state machine and the `JobService` that commits it
//! - Propagation of job statuses into resource statuses and webhook events
//! - An in-process event broker for live job updates
//! - Webhook endpoint registry and delivery fan-out
//! - Idempotency and fixed-window rate limit guards
//! - Store traits with in-memory and Redis backends

pub mod broker;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod metrics;
pub mod propagation;
pub mod rate_limit;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod webhooks;

pub use broker::EventBroker;
pub use config::GuardConfig;
pub use error::{CoreError, CoreResult, StoreError, StoreResult};
pub use idempotency::{IdempotencyGuard, IdempotencyOutcome};
pub use rate_limit::{RateDecision, RateLimiter, RatePolicy};
pub use service::{AdvanceRequest, JobService};
pub use store::{
    IdempotencyStore, JobFilter, JobStore, MemoryStore, RateLimitStore, RedisIdempotencyStore,
    RedisRateLimitStore, WebhookStore,
};
pub use webhooks::WebhookDispatcher;
