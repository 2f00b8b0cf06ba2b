//! Shared data models for the Reelflow orchestration engine.
//!
//! This crate provides Serde-serializable types for:
//! - Pipeline jobs, job types and job statuses
//! - Derived resource statuses (video, clip, transcript, project, retell)
//! - Webhook endpoints and deliveries
//! - Idempotency records and rate limit counters
//! - Live status messages streamed to subscribers

pub mod guard;
pub mod id;
pub mod job;
pub mod resource;
pub mod webhook;
pub mod ws;

// Re-export common types
pub use guard::{IdempotencyRecord, RateLimitCounter};
pub use id::{
    ClipId, DeliveryId, EndpointId, JobId, ProjectId, RetellId, TenantId, TranscriptId, VideoId,
};
pub use job::{Job, JobRefs, JobRefsError, JobStatus, JobType, NewJob};
pub use resource::{
    ClipStyleStatus, ClipVoiceStatus, ExportStatus, ResourceEffect, ResourceKind, ResourceRef,
    ResourceState, ResourceStatus, RetellStatus, VideoStatus,
};
pub use webhook::{DeliveryStatus, WebhookDelivery, WebhookEndpoint, WebhookEventType};
pub use ws::LiveMessage;
