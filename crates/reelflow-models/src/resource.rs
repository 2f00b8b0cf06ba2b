//! Derived resource statuses.
//!
//! Resource statuses are denormalized from job transitions and are written
//! only by the side-effect propagator.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TenantId;

/// Kind of resource a job can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Clip,
    Transcript,
    Project,
    Retell,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Clip => "clip",
            ResourceKind::Transcript => "transcript",
            ResourceKind::Project => "project",
            ResourceKind::Retell => "retell",
        }
    }

    /// Parse from a path segment (`videos` and `video` both accepted).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_end_matches('s') {
            "video" => Some(ResourceKind::Video),
            "clip" => Some(ResourceKind::Clip),
            "transcript" => Some(ResourceKind::Transcript),
            "project" => Some(ResourceKind::Project),
            "retell" => Some(ResourceKind::Retell),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pointer to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Video pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    Ingesting,
    ReadyForTranscode,
    IngestFailed,
    Transcoding,
    ReadyForTranscription,
    TranscodeFailed,
    Transcribing,
    ReadyForAlignment,
    TranscribeFailed,
    Aligning,
    ReadyForClipDiscovery,
    AlignFailed,
    DiscoveringClips,
    ReadyForClipReview,
    ClipDiscoveryFailed,
}

/// Clip style (subtitle render) sub-status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClipStyleStatus {
    Styling,
    Styled,
    StyleFailed,
}

/// Clip voice (text-to-speech render) sub-status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClipVoiceStatus {
    Synthesizing,
    Synthesized,
    VoiceFailed,
}

/// Project export status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Exporting,
    Exported,
    ExportFailed,
}

/// Movie retell status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetellStatus {
    Retelling,
    Ready,
    Failed,
}

/// A status value for one of the status fields of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ResourceStatus {
    Video(VideoStatus),
    ClipStyle(ClipStyleStatus),
    ClipVoice(ClipVoiceStatus),
    ProjectExport(ExportStatus),
    Retell(RetellStatus),
}

/// Update derived from a job transition, applied atomically with the job write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceEffect {
    pub target: ResourceRef,
    pub status: ResourceStatus,
    /// Error to attach; `None` clears any previous error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stamp the sub-status "last updated" timestamp.
    #[serde(default)]
    pub stamp: bool,
}

/// Denormalized status row for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceState {
    pub tenant_id: TenantId,
    pub resource: ResourceRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_status: Option<VideoStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_status: Option<ClipStyleStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styled_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_status: Option<ClipVoiceStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voiced_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_status: Option<ExportStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retell_status: Option<RetellStatus>,

    /// Last failure of the subtitle track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_error: Option<String>,

    /// Last failure of the voice track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_error: Option<String>,

    /// Last failure of the video, export or retell status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    /// Empty state for a resource that has never been touched.
    pub fn new(tenant_id: TenantId, resource: ResourceRef, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            resource,
            video_status: None,
            style_status: None,
            styled_at: None,
            voice_status: None,
            voiced_at: None,
            export_status: None,
            retell_status: None,
            style_error: None,
            voice_error: None,
            error: None,
            updated_at: now,
        }
    }

    /// Apply a derived effect.
    ///
    /// A clip's style and voice tracks keep separate errors, so a transition
    /// on one track never clears the other's failure.
    pub fn apply(&mut self, effect: &ResourceEffect, now: DateTime<Utc>) {
        let error = effect.error.clone();
        match effect.status {
            ResourceStatus::Video(status) => {
                self.video_status = Some(status);
                self.error = error;
            }
            ResourceStatus::ClipStyle(status) => {
                self.style_status = Some(status);
                self.style_error = error;
                if effect.stamp {
                    self.styled_at = Some(now);
                }
            }
            ResourceStatus::ClipVoice(status) => {
                self.voice_status = Some(status);
                self.voice_error = error;
                if effect.stamp {
                    self.voiced_at = Some(now);
                }
            }
            ResourceStatus::ProjectExport(status) => {
                self.export_status = Some(status);
                self.error = error;
            }
            ResourceStatus::Retell(status) => {
                self.retell_status = Some(status);
                self.error = error;
            }
        }
        self.updated_at = now;
    }
}
