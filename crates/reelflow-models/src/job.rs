//! Pipeline job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{ClipId, JobId, ProjectId, RetellId, TenantId, TranscriptId, VideoId};

/// Type of pipeline step a job executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Ingest,
    Transcode,
    Transcribe,
    Align,
    ClipDiscovery,
    SubtitleRender,
    VoiceRender,
    ProjectExport,
    MovieRetell,
}

impl JobType {
    /// Every job type, in pipeline order.
    pub const ALL: [JobType; 9] = [
        JobType::Ingest,
        JobType::Transcode,
        JobType::Transcribe,
        JobType::Align,
        JobType::ClipDiscovery,
        JobType::SubtitleRender,
        JobType::VoiceRender,
        JobType::ProjectExport,
        JobType::MovieRetell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ingest => "ingest",
            JobType::Transcode => "transcode",
            JobType::Transcribe => "transcribe",
            JobType::Align => "align",
            JobType::ClipDiscovery => "clip_discovery",
            JobType::SubtitleRender => "subtitle_render",
            JobType::VoiceRender => "voice_render",
            JobType::ProjectExport => "project_export",
            JobType::MovieRetell => "movie_retell",
        }
    }

    /// Queue task name handled by the worker pool for this job type.
    pub fn task_name(&self) -> String {
        format!("pipeline.{}", self.as_str())
    }

    /// Whether this job type operates on a source video stage.
    pub fn is_video_stage(&self) -> bool {
        matches!(
            self,
            JobType::Ingest
                | JobType::Transcode
                | JobType::Transcribe
                | JobType::Align
                | JobType::ClipDiscovery
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for a worker
    #[default]
    Queued,
    /// A worker is executing the step
    Running,
    /// Suspended by the user, resumable
    Paused,
    /// Finished successfully
    Succeeded,
    /// Worker reported a failure (retryable)
    Failed,
    /// Cancelled by the user (retryable)
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Paused => "PAUSED",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states accept no further worker updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Cancelled)
    }

    /// Failure-like outcomes that attach the job message to the resource.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invalid combination of references for a job type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobRefsError {
    #[error("{0} jobs require a video_id")]
    MissingVideo(JobType),

    #[error("{0} jobs require a clip_id")]
    MissingClip(JobType),

    #[error("{0} jobs require a retell_id")]
    MissingRetell(JobType),

    #[error("{job_type} jobs do not accept a {field}")]
    UnexpectedRef { job_type: JobType, field: &'static str },
}

/// References from a job to the resources it works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobRefs {
    pub project_id: ProjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<VideoId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<ClipId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<TranscriptId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retell_id: Option<RetellId>,
}

impl JobRefs {
    /// References scoped to a project only.
    pub fn project(project_id: impl Into<ProjectId>) -> Self {
        Self {
            project_id: project_id.into(),
            video_id: None,
            clip_id: None,
            transcript_id: None,
            retell_id: None,
        }
    }

    pub fn with_video(mut self, video_id: impl Into<VideoId>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_clip(mut self, clip_id: impl Into<ClipId>) -> Self {
        self.clip_id = Some(clip_id.into());
        self
    }

    pub fn with_transcript(mut self, transcript_id: impl Into<TranscriptId>) -> Self {
        self.transcript_id = Some(transcript_id.into());
        self
    }

    pub fn with_retell(mut self, retell_id: impl Into<RetellId>) -> Self {
        self.retell_id = Some(retell_id.into());
        self
    }

    /// Check that the references fit the job type.
    ///
    /// At most one of clip, transcript and retell may be set, and only the
    /// one the job type works on.
    pub fn validate_for(&self, job_type: JobType) -> Result<(), JobRefsError> {
        let unexpected = |field| Err(JobRefsError::UnexpectedRef { job_type, field });

        match job_type {
            JobType::Ingest | JobType::Transcode | JobType::ClipDiscovery => {
                if self.video_id.is_none() {
                    return Err(JobRefsError::MissingVideo(job_type));
                }
                if self.transcript_id.is_some() {
                    return unexpected("transcript_id");
                }
            }
            JobType::Transcribe | JobType::Align => {
                if self.video_id.is_none() {
                    return Err(JobRefsError::MissingVideo(job_type));
                }
            }
            JobType::SubtitleRender | JobType::VoiceRender => {
                if self.clip_id.is_none() {
                    return Err(JobRefsError::MissingClip(job_type));
                }
            }
            JobType::MovieRetell => {
                if self.retell_id.is_none() {
                    return Err(JobRefsError::MissingRetell(job_type));
                }
            }
            JobType::ProjectExport => {
                if self.transcript_id.is_some() {
                    return unexpected("transcript_id");
                }
            }
        }

        if self.clip_id.is_some()
            && !matches!(job_type, JobType::SubtitleRender | JobType::VoiceRender)
        {
            return unexpected("clip_id");
        }
        if self.retell_id.is_some() && job_type != JobType::MovieRetell {
            return unexpected("retell_id");
        }

        Ok(())
    }
}

/// Request to create a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewJob {
    pub tenant_id: TenantId,
    pub job_type: JobType,
    #[serde(flatten)]
    pub refs: JobRefs,
}

/// One pipeline step execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Pipeline step
    pub job_type: JobType,

    /// Resources this job works on
    #[serde(flatten)]
    pub refs: JobRefs,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress in [0.0, 1.0]
    #[serde(default)]
    pub progress: f64,

    /// Last message reported by the worker or the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of explicit retries
    #[serde(default)]
    pub retry_count: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Row version, bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl Job {
    /// Create a QUEUED job from a creation request.
    pub fn create(new: NewJob) -> Result<Self, JobRefsError> {
        new.refs.validate_for(new.job_type)?;
        let now = Utc::now();

        Ok(Self {
            id: JobId::new(),
            tenant_id: new.tenant_id,
            job_type: new.job_type,
            refs: new.refs,
            status: JobStatus::Queued,
            progress: 0.0,
            message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bump the version and update timestamp after a mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(job_type: JobType, refs: JobRefs) -> NewJob {
        NewJob {
            tenant_id: TenantId::from("tenant-1"),
            job_type,
            refs,
        }
    }

    #[test]
    fn test_job_creation() {
        let job = Job::create(new_job(
            JobType::Ingest,
            JobRefs::project("p1").with_video("v1"),
        ))
        .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.version, 0);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn test_refs_required_per_type() {
        assert_eq!(
            JobRefs::project("p1").validate_for(JobType::Transcode),
            Err(JobRefsError::MissingVideo(JobType::Transcode))
        );
        assert_eq!(
            JobRefs::project("p1").validate_for(JobType::VoiceRender),
            Err(JobRefsError::MissingClip(JobType::VoiceRender))
        );
        assert_eq!(
            JobRefs::project("p1").validate_for(JobType::MovieRetell),
            Err(JobRefsError::MissingRetell(JobType::MovieRetell))
        );
        assert!(JobRefs::project("p1").validate_for(JobType::ProjectExport).is_ok());
    }

    #[test]
    fn test_refs_reject_foreign_targets() {
        let refs = JobRefs::project("p1").with_video("v1").with_clip("c1");
        assert!(matches!(
            refs.validate_for(JobType::ClipDiscovery),
            Err(JobRefsError::UnexpectedRef { field: "clip_id", .. })
        ));

        let refs = JobRefs::project("p1").with_clip("c1").with_retell("r1");
        assert!(matches!(
            refs.validate_for(JobType::SubtitleRender),
            Err(JobRefsError::UnexpectedRef { field: "retell_id", .. })
        ));

        let refs = JobRefs::project("p1").with_video("v1").with_transcript("t1");
        assert!(refs.validate_for(JobType::Align).is_ok());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Succeeded).unwrap(),
            "\"SUCCEEDED\""
        );
        assert_eq!(
            serde_json::to_string(&JobType::ClipDiscovery).unwrap(),
            "\"clip_discovery\""
        );
        assert_eq!(JobType::SubtitleRender.task_name(), "pipeline.subtitle_render");
    }
}
