//! Derives resource statuses and outbound events from job transitions.

use reelflow_models::{
    ClipStyleStatus, ClipVoiceStatus, ExportStatus, Job, JobStatus, JobType, ResourceEffect,
    ResourceKind, ResourceRef, ResourceStatus, RetellStatus, VideoStatus, WebhookEventType,
};

/// Which phase of a job the status represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Succeeded,
    Failed,
}

fn phase(status: JobStatus) -> Option<Phase> {
    match status {
        JobStatus::Running => Some(Phase::Running),
        JobStatus::Succeeded => Some(Phase::Succeeded),
        JobStatus::Failed | JobStatus::Cancelled => Some(Phase::Failed),
        JobStatus::Queued | JobStatus::Paused => None,
    }
}

fn video_status(job_type: VideoStage, phase: Phase) -> VideoStatus {
    use VideoStatus::*;

    match (job_type, phase) {
        (VideoStage::Ingest, Phase::Running) => Ingesting,
        (VideoStage::Ingest, Phase::Succeeded) => ReadyForTranscode,
        (VideoStage::Ingest, Phase::Failed) => IngestFailed,
        (VideoStage::Transcode, Phase::Running) => Transcoding,
        (VideoStage::Transcode, Phase::Succeeded) => ReadyForTranscription,
        (VideoStage::Transcode, Phase::Failed) => TranscodeFailed,
        (VideoStage::Transcribe, Phase::Running) => Transcribing,
        (VideoStage::Transcribe, Phase::Succeeded) => ReadyForAlignment,
        (VideoStage::Transcribe, Phase::Failed) => TranscribeFailed,
        (VideoStage::Align, Phase::Running) => Aligning,
        (VideoStage::Align, Phase::Succeeded) => ReadyForClipDiscovery,
        (VideoStage::Align, Phase::Failed) => AlignFailed,
        (VideoStage::ClipDiscovery, Phase::Running) => DiscoveringClips,
        (VideoStage::ClipDiscovery, Phase::Succeeded) => ReadyForClipReview,
        (VideoStage::ClipDiscovery, Phase::Failed) => ClipDiscoveryFailed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoStage {
    Ingest,
    Transcode,
    Transcribe,
    Align,
    ClipDiscovery,
}

/// Status update the job's owning resource receives for its current status.
///
/// `None` for QUEUED and PAUSED, and when the job lacks the reference its
/// type works on.
pub fn derive_effect(job: &Job) -> Option<ResourceEffect> {
    let phase = phase(job.status)?;

    let (kind, id, status) = match job.job_type {
        JobType::Ingest => video_effect(job, VideoStage::Ingest, phase)?,
        JobType::Transcode => video_effect(job, VideoStage::Transcode, phase)?,
        JobType::Transcribe => video_effect(job, VideoStage::Transcribe, phase)?,
        JobType::Align => video_effect(job, VideoStage::Align, phase)?,
        JobType::ClipDiscovery => video_effect(job, VideoStage::ClipDiscovery, phase)?,
        JobType::SubtitleRender => (
            ResourceKind::Clip,
            job.refs.clip_id.as_ref()?.to_string(),
            ResourceStatus::ClipStyle(match phase {
                Phase::Running => ClipStyleStatus::Styling,
                Phase::Succeeded => ClipStyleStatus::Styled,
                Phase::Failed => ClipStyleStatus::StyleFailed,
            }),
        ),
        JobType::VoiceRender => (
            ResourceKind::Clip,
            job.refs.clip_id.as_ref()?.to_string(),
            ResourceStatus::ClipVoice(match phase {
                Phase::Running => ClipVoiceStatus::Synthesizing,
                Phase::Succeeded => ClipVoiceStatus::Synthesized,
                Phase::Failed => ClipVoiceStatus::VoiceFailed,
            }),
        ),
        JobType::ProjectExport => (
            ResourceKind::Project,
            job.refs.project_id.to_string(),
            ResourceStatus::ProjectExport(match phase {
                Phase::Running => ExportStatus::Exporting,
                Phase::Succeeded => ExportStatus::Exported,
                Phase::Failed => ExportStatus::ExportFailed,
            }),
        ),
        JobType::MovieRetell => (
            ResourceKind::Retell,
            job.refs.retell_id.as_ref()?.to_string(),
            ResourceStatus::Retell(match phase {
                Phase::Running => RetellStatus::Retelling,
                Phase::Succeeded => RetellStatus::Ready,
                Phase::Failed => RetellStatus::Failed,
            }),
        ),
    };

    let error = match phase {
        Phase::Failed => job.message.clone(),
        Phase::Running | Phase::Succeeded => None,
    };

    let stamp = phase == Phase::Succeeded
        && matches!(job.job_type, JobType::SubtitleRender | JobType::VoiceRender);

    Some(ResourceEffect {
        target: ResourceRef::new(kind, id),
        status,
        error,
        stamp,
    })
}

fn video_effect(
    job: &Job,
    stage: VideoStage,
    phase: Phase,
) -> Option<(ResourceKind, String, ResourceStatus)> {
    let video_id = job.refs.video_id.as_ref()?;
    Some((
        ResourceKind::Video,
        video_id.to_string(),
        ResourceStatus::Video(video_status(stage, phase)),
    ))
}

/// Resource-specific event emitted when a job of this type succeeds.
pub fn success_event(job_type: JobType) -> WebhookEventType {
    match job_type {
        JobType::Ingest => WebhookEventType::VideoIngested,
        JobType::Transcode => WebhookEventType::VideoTranscoded,
        JobType::Transcribe => WebhookEventType::TranscriptReady,
        JobType::Align => WebhookEventType::TranscriptAligned,
        JobType::ClipDiscovery => WebhookEventType::ClipsDiscovered,
        JobType::SubtitleRender => WebhookEventType::ClipStyled,
        JobType::VoiceRender => WebhookEventType::ClipVoiced,
        JobType::ProjectExport => WebhookEventType::ProjectExported,
        JobType::MovieRetell => WebhookEventType::RetellCompleted,
    }
}

/// Webhook events for a job that was just written.
///
/// Every applied transition emits `job.updated`; reaching SUCCEEDED also
/// emits the resource event.
pub fn events_for(job: &Job) -> Vec<WebhookEventType> {
    let mut events = vec![WebhookEventType::JobUpdated];
    if job.status == JobStatus::Succeeded {
        events.push(success_event(job.job_type));
    }
    events
}
