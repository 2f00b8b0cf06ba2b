//! Job lifecycle transitions.
//!
//! ```text
//! QUEUED ──► RUNNING ──► SUCCEEDED
//!              │  ▲  └──► FAILED ──retry──► QUEUED
//!        pause │  │ (worker)
//!              ▼  │
//!            PAUSED ──resume──► QUEUED
//!
//! any non-terminal ──cancel──► CANCELLED ──retry──► QUEUED
//! ```
//!
//! Planning is pure: it takes the current row and returns the row to write.
//! The service commits it with a version check.

use chrono::{DateTime, Utc};

use reelflow_models::{Job, JobStatus};

use crate::error::{CoreError, CoreResult};

/// Message stored on a job cancelled without an explicit reason.
pub const DEFAULT_CANCEL_MESSAGE: &str = "Cancelled by user";

/// A requested change to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Worker-reported status change.
    Advance {
        status: JobStatus,
        progress: Option<f64>,
        message: Option<String>,
    },
    Cancel {
        reason: Option<String>,
    },
    Pause,
    Resume,
    Retry,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Advance { .. } => "advance",
            Command::Cancel { .. } => "cancel",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Retry => "retry",
        }
    }

    /// Whether the resulting job must be handed back to the worker pool.
    pub fn requeues(&self) -> bool {
        matches!(self, Command::Resume | Command::Retry)
    }
}

/// Result of planning a command against the current row.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Write this row.
    Apply(Job),
    /// Nothing to write; the current row stands.
    Noop,
}

/// Plan `command` against `current`.
///
/// Control commands fail with `Conflict` when the job is not in a state that
/// allows them. Advances on a terminal job plan a no-op.
pub fn plan(current: &Job, command: &Command, now: DateTime<Utc>) -> CoreResult<Plan> {
    let mut next = current.clone();

    match command {
        Command::Advance {
            status,
            progress,
            message,
        } => {
            if current.is_terminal() {
                return Ok(Plan::Noop);
            }
            if *status == JobStatus::Queued {
                return Err(CoreError::conflict(
                    "workers cannot move a job back to QUEUED",
                ));
            }

            let progress = match progress {
                Some(p) if !p.is_finite() => {
                    return Err(CoreError::validation("progress must be a finite number"));
                }
                Some(p) => Some(p.clamp(0.0, 1.0)),
                None => None,
            };

            next.progress = match (progress, status) {
                (Some(p), _) => p,
                (None, JobStatus::Succeeded) => 1.0,
                (None, _) => current.progress,
            };

            next.message = match message {
                Some(m) => Some(m.clone()),
                None if *status == current.status => current.message.clone(),
                None => None,
            };
            next.status = *status;
        }
        Command::Cancel { reason } => {
            if matches!(current.status, JobStatus::Succeeded | JobStatus::Cancelled) {
                return Err(illegal(current, command));
            }
            next.status = JobStatus::Cancelled;
            next.message = Some(
                reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CANCEL_MESSAGE.to_string()),
            );
        }
        Command::Pause => {
            if current.status != JobStatus::Running {
                return Err(illegal(current, command));
            }
            next.status = JobStatus::Paused;
        }
        Command::Resume => {
            if current.status != JobStatus::Paused {
                return Err(illegal(current, command));
            }
            next.status = JobStatus::Queued;
        }
        Command::Retry => {
            if !current.status.is_failure() {
                return Err(illegal(current, command));
            }
            next.status = JobStatus::Queued;
            next.retry_count += 1;
            next.progress = 0.0;
            next.message = None;
        }
    }

    next.touch(now);
    Ok(Plan::Apply(next))
}

fn illegal(job: &Job, command: &Command) -> CoreError {
    CoreError::conflict(format!(
        "cannot {} job {} in status {}",
        command.name(),
        job.id,
        job.status
    ))
}
