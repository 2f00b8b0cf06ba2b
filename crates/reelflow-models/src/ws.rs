//! Live job status messages sent over the WebSocket transport.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Job;

/// Message envelope for live status subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Current job state, sent once on connect
    Snapshot { job: Job },

    /// Job changed
    Update { job: Job },

    /// The subscriber fell behind and older snapshots were skipped
    Lagged { skipped: u64 },

    /// Error message
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl LiveMessage {
    pub fn snapshot(job: Job) -> Self {
        Self::Snapshot { job }
    }

    pub fn update(job: Job) -> Self {
        Self::Update { job }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Message type name, used for metrics labels.
    pub fn type_name(&self) -> &'static str {
        match self {
            LiveMessage::Snapshot { .. } => "snapshot",
            LiveMessage::Update { .. } => "update",
            LiveMessage::Lagged { .. } => "lagged",
            LiveMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_tagged() {
        let json = serde_json::to_value(LiveMessage::Lagged { skipped: 3 }).unwrap();
        assert_eq!(json["type"], "lagged");
        assert_eq!(json["skipped"], 3);
    }

    #[test]
    fn test_error_message() {
        let msg = LiveMessage::error("boom");
        assert_eq!(msg.type_name(), "error");
    }
}
