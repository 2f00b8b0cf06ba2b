//! Strongly typed identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a pipeline job.
    JobId
);
string_id!(
    /// Tenant that owns every record.
    TenantId
);
string_id!(
    /// Project that owns a job.
    ProjectId
);
string_id!(
    /// Source video.
    VideoId
);
string_id!(
    /// Clip cut from a video.
    ClipId
);
string_id!(
    /// Transcript of a video.
    TranscriptId
);
string_id!(
    /// Movie retell.
    RetellId
);
string_id!(
    /// Registered webhook endpoint.
    EndpointId
);
string_id!(
    /// Single webhook delivery record.
    DeliveryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = TenantId::from("tenant-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"tenant-1\"");
        assert_eq!(id.to_string(), "tenant-1");
    }
}
