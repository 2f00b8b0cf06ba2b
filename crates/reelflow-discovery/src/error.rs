//! Discovery error types.

use thiserror::Error;

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscoveryError {
    #[error("Invalid weight for {signal}: {value} (must be finite and non-negative)")]
    InvalidWeight { signal: &'static str, value: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid candidate window at index {index}: {reason}")]
    InvalidWindow { index: usize, reason: String },
}

impl DiscoveryError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
