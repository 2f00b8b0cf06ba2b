//! Discovery configuration.

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, DiscoveryResult};

/// Weights of the four confidence components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub motion: f64,
    pub audio: f64,
    pub keyword: f64,
    pub duration: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            motion: 0.3,
            audio: 0.3,
            keyword: 0.25,
            duration: 0.15,
        }
    }
}

impl ScoreWeights {
    /// All weights zero.
    pub const ZERO: ScoreWeights = ScoreWeights {
        motion: 0.0,
        audio: 0.0,
        keyword: 0.0,
        duration: 0.0,
    };

    /// Divisor for the weighted average. Falls back to 1 when every weight
    /// is zero, so the confidence collapses to the bias.
    pub fn total(&self) -> f64 {
        let total = self.motion + self.audio + self.keyword + self.duration;
        if total > 0.0 {
            total
        } else {
            1.0
        }
    }

    pub fn validate(&self) -> DiscoveryResult<()> {
        for (signal, value) in [
            ("motion", self.motion),
            ("audio", self.audio),
            ("keyword", self.keyword),
            ("duration", self.duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DiscoveryError::InvalidWeight { signal, value });
            }
        }
        Ok(())
    }
}

/// Parameters of one discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub weights: ScoreWeights,

    /// Added to the weighted average before clamping
    #[serde(default)]
    pub bias: f64,

    /// Candidates below this confidence are discarded
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Ideal clip length in seconds
    #[serde(default = "default_target_duration")]
    pub target_duration: f64,

    /// Shortest clip allowed, in seconds
    #[serde(default = "default_min_duration")]
    pub min_duration: f64,

    /// Longest clip allowed, in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,

    /// Maximum number of clips to select
    #[serde(default = "default_clip_count")]
    pub clip_count: usize,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_target_duration() -> f64 {
    30.0
}

fn default_min_duration() -> f64 {
    15.0
}

fn default_max_duration() -> f64 {
    60.0
}

fn default_clip_count() -> usize {
    10
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            bias: 0.0,
            threshold: default_threshold(),
            target_duration: default_target_duration(),
            min_duration: default_min_duration(),
            max_duration: default_max_duration(),
            clip_count: default_clip_count(),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> DiscoveryResult<()> {
        self.weights.validate()?;

        if !self.bias.is_finite() {
            return Err(DiscoveryError::invalid_config("bias must be finite"));
        }
        if !self.threshold.is_finite() {
            return Err(DiscoveryError::invalid_config("threshold must be finite"));
        }
        if !(self.min_duration.is_finite() && self.min_duration > 0.0) {
            return Err(DiscoveryError::invalid_config(
                "min_duration must be positive",
            ));
        }
        if !self.max_duration.is_finite() || self.max_duration < self.min_duration {
            return Err(DiscoveryError::invalid_config(format!(
                "max_duration ({}) must be >= min_duration ({})",
                self.max_duration, self.min_duration
            )));
        }
        if !self.target_duration.is_finite() {
            return Err(DiscoveryError::invalid_config(
                "target_duration must be finite",
            ));
        }
        Ok(())
    }

    /// Minimum distance between two selected start offsets.
    pub fn suppression_radius(&self) -> f64 {
        self.min_duration / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DiscoveryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_weights_total_is_one() {
        assert_eq!(ScoreWeights::ZERO.total(), 1.0);
        assert!(ScoreWeights::ZERO.validate().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoreWeights {
            audio: -0.1,
            ..ScoreWeights::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(DiscoveryError::InvalidWeight { signal: "audio", .. })
        ));
    }

    #[test]
    fn test_inverted_duration_bounds_rejected() {
        let config = DiscoveryConfig {
            min_duration: 30.0,
            max_duration: 10.0,
            ..DiscoveryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DiscoveryConfig =
            serde_json::from_str(r#"{"clip_count": 3, "bias": 0.1}"#).unwrap();
        assert_eq!(config.clip_count, 3);
        assert_eq!(config.min_duration, 15.0);
        assert_eq!(config.weights, ScoreWeights::default());
    }
}
