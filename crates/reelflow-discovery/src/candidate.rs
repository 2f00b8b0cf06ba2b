//! Candidate windows and scored clips.

use serde::{Deserialize, Serialize};

/// Raw signals measured over one candidate time window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateWindow {
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds
    pub end: f64,
    /// Raw frame-difference motion delta over the window
    pub motion_delta: f64,
    /// Mean audio energy over the window
    pub audio_energy: f64,
    /// Fraction of transcript tokens that hit the keyword list
    pub keyword_density: f64,
}

impl CandidateWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Per-asset signals shared by every window of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetSignals {
    /// Total asset duration in seconds
    pub duration: f64,
    /// Peak audio energy of the whole asset
    pub peak_audio_energy: f64,
}

/// Normalized component scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub motion: f64,
    pub audio: f64,
    pub keyword: f64,
    pub duration_fit: f64,
}

/// A scored window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipCandidate {
    pub start: f64,
    pub end: f64,
    pub scores: ComponentScores,
    /// Aggregate viability in `[0, 1]`
    pub confidence: f64,
}

impl ClipCandidate {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
