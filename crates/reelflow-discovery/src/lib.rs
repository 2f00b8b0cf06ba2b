//! Clip discovery scoring.
//!
//! Scores candidate time windows of a source asset by fusing four signals
//! (motion, audio energy, keyword density, duration fit) into a single
//! confidence in `[0, 1]`, then selects non-overlapping windows:
//!
//! 1. Normalize each signal against the run (motion) or the asset (audio)
//! 2. Weighted-average the components, add the bias, clamp
//! 3. Drop candidates under the confidence threshold
//! 4. Clamp each window to the duration bounds and the asset
//! 5. Greedy non-maximum suppression: a window is rejected when its start is
//!    within half the minimum duration of a selected start, or when it shares
//!    more than that with a selected window
//!
//! Everything here is pure: the same inputs always produce the same output.

pub mod candidate;
pub mod config;
pub mod error;
pub mod scorer;

pub use candidate::{AssetSignals, CandidateWindow, ClipCandidate, ComponentScores};
pub use config::{DiscoveryConfig, ScoreWeights};
pub use error::{DiscoveryError, DiscoveryResult};
pub use scorer::{discover_clips, score_window, ScoringContext};
