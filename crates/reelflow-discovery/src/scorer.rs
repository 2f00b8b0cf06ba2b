//! Confidence scoring and non-overlapping selection.

use std::cmp::Ordering;

use tracing::debug;

use crate::candidate::{AssetSignals, CandidateWindow, ClipCandidate, ComponentScores};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};

/// Normalization denominators shared by all windows of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Largest motion delta across the run's windows
    pub max_motion_delta: f64,
    /// Peak audio energy of the asset
    pub peak_audio_energy: f64,
    /// Ideal clip length in seconds
    pub target_duration: f64,
}

impl ScoringContext {
    /// Build the context for a run over `windows`.
    pub fn for_run(
        asset: &AssetSignals,
        windows: &[CandidateWindow],
        config: &DiscoveryConfig,
    ) -> Self {
        let max_motion_delta = windows
            .iter()
            .map(|w| w.motion_delta)
            .fold(0.0_f64, f64::max);

        Self {
            max_motion_delta,
            peak_audio_energy: asset.peak_audio_energy,
            target_duration: config.target_duration,
        }
    }
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn duration_fit(duration: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    (1.0 - (duration - target).abs() / target).clamp(0.0, 1.0)
}

/// Score a single window.
pub fn score_window(
    window: &CandidateWindow,
    ctx: &ScoringContext,
    config: &DiscoveryConfig,
) -> ClipCandidate {
    let scores = ComponentScores {
        motion: ratio(window.motion_delta, ctx.max_motion_delta),
        audio: ratio(window.audio_energy, ctx.peak_audio_energy),
        keyword: window.keyword_density.clamp(0.0, 1.0),
        duration_fit: duration_fit(window.duration(), ctx.target_duration),
    };

    let w = &config.weights;
    let weighted = w.motion * scores.motion
        + w.audio * scores.audio
        + w.keyword * scores.keyword
        + w.duration * scores.duration_fit;
    let confidence = (weighted / w.total() + config.bias).clamp(0.0, 1.0);

    ClipCandidate {
        start: window.start,
        end: window.end,
        scores,
        confidence,
    }
}

fn validate_inputs(asset: &AssetSignals, windows: &[CandidateWindow]) -> DiscoveryResult<()> {
    if !(asset.duration.is_finite() && asset.duration > 0.0) {
        return Err(DiscoveryError::invalid_config(
            "asset duration must be positive",
        ));
    }
    if !asset.peak_audio_energy.is_finite() || asset.peak_audio_energy < 0.0 {
        return Err(DiscoveryError::invalid_config(
            "peak audio energy must be finite and non-negative",
        ));
    }

    for (index, w) in windows.iter().enumerate() {
        let invalid = |reason: &str| DiscoveryError::InvalidWindow {
            index,
            reason: reason.to_string(),
        };
        let all_finite = [w.start, w.end, w.motion_delta, w.audio_energy, w.keyword_density]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(invalid("non-finite value"));
        }
        if w.start < 0.0 || w.end <= w.start {
            return Err(invalid("window must satisfy 0 <= start < end"));
        }
        if w.start >= asset.duration {
            return Err(invalid("window starts after the end of the asset"));
        }
    }
    Ok(())
}

/// Order by confidence descending, then earlier start, then earlier end.
fn rank(a: &ClipCandidate, b: &ClipCandidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.start.total_cmp(&b.start))
        .then_with(|| a.end.total_cmp(&b.end))
}

/// Clamp a window to `[min, max]` duration, then to the asset end.
fn clamp_window(candidate: ClipCandidate, config: &DiscoveryConfig, asset_duration: f64) -> ClipCandidate {
    let duration = candidate
        .duration()
        .clamp(config.min_duration, config.max_duration);
    let end = (candidate.start + duration).min(asset_duration);

    ClipCandidate { end, ..candidate }
}

/// Seconds shared by two windows.
fn overlap(a: &ClipCandidate, b: &ClipCandidate) -> f64 {
    (a.end.min(b.end) - a.start.max(b.start)).max(0.0)
}

/// Score all windows and select up to `clip_count` non-overlapping clips.
///
/// Returned clips are in timeline order.
pub fn discover_clips(
    asset: &AssetSignals,
    windows: &[CandidateWindow],
    config: &DiscoveryConfig,
) -> DiscoveryResult<Vec<ClipCandidate>> {
    config.validate()?;
    validate_inputs(asset, windows)?;

    let ctx = ScoringContext::for_run(asset, windows, config);

    let mut survivors: Vec<ClipCandidate> = windows
        .iter()
        .map(|w| score_window(w, &ctx, config))
        .filter(|c| c.confidence >= config.threshold)
        .collect();
    survivors.sort_by(rank);

    let radius = config.suppression_radius();
    let mut selected: Vec<ClipCandidate> = Vec::with_capacity(config.clip_count.min(survivors.len()));

    for candidate in survivors {
        if selected.len() >= config.clip_count {
            break;
        }
        // Suppression compares the windows as they will be returned
        let clip = clamp_window(candidate, config, asset.duration);
        let suppressed = selected
            .iter()
            .any(|s| (s.start - clip.start).abs() < radius || overlap(s, &clip) > radius);
        if !suppressed {
            selected.push(clip);
        }
    }

    debug!(
        windows = windows.len(),
        selected = selected.len(),
        max_motion = ctx.max_motion_delta,
        "Clip discovery run complete"
    );

    let mut clips = selected;
    clips.sort_by(|a, b| a.start.total_cmp(&b.start));

    Ok(clips)
}
