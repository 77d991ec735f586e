use thiserror::Error;

use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::shared::frame::Frame;
use crate::shared::mask::ForegroundMask;

#[derive(Error, Debug)]
pub enum DetectionError {
    /// Frame shape disagrees with the shape the model adapted to.
    /// Programmer error, fail fast — frames are never silently reshaped.
    #[error("frame is {got_width}x{got_height} but model expects {want_width}x{want_height}")]
    DimensionMismatch {
        got_width: u32,
        got_height: u32,
        want_width: u32,
        want_height: u32,
    },

    /// A parameter failed range validation in `apply_parameters`.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Result of classifying one frame.
#[derive(Debug)]
pub struct Detection {
    pub mask: ForegroundMask,
    pub moving: bool,
}

/// Maintains a running statistical model of the scene background and
/// classifies each incoming frame as containing foreground movement or not.
///
/// This is a streaming, adaptive model: every `detect` call updates it —
/// there is no evaluate-without-updating mode. Implementations are stateful,
/// hence `&mut self`, and must never be driven from two loops concurrently.
/// Any algorithm maintaining per-pixel background statistics over a bounded
/// history behind this trait is conformant.
pub trait MotionModel: Send {
    /// Classifies `frame` and updates the background statistics. The frame
    /// is reduced to single-channel intensity before modeling; the returned
    /// mask has been post-filtered with a morphological opening of the
    /// configured kernel size.
    fn detect(&mut self, frame: &Frame) -> Result<Detection, DetectionError>;

    /// Validates and adopts `params`, replacing the adaptive state entirely.
    /// This is a full reset — callers changing parameters mid-stream should
    /// expect a short re-adaptation period afterward.
    fn apply_parameters(&mut self, params: &DetectionParameters) -> Result<(), DetectionError>;

    /// Copy of the parameters currently in effect.
    fn parameters(&self) -> DetectionParameters;
}

/// The movement decision rule: strictly more foreground than the threshold
/// allows. A ratio exactly equal to the threshold is "no movement".
pub fn exceeds_threshold(foreground_ratio: f64, movement_threshold: f64) -> bool {
    foreground_ratio > movement_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_comparison_is_strict() {
        assert!(!exceeds_threshold(0.25, 0.25));
        assert!(exceeds_threshold(0.2500001, 0.25));
        assert!(!exceeds_threshold(0.2499999, 0.25));
    }

    #[test]
    fn test_zero_ratio_never_moves() {
        assert!(!exceeds_threshold(0.0, 0.001));
    }
}
