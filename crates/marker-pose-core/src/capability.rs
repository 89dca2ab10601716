//! Narrow interfaces the frame pipeline talks to.
//!
//! Each backend (native or OpenCV) provides one implementation of every
//! trait; tests use deterministic stubs.

use crate::{
    BgrImage, CameraModel, CameraModelError, DetectedMarker, MarkerCorners, MarkerDetectionResult,
    MarkerPose,
};

/// Pose estimation failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("marker length must be positive and finite, got {0}")]
    InvalidMarkerLength(f64),
    #[error("marker {index}: corners contain non-finite coordinates")]
    NonFiniteCorners { index: usize },
    #[error("marker {index}: degenerate quad ({reason})")]
    DegenerateQuad { index: usize, reason: &'static str },
    #[error(transparent)]
    Camera(#[from] CameraModelError),
    #[error("pose backend failed: {0}")]
    Backend(String),
}

/// Finds markers of a fixed dictionary in a BGR frame.
pub trait MarkerDetector {
    fn detect(&self, image: &BgrImage) -> MarkerDetectionResult;
}

/// Solves one pose per corner set.
///
/// Implementations must return exactly `corners.len()` poses in input order
/// or an error.
pub trait PoseEstimator {
    fn estimate(
        &self,
        corners: &[MarkerCorners],
        marker_length: f64,
        camera: &CameraModel,
    ) -> Result<Vec<MarkerPose>, PoseError>;
}

/// Debug overlays drawn onto the outgoing frame.
pub trait AxisRenderer {
    /// Draw x (red), y (green) and z (blue) axes of `pose`.
    fn draw_axes(
        &self,
        image: &mut BgrImage,
        camera: &CameraModel,
        pose: &MarkerPose,
        length: f64,
    );

    /// Outline accepted markers and highlight their first corner.
    fn draw_markers(&self, image: &mut BgrImage, markers: &[DetectedMarker]);
}

/// Shows an annotated frame to a human.
pub trait DebugDisplay {
    fn show(&mut self, image: &BgrImage);
}
