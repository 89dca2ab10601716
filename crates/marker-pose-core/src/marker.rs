use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Marker corners in image pixels: top-left, top-right, bottom-right,
/// bottom-left of the marker's own frame (clockwise on screen).
pub type MarkerCorners = [Point2<f32>; 4];

/// One accepted marker candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    pub corners: MarkerCorners,
}

/// Detection output for a single frame.
///
/// `markers` keeps detection order; ids are not deduplicated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetectionResult {
    pub markers: Vec<DetectedMarker>,
    /// Candidate quads that passed the geometric checks but did not decode.
    pub rejected: Vec<MarkerCorners>,
}

impl MarkerDetectionResult {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn corners(&self) -> Vec<MarkerCorners> {
        self.markers.iter().map(|m| m.corners).collect()
    }
}

/// Pose of a marker in the camera frame.
///
/// `rvec` is an axis-angle rotation (direction = axis, norm = angle in
/// radians); `tvec` is the marker center in the same units as the marker
/// edge length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl MarkerPose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn rotation(&self) -> nalgebra::Rotation3<f64> {
        nalgebra::Rotation3::new(self.rvec)
    }

    /// Transform a point from marker coordinates into camera coordinates.
    pub fn transform(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * p + self.tvec
    }
}
