//! Pinhole camera with Brown–Conrady distortion.

use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Errors produced when validating a [`CameraModel`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("focal lengths must be positive and finite (fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("camera matrix must have last row [0, 0, 1] and finite entries")]
    InvalidCameraMatrix,
    #[error("unsupported number of distortion coefficients: {0} (expected 0, 4 or 5)")]
    UnsupportedDistortion(usize),
    #[error("distortion coefficients must be finite")]
    NonFiniteDistortion,
}

/// Immutable camera intrinsics plus distortion.
///
/// `dist_coeffs` follows the usual `k1, k2, p1, p2[, k3]` ordering; an empty
/// vector means no distortion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Row-major 3×3 intrinsic matrix.
    pub camera_matrix: [[f64; 3]; 3],
    #[serde(default)]
    pub dist_coeffs: Vec<f64>,
}

impl Default for CameraModel {
    /// Simulated 640×480 USB camera with no distortion.
    fn default() -> Self {
        Self {
            camera_matrix: [
                [277.191356, 0.0, 320.5],
                [0.0, 277.191356, 240.5],
                [0.0, 0.0, 1.0],
            ],
            dist_coeffs: vec![0.0; 4],
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Distortion {
    k1: f64,
    k2: f64,
    k3: f64,
    p1: f64,
    p2: f64,
}

impl Distortion {
    fn from_coeffs(c: &[f64]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    fn radial(&self, r2: f64) -> f64 {
        1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        (
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }
}

const UNDISTORT_ITERS: usize = 10;

impl CameraModel {
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            camera_matrix: [[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]],
            dist_coeffs: Vec::new(),
        }
    }

    pub fn with_distortion(mut self, dist_coeffs: Vec<f64>) -> Self {
        self.dist_coeffs = dist_coeffs;
        self
    }

    pub fn validate(&self) -> Result<(), CameraModelError> {
        let k = &self.camera_matrix;
        if k.iter().flatten().any(|v| !v.is_finite()) || k[2] != [0.0, 0.0, 1.0] {
            return Err(CameraModelError::InvalidCameraMatrix);
        }
        let (fx, fy) = (k[0][0], k[1][1]);
        if fx <= 0.0 || fy <= 0.0 {
            return Err(CameraModelError::InvalidFocalLength { fx, fy });
        }
        if !matches!(self.dist_coeffs.len(), 0 | 4 | 5) {
            return Err(CameraModelError::UnsupportedDistortion(
                self.dist_coeffs.len(),
            ));
        }
        if self.dist_coeffs.iter().any(|v| !v.is_finite()) {
            return Err(CameraModelError::NonFiniteDistortion);
        }
        Ok(())
    }

    pub fn k_matrix(&self) -> Matrix3<f64> {
        let k = &self.camera_matrix;
        Matrix3::new(
            k[0][0], k[0][1], k[0][2], //
            k[1][0], k[1][1], k[1][2], //
            k[2][0], k[2][1], k[2][2],
        )
    }

    pub fn has_distortion(&self) -> bool {
        self.dist_coeffs.iter().any(|&c| c != 0.0)
    }

    fn distortion(&self) -> Distortion {
        Distortion::from_coeffs(&self.dist_coeffs)
    }

    /// Apply lens distortion to an ideal normalized image point.
    pub fn distort_normalized(&self, n: Vector2<f64>) -> Vector2<f64> {
        if !self.has_distortion() {
            return n;
        }
        let d = self.distortion();
        let r2 = n.norm_squared();
        let radial = d.radial(r2);
        let (dx, dy) = d.tangential(n.x, n.y, r2);
        Vector2::new(n.x * radial + dx, n.y * radial + dy)
    }

    /// Invert [`Self::distort_normalized`] by fixed-point iteration.
    pub fn undistort_normalized(&self, nd: Vector2<f64>) -> Vector2<f64> {
        if !self.has_distortion() {
            return nd;
        }
        let d = self.distortion();
        let mut x = nd.x;
        let mut y = nd.y;
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let inv_radial = 1.0 / d.radial(r2);
            let (dx, dy) = d.tangential(x, y, r2);
            x = (nd.x - dx) * inv_radial;
            y = (nd.y - dy) * inv_radial;
        }
        Vector2::new(x, y)
    }

    fn normalized_to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        let k = &self.camera_matrix;
        Point2::new(
            k[0][0] * n.x + k[0][1] * n.y + k[0][2],
            k[1][1] * n.y + k[1][2],
        )
    }

    fn pixel_to_normalized(&self, p: Point2<f64>) -> Vector2<f64> {
        let k = &self.camera_matrix;
        let y = (p.y - k[1][2]) / k[1][1];
        let x = (p.x - k[0][2] - k[0][1] * y) / k[0][0];
        Vector2::new(x, y)
    }

    /// Project a point given in camera coordinates to pixels.
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= 1e-9 {
            return None;
        }
        let n = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        Some(self.normalized_to_pixel(self.distort_normalized(n)))
    }

    /// Map a distorted pixel to ideal normalized coordinates (`z = 1` plane).
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Vector2<f64> {
        self.undistort_normalized(self.pixel_to_normalized(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_model_is_valid() {
        let cam = CameraModel::default();
        assert!(cam.validate().is_ok());
        assert!(!cam.has_distortion());
    }

    #[test]
    fn rejects_bad_distortion_length() {
        let cam = CameraModel::default().with_distortion(vec![0.1, 0.2, 0.3]);
        assert_eq!(
            cam.validate(),
            Err(CameraModelError::UnsupportedDistortion(3))
        );
    }

    #[test]
    fn rejects_non_positive_focal_length() {
        let cam = CameraModel::pinhole(0.0, 100.0, 10.0, 10.0);
        assert!(matches!(
            cam.validate(),
            Err(CameraModelError::InvalidFocalLength { .. })
        ));
    }

    #[test]
    fn project_then_undistort_recovers_ray() {
        let cam = CameraModel::pinhole(600.0, 610.0, 320.0, 240.0)
            .with_distortion(vec![-0.12, 0.03, 0.001, -0.0005, 0.0]);
        let p = Vector3::new(0.3, -0.2, 2.0);
        let px = cam.project(&p).expect("in front of camera");
        let n = cam.undistort_pixel(px);
        assert_relative_eq!(n.x, 0.15, epsilon = 1e-7);
        assert_relative_eq!(n.y, -0.1, epsilon = 1e-7);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let cam = CameraModel::default();
        assert!(cam.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn deserializes_without_distortion_field() {
        let cam: CameraModel = serde_json::from_str(
            r#"{"camera_matrix": [[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]]}"#,
        )
        .expect("parse");
        assert!(cam.dist_coeffs.is_empty());
        assert!(cam.validate().is_ok());
    }
}
