//! Core types shared by the marker pose crates.
//!
//! Holds the image buffers, the planar homography, the camera model, the
//! marker/pose records and the capability traits the pipeline is built
//! from. Nothing here depends on a concrete detector or vision library.

mod camera;
mod capability;
mod homography;
mod image;
mod logger;
mod marker;

pub use camera::{CameraModel, CameraModelError};
pub use capability::{AxisRenderer, DebugDisplay, MarkerDetector, PoseError, PoseEstimator};
pub use homography::{homography_from_4pt, Homography};
pub use image::{get_gray, sample_mean_3x3, BgrImage, GrayImage, GrayImageView};
pub use marker::{DetectedMarker, MarkerCorners, MarkerDetectionResult, MarkerPose};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, init_tracing_with_level};

pub use logger::init_with_level;
