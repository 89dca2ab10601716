//! Per-frame fiducial marker pose pipeline.
//!
//! Each incoming frame is decoded, searched for markers of a fixed
//! dictionary, every accepted marker gets a pose for a fixed camera model and
//! marker size, axes are drawn on a copy of the frame, and the poses and the
//! annotated frame are published.
//!
//! ## Quickstart
//!
//! ```no_run
//! use marker_pose::{build_pipeline, spin, DictionarySpec, ImageDirSource, Outputs};
//! use marker_pose::{ImageMessage, PipelineConfig, PoseMessage, RecordingPublisher};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig {
//!     dictionary: DictionarySpec::Predefined("DEMO_4X4_9".into()),
//!     ..PipelineConfig::default()
//! };
//! let rvec = RecordingPublisher::<PoseMessage>::new(&config.topics.rvec);
//! let mut outputs = Outputs {
//!     rvec: Box::new(rvec.clone()),
//!     tvec: Box::new(RecordingPublisher::<PoseMessage>::new(&config.topics.tvec)),
//!     image: Box::new(RecordingPublisher::<ImageMessage>::new(&config.topics.output_image)),
//! };
//! let source = ImageDirSource::open("frames", "camera", 30.0)?;
//! let mut pipeline = build_pipeline(config)?;
//! let stats = spin(source, &mut pipeline, &mut outputs);
//! println!("{} frames, {} rotation messages", stats.frames, rvec.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_pose::core`: images, camera model, marker/pose records, capability traits.
//! - `marker_pose::aruco`: native square marker detector and dictionaries.
//! - `marker_pose::estimate`: native square marker pose solver.
//! - [`FramePipeline`]: the orchestrator; [`spin`] drives it from a frame source.
//! - [`Publisher`] sinks and [`ImageDirSource`] for offline runs.
//! - `opencv_backend` (feature `opencv`): the same collaborators on top of OpenCV.

pub use marker_pose_aruco as aruco;
pub use marker_pose_core as core;
pub use marker_pose_estimate as estimate;

mod annotate;
mod backend;
mod bridge;
mod config;
mod pipeline;
mod publish;
mod source;
mod transport;

#[cfg(feature = "opencv")]
pub mod opencv_backend;

pub use annotate::{draw_line, NativeAxisRenderer};
pub use backend::{
    build_pipeline, collaborators, load_native_dictionary, native_collaborators, BackendError,
    Collaborators,
};
pub use bridge::{from_bgr8, from_rgb_image, to_bgr8, to_rgb_image, DecodeError, ImageEncoding};
pub use config::{Backend, ConfigError, DictionarySpec, PipelineConfig, Topics};
pub use pipeline::{spin, FrameError, FramePipeline, FrameReport, Outputs, SpinStats};
pub use publish::{
    ImageFilePublisher, JsonLinesPublisher, PublishError, Publisher, RecordingPublisher,
};
pub use source::{ImageDirSource, SourceError};
pub use transport::{Header, ImageMessage, PoseMessage, Timestamp, Vector3Message};

pub use marker_pose_core::{
    BgrImage, CameraModel, DetectedMarker, MarkerDetectionResult, MarkerPose,
};
