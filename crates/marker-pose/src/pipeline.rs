//! Per-frame orchestration: decode, detect, estimate, annotate, publish.

use crate::bridge::{from_bgr8, to_bgr8, DecodeError};
use crate::config::{ConfigError, PipelineConfig};
use crate::publish::Publisher;
use crate::source::SourceError;
use crate::transport::{Header, ImageMessage, PoseMessage};
use log::{debug, error, info, warn};
use marker_pose_core::{
    AxisRenderer, DebugDisplay, DetectedMarker, MarkerCorners, MarkerDetector, MarkerPose,
    PoseEstimator,
};
use nalgebra::Vector3;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("dropping frame: {0}")]
    Decode(#[from] DecodeError),
}

/// The three outbound streams of the pipeline.
pub struct Outputs {
    pub rvec: Box<dyn Publisher<PoseMessage>>,
    pub tvec: Box<dyn Publisher<PoseMessage>>,
    pub image: Box<dyn Publisher<ImageMessage>>,
}

/// Outcome of one processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub seq: u64,
    pub markers: Vec<DetectedMarker>,
    pub rejected: usize,
    /// Index-aligned with `markers`, or empty when pose estimation failed.
    pub poses: Vec<MarkerPose>,
    /// Rotation plus translation messages that were published successfully.
    pub pose_messages: usize,
    pub image_published: bool,
    pub elapsed: Duration,
}

/// Counters accumulated by [`spin`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpinStats {
    pub frames: usize,
    pub dropped: usize,
    pub markers: usize,
}

pub struct FramePipeline {
    config: PipelineConfig,
    detector: Box<dyn MarkerDetector>,
    estimator: Box<dyn PoseEstimator>,
    renderer: Box<dyn AxisRenderer>,
    display: Option<Box<dyn DebugDisplay>>,
}

fn publish_or_warn<M>(publisher: &mut dyn Publisher<M>, msg: &M) -> bool {
    match publisher.publish(msg) {
        Ok(()) => true,
        Err(e) => {
            warn!("publish on {} failed: {e}", publisher.topic());
            false
        }
    }
}

fn pose_message(header: &Header, marker_id: u32, v: Vector3<f64>) -> PoseMessage {
    PoseMessage {
        header: header.clone(),
        marker_id,
        vector: v.into(),
    }
}

impl FramePipeline {
    pub fn new(
        config: PipelineConfig,
        detector: Box<dyn MarkerDetector>,
        estimator: Box<dyn PoseEstimator>,
        renderer: Box<dyn AxisRenderer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            estimator,
            renderer,
            display: None,
        })
    }

    pub fn with_display(mut self, display: Box<dyn DebugDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn estimate_poses(&self, markers: &[DetectedMarker]) -> Vec<MarkerPose> {
        if markers.is_empty() {
            return Vec::new();
        }
        let corners: Vec<MarkerCorners> = markers.iter().map(|m| m.corners).collect();
        match self
            .estimator
            .estimate(&corners, self.config.marker_length, &self.config.camera)
        {
            Ok(poses) if poses.len() == markers.len() => poses,
            Ok(poses) => {
                error!(
                    "pose estimator returned {} poses for {} markers, skipping poses",
                    poses.len(),
                    markers.len()
                );
                Vec::new()
            }
            Err(e) => {
                error!("pose estimation failed: {e}");
                Vec::new()
            }
        }
    }

    /// Run the whole pipeline on one frame.
    ///
    /// Only a frame that cannot be decoded is an error; in that case nothing
    /// is published.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(seq = msg.header.seq))
    )]
    pub fn process(
        &mut self,
        msg: &ImageMessage,
        outputs: &mut Outputs,
    ) -> Result<FrameReport, FrameError> {
        let started = Instant::now();
        let input = to_bgr8(msg)?;
        let mut annotated = to_bgr8(msg)?;

        let detection = self.detector.detect(&input);
        let poses = self.estimate_poses(&detection.markers);

        if self.config.draw_markers {
            self.renderer.draw_markers(&mut annotated, &detection.markers);
        }
        for pose in &poses {
            self.renderer.draw_axes(
                &mut annotated,
                &self.config.camera,
                pose,
                self.config.axis_length,
            );
        }
        if let Some(display) = self.display.as_mut() {
            display.show(&annotated);
        }

        let header = &msg.header;
        let mut pose_messages = 0;
        for (marker, pose) in detection.markers.iter().zip(&poses) {
            let rvec = pose_message(header, marker.id, pose.rvec);
            let tvec = pose_message(header, marker.id, pose.tvec);
            pose_messages += publish_or_warn(outputs.rvec.as_mut(), &rvec) as usize;
            pose_messages += publish_or_warn(outputs.tvec.as_mut(), &tvec) as usize;
        }
        let image_published =
            publish_or_warn(outputs.image.as_mut(), &from_bgr8(&annotated, header.clone()));

        let elapsed = started.elapsed();
        if let Some(budget) = self.config.frame_budget_ms {
            let ms = elapsed.as_secs_f64() * 1e3;
            if ms > budget {
                warn!("frame {} took {ms:.1} ms (budget {budget:.1} ms)", header.seq);
            }
        }
        debug!(
            "frame {}: {} markers, {} rejected, {} poses in {:.2?}",
            header.seq,
            detection.markers.len(),
            detection.rejected.len(),
            poses.len(),
            elapsed
        );

        Ok(FrameReport {
            seq: header.seq,
            rejected: detection.rejected.len(),
            markers: detection.markers,
            poses,
            pose_messages,
            image_published,
            elapsed,
        })
    }

    /// Frame callback: like [`Self::process`] but logs and swallows decode
    /// failures.
    pub fn handle_frame(
        &mut self,
        msg: &ImageMessage,
        outputs: &mut Outputs,
    ) -> Option<FrameReport> {
        match self.process(msg, outputs) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("frame {}: {e}", msg.header.seq);
                None
            }
        }
    }
}

/// Feed every frame of `source` through the pipeline, one at a time.
pub fn spin<I>(source: I, pipeline: &mut FramePipeline, outputs: &mut Outputs) -> SpinStats
where
    I: IntoIterator<Item = Result<ImageMessage, SourceError>>,
{
    let mut stats = SpinStats::default();
    for frame in source {
        stats.frames += 1;
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                error!("frame source: {e}");
                stats.dropped += 1;
                continue;
            }
        };
        match pipeline.handle_frame(&msg, outputs) {
            Some(report) => stats.markers += report.markers.len(),
            None => stats.dropped += 1,
        }
    }
    info!(
        "processed {} frames ({} dropped), {} markers",
        stats.frames, stats.dropped, stats.markers
    );
    stats
}
