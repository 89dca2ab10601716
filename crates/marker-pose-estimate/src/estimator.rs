use crate::square::{solve_square, RefineParams, SolveFailure};
use log::trace;
use marker_pose_core::{CameraModel, MarkerCorners, MarkerPose, PoseError, PoseEstimator};

/// Native square-marker pose estimator.
#[derive(Clone, Debug, Default)]
pub struct SquarePoseEstimator {
    pub refine: RefineParams,
}

impl SquarePoseEstimator {
    pub fn new(refine: RefineParams) -> Self {
        Self { refine }
    }

    /// Pose of a single marker.
    pub fn estimate_one(
        &self,
        corners: &MarkerCorners,
        marker_length: f64,
        camera: &CameraModel,
    ) -> Result<MarkerPose, PoseError> {
        check_inputs(marker_length, camera)?;
        solve_square(corners, marker_length, camera, &self.refine).map_err(|e| to_pose_error(0, e))
    }
}

fn check_inputs(marker_length: f64, camera: &CameraModel) -> Result<(), PoseError> {
    if !(marker_length.is_finite() && marker_length > 0.0) {
        return Err(PoseError::InvalidMarkerLength(marker_length));
    }
    camera.validate()?;
    Ok(())
}

fn to_pose_error(index: usize, failure: SolveFailure) -> PoseError {
    match failure {
        SolveFailure::NonFinite => PoseError::NonFiniteCorners { index },
        SolveFailure::Degenerate(reason) => PoseError::DegenerateQuad { index, reason },
    }
}

impl PoseEstimator for SquarePoseEstimator {
    fn estimate(
        &self,
        corners: &[MarkerCorners],
        marker_length: f64,
        camera: &CameraModel,
    ) -> Result<Vec<MarkerPose>, PoseError> {
        check_inputs(marker_length, camera)?;
        corners
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let pose = solve_square(c, marker_length, camera, &self.refine)
                    .map_err(|e| to_pose_error(i, e))?;
                trace!("marker #{i}: rvec={:?} tvec={:?}", pose.rvec, pose.tvec);
                Ok(pose)
            })
            .collect()
    }
}
