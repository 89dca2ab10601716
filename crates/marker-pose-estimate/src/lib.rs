//! Native pose estimation for square fiducial markers.
//!
//! [`SquarePoseEstimator`] implements [`marker_pose_core::PoseEstimator`]:
//! one pose per corner set, in input order, for a marker of known edge
//! length.

mod estimator;
mod project;
mod square;

pub use estimator::SquarePoseEstimator;
pub use marker_pose_core::PoseError;
pub use project::{marker_object_points, project_points};
pub use square::RefineParams;
