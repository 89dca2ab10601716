use marker_pose_core::{CameraModel, MarkerPose};
use nalgebra::{Point2, Vector3};

/// Object-frame corners of a square marker with edge `length`, in
/// top-left, top-right, bottom-right, bottom-left order.
///
/// The marker lies in `z = 0` with x to the right and y up.
pub fn marker_object_points(length: f64) -> [Vector3<f64>; 4] {
    let h = 0.5 * length;
    [
        Vector3::new(-h, h, 0.0),
        Vector3::new(h, h, 0.0),
        Vector3::new(h, -h, 0.0),
        Vector3::new(-h, -h, 0.0),
    ]
}

/// Project marker-frame points into the image.
///
/// Entries are `None` for points that end up behind the camera.
pub fn project_points(
    camera: &CameraModel,
    pose: &MarkerPose,
    points: &[Vector3<f64>],
) -> Vec<Option<Point2<f64>>> {
    let r = pose.rotation();
    points
        .iter()
        .map(|p| camera.project(&(r * p + pose.tvec)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_pose_projects_center_to_principal_point() {
        let cam = CameraModel::default();
        let pose = MarkerPose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0));
        let px = project_points(&cam, &pose, &[Vector3::zeros()]);
        let p = px[0].expect("visible");
        assert_relative_eq!(p.x, 320.5, epsilon = 1e-12);
        assert_relative_eq!(p.y, 240.5, epsilon = 1e-12);
    }

    #[test]
    fn facing_marker_appears_clockwise_on_screen() {
        let cam = CameraModel::default();
        let pose = MarkerPose::new(
            Vector3::new(std::f64::consts::PI, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 3.0),
        );
        let px: Vec<Point2<f64>> = project_points(&cam, &pose, &marker_object_points(1.0))
            .into_iter()
            .map(|p| p.expect("visible"))
            .collect();
        // top-left corner is up and to the left of the principal point
        assert!(px[0].x < 320.5 && px[0].y < 240.5);
        assert!(px[2].x > 320.5 && px[2].y > 240.5);
    }

    #[test]
    fn points_behind_camera_are_dropped() {
        let cam = CameraModel::default();
        let pose = MarkerPose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 0.5));
        let px = project_points(&cam, &pose, &[Vector3::new(0.0, 0.0, -1.0)]);
        assert!(px[0].is_none());
    }
}
