//! Pose of a square marker from its four image corners.
//!
//! The corners are undistorted into normalized camera coordinates, the
//! plane-to-image homography is decomposed into `[r1 r2 t]` and projected
//! onto SO(3), and the result is polished with Gauss–Newton on the
//! normalized reprojection error.

use crate::project::marker_object_points;
use marker_pose_core::{homography_from_4pt, CameraModel, MarkerCorners, MarkerPose};
use nalgebra::{Matrix3, Matrix6, Point2, Rotation3, SMatrix, Vector2, Vector3, Vector6};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a corner set could not produce a pose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SolveFailure {
    NonFinite,
    Degenerate(&'static str),
}

/// Gauss–Newton stopping rules.
#[derive(Clone, Copy, Debug)]
pub struct RefineParams {
    pub max_iters: usize,
    /// Stop once the parameter update norm falls below this.
    pub step_tol: f64,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            max_iters: 20,
            step_tol: 1e-12,
        }
    }
}

fn cross2(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn check_convex(pts: &[Point2<f64>; 4]) -> Result<(), SolveFailure> {
    let turns = [0, 1, 2, 3].map(|i| {
        let e0 = pts[(i + 1) % 4] - pts[i];
        let e1 = pts[(i + 2) % 4] - pts[(i + 1) % 4];
        cross2(e0, e1)
    });
    let scale = pts
        .iter()
        .map(|p| (p - pts[0]).norm_squared())
        .fold(0.0, f64::max);
    let eps = 1e-9 * scale.max(1e-300);
    if turns.iter().all(|&t| t > eps) || turns.iter().all(|&t| t < -eps) {
        Ok(())
    } else {
        Err(SolveFailure::Degenerate("corners are collinear or not convex"))
    }
}

/// Initial pose from the plane-to-normalized-image homography.
fn pose_from_homography(
    h: &Matrix3<f64>,
) -> Result<(Rotation3<f64>, Vector3<f64>), SolveFailure> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let denom = 0.5 * (h1.norm() + h2.norm());
    if denom <= 1e-12 {
        return Err(SolveFailure::Degenerate("homography has vanishing columns"));
    }
    let lambda = 1.0 / denom;
    let (mut r1, mut r2, mut t) = (lambda * h1, lambda * h2, lambda * h3);
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(SolveFailure::Degenerate("homography columns are parallel"));
    }

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(SolveFailure::Degenerate("svd failed"));
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    Ok((Rotation3::from_matrix_unchecked(r_orth), t))
}

fn reprojection(
    r: &Rotation3<f64>,
    t: &Vector3<f64>,
    object: &[Vector3<f64>; 4],
    observed: &[Vector2<f64>; 4],
) -> Option<(SMatrix<f64, 8, 1>, SMatrix<f64, 8, 6>)> {
    let mut res = SMatrix::<f64, 8, 1>::zeros();
    let mut jac = SMatrix::<f64, 8, 6>::zeros();
    for (i, (x, obs)) in object.iter().zip(observed).enumerate() {
        let rx = r * x;
        let p = rx + t;
        if p.z <= 1e-9 {
            return None;
        }
        let iz = 1.0 / p.z;
        res[2 * i] = p.x * iz - obs.x;
        res[2 * i + 1] = p.y * iz - obs.y;

        // d(proj)/dp
        let dproj = SMatrix::<f64, 2, 3>::new(
            iz, 0.0, -p.x * iz * iz, //
            0.0, iz, -p.y * iz * iz,
        );
        // left perturbation: d(exp(w) R x)/dw = -[R x]x
        let skew = Matrix3::new(
            0.0, rx.z, -rx.y, //
            -rx.z, 0.0, rx.x, //
            rx.y, -rx.x, 0.0,
        );
        let j_rot = dproj * skew;
        jac.view_mut((2 * i, 0), (2, 3)).copy_from(&j_rot);
        jac.view_mut((2 * i, 3), (2, 3)).copy_from(&dproj);
    }
    Some((res, jac))
}

fn refine(
    mut r: Rotation3<f64>,
    mut t: Vector3<f64>,
    object: &[Vector3<f64>; 4],
    observed: &[Vector2<f64>; 4],
    params: &RefineParams,
) -> (Rotation3<f64>, Vector3<f64>) {
    let Some((mut res, mut jac)) = reprojection(&r, &t, object, observed) else {
        return (r, t);
    };
    let mut cost = res.norm_squared();

    for _ in 0..params.max_iters {
        let jtj: Matrix6<f64> = jac.transpose() * jac;
        let jtr: Vector6<f64> = jac.transpose() * res;
        let Some(chol) = jtj.cholesky() else {
            break;
        };
        let delta = -chol.solve(&jtr);

        let r_new = Rotation3::new(delta.fixed_rows::<3>(0).into_owned()) * r;
        let t_new = t + delta.fixed_rows::<3>(3);
        let Some((res_new, jac_new)) = reprojection(&r_new, &t_new, object, observed) else {
            break;
        };
        let cost_new = res_new.norm_squared();
        if cost_new > cost {
            break;
        }
        r = r_new;
        t = t_new;
        res = res_new;
        jac = jac_new;
        cost = cost_new;
        if delta.norm() < params.step_tol {
            break;
        }
    }
    (r, t)
}

/// Solve a single marker; `marker_length` and `camera` are assumed valid.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub(crate) fn solve_square(
    corners: &MarkerCorners,
    marker_length: f64,
    camera: &CameraModel,
    params: &RefineParams,
) -> Result<MarkerPose, SolveFailure> {
    if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(SolveFailure::NonFinite);
    }
    let pixels = corners.map(|p| Point2::new(p.x as f64, p.y as f64));
    check_convex(&pixels)?;

    let normalized = pixels.map(|p| camera.undistort_pixel(p));
    let object = marker_object_points(marker_length);
    let plane = object.map(|x| Point2::new(x.x, x.y));
    let image = normalized.map(Point2::from);
    let h = homography_from_4pt(&plane, &image)
        .ok_or(SolveFailure::Degenerate("homography is singular"))?;

    let (r0, t0) = pose_from_homography(&h.h)?;
    let (r, t) = refine(r0, t0, &object, &normalized, params);

    let rvec = r.scaled_axis();
    if !rvec.iter().chain(t.iter()).all(|v| v.is_finite()) || t.z <= 0.0 {
        return Err(SolveFailure::Degenerate("pose is not in front of the camera"));
    }
    Ok(MarkerPose::new(rvec, t))
}
