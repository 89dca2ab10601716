use nalgebra::{Matrix3, Point2, Vector3};

/// Planar projective transform `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Closed-form map of the unit square `(0,0) (1,0) (1,1) (0,1)` onto `quad`.
///
/// Parallelograms come out affine (`g = h = 0`).
fn unit_square_to_quad(quad: &[Point2<f64>; 4]) -> Option<Matrix3<f64>> {
    let [p0, p1, p2, p3] = *quad;
    let d1 = p1 - p2;
    let d2 = p3 - p2;
    let s = p0 - p1 + (p2 - p3);

    let det = d1.x * d2.y - d2.x * d1.y;
    if det.abs() < 1e-12 {
        return None;
    }
    let g = (s.x * d2.y - d2.x * s.y) / det;
    let h = (d1.x * s.y - s.x * d1.y) / det;

    Some(Matrix3::new(
        p1.x - p0.x + g * p1.x,
        p3.x - p0.x + h * p3.x,
        p0.x,
        p1.y - p0.y + g * p1.y,
        p3.y - p0.y + h * p3.y,
        p0.y,
        g,
        h,
        1.0,
    ))
}

/// Compute H such that `dst ~ H * src` from 4 point correspondences.
///
/// Both quads go through the unit square: `H = S_dst * S_src^-1`. Corner
/// order must be consistent between `src` and `dst`. Returns `None` for
/// degenerate configurations (three collinear points, repeated points).
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let from_src = unit_square_to_quad(src)?.try_inverse()?;
    let to_dst = unit_square_to_quad(dst)?;
    let h = to_dst * from_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 || h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Homography::new(h / scale))
}
