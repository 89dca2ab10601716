//! Quadrilateral candidates from a binary mask.
//!
//! Each 4-connected dark component yields at most one quad. Its outer
//! boundary is sampled at the midpoints between dark pixels and the light
//! region surrounding the component. Four coarse corners taken from extreme
//! boundary points are refined by intersecting total-least-squares side
//! lines.

use crate::threshold::BinaryMask;
use nalgebra::{Point2, Vector2};
use std::collections::VecDeque;

/// Geometric acceptance limits for quad candidates.
#[derive(Clone, Debug)]
pub struct QuadParams {
    /// Shortest allowed side, pixels.
    pub min_side_px: f64,
    /// Longest over shortest side.
    pub max_side_ratio: f64,
    /// Boundary points farther than this outside the coarse quad count as outliers.
    pub outside_tol_px: f64,
    /// Allowed share of outlier boundary points.
    pub max_outside_frac: f64,
    /// Side fits with a larger RMS residual are rejected.
    pub max_line_rms_px: f64,
    /// Boundary points this close to a corner (fraction of side) are not fitted.
    pub corner_exclusion_frac: f64,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            min_side_px: 16.0,
            max_side_ratio: 4.0,
            outside_tol_px: 1.5,
            max_outside_frac: 0.05,
            max_line_rms_px: 1.0,
            corner_exclusion_frac: 0.1,
        }
    }
}

pub(crate) type Quad = [Point2<f64>; 4];

struct Component {
    label: u32,
    pixels: Vec<usize>,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    touches_border: bool,
}

fn label_components(mask: &BinaryMask) -> (Vec<u32>, Vec<Component>) {
    let (w, h) = (mask.width, mask.height);
    let mut labels = vec![0u32; w * h];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..w * h {
        if !mask.dark[start] || labels[start] != 0 {
            continue;
        }
        let label = components.len() as u32 + 1;
        let mut comp = Component {
            label,
            pixels: Vec::new(),
            x0: usize::MAX,
            y0: usize::MAX,
            x1: 0,
            y1: 0,
            touches_border: false,
        };
        labels[start] = label;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % w, idx / w);
            comp.pixels.push(idx);
            comp.x0 = comp.x0.min(x);
            comp.y0 = comp.y0.min(y);
            comp.x1 = comp.x1.max(x);
            comp.y1 = comp.y1.max(y);
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                comp.touches_border = true;
            }

            let mut visit = |n: usize| {
                if mask.dark[n] && labels[n] == 0 {
                    labels[n] = label;
                    queue.push_back(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }
        components.push(comp);
    }

    (labels, components)
}

/// Midpoints between the component and the light region that encloses it.
///
/// Holes inside the component are ignored. Requires a component that does
/// not touch the image border.
fn outer_boundary_points(labels: &[u32], width: usize, comp: &Component) -> Vec<Point2<f64>> {
    let ox = comp.x0 - 1;
    let oy = comp.y0 - 1;
    let lw = comp.x1 - comp.x0 + 3;
    let lh = comp.y1 - comp.y0 + 3;
    let is_comp = |lx: usize, ly: usize| labels[(oy + ly) * width + ox + lx] == comp.label;

    let mut outside = vec![false; lw * lh];
    let mut queue = VecDeque::new();
    for lx in 0..lw {
        for ly in [0, lh - 1] {
            let i = ly * lw + lx;
            if !outside[i] {
                outside[i] = true;
                queue.push_back(i);
            }
        }
    }
    for ly in 1..lh - 1 {
        for lx in [0, lw - 1] {
            let i = ly * lw + lx;
            if !outside[i] {
                outside[i] = true;
                queue.push_back(i);
            }
        }
    }
    while let Some(i) = queue.pop_front() {
        let (lx, ly) = (i % lw, i / lw);
        let neighbours = [
            (lx.wrapping_sub(1), ly),
            (lx + 1, ly),
            (lx, ly.wrapping_sub(1)),
            (lx, ly + 1),
        ];
        for (nx, ny) in neighbours {
            if nx >= lw || ny >= lh {
                continue;
            }
            let n = ny * lw + nx;
            if !outside[n] && !is_comp(nx, ny) {
                outside[n] = true;
                queue.push_back(n);
            }
        }
    }

    let mut points = Vec::new();
    for &idx in &comp.pixels {
        let (x, y) = (idx % width, idx / width);
        let (lx, ly) = (x - ox, y - oy);
        for (dx, dy) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
            let nx = (lx as i64 + dx) as usize;
            let ny = (ly as i64 + dy) as usize;
            if outside[ny * lw + nx] {
                points.push(Point2::new(
                    x as f64 + 0.5 * dx as f64,
                    y as f64 + 0.5 * dy as f64,
                ));
            }
        }
    }
    points
}

#[inline]
fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn argmax_by<F>(points: &[Point2<f64>], f: F) -> Option<(Point2<f64>, f64)>
where
    F: Fn(&Point2<f64>) -> f64,
{
    points
        .iter()
        .map(|p| (*p, f(p)))
        .fold(None, |best, cur| match best {
            Some((_, v)) if v >= cur.1 => best,
            _ => Some(cur),
        })
}

/// Four extreme boundary points, ordered clockwise on screen starting from
/// the one closest to the image origin.
fn coarse_corners(points: &[Point2<f64>]) -> Option<Quad> {
    if points.len() < 8 {
        return None;
    }
    let n = points.len() as f64;
    let centroid = Point2::from(points.iter().map(|p| p.coords).sum::<Vector2<f64>>() / n);

    let (a, _) = argmax_by(points, |p| (p - centroid).norm_squared())?;
    let (b, _) = argmax_by(points, |p| (p - a).norm_squared())?;
    let (c, _) = argmax_by(points, |p| cross(b - a, p - a).abs())?;

    let s = cross(b - a, c - a).signum();
    if s == 0.0 {
        return None;
    }
    let edges = [(a, b), (b, c), (c, a)];
    let (d, outward) = argmax_by(points, |p| {
        edges
            .iter()
            .map(|(u, v)| -s * cross(v - u, p - u))
            .fold(f64::MIN, f64::max)
    })?;
    if outward <= 0.0 {
        return None;
    }

    let mut quad = [a, b, c, d];
    let center = Point2::from(quad.iter().map(|p| p.coords).sum::<Vector2<f64>>() / 4.0);
    // ascending angle is clockwise on screen (y down)
    quad.sort_by(|p, q| {
        let ap = (p.y - center.y).atan2(p.x - center.x);
        let aq = (q.y - center.y).atan2(q.x - center.x);
        ap.total_cmp(&aq)
    });
    let start = (0..4)
        .min_by(|&i, &j| (quad[i].x + quad[i].y).total_cmp(&(quad[j].x + quad[j].y)))
        .unwrap_or(0);
    quad.rotate_left(start);
    Some(quad)
}

fn side_lengths(q: &Quad) -> [f64; 4] {
    [0, 1, 2, 3].map(|i| (q[(i + 1) % 4] - q[i]).norm())
}

fn is_strictly_convex_clockwise(q: &Quad) -> bool {
    (0..4).all(|i| {
        let e0 = q[(i + 1) % 4] - q[i];
        let e1 = q[(i + 2) % 4] - q[(i + 1) % 4];
        cross(e0, e1) > 0.0
    })
}

fn passes_shape_checks(q: &Quad, params: &QuadParams) -> bool {
    if !is_strictly_convex_clockwise(q) {
        return false;
    }
    let sides = side_lengths(q);
    let min_side = sides.iter().copied().fold(f64::INFINITY, f64::min);
    let max_side = sides.iter().copied().fold(0.0, f64::max);
    min_side >= params.min_side_px && max_side <= params.max_side_ratio * min_side
}

/// Signed distance to the side `q[i] -> q[i+1]`, positive inside.
#[inline]
fn side_distance(q: &Quad, i: usize, p: &Point2<f64>) -> f64 {
    let a = q[i];
    let d = q[(i + 1) % 4] - a;
    cross(d, p - a) / d.norm()
}

fn outside_fraction(q: &Quad, points: &[Point2<f64>], tol: f64) -> f64 {
    let outside = points
        .iter()
        .filter(|p| (0..4).any(|i| side_distance(q, i, p) < -tol))
        .count();
    outside as f64 / points.len().max(1) as f64
}

#[derive(Clone, Copy, Debug)]
struct Line {
    /// Unit normal.
    n: Vector2<f64>,
    /// `n · x = c` for points on the line.
    c: f64,
}

/// Total-least-squares line fit; returns the line and its RMS residual.
fn fit_line(points: &[Point2<f64>]) -> Option<(Line, f64)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.coords).sum::<Vector2<f64>>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let d = p.coords - mean;
        sxx += d.x * d.x;
        sxy += d.x * d.y;
        syy += d.y * d.y;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let normal = Vector2::new(-theta.sin(), theta.cos());
    let c = normal.dot(&mean);
    let ss: f64 = points
        .iter()
        .map(|p| (normal.dot(&p.coords) - c).powi(2))
        .sum();
    Some((Line { n: normal, c }, (ss / n).sqrt()))
}

fn intersect(l0: &Line, l1: &Line) -> Option<Point2<f64>> {
    let det = l0.n.x * l1.n.y - l0.n.y * l1.n.x;
    if det.abs() < 1e-3 {
        return None;
    }
    Some(Point2::new(
        (l0.c * l1.n.y - l0.n.y * l1.c) / det,
        (l0.n.x * l1.c - l0.c * l1.n.x) / det,
    ))
}

fn refine_corners(coarse: &Quad, points: &[Point2<f64>], params: &QuadParams) -> Option<Quad> {
    let sides = side_lengths(coarse);
    let mut per_side: [Vec<Point2<f64>>; 4] = Default::default();

    for p in points {
        let (best, dist) = (0..4)
            .map(|i| (i, side_distance(coarse, i, p).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        let band = (0.05 * sides[best]).max(2.0);
        if dist > band {
            continue;
        }
        let a = coarse[best];
        let d = coarse[(best + 1) % 4] - a;
        let t = d.dot(&(p - a)) / d.norm_squared();
        let excl = params.corner_exclusion_frac;
        if t >= excl && t <= 1.0 - excl {
            per_side[best].push(*p);
        }
    }

    let mut lines = [Line {
        n: Vector2::zeros(),
        c: 0.0,
    }; 4];
    for (line, side_points) in lines.iter_mut().zip(per_side.iter()) {
        let (fit, rms) = fit_line(side_points)?;
        if rms > params.max_line_rms_px {
            return None;
        }
        *line = fit;
    }

    let mut refined = *coarse;
    for (i, corner) in refined.iter_mut().enumerate() {
        let p = intersect(&lines[(i + 3) % 4], &lines[i])?;
        let max_shift = (0.25 * sides[i].min(sides[(i + 3) % 4])).max(3.0);
        if (p - coarse[i]).norm() > max_shift {
            return None;
        }
        *corner = p;
    }
    Some(refined)
}

fn fit_quad(points: &[Point2<f64>], params: &QuadParams) -> Option<Quad> {
    let coarse = coarse_corners(points)?;
    if !passes_shape_checks(&coarse, params) {
        return None;
    }
    if outside_fraction(&coarse, points, params.outside_tol_px) > params.max_outside_frac {
        return None;
    }
    let refined = refine_corners(&coarse, points, params)?;
    passes_shape_checks(&refined, params).then_some(refined)
}

/// All quad candidates of the mask, in raster order of their first pixel.
pub(crate) fn find_quads(mask: &BinaryMask, params: &QuadParams) -> Vec<Quad> {
    let (labels, components) = label_components(mask);
    let min_extent = params.min_side_px.floor() as usize;

    components
        .iter()
        .filter(|c| !c.touches_border)
        .filter(|c| (c.x1 - c.x0 + 1).max(c.y1 - c.y0 + 1) >= min_extent)
        .filter_map(|c| {
            let points = outer_boundary_points(&labels, mask.width, c);
            fit_quad(&points, params)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_fn(w: usize, h: usize, dark: impl Fn(f64, f64) -> bool) -> BinaryMask {
        let mut data = vec![false; w * h];
        for y in 0..h {
            for x in 0..w {
                data[y * w + x] = dark(x as f64, y as f64);
            }
        }
        BinaryMask {
            width: w,
            height: h,
            dark: data,
            threshold: 127,
        }
    }

    fn assert_corner(p: Point2<f64>, x: f64, y: f64, tol: f64) {
        assert!(
            (p.x - x).abs() <= tol && (p.y - y).abs() <= tol,
            "corner ({:.3},{:.3}) != ({x},{y})",
            p.x,
            p.y
        );
    }

    #[test]
    fn axis_aligned_square_corners_land_on_pixel_edges() {
        let mask = mask_from_fn(40, 40, |x, y| {
            (10.0..30.0).contains(&x) && (10.0..30.0).contains(&y)
        });
        let quads = find_quads(&mask, &QuadParams::default());
        assert_eq!(quads.len(), 1);
        let q = quads[0];
        assert_corner(q[0], 9.5, 9.5, 1e-9);
        assert_corner(q[1], 29.5, 9.5, 1e-9);
        assert_corner(q[2], 29.5, 29.5, 1e-9);
        assert_corner(q[3], 9.5, 29.5, 1e-9);
    }

    #[test]
    fn square_with_holes_uses_outer_boundary() {
        let mask = mask_from_fn(50, 50, |x, y| {
            let inside = (10.0..40.0).contains(&x) && (10.0..40.0).contains(&y);
            let hole = (18.0..24.0).contains(&x) && (15.0..33.0).contains(&y);
            inside && !hole
        });
        let quads = find_quads(&mask, &QuadParams::default());
        assert_eq!(quads.len(), 1);
        assert_corner(quads[0][0], 9.5, 9.5, 1e-9);
        assert_corner(quads[0][2], 39.5, 39.5, 1e-9);
    }

    #[test]
    fn rotated_square_is_found_clockwise() {
        // diamond centered at (40, 40) with half-diagonal 20
        let mask = mask_from_fn(80, 80, |x, y| (x - 40.0).abs() + (y - 40.0).abs() <= 20.0);
        let quads = find_quads(&mask, &QuadParams::default());
        assert_eq!(quads.len(), 1);
        let q = quads[0];
        assert!(is_strictly_convex_clockwise(&q));
        let expected = [(20.0, 40.0), (40.0, 20.0), (60.0, 40.0), (40.0, 60.0)];
        for p in q {
            let near = expected
                .iter()
                .any(|&(x, y)| (p.x - x).abs() < 1.0 && (p.y - y).abs() < 1.0);
            assert!(near, "unexpected corner ({:.2},{:.2})", p.x, p.y);
        }
    }

    #[test]
    fn disk_is_not_a_quad() {
        let mask = mask_from_fn(60, 60, |x, y| {
            (x - 30.0).powi(2) + (y - 30.0).powi(2) <= 225.0
        });
        assert!(find_quads(&mask, &QuadParams::default()).is_empty());
    }

    #[test]
    fn components_touching_border_or_too_small_are_skipped() {
        let mask = mask_from_fn(60, 60, |x, y| {
            let at_border = x < 20.0 && y < 20.0;
            let tiny = (40.0..45.0).contains(&x) && (40.0..45.0).contains(&y);
            at_border || tiny
        });
        assert!(find_quads(&mask, &QuadParams::default()).is_empty());
    }
}
