//! Native debug overlays drawn straight into the BGR buffer.

use marker_pose_core::{AxisRenderer, BgrImage, CameraModel, DetectedMarker, MarkerPose};
use marker_pose_estimate::project_points;
use nalgebra::{Point2, Vector3};

const RED: [u8; 3] = [0, 0, 255];
const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [255, 0, 0];

/// Axis and outline rasterizer.
#[derive(Clone, Debug)]
pub struct NativeAxisRenderer {
    /// Line thickness in pixels.
    pub thickness: u32,
}

impl Default for NativeAxisRenderer {
    fn default() -> Self {
        Self { thickness: 3 }
    }
}

/// Clip the segment to `[xmin, xmax] x [ymin, ymax]` (Liang–Barsky).
fn clip_segment(
    p0: Point2<f64>,
    p1: Point2<f64>,
    (xmin, ymin, xmax, ymax): (f64, f64, f64, f64),
) -> Option<(Point2<f64>, Point2<f64>)> {
    let d = p1 - p0;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-d.x, p0.x - xmin),
        (d.x, xmax - p0.x),
        (-d.y, p0.y - ymin),
        (d.y, ymax - p0.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((p0 + d * t0, p0 + d * t1))
}

fn stamp(img: &mut BgrImage, x: i64, y: i64, radius: i64, color: [u8; 3]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                img.put_pixel(x + dx, y + dy, color);
            }
        }
    }
}

/// Bresenham line with a round brush; parts outside the image are dropped.
pub fn draw_line(
    img: &mut BgrImage,
    from: Point2<f64>,
    to: Point2<f64>,
    thickness: u32,
    color: [u8; 3],
) {
    if !(from.x.is_finite() && from.y.is_finite() && to.x.is_finite() && to.y.is_finite()) {
        return;
    }
    let radius = (thickness.max(1) as i64 - 1) / 2;
    let margin = radius as f64 + 1.0;
    let bounds = (
        -margin,
        -margin,
        img.width as f64 - 1.0 + margin,
        img.height as f64 - 1.0 + margin,
    );
    let Some((a, b)) = clip_segment(from, to, bounds) else {
        return;
    };

    let (mut x, mut y) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        stamp(img, x, y, radius, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

impl AxisRenderer for NativeAxisRenderer {
    fn draw_axes(
        &self,
        image: &mut BgrImage,
        camera: &CameraModel,
        pose: &MarkerPose,
        length: f64,
    ) {
        let pts = [
            Vector3::zeros(),
            Vector3::new(length, 0.0, 0.0),
            Vector3::new(0.0, length, 0.0),
            Vector3::new(0.0, 0.0, length),
        ];
        let px = project_points(camera, pose, &pts);
        let Some(origin) = px[0] else {
            return;
        };
        for (end, color) in px[1..].iter().zip([RED, GREEN, BLUE]) {
            if let Some(end) = end {
                draw_line(image, origin, *end, self.thickness, color);
            }
        }
    }

    fn draw_markers(&self, image: &mut BgrImage, markers: &[DetectedMarker]) {
        for m in markers {
            let c = m.corners.map(|p| Point2::new(p.x as f64, p.y as f64));
            for i in 0..4 {
                draw_line(image, c[i], c[(i + 1) % 4], 1, GREEN);
            }
            let (x, y) = (c[0].x.round() as i64, c[0].y.round() as i64);
            for d in -3..=3 {
                image.put_pixel(x + d, y - 3, RED);
                image.put_pixel(x + d, y + 3, RED);
                image.put_pixel(x - 3, y + d, RED);
                image.put_pixel(x + 3, y + d, RED);
            }
        }
    }
}
