//! Reading marker bits through a quad homography.

use crate::quads::Quad;
use crate::threshold::otsu_threshold_from_samples;
use crate::Matcher;
use marker_pose_core::{homography_from_4pt, sample_mean_3x3, GrayImageView};
use nalgebra::Point2;

/// Bit-reading configuration.
#[derive(Clone, Debug)]
pub struct DecodeParams {
    /// Marker border width in cells.
    pub border_bits: usize,
    /// Required share of border cells that read black.
    pub min_border_score: f32,
    /// Minimum intensity spread inside the quad.
    pub min_contrast: u8,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            border_bits: 1,
            min_border_score: 0.85,
            min_contrast: 30,
        }
    }
}

/// Canonical pixels per cell of the unwarped marker.
const CANONICAL_CELL_PX: f64 = 10.0;
const THRESH_SUBDIV: usize = 3;

#[derive(Clone, Copy, Debug)]
pub(crate) struct DecodedMarker {
    pub id: u32,
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// Corners starting at the marker's own top-left.
    pub corners: Quad,
}

#[derive(Clone, Copy, Debug)]
struct MarkerObservation {
    code: u64,
    border_score: f32,
}

/// Precomputed sample grid in canonical marker coordinates.
#[derive(Clone, Debug)]
pub(crate) struct MarkerDecoder {
    params: DecodeParams,
    bits: usize,
    cells: usize,
    canonical: Quad,
    points: Vec<Point2<f64>>, // row-major: cy * cells + cx
    threshold_points: Vec<Point2<f64>>,
}

impl MarkerDecoder {
    pub fn new(bits: usize, params: DecodeParams) -> Self {
        let cells = bits + 2 * params.border_bits;
        let side = cells as f64 * CANONICAL_CELL_PX;
        let canonical = [
            Point2::new(0.0, 0.0),
            Point2::new(side, 0.0),
            Point2::new(side, side),
            Point2::new(0.0, side),
        ];

        let grid_points = |n: usize| {
            let step = side / n as f64;
            let mut pts = Vec::with_capacity(n * n);
            for y in 0..n {
                for x in 0..n {
                    pts.push(Point2::new(
                        (x as f64 + 0.5) * step,
                        (y as f64 + 0.5) * step,
                    ));
                }
            }
            pts
        };

        Self {
            points: grid_points(cells),
            threshold_points: grid_points(cells * THRESH_SUBDIV),
            params,
            bits,
            cells,
            canonical,
        }
    }

    /// Read the bit grid inside `quad` and match it against the dictionary.
    pub fn decode(
        &self,
        img: &GrayImageView<'_>,
        quad: &Quad,
        matcher: &Matcher,
    ) -> Option<DecodedMarker> {
        let h = homography_from_4pt(&self.canonical, quad)?;

        let samples = self
            .points
            .iter()
            .map(|p| {
                let q = h.apply(*p);
                sample_mean_3x3(img, q.x, q.y)
            })
            .collect::<Option<Vec<u8>>>()?;

        let thr_samples: Vec<u8> = self
            .threshold_points
            .iter()
            .filter_map(|p| {
                let q = h.apply(*p);
                sample_mean_3x3(img, q.x, q.y)
            })
            .collect();

        let obs = decode_samples(
            &samples,
            &thr_samples,
            self.cells,
            self.bits,
            self.params.border_bits,
            &self.params,
        )?;

        let m = matcher.match_code(obs.code)?;
        let mut corners = *quad;
        corners.rotate_left(m.rotation as usize);
        Some(DecodedMarker {
            id: m.id,
            rotation: m.rotation,
            hamming: m.hamming,
            border_score: obs.border_score,
            corners,
        })
    }
}

fn decode_samples(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    border: usize,
    params: &DecodeParams,
) -> Option<MarkerObservation> {
    if samples.len() != cells * cells {
        return None;
    }
    let thr_source = if thr_samples.is_empty() {
        samples
    } else {
        thr_samples
    };
    let lo = thr_source.iter().copied().min()?;
    let hi = thr_source.iter().copied().max()?;
    if hi - lo < params.min_contrast {
        return None;
    }
    let thr = otsu_threshold_from_samples(thr_source);

    let mut border_ok = 0u32;
    let mut border_total = 0u32;
    let mut code: u64 = 0;

    for cy in 0..cells {
        for cx in 0..cells {
            let is_black = samples[cy * cells + cx] <= thr;
            let is_border =
                cx < border || cy < border || cx + border >= cells || cy + border >= cells;
            if is_border {
                border_total += 1;
                border_ok += is_black as u32;
            } else if is_black {
                let idx = (cy - border) * bits + (cx - border);
                code |= 1u64 << idx;
            }
        }
    }

    let border_score = if border_total > 0 {
        border_ok as f32 / border_total as f32
    } else {
        1.0
    };
    (border_score >= params.min_border_score).then_some(MarkerObservation {
        code,
        border_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin_dictionary;
    use marker_pose_core::GrayImage;

    fn build_marker_image(code: u64, bits: usize, cell_px: usize, margin: usize) -> GrayImage {
        let cells = bits + 2;
        let side = cells * cell_px + 2 * margin;
        let mut img = GrayImage::new(side, side, 255);

        for cy in 0..cells {
            for cx in 0..cells {
                let is_border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
                let is_black = is_border || (code >> ((cy - 1) * bits + (cx - 1))) & 1 == 1;
                if !is_black {
                    continue;
                }
                for yy in 0..cell_px {
                    for xx in 0..cell_px {
                        let x = margin + cx * cell_px + xx;
                        let y = margin + cy * cell_px + yy;
                        img.data[y * side + x] = 0;
                    }
                }
            }
        }
        img
    }

    fn pixel_quad(margin: usize, extent: usize) -> Quad {
        let a = margin as f64 - 0.5;
        let b = (margin + extent) as f64 - 0.5;
        [
            Point2::new(a, a),
            Point2::new(b, a),
            Point2::new(b, b),
            Point2::new(a, b),
        ]
    }

    #[test]
    fn decodes_upright_marker() {
        let dict = builtin_dictionary("DEMO_4X4_9").expect("dict");
        let code = dict.codes[2];
        let matcher = Matcher::new(dict, 0).expect("matcher");
        let img = build_marker_image(code, 4, 10, 8);
        let decoder = MarkerDecoder::new(4, DecodeParams::default());

        let quad = pixel_quad(8, 60);
        let m = decoder.decode(&img.view(), &quad, &matcher).expect("decode");
        assert_eq!((m.id, m.rotation, m.hamming), (2, 0, 0));
        assert_eq!(m.corners, quad);
        assert_eq!(m.border_score, 1.0);
    }

    #[test]
    fn rotated_marker_reports_own_top_left_first() {
        let dict = builtin_dictionary("DEMO_4X4_9").expect("dict");
        let code = crate::rotate_code_u64(dict.codes[4], 4, 1);
        let matcher = Matcher::new(dict, 0).expect("matcher");
        let img = build_marker_image(code, 4, 10, 8);
        let decoder = MarkerDecoder::new(4, DecodeParams::default());

        let quad = pixel_quad(8, 60);
        let m = decoder.decode(&img.view(), &quad, &matcher).expect("decode");
        assert_eq!((m.id, m.rotation), (4, 1));
        // a clockwise quarter turn moves the marker's top-left to the image top-right
        assert_eq!(m.corners[0], quad[1]);
        assert_eq!(m.corners[3], quad[0]);
    }

    #[test]
    fn white_border_is_rejected() {
        let dict = builtin_dictionary("DEMO_4X4_9").expect("dict");
        let matcher = Matcher::new(dict, 1).expect("matcher");
        let mut img = GrayImage::new(76, 76, 255);
        // dark blob inside the would-be inner area only
        for y in 28..48 {
            for x in 28..48 {
                img.data[y * 76 + x] = 0;
            }
        }
        let decoder = MarkerDecoder::new(4, DecodeParams::default());
        assert!(decoder
            .decode(&img.view(), &pixel_quad(8, 60), &matcher)
            .is_none());
    }

    #[test]
    fn flat_quad_has_no_contrast() {
        let dict = builtin_dictionary("DEMO_4X4_9").expect("dict");
        let matcher = Matcher::new(dict, 1).expect("matcher");
        let img = GrayImage::new(76, 76, 0);
        let decoder = MarkerDecoder::new(4, DecodeParams::default());
        assert!(decoder
            .decode(&img.view(), &pixel_quad(8, 60), &matcher)
            .is_none());
    }
}
