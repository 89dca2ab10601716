//! Full-frame marker detection.

use crate::decode::{DecodeParams, MarkerDecoder};
use crate::quads::{find_quads, QuadParams};
use crate::threshold::binarize_otsu;
use crate::{Dictionary, DictionaryError, Matcher};
use log::debug;
use marker_pose_core::{
    BgrImage, DetectedMarker, GrayImageView, MarkerCorners, MarkerDetectionResult, MarkerDetector,
};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fixed detector settings.
#[derive(Clone, Debug)]
pub struct ArucoDetectorParams {
    /// Frames with a smaller intensity range are skipped entirely.
    pub min_image_contrast: u8,
    pub quad: QuadParams,
    pub decode: DecodeParams,
    /// Matching tolerance; `None` uses the dictionary's `max_correction_bits`.
    pub max_hamming: Option<u8>,
}

impl Default for ArucoDetectorParams {
    fn default() -> Self {
        Self {
            min_image_contrast: 30,
            quad: QuadParams::default(),
            decode: DecodeParams::default(),
            max_hamming: None,
        }
    }
}

/// Native detector for one dictionary.
#[derive(Clone, Debug)]
pub struct ArucoDetector {
    params: ArucoDetectorParams,
    matcher: Matcher,
    decoder: MarkerDecoder,
}

impl ArucoDetector {
    pub fn new(dict: Dictionary) -> Result<Self, DictionaryError> {
        Self::with_params(dict, ArucoDetectorParams::default())
    }

    pub fn with_params(
        dict: Dictionary,
        params: ArucoDetectorParams,
    ) -> Result<Self, DictionaryError> {
        let max_hamming = params.max_hamming.unwrap_or(dict.max_correction_bits);
        let decoder = MarkerDecoder::new(dict.marker_size, params.decode.clone());
        let matcher = Matcher::new(dict, max_hamming)?;
        Ok(Self {
            params,
            matcher,
            decoder,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    /// Detect markers in a grayscale frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, gray),
            fields(width = gray.width, height = gray.height)
        )
    )]
    pub fn detect_gray(&self, gray: &GrayImageView<'_>) -> MarkerDetectionResult {
        let mut result = MarkerDetectionResult::default();
        let Some(mask) = binarize_otsu(gray, self.params.min_image_contrast) else {
            debug!("frame has too little contrast, skipping");
            return result;
        };

        let quads = find_quads(&mask, &self.params.quad);
        for quad in &quads {
            match self.decoder.decode(gray, quad, &self.matcher) {
                Some(m) => {
                    debug!(
                        "marker {} rot={} hamming={} border={:.2}",
                        m.id, m.rotation, m.hamming, m.border_score
                    );
                    result.markers.push(DetectedMarker {
                        id: m.id,
                        corners: to_f32(&m.corners),
                    });
                }
                None => result.rejected.push(to_f32(quad)),
            }
        }

        debug!(
            "threshold={} quads={} accepted={} rejected={}",
            mask.threshold,
            quads.len(),
            result.markers.len(),
            result.rejected.len()
        );
        result
    }
}

impl MarkerDetector for ArucoDetector {
    fn detect(&self, image: &BgrImage) -> MarkerDetectionResult {
        let gray = image.to_gray();
        self.detect_gray(&gray.view())
    }
}

fn to_f32(q: &[Point2<f64>; 4]) -> MarkerCorners {
    q.map(|p| Point2::new(p.x as f32, p.y as f32))
}
