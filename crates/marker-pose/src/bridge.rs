//! Conversion between transport frames and working buffers.

use crate::transport::{Header, ImageMessage};
use marker_pose_core::BgrImage;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported image encoding {0:?}")]
    UnsupportedEncoding(String),
    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("row step {step} is shorter than {min} bytes")]
    StepTooSmall { step: u32, min: usize },
    #[error("image buffer holds {got} bytes, expected at least {expected}")]
    BufferTooShort { expected: usize, got: usize },
}

/// Pixel layouts accepted on the input stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageEncoding {
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
    Mono8,
}

impl ImageEncoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bgr8" => Some(Self::Bgr8),
            "rgb8" => Some(Self::Rgb8),
            "bgra8" => Some(Self::Bgra8),
            "rgba8" => Some(Self::Rgba8),
            "mono8" => Some(Self::Mono8),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bgr8 => "bgr8",
            Self::Rgb8 => "rgb8",
            Self::Bgra8 => "bgra8",
            Self::Rgba8 => "rgba8",
            Self::Mono8 => "mono8",
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Bgr8 | Self::Rgb8 => 3,
            Self::Bgra8 | Self::Rgba8 => 4,
        }
    }

    #[inline]
    fn to_bgr(self, px: &[u8]) -> [u8; 3] {
        match self {
            Self::Bgr8 | Self::Bgra8 => [px[0], px[1], px[2]],
            Self::Rgb8 | Self::Rgba8 => [px[2], px[1], px[0]],
            Self::Mono8 => [px[0]; 3],
        }
    }
}

/// Decode a frame into an owned BGR buffer.
///
/// Row padding (`step > width * channels`) is dropped.
pub fn to_bgr8(msg: &ImageMessage) -> Result<BgrImage, DecodeError> {
    let enc = ImageEncoding::parse(&msg.encoding)
        .ok_or_else(|| DecodeError::UnsupportedEncoding(msg.encoding.clone()))?;
    if msg.width == 0 || msg.height == 0 {
        return Err(DecodeError::EmptyImage {
            width: msg.width,
            height: msg.height,
        });
    }

    let width = msg.width as usize;
    let height = msg.height as usize;
    let row_bytes = width * enc.channels();
    let step = msg.step as usize;
    if step < row_bytes {
        return Err(DecodeError::StepTooSmall {
            step: msg.step,
            min: row_bytes,
        });
    }
    let expected = step * height;
    if msg.data.len() < expected {
        return Err(DecodeError::BufferTooShort {
            expected,
            got: msg.data.len(),
        });
    }

    let mut data = Vec::with_capacity(width * height * BgrImage::CHANNELS);
    for row in msg.data.chunks_exact(step).take(height) {
        for px in row[..row_bytes].chunks_exact(enc.channels()) {
            data.extend_from_slice(&enc.to_bgr(px));
        }
    }
    Ok(BgrImage {
        width,
        height,
        data,
    })
}

/// Encode a BGR buffer as a tightly packed `bgr8` frame.
pub fn from_bgr8(img: &BgrImage, header: Header) -> ImageMessage {
    ImageMessage {
        header,
        height: img.height as u32,
        width: img.width as u32,
        encoding: ImageEncoding::Bgr8.as_str().to_string(),
        is_bigendian: false,
        step: (img.width * BgrImage::CHANNELS) as u32,
        data: img.data.clone(),
    }
}

/// Wrap an `image` RGB buffer as an `rgb8` frame.
pub fn from_rgb_image(img: &image::RgbImage, header: Header) -> ImageMessage {
    ImageMessage {
        header,
        height: img.height(),
        width: img.width(),
        encoding: ImageEncoding::Rgb8.as_str().to_string(),
        is_bigendian: false,
        step: img.width() * 3,
        data: img.as_raw().clone(),
    }
}

pub fn to_rgb_image(img: &BgrImage) -> Option<image::RgbImage> {
    let data = img
        .data
        .chunks_exact(BgrImage::CHANNELS)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect();
    image::RgbImage::from_raw(img.width as u32, img.height as u32, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(encoding: &str, width: u32, height: u32, step: u32, data: Vec<u8>) -> ImageMessage {
        ImageMessage {
            header: Header::default(),
            height,
            width,
            encoding: encoding.into(),
            is_bigendian: false,
            step,
            data,
        }
    }

    #[test]
    fn rgb_is_swapped_to_bgr() {
        let img = to_bgr8(&msg("rgb8", 1, 1, 3, vec![10, 20, 30])).expect("decode");
        assert_eq!(img.data, vec![30, 20, 10]);
    }

    #[test]
    fn padded_rows_and_alpha_are_dropped() {
        // 2x2 bgra8 with 2 bytes of padding per row
        let data = vec![
            1, 2, 3, 255, 4, 5, 6, 255, 0, 0, //
            7, 8, 9, 255, 10, 11, 12, 255, 0, 0,
        ];
        let img = to_bgr8(&msg("bgra8", 2, 2, 10, data)).expect("decode");
        assert_eq!(img.data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn mono_is_replicated() {
        let img = to_bgr8(&msg("mono8", 2, 1, 2, vec![5, 200])).expect("decode");
        assert_eq!(img.data, vec![5, 5, 5, 200, 200, 200]);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert_eq!(
            to_bgr8(&msg("yuv422", 1, 1, 2, vec![0, 0])),
            Err(DecodeError::UnsupportedEncoding("yuv422".into()))
        );
        assert!(matches!(
            to_bgr8(&msg("bgr8", 0, 4, 0, vec![])),
            Err(DecodeError::EmptyImage { .. })
        ));
        assert!(matches!(
            to_bgr8(&msg("bgr8", 4, 1, 8, vec![0; 12])),
            Err(DecodeError::StepTooSmall { step: 8, min: 12 })
        ));
        assert!(matches!(
            to_bgr8(&msg("bgr8", 2, 2, 6, vec![0; 11])),
            Err(DecodeError::BufferTooShort {
                expected: 12,
                got: 11
            })
        ));
    }

    #[test]
    fn bgr_round_trip_keeps_header() {
        let mut img = BgrImage::new(3, 2, [0, 0, 0]);
        img.put_pixel(2, 1, [1, 2, 3]);
        let header = Header {
            seq: 9,
            ..Header::default()
        };
        let out = from_bgr8(&img, header.clone());
        assert_eq!(out.header, header);
        assert_eq!(out.step, 9);
        assert_eq!(to_bgr8(&out).expect("decode"), img);
    }
}
