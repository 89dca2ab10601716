//! Plain 8-bit image buffers.
//!
//! Pixel `(x, y)` has its center at integer coordinates `(x, y)`, the same
//! convention camera intrinsics use.

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Interleaved 3-channel 8-bit image in B, G, R order without row padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BgrImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>, // row-major, len = w*h*3
}

impl BgrImage {
    pub const CHANNELS: usize = 3;

    pub fn new(width: usize, height: usize, fill: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width * height * Self::CHANNELS);
        for _ in 0..width * height {
            data.extend_from_slice(&fill);
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * Self::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Write one pixel; coordinates outside the image are ignored.
    #[inline]
    pub fn put_pixel(&mut self, x: i64, y: i64, bgr: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = (y as usize * self.width + x as usize) * Self::CHANNELS;
        self.data[i..i + 3].copy_from_slice(&bgr);
    }

    /// Luma conversion with BT.601 weights (`0.299 R + 0.587 G + 0.114 B`).
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(Self::CHANNELS)
            .map(|px| {
                let b = px[0] as u32;
                let g = px[1] as u32;
                let r = px[2] as u32;
                // fixed-point weights scaled by 2^14
                ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

#[inline]
pub fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Mean of the 3×3 neighbourhood around the pixel nearest to `(x, y)`.
///
/// Returns `None` when the neighbourhood leaves the image.
pub fn sample_mean_3x3(img: &GrayImageView<'_>, x: f64, y: f64) -> Option<u8> {
    let ix = x.round() as i64;
    let iy = y.round() as i64;
    if ix - 1 < 0 || iy - 1 < 0 || ix + 1 >= img.width as i64 || iy + 1 >= img.height as i64 {
        return None;
    }

    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += get_gray(img, (ix + dx) as i32, (iy + dy) as i32) as u32;
        }
    }
    Some((sum / 9) as u8)
}
