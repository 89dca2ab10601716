//! Global and per-marker thresholding.

use marker_pose_core::GrayImageView;

/// Otsu threshold over a set of intensities.
///
/// Values `<= threshold` form the dark class.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    otsu_threshold_from_histogram(&hist, samples.len())
}

fn otsu_threshold_from_histogram(hist: &[u32; 256], total: usize) -> u8 {
    let min_v = hist.iter().position(|&h| h > 0).unwrap_or(0);
    let max_v = hist.iter().rposition(|&h| h > 0).unwrap_or(255);
    if min_v == max_v {
        return min_v as u8;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v + max_v) / 2) as u8;
    }

    let total = total as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Dark-pixel mask of a grayscale image.
#[derive(Clone, Debug)]
pub(crate) struct BinaryMask {
    pub width: usize,
    pub height: usize,
    /// Row-major, `true` = dark.
    pub dark: Vec<bool>,
    pub threshold: u8,
}

impl BinaryMask {
    #[inline]
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.width + x]
    }
}

/// Binarize with a whole-image Otsu threshold.
///
/// Returns `None` for images whose intensity range is below `min_contrast`;
/// a flat frame has no markers to find.
pub(crate) fn binarize_otsu(img: &GrayImageView<'_>, min_contrast: u8) -> Option<BinaryMask> {
    let mut hist = [0u32; 256];
    for &v in img.data {
        hist[v as usize] += 1;
    }
    let min_v = hist.iter().position(|&h| h > 0)?;
    let max_v = hist.iter().rposition(|&h| h > 0)?;
    if max_v - min_v < min_contrast as usize {
        return None;
    }

    let threshold = otsu_threshold_from_histogram(&hist, img.data.len());
    let dark = img.data.iter().map(|&v| v <= threshold).collect();
    Some(BinaryMask {
        width: img.width,
        height: img.height,
        dark,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_pose_core::GrayImage;

    #[test]
    fn two_level_samples_split_in_the_middle() {
        let samples = [10u8, 10, 10, 200, 200];
        assert_eq!(otsu_threshold_from_samples(&samples), 105);
    }

    #[test]
    fn bimodal_samples_separate_modes() {
        let mut samples = vec![];
        for v in [20u8, 25, 30] {
            samples.extend(std::iter::repeat(v).take(50));
        }
        for v in [200u8, 210, 220] {
            samples.extend(std::iter::repeat(v).take(50));
        }
        let t = otsu_threshold_from_samples(&samples);
        assert!((30..200).contains(&t), "threshold {t}");
    }

    #[test]
    fn flat_image_is_not_binarized() {
        let img = GrayImage::new(8, 8, 128);
        assert!(binarize_otsu(&img.view(), 20).is_none());
    }

    #[test]
    fn mask_marks_dark_pixels() {
        let mut img = GrayImage::new(4, 1, 240);
        img.data[1] = 15;
        let mask = binarize_otsu(&img.view(), 20).expect("mask");
        assert_eq!(mask.dark, vec![false, true, false, false]);
        assert!(mask.is_dark(1, 0));
    }
}
