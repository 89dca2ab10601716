//! Inbound frame sources.

use crate::bridge::from_rgb_image;
use crate::transport::{Header, ImageMessage, Timestamp};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no image files found in {0}")]
    NoImages(PathBuf),
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "tif", "tiff", "pnm", "ppm", "pgm",
];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Replays the images of a directory, sorted by file name, as `rgb8`
/// frames.
///
/// Frame `i` gets sequence number `i` and stamp `i / fps` seconds.
#[derive(Debug)]
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    frame_id: String,
    period: Duration,
}

impl ImageDirSource {
    pub fn open(
        dir: impl AsRef<Path>,
        frame_id: impl Into<String>,
        fps: f64,
    ) -> Result<Self, SourceError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(SourceError::InvalidFrameRate(fps));
        }
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if is_image_file(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(SourceError::NoImages(dir.to_path_buf()));
        }
        files.sort();

        Ok(Self {
            files,
            next: 0,
            frame_id: frame_id.into(),
            period: Duration::from_secs_f64(1.0 / fps),
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn load(&self, index: usize) -> Result<ImageMessage, SourceError> {
        let path = &self.files[index];
        let img = image::open(path)
            .map_err(|source| SourceError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let header = Header {
            seq: index as u64,
            stamp: Timestamp::from_duration(self.period * index as u32),
            frame_id: self.frame_id.clone(),
        };
        Ok(from_rgb_image(&img, header))
    }
}

impl Iterator for ImageDirSource {
    type Item = Result<ImageMessage, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.files.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.load(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.files.len() - self.next;
        (left, Some(left))
    }
}
