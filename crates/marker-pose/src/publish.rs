//! Outbound message sinks.

use crate::bridge::{to_bgr8, to_rgb_image, DecodeError};
use crate::transport::ImageMessage;
use serde::Serialize;
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("cannot encode outgoing frame: {0}")]
    Frame(#[from] DecodeError),
    #[error("frame on {topic} does not match its dimensions")]
    FrameSize { topic: String },
}

/// A named outbound stream of `M` messages.
pub trait Publisher<M> {
    fn topic(&self) -> &str;
    fn publish(&mut self, msg: &M) -> Result<(), PublishError>;
}

/// Keeps every published message in memory.
///
/// Clones share the same buffer, so a clone handed to the pipeline can be
/// inspected through any other handle.
#[derive(Debug)]
pub struct RecordingPublisher<M> {
    topic: String,
    messages: Rc<RefCell<Vec<M>>>,
}

impl<M> Clone for RecordingPublisher<M> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            messages: Rc::clone(&self.messages),
        }
    }
}

impl<M: Clone> RecordingPublisher<M> {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            messages: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn messages(&self) -> Vec<M> {
        self.messages.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl<M: Clone> Publisher<M> for RecordingPublisher<M> {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, msg: &M) -> Result<(), PublishError> {
        self.messages.borrow_mut().push(msg.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a, M> {
    topic: &'a str,
    msg: &'a M,
}

/// Writes one `{"topic": ..., "msg": ...}` JSON record per line.
pub struct JsonLinesPublisher<W: Write> {
    topic: String,
    writer: W,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(topic: impl Into<String>, writer: W) -> Self {
        Self {
            topic: topic.into(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesPublisher<BufWriter<File>> {
    pub fn create(topic: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let file = File::create(path)?;
        Ok(Self::new(topic, BufWriter::new(file)))
    }
}

impl<M: Serialize, W: Write> Publisher<M> for JsonLinesPublisher<W> {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, msg: &M) -> Result<(), PublishError> {
        let line = JsonLine {
            topic: &self.topic,
            msg,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Saves every frame as `frame_<seq>.png` in a directory.
#[derive(Debug)]
pub struct ImageFilePublisher {
    topic: String,
    dir: PathBuf,
}

impl ImageFilePublisher {
    pub fn create(topic: impl Into<String>, dir: impl Into<PathBuf>) -> Result<Self, PublishError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            topic: topic.into(),
            dir,
        })
    }

    pub fn frame_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("frame_{seq:06}.png"))
    }
}

impl Publisher<ImageMessage> for ImageFilePublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, msg: &ImageMessage) -> Result<(), PublishError> {
        let bgr = to_bgr8(msg)?;
        let rgb = to_rgb_image(&bgr).ok_or_else(|| PublishError::FrameSize {
            topic: self.topic.clone(),
        })?;
        rgb.save(self.frame_path(msg.header.seq))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::from_bgr8;
    use crate::transport::{Header, PoseMessage};
    use marker_pose_core::BgrImage;

    #[test]
    fn recording_clones_share_messages() {
        let rec = RecordingPublisher::<u32>::new("/numbers");
        let mut handle = rec.clone();
        handle.publish(&1).expect("publish");
        handle.publish(&2).expect("publish");
        assert_eq!(rec.messages(), vec![1, 2]);
        assert_eq!(handle.topic(), "/numbers");
    }

    #[test]
    fn json_lines_writes_one_record_per_message() {
        let mut publisher = JsonLinesPublisher::new("/marker_detection/pose/tvec", Vec::new());
        for id in [4u32, 9] {
            let msg = PoseMessage {
                header: Header::default(),
                marker_id: id,
                vector: Default::default(),
            };
            publisher.publish(&msg).expect("publish");
        }
        let text = String::from_utf8(publisher.into_inner()).expect("utf8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["topic"], "/marker_detection/pose/tvec");
        assert_eq!(lines[1]["msg"]["marker_id"], 9);
    }

    #[test]
    fn image_files_are_named_by_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut publisher = ImageFilePublisher::create("/out", dir.path()).expect("create");
        let img = BgrImage::new(4, 3, [0, 0, 255]);
        let header = Header {
            seq: 12,
            ..Header::default()
        };
        publisher.publish(&from_bgr8(&img, header)).expect("publish");

        let saved = image::open(dir.path().join("frame_000012.png"))
            .expect("png")
            .to_rgb8();
        assert_eq!(saved.dimensions(), (4, 3));
        assert_eq!(saved.get_pixel(0, 0).0, [255, 0, 0]);
    }
}
