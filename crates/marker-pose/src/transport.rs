//! Messages exchanged with the transport layer.
//!
//! Field layout follows the usual robotics middleware image and vector
//! messages so records can be bridged without translation.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub nanosec: u32,
}

impl Timestamp {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            nanosec: d.subsec_nanos(),
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::new(self.sec, self.nanosec)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub seq: u64,
    pub stamp: Timestamp,
    pub frame_id: String,
}

/// A raw image frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    /// Pixel layout name, e.g. `bgr8` or `mono8`.
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3Message {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vector3<f64>> for Vector3Message {
    fn from(v: Vector3<f64>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vector3Message> for Vector3<f64> {
    fn from(v: Vector3Message) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

/// One rotation or translation vector of a marker pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseMessage {
    /// Header of the frame the marker was seen in.
    pub header: Header,
    pub marker_id: u32,
    pub vector: Vector3Message,
}
