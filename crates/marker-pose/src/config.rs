//! Immutable pipeline configuration.

use marker_pose_core::{CameraModel, CameraModelError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid camera model: {0}")]
    Camera(#[from] CameraModelError),
    #[error("marker_length must be positive and finite, got {0}")]
    InvalidMarkerLength(f64),
    #[error("axis_length must be positive and finite, got {0}")]
    InvalidAxisLength(f64),
    #[error("frame_budget_ms must be positive and finite, got {0}")]
    InvalidFrameBudget(f64),
    #[error("topic {0} must not be empty")]
    EmptyTopic(&'static str),
}

/// Stream names for the inbound frames and the three outbound streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub input_image: String,
    pub output_image: String,
    pub rvec: String,
    pub tvec: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            input_image: "/iris/usb_cam/image_raw".to_string(),
            output_image: "/image_converter/output_video".to_string(),
            rvec: "/marker_detection/pose/rvec".to_string(),
            tvec: "/marker_detection/pose/tvec".to_string(),
        }
    }
}

/// Which marker vocabulary to detect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DictionarySpec {
    /// A named dictionary: one compiled into `marker_pose_aruco` (e.g.
    /// `MARKER_POSE_4X4_250`) or, with the OpenCV backend, one of OpenCV's
    /// predefined ones (e.g. `DICT_4X4_250`).
    Predefined(String),
    /// A JSON dictionary file.
    File(PathBuf),
}

impl Default for DictionarySpec {
    fn default() -> Self {
        Self::Predefined("MARKER_POSE_4X4_250".to_string())
    }
}

/// Implementation of the detection, pose and drawing collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Backend {
    #[default]
    Native,
    Opencv,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: CameraModel,
    pub dictionary: DictionarySpec,
    pub backend: Backend,
    /// Physical marker edge; poses are expressed in the same unit.
    pub marker_length: f64,
    /// Length of the drawn axes, in marker units.
    pub axis_length: f64,
    pub topics: Topics,
    /// Outline accepted markers on the outgoing frame.
    pub draw_markers: bool,
    /// Warn when a frame takes longer than this.
    pub frame_budget_ms: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            camera: CameraModel::default(),
            dictionary: DictionarySpec::default(),
            backend: Backend::default(),
            marker_length: 1.0,
            axis_length: 0.5,
            topics: Topics::default(),
            draw_markers: false,
            frame_budget_ms: None,
        }
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate()?;
        if !positive(self.marker_length) {
            return Err(ConfigError::InvalidMarkerLength(self.marker_length));
        }
        if !positive(self.axis_length) {
            return Err(ConfigError::InvalidAxisLength(self.axis_length));
        }
        if let Some(budget) = self.frame_budget_ms {
            if !positive(budget) {
                return Err(ConfigError::InvalidFrameBudget(budget));
            }
        }
        let topics = [
            ("input_image", &self.topics.input_image),
            ("output_image", &self.topics.output_image),
            ("rvec", &self.topics.rvec),
            ("tvec", &self.topics.tvec),
        ];
        if let Some((name, _)) = topics.iter().find(|(_, t)| t.is_empty()) {
            return Err(ConfigError::EmptyTopic(*name));
        }
        Ok(())
    }

    /// Load and validate a JSON config; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_simulated_camera_setup() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.camera.camera_matrix[0][0], 277.191356);
        assert_eq!(cfg.camera.camera_matrix[1][2], 240.5);
        assert_eq!(cfg.camera.dist_coeffs, vec![0.0; 4]);
        assert_eq!(cfg.marker_length, 1.0);
        assert_eq!(cfg.axis_length, 0.5);
        assert_eq!(cfg.topics.rvec, "/marker_detection/pose/rvec");
        assert_eq!(
            cfg.dictionary,
            DictionarySpec::Predefined("MARKER_POSE_4X4_250".into())
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"marker_length": 0.15, "dictionary": {"file": "dict.json"}, "backend": "opencv"}"#,
        )
        .expect("parse");
        assert_eq!(cfg.marker_length, 0.15);
        assert_eq!(cfg.dictionary, DictionarySpec::File("dict.json".into()));
        assert_eq!(cfg.backend, Backend::Opencv);
        assert_eq!(cfg.topics, Topics::default());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cfg = PipelineConfig {
            marker_length: -1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidMarkerLength(_))
        ));

        let mut cfg = PipelineConfig::default();
        cfg.topics.tvec.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyTopic("tvec"))));

        let cfg = PipelineConfig {
            frame_budget_ms: Some(0.0),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidFrameBudget(_))
        ));
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pipeline.json");
        let cfg = PipelineConfig {
            draw_markers: true,
            frame_budget_ms: Some(33.0),
            ..PipelineConfig::default()
        };
        cfg.write_json(&path).expect("write");
        assert_eq!(PipelineConfig::load_json(&path).expect("load"), cfg);
    }
}
