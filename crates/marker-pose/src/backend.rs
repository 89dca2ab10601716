//! Builds the detection, pose and drawing collaborators from a config.

use crate::annotate::NativeAxisRenderer;
use crate::config::{Backend, DictionarySpec, PipelineConfig};
use crate::pipeline::FramePipeline;
use log::info;
use marker_pose_aruco::{
    builtin_dictionary, ArucoDetector, Dictionary, DictionaryError, BUILTIN_DICTIONARY_NAMES,
};
use marker_pose_core::{AxisRenderer, MarkerDetector, PoseEstimator};
use marker_pose_estimate::SquarePoseEstimator;

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("dictionary {name:?} is not available in the native backend (built in: {available})")]
    UnknownDictionary { name: String, available: String },
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("the opencv backend requires building with the `opencv` feature")]
    OpencvDisabled,
    #[cfg(feature = "opencv")]
    #[error(transparent)]
    Opencv(#[from] opencv::Error),
    #[cfg(feature = "opencv")]
    #[error("dictionary {0:?} is not a predefined OpenCV dictionary")]
    UnknownOpencvDictionary(String),
}

/// The three collaborators a [`FramePipeline`] is built from.
pub struct Collaborators {
    pub detector: Box<dyn MarkerDetector>,
    pub estimator: Box<dyn PoseEstimator>,
    pub renderer: Box<dyn AxisRenderer>,
}

/// Resolve the dictionary for the native detector.
pub fn load_native_dictionary(spec: &DictionarySpec) -> Result<Dictionary, BackendError> {
    match spec {
        DictionarySpec::Predefined(name) => {
            builtin_dictionary(name).ok_or_else(|| BackendError::UnknownDictionary {
                name: name.clone(),
                available: BUILTIN_DICTIONARY_NAMES.join(", "),
            })
        }
        DictionarySpec::File(path) => Ok(Dictionary::load_json(path)?),
    }
}

pub fn native_collaborators(config: &PipelineConfig) -> Result<Collaborators, BackendError> {
    let dict = load_native_dictionary(&config.dictionary)?;
    info!(
        "native backend: dictionary {} ({} markers, {}x{} bits)",
        dict.name,
        dict.len(),
        dict.marker_size,
        dict.marker_size
    );
    Ok(Collaborators {
        detector: Box::new(ArucoDetector::new(dict)?),
        estimator: Box::new(SquarePoseEstimator::default()),
        renderer: Box::new(NativeAxisRenderer::default()),
    })
}

#[cfg(feature = "opencv")]
fn opencv_collaborators(config: &PipelineConfig) -> Result<Collaborators, BackendError> {
    use crate::opencv_backend::{OpencvAxisRenderer, OpencvDetector, OpencvPoseEstimator};

    let detector = match &config.dictionary {
        DictionarySpec::Predefined(name) => OpencvDetector::named(name)?,
        DictionarySpec::File(path) => OpencvDetector::from_dictionary(&Dictionary::load_json(path)?)?,
    };
    info!("opencv backend: dictionary {:?}", config.dictionary);
    Ok(Collaborators {
        detector: Box::new(detector),
        estimator: Box::new(OpencvPoseEstimator),
        renderer: Box::new(OpencvAxisRenderer::default()),
    })
}

#[cfg(not(feature = "opencv"))]
fn opencv_collaborators(_config: &PipelineConfig) -> Result<Collaborators, BackendError> {
    Err(BackendError::OpencvDisabled)
}

pub fn collaborators(config: &PipelineConfig) -> Result<Collaborators, BackendError> {
    match config.backend {
        Backend::Native => native_collaborators(config),
        Backend::Opencv => opencv_collaborators(config),
    }
}

/// Build a pipeline with the backend selected in `config`.
pub fn build_pipeline(config: PipelineConfig) -> Result<FramePipeline, BackendError> {
    let c = collaborators(&config)?;
    Ok(FramePipeline::new(config, c.detector, c.estimator, c.renderer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_backend_resolves_builtin_names() {
        let dict = load_native_dictionary(&DictionarySpec::default()).expect("default");
        assert_eq!(dict.name, "MARKER_POSE_4X4_250");
        assert_eq!(dict.len(), 250);

        let err = load_native_dictionary(&DictionarySpec::Predefined("DICT_4X4_250".into()))
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownDictionary { ref name, .. } if name == "DICT_4X4_250"));
    }

    #[test]
    fn default_config_builds_a_pipeline() {
        let pipeline = build_pipeline(PipelineConfig::default()).expect("pipeline");
        assert_eq!(pipeline.config().dictionary, DictionarySpec::default());
    }

    #[test]
    fn dictionary_file_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dict.json");
        builtin_dictionary("DEMO_4X4_9")
            .expect("builtin")
            .write_json(&path)
            .expect("write");
        let config = PipelineConfig {
            dictionary: DictionarySpec::File(path),
            ..PipelineConfig::default()
        };
        let pipeline = build_pipeline(config).expect("pipeline");
        assert_eq!(pipeline.config().marker_length, 1.0);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn opencv_backend_needs_the_feature() {
        let config = PipelineConfig {
            backend: Backend::Opencv,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            collaborators(&config),
            Err(BackendError::OpencvDisabled)
        ));
    }
}
