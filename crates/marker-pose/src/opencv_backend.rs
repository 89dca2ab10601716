//! Collaborators backed by OpenCV's `objdetect` and `calib3d` modules.
//!
//! Frames cross the boundary as continuous `CV_8UC3` matrices copied from
//! and back into [`BgrImage`].

use crate::backend::BackendError;
use log::{error, warn};
use marker_pose_aruco::{builtin_dictionary, Dictionary};
use marker_pose_core::{
    AxisRenderer, BgrImage, CameraModel, DebugDisplay, DetectedMarker, MarkerCorners,
    MarkerDetectionResult, MarkerDetector, MarkerPose, PoseError, PoseEstimator,
};
use marker_pose_estimate::marker_object_points;
use nalgebra::{Point2, Vector3};
use opencv::calib3d;
use opencv::core::{self as cv, Mat, Point2f, Point3f, Scalar, Vector};
use opencv::highgui;
use opencv::objdetect::{self, PredefinedDictionaryType};
use opencv::prelude::*;

fn to_mat(img: &BgrImage) -> opencv::Result<Mat> {
    Mat::from_slice(&img.data)?
        .reshape(3, img.height as i32)?
        .try_clone()
}

fn copy_back(mat: &Mat, img: &mut BgrImage) -> opencv::Result<()> {
    let bytes = mat.data_bytes()?;
    if bytes.len() != img.data.len() {
        return Err(opencv::Error::new(
            cv::StsUnmatchedSizes,
            format!("{} bytes for a {}x{} frame", bytes.len(), img.width, img.height),
        ));
    }
    img.data.copy_from_slice(bytes);
    Ok(())
}

fn camera_mats(camera: &CameraModel) -> opencv::Result<(Mat, Mat)> {
    let k = Mat::from_slice_2d(&camera.camera_matrix)?.try_clone()?;
    let dist = if camera.dist_coeffs.is_empty() {
        Mat::default()
    } else {
        Mat::from_slice(&camera.dist_coeffs)?.try_clone()?
    };
    Ok((k, dist))
}

fn vec3_mat(v: &Vector3<f64>) -> opencv::Result<Mat> {
    Mat::from_slice(&[v.x, v.y, v.z])?.try_clone()
}

fn mat_vec3(m: &Mat) -> opencv::Result<Vector3<f64>> {
    Ok(Vector3::new(
        *m.at::<f64>(0)?,
        *m.at::<f64>(1)?,
        *m.at::<f64>(2)?,
    ))
}

fn predefined_type(name: &str) -> Option<PredefinedDictionaryType> {
    use PredefinedDictionaryType::*;
    Some(match name {
        "DICT_4X4_50" => DICT_4X4_50,
        "DICT_4X4_100" => DICT_4X4_100,
        "DICT_4X4_250" => DICT_4X4_250,
        "DICT_4X4_1000" => DICT_4X4_1000,
        "DICT_5X5_50" => DICT_5X5_50,
        "DICT_5X5_100" => DICT_5X5_100,
        "DICT_5X5_250" => DICT_5X5_250,
        "DICT_5X5_1000" => DICT_5X5_1000,
        "DICT_6X6_50" => DICT_6X6_50,
        "DICT_6X6_100" => DICT_6X6_100,
        "DICT_6X6_250" => DICT_6X6_250,
        "DICT_6X6_1000" => DICT_6X6_1000,
        "DICT_7X7_50" => DICT_7X7_50,
        "DICT_7X7_100" => DICT_7X7_100,
        "DICT_7X7_250" => DICT_7X7_250,
        "DICT_7X7_1000" => DICT_7X7_1000,
        "DICT_ARUCO_ORIGINAL" => DICT_ARUCO_ORIGINAL,
        _ => return None,
    })
}

/// Convert a dictionary to OpenCV's byte list layout.
///
/// OpenCV bit matrices mark white cells with 1, so every code is inverted.
pub(crate) fn opencv_dictionary(dict: &Dictionary) -> Result<objdetect::Dictionary, BackendError> {
    let n = dict.marker_size as i32;
    let mut rows = Vector::<Mat>::new();
    for &code in &dict.codes {
        let white = !code;
        let bits: Vec<u8> = (0..dict.bit_count())
            .map(|i| ((white >> i) & 1) as u8)
            .collect();
        let bits = Mat::from_slice(&bits)?.reshape(1, n)?.try_clone()?;
        rows.push(objdetect::Dictionary::get_byte_list_from_bits(&bits)?);
    }
    let mut bytes_list = Mat::default();
    cv::vconcat(&rows, &mut bytes_list)?;
    Ok(objdetect::Dictionary::new(
        &bytes_list,
        n,
        dict.max_correction_bits as i32,
    )?)
}

/// `cv::aruco::ArucoDetector` with default detector parameters.
pub struct OpencvDetector {
    inner: objdetect::ArucoDetector,
}

impl OpencvDetector {
    fn with_dictionary(dict: &objdetect::Dictionary) -> Result<Self, BackendError> {
        let params = objdetect::DetectorParameters::default()?;
        let refine = objdetect::RefineParameters::new(10.0, 3.0, true)?;
        Ok(Self {
            inner: objdetect::ArucoDetector::new(dict, &params, refine)?,
        })
    }

    /// Detector for one of OpenCV's predefined dictionaries, e.g. `DICT_4X4_250`.
    pub fn predefined(name: &str) -> Result<Self, BackendError> {
        let kind = predefined_type(name)
            .ok_or_else(|| BackendError::UnknownOpencvDictionary(name.to_string()))?;
        Self::with_dictionary(&objdetect::get_predefined_dictionary(kind)?)
    }

    /// OpenCV's predefined dictionaries first, then the ones compiled into
    /// `marker_pose_aruco`.
    pub fn named(name: &str) -> Result<Self, BackendError> {
        if predefined_type(name).is_some() {
            return Self::predefined(name);
        }
        match builtin_dictionary(name) {
            Some(dict) => Self::from_dictionary(&dict),
            None => Err(BackendError::UnknownOpencvDictionary(name.to_string())),
        }
    }

    /// Detector for a custom dictionary (inner bits row-major, black = 1).
    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, BackendError> {
        Self::with_dictionary(&opencv_dictionary(dict)?)
    }

    fn try_detect(&self, image: &BgrImage) -> opencv::Result<MarkerDetectionResult> {
        let mat = to_mat(image)?;
        let mut corners = Vector::<Vector<Point2f>>::new();
        let mut ids = Vector::<i32>::new();
        let mut rejected = Vector::<Vector<Point2f>>::new();
        self.inner
            .detect_markers(&mat, &mut corners, &mut ids, &mut rejected)?;

        let quad = |c: &Vector<Point2f>| -> opencv::Result<MarkerCorners> {
            let mut out = [Point2::new(0.0f32, 0.0); 4];
            for (i, o) in out.iter_mut().enumerate() {
                let p = c.get(i)?;
                *o = Point2::new(p.x, p.y);
            }
            Ok(out)
        };

        let mut result = MarkerDetectionResult::default();
        for (id, c) in ids.iter().zip(corners.iter()) {
            result.markers.push(DetectedMarker {
                id: id as u32,
                corners: quad(&c)?,
            });
        }
        for c in rejected.iter() {
            result.rejected.push(quad(&c)?);
        }
        Ok(result)
    }
}

impl MarkerDetector for OpencvDetector {
    fn detect(&self, image: &BgrImage) -> MarkerDetectionResult {
        self.try_detect(image).unwrap_or_else(|e| {
            error!("opencv marker detection failed: {e}");
            MarkerDetectionResult::default()
        })
    }
}

/// `solvePnP` with the IPPE square solver, one call per marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpencvPoseEstimator;

impl OpencvPoseEstimator {
    fn solve(
        corners: &[MarkerCorners],
        marker_length: f64,
        camera: &CameraModel,
    ) -> opencv::Result<Vec<MarkerPose>> {
        let (k, dist) = camera_mats(camera)?;
        let object: Vector<Point3f> = marker_object_points(marker_length)
            .iter()
            .map(|p| Point3f::new(p.x as f32, p.y as f32, p.z as f32))
            .collect();

        corners
            .iter()
            .map(|c| {
                let image: Vector<Point2f> = c.iter().map(|p| Point2f::new(p.x, p.y)).collect();
                let mut rvec = Mat::default();
                let mut tvec = Mat::default();
                calib3d::solve_pnp(
                    &object,
                    &image,
                    &k,
                    &dist,
                    &mut rvec,
                    &mut tvec,
                    false,
                    calib3d::SOLVEPNP_IPPE_SQUARE,
                )?;
                Ok(MarkerPose::new(mat_vec3(&rvec)?, mat_vec3(&tvec)?))
            })
            .collect()
    }
}

impl PoseEstimator for OpencvPoseEstimator {
    fn estimate(
        &self,
        corners: &[MarkerCorners],
        marker_length: f64,
        camera: &CameraModel,
    ) -> Result<Vec<MarkerPose>, PoseError> {
        if !(marker_length.is_finite() && marker_length > 0.0) {
            return Err(PoseError::InvalidMarkerLength(marker_length));
        }
        camera.validate()?;
        Self::solve(corners, marker_length, camera).map_err(|e| PoseError::Backend(e.to_string()))
    }
}

/// `drawFrameAxes` and `drawDetectedMarkers`.
#[derive(Clone, Debug)]
pub struct OpencvAxisRenderer {
    pub thickness: i32,
}

impl Default for OpencvAxisRenderer {
    fn default() -> Self {
        Self { thickness: 3 }
    }
}

impl OpencvAxisRenderer {
    fn try_draw_axes(
        &self,
        image: &mut BgrImage,
        camera: &CameraModel,
        pose: &MarkerPose,
        length: f64,
    ) -> opencv::Result<()> {
        let mut mat = to_mat(image)?;
        let (k, dist) = camera_mats(camera)?;
        calib3d::draw_frame_axes(
            &mut mat,
            &k,
            &dist,
            &vec3_mat(&pose.rvec)?,
            &vec3_mat(&pose.tvec)?,
            length as f32,
            self.thickness,
        )?;
        copy_back(&mat, image)
    }

    fn try_draw_markers(
        &self,
        image: &mut BgrImage,
        markers: &[DetectedMarker],
    ) -> opencv::Result<()> {
        let mut mat = to_mat(image)?;
        let corners: Vector<Vector<Point2f>> = markers
            .iter()
            .map(|m| m.corners.iter().map(|p| Point2f::new(p.x, p.y)).collect())
            .collect();
        let ids: Vector<i32> = markers.iter().map(|m| m.id as i32).collect();
        objdetect::draw_detected_markers(
            &mut mat,
            &corners,
            &ids,
            Scalar::new(0.0, 255.0, 0.0, 0.0),
        )?;
        copy_back(&mat, image)
    }
}

impl AxisRenderer for OpencvAxisRenderer {
    fn draw_axes(
        &self,
        image: &mut BgrImage,
        camera: &CameraModel,
        pose: &MarkerPose,
        length: f64,
    ) {
        if let Err(e) = self.try_draw_axes(image, camera, pose, length) {
            warn!("drawFrameAxes failed: {e}");
        }
    }

    fn draw_markers(&self, image: &mut BgrImage, markers: &[DetectedMarker]) {
        if let Err(e) = self.try_draw_markers(image, markers) {
            warn!("drawDetectedMarkers failed: {e}");
        }
    }
}

/// HighGUI window refreshed once per frame.
pub struct OpencvDisplay {
    window: String,
}

impl OpencvDisplay {
    pub fn open(window: impl Into<String>) -> Result<Self, BackendError> {
        let window = window.into();
        highgui::named_window(&window, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { window })
    }
}

impl DebugDisplay for OpencvDisplay {
    fn show(&mut self, image: &BgrImage) {
        let shown = to_mat(image)
            .and_then(|mat| highgui::imshow(&self.window, &mat))
            .and_then(|()| highgui::wait_key(3).map(|_| ()));
        if let Err(e) = shown {
            warn!("cannot show frame in {:?}: {e}", self.window);
        }
    }
}

impl Drop for OpencvDisplay {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.window);
    }
}
