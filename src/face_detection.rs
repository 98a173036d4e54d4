//! Face detection with the OpenCV DNN module.
//!
//! Runs the ResNet-10 SSD face detector (Caffe format, 300×300 input) and
//! reports the most confident face above the threshold.

use crate::{
    constants::{FACE_DETECTOR_INPUT_SIZE, FACE_DETECTOR_MEAN},
    landmarks::FaceBox,
    pipeline::{FaceDetector, Frame},
    utils::{
        image_conversion::rgb_image_to_bgr_mat,
        safe_cast::{frame_extent, scale_to_pixel},
    },
    Error, Result,
};
use opencv::{
    core::{Mat, Scalar, Size, CV_32F},
    dnn,
    prelude::*,
};
use std::path::Path;

/// Values per detection row: image id, class, confidence, x1, y1, x2, y2
const DETECTION_ROW_LEN: usize = 7;

/// Single detection in normalized `[0, 1]` frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Detection {
    /// Pixel box in a `width × height` frame
    #[must_use]
    pub fn to_face_box(&self, width: i32, height: i32) -> FaceBox {
        FaceBox::new(
            scale_to_pixel(self.x1, width),
            scale_to_pixel(self.y1, height),
            scale_to_pixel(self.x2, width),
            scale_to_pixel(self.y2, height),
        )
    }
}

/// SSD face detector using the OpenCV DNN module
pub struct CaffeFaceDetector {
    net: dnn::Net,
    confidence_threshold: f32,
}

impl CaffeFaceDetector {
    /// Load the detector network.
    ///
    /// # Errors
    ///
    /// Returns an error if either model file cannot be loaded.
    pub fn new<P: AsRef<Path>>(prototxt: P, weights: P, confidence_threshold: f32) -> Result<Self> {
        log::info!(
            "Initializing face detector: {} / {}",
            prototxt.as_ref().display(),
            weights.as_ref().display()
        );
        let to_str = |p: &Path| {
            p.to_str()
                .map(str::to_owned)
                .ok_or_else(|| Error::ModelError(format!("Non UTF-8 model path: {}", p.display())))
        };
        let net = dnn::read_net_from_caffe(&to_str(prototxt.as_ref())?, &to_str(weights.as_ref())?)?;
        if net.empty()? {
            return Err(Error::ModelError("Face detector network is empty".to_string()));
        }
        Ok(Self {
            net,
            confidence_threshold,
        })
    }

    /// All detections above the confidence threshold, most confident first
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    pub fn detect_all(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let bgr = rgb_image_to_bgr_mat(frame)?;
        let [b, g, r] = FACE_DETECTOR_MEAN;
        let blob = dnn::blob_from_image(
            &bgr,
            1.0,
            Size::new(FACE_DETECTOR_INPUT_SIZE, FACE_DETECTOR_INPUT_SIZE),
            Scalar::new(b, g, r, 0.0),
            false,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;

        let mut detections = parse_detections(&output, self.confidence_threshold)?;
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(detections)
    }
}

impl FaceDetector for CaffeFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceBox>> {
        let width = frame_extent(frame.width())?;
        let height = frame_extent(frame.height())?;
        Ok(self
            .detect_all(frame)?
            .first()
            .map(|detection| detection.to_face_box(width, height)))
    }
}

/// Read `[1, 1, N, 7]` SSD output rows above `threshold`
fn parse_detections(output: &Mat, threshold: f32) -> Result<Vec<Detection>> {
    let values = output.data_typed::<f32>()?;
    Ok(rows_above_threshold(values, threshold))
}

fn rows_above_threshold(values: &[f32], threshold: f32) -> Vec<Detection> {
    values
        .chunks_exact(DETECTION_ROW_LEN)
        .filter(|row| row[2] > threshold)
        .map(|row| Detection {
            confidence: row[2],
            x1: row[3],
            y1: row[4],
            x2: row[5],
            y2: row[6],
        })
        .collect()
}
