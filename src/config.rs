//! Configuration management for the head pose tracker

use crate::{
    constants::FACE_BOX_SHIFT_RATIO,
    pipeline::PipelineConfig,
    pose_estimation::SolverConfig,
    stabilizer::{AdaptiveConfig, NoisePair, StabilizerConfig},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    pub models: ModelConfig,

    /// Face detection configuration
    pub face_detection: FaceDetectionConfig,

    /// Landmark and pose stabilizer configuration
    pub stabilizer: StabilizerSection,

    /// Moving/still covariance switching
    pub adaptive: AdaptiveConfig,

    /// Pose solver configuration
    pub solver: SolverConfig,

    /// Display configuration
    pub display: DisplayConfig,
}

/// Model file paths configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Face detector network definition (Caffe prototxt)
    pub face_detector_prototxt: PathBuf,

    /// Face detector weights (Caffe model)
    pub face_detector_weights: PathBuf,

    /// Path to facial landmarks ONNX model
    pub face_landmarks: PathBuf,

    /// Optional 68-point 3D face model; the built-in six-point model is used when unset
    pub face_model_3d: Option<PathBuf>,
}

/// Face detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Confidence threshold for face detection (0.0-1.0)
    pub confidence_threshold: f32,

    /// Downward box shift as a fraction of the box height
    pub box_shift: f64,
}

/// Stabilizer parameters for landmarks and pose components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerSection {
    /// One per landmark (2D point)
    pub point: StabilizerConfig,

    /// One per pose component (scalar)
    pub pose: StabilizerConfig,
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Preview window title
    pub window_name: String,

    /// Mirror webcam frames horizontally
    pub mirror: bool,

    /// Milliseconds to wait for a key press per frame
    pub wait_key_ms: i32,

    /// Draw regressor landmarks
    pub show_raw_marks: bool,

    /// Draw stabilized landmarks
    pub show_stable_marks: bool,

    /// Draw the annotation box from the smoothed pose
    pub annotate_with_smoothed_pose: bool,

    /// Show dense optical flow around the outer left eye corner in a second window
    pub show_eye_flow: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector_prototxt: PathBuf::from("assets/deploy.prototxt"),
            face_detector_weights: PathBuf::from("assets/res10_300x300_ssd_iter_140000.caffemodel"),
            face_landmarks: PathBuf::from("assets/face_landmarks.onnx"),
            face_model_3d: None,
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            box_shift: FACE_BOX_SHIFT_RATIO,
        }
    }
}

impl Default for StabilizerSection {
    fn default() -> Self {
        Self {
            point: StabilizerConfig::point(),
            pose: StabilizerConfig::pose(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_name: "Preview".to_string(),
            mirror: true,
            wait_key_ms: 10,
            show_raw_marks: false,
            show_stable_marks: false,
            annotate_with_smoothed_pose: false,
            show_eye_flow: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text is not a valid configuration.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Pipeline parameters derived from this configuration
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            point_stabilizer: self.stabilizer.point,
            pose_stabilizer: self.stabilizer.pose,
            solver: self.solver,
            adaptive: self.adaptive,
            face_box_shift: self.face_detection.box_shift,
            annotate_with_smoothed_pose: self.display.annotate_with_smoothed_pose,
            show_raw_marks: self.display.show_raw_marks,
            show_stable_marks: self.display.show_stable_marks,
        }
    }

    /// Validate parameter values
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.face_detection.confidence_threshold) {
            return Err(Error::ConfigError(
                "Confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.face_detection.box_shift) {
            return Err(Error::ConfigError("Box shift must be in [0.0, 1.0)".to_string()));
        }

        for (name, stabilizer) in [("point", &self.stabilizer.point), ("pose", &self.stabilizer.pose)] {
            stabilizer
                .build()
                .map_err(|e| Error::ConfigError(format!("Invalid {name} stabilizer: {e}")))?;
        }
        if self.stabilizer.point.measure_num != 2 {
            return Err(Error::ConfigError("Point stabilizers must measure 2 values".to_string()));
        }
        if self.stabilizer.pose.measure_num != 1 {
            return Err(Error::ConfigError("Pose stabilizers must measure 1 value".to_string()));
        }

        if self.adaptive.window_size == 0 {
            return Err(Error::ConfigError("Adaptive window size must be greater than 0".to_string()));
        }
        if !(self.adaptive.threshold_ratio.is_finite() && self.adaptive.threshold_ratio > 0.0) {
            return Err(Error::ConfigError("Adaptive threshold ratio must be positive".to_string()));
        }
        for (name, noise) in [("moving", &self.adaptive.moving), ("still", &self.adaptive.still)] {
            if !is_valid_noise(noise) {
                return Err(Error::ConfigError(format!(
                    "Adaptive {name} covariances must be positive and finite"
                )));
            }
        }

        if self.solver.max_iterations == 0 {
            return Err(Error::ConfigError("Solver iterations must be greater than 0".to_string()));
        }
        if !(self.solver.tolerance > 0.0 && self.solver.initial_damping > 0.0) {
            return Err(Error::ConfigError(
                "Solver tolerance and damping must be positive".to_string(),
            ));
        }

        if self.display.wait_key_ms <= 0 {
            return Err(Error::ConfigError("Key wait must be at least 1 ms".to_string()));
        }

        Ok(())
    }

    /// Check that every configured model file exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for the first missing file.
    pub fn validate_model_paths(&self) -> Result<()> {
        let required = [
            ("Face detector network", &self.models.face_detector_prototxt),
            ("Face detector weights", &self.models.face_detector_weights),
            ("Face landmarks model", &self.models.face_landmarks),
        ];
        for (name, path) in required.into_iter().chain(
            self.models
                .face_model_3d
                .as_ref()
                .map(|p| ("3D face model", p)),
        ) {
            if !path.exists() {
                return Err(Error::ConfigError(format!("{name} not found: {}", path.display())));
            }
        }
        Ok(())
    }
}

fn is_valid_noise(noise: &NoisePair) -> bool {
    noise.cov_process.is_finite() && noise.cov_process > 0.0 && noise.cov_measure.is_finite() && noise.cov_measure > 0.0
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Head Pose Tracker Configuration

# Model paths
models:
  face_detector_prototxt: "assets/deploy.prototxt"
  face_detector_weights: "assets/res10_300x300_ssd_iter_140000.caffemodel"
  face_landmarks: "assets/face_landmarks.onnx"
  # face_model_3d: "assets/model.txt"

# Face detection parameters
face_detection:
  confidence_threshold: 0.9
  box_shift: 0.1

# Kalman stabilizers
stabilizer:
  point:
    state_num: 4
    measure_num: 2
    cov_process: 0.001
    cov_measure: 0.1
  pose:
    state_num: 2
    measure_num: 1
    cov_process: 0.01
    cov_measure: 0.1

# Moving/still covariance switching
adaptive:
  enabled: false
  window_size: 5
  threshold_ratio: 0.005
  hysteresis_frames: 3
  moving:
    cov_process: 0.1
    cov_measure: 0.01
  still:
    cov_process: 0.0001
    cov_measure: 0.1

# PnP solver
solver:
  max_iterations: 100
  tolerance: 1.0e-8
  initial_damping: 1.0e-3

# Display settings
display:
  window_name: "Preview"
  mirror: true
  wait_key_ms: 10
  show_raw_marks: false
  show_stable_marks: false
  annotate_with_smoothed_pose: false
  show_eye_flow: false
"#;
