//! Real-time head pose tracking with temporal stabilization.
//!
//! The tracking pipeline consists of:
//! 1. Face detection to locate the face in the frame
//! 2. Facial landmark regression to find 68 key points
//! 3. Kalman stabilization of every landmark
//! 4. Pose recovery with a `PnP` (Perspective-n-Point) solver
//! 5. Kalman stabilization of the six pose components
//!
//! Detection and regression are pluggable through the traits in
//! [`pipeline`]. OpenCV and ONNX Runtime implementations live behind the
//! `runtime` cargo feature.
//!
//! # Examples
//!
//! ## Stabilizing a signal
//!
//! ```
//! use head_pose_tracker::stabilizer::Stabilizer;
//!
//! # fn main() -> head_pose_tracker::Result<()> {
//! // Scalar signal with velocity
//! let mut stabilizer = Stabilizer::new(2, 1, 0.01, 0.1)?;
//! for measurement in [10.0, 10.4, 9.8, 10.1] {
//!     let smoothed = stabilizer.update(&[measurement])?;
//!     println!("{measurement:.1} -> {:.2}", smoothed[0]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Solving a pose
//!
//! ```no_run
//! use head_pose_tracker::{
//!     landmarks::LandmarkSet,
//!     pose_estimation::{CameraModel, FaceModel3D, PoseSolver},
//! };
//!
//! # fn main() -> head_pose_tracker::Result<()> {
//! # let marks = LandmarkSet::from_flat(&[0.0; 136])?;
//! let camera = CameraModel::from_frame_size(640, 480);
//! let model = FaceModel3D::standard();
//! let pose = PoseSolver::default().solve_pose(&marks, &camera, &model, None)?;
//! let angles = pose.euler_angles();
//! println!("Pitch: {:.2}°, Yaw: {:.2}°, Roll: {:.2}°", angles[0], angles[1], angles[2]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the pipeline
//!
//! ```no_run
//! use head_pose_tracker::{
//!     landmarks::{FaceBox, LandmarkSet},
//!     pipeline::{FaceDetector, Frame, LandmarkRegressor, Pipeline, PipelineConfig},
//! };
//!
//! struct Detector;
//! impl FaceDetector for Detector {
//!     fn detect(&mut self, _frame: &Frame) -> head_pose_tracker::Result<Option<FaceBox>> {
//!         Ok(Some(FaceBox::new(200, 100, 400, 300)))
//!     }
//! }
//!
//! struct Regressor;
//! impl LandmarkRegressor for Regressor {
//!     fn regress(&mut self, _face: &Frame) -> head_pose_tracker::Result<LandmarkSet> {
//!         LandmarkSet::from_flat(&[0.5; 136])
//!     }
//! }
//!
//! # fn main() -> head_pose_tracker::Result<()> {
//! let mut pipeline = Pipeline::new(PipelineConfig::default())?;
//! let frame = Frame::new(640, 480);
//! let output = pipeline.process_frame(&frame, &mut Detector, &mut Regressor)?;
//! if let Some(pose) = output.stable_pose {
//!     println!("Rotation: {:?}", pose.rotation);
//! }
//! # Ok(())
//! # }
//! ```

/// Kalman-filter stabilizers and their banks
pub mod stabilizer;

/// Face boxes and landmark sets
pub mod landmarks;

/// Head pose recovery using `PnP`
pub mod pose_estimation;

/// Per-frame orchestration and collaborator traits
pub mod pipeline;

/// Motion classification for adaptive stabilization
pub mod movement_detector;

/// Drawing of landmarks and pose annotation
pub mod render;

/// Optical flow around the outer eye corner
pub mod eye_flow;

/// Face box preparation and numeric conversions
pub mod utils;

/// Error types and result handling
pub mod error;

/// Constants used throughout the tracker
pub mod constants;

/// Configuration management
pub mod config;

/// Face detection with the OpenCV DNN module
#[cfg(feature = "runtime")]
pub mod face_detection;

/// Facial landmark regression with `ONNX` Runtime
#[cfg(feature = "runtime")]
pub mod mark_detection;

/// Capture, display and application wiring
#[cfg(feature = "runtime")]
pub mod app;

pub use error::{Error, Result};
