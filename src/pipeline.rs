//! Per-frame orchestration of detection, stabilization and pose recovery.
//!
//! The pipeline owns the 68 landmark stabilizers, the 6 pose stabilizers and
//! the pose solver. Frame capture, face detection, landmark regression and
//! display are collaborators supplied by the caller through the traits below.

use image::RgbImage;
use log::{debug, info, warn};
use nalgebra::Point2;

use crate::{
    constants::{ESCAPE_KEY, FACE_BOX_SHIFT_RATIO, LANDMARK_INPUT_SIZE},
    landmarks::{FaceBox, LandmarkSet},
    movement_detector::{MotionClassifier, MovementDetector},
    pose_estimation::{project_annotation, CameraModel, FaceModel3D, Pose, PoseSolver, SolverConfig},
    render::{draw_annotation_box, draw_marks, ANNOTATION_COLOR, ANNOTATION_LINE_WIDTH, RAW_MARK_COLOR, STABLE_MARK_COLOR},
    stabilizer::{AdaptiveConfig, AdaptiveTuner, LandmarkStabilizers, MotionRegime, PoseStabilizers, StabilizerConfig},
    utils::{crop_face, prepare_face_box},
    Error, Result,
};

/// 8-bit RGB video frame
pub type Frame = RgbImage;

/// Supplies video frames
pub trait FrameSource {
    /// Next frame, `None` at end of stream
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be read.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Locates the face in a frame
pub trait FaceDetector {
    /// Bounding box of the most confident face, if any
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceBox>>;
}

/// Regresses 68 landmarks from a face crop
pub trait LandmarkRegressor {
    /// Landmarks of a 128×128 RGB face crop in crop-normalized `[0, 1]` coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn regress(&mut self, face: &Frame) -> Result<LandmarkSet>;
}

/// Presents rendered frames and reports key presses
pub trait DisplaySink {
    /// Present a rendered frame
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be shown.
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Present everything derived from `input`; shows the rendered frame by default
    ///
    /// # Errors
    ///
    /// Returns an error if the output could not be shown.
    fn present(&mut self, _input: &Frame, output: &FrameOutput) -> Result<()> {
        self.show(&output.rendered)
    }

    /// Key pressed since the last poll, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the window system fails.
    fn poll_key(&mut self) -> Result<Option<i32>>;
}

/// Whether `key` ends the processing loop (ESC or `q`)
#[must_use]
pub fn is_termination_key(key: i32) -> bool {
    key == ESCAPE_KEY || key == i32::from(b'q')
}

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, no frame processed yet
    Idle,
    /// Looking for a face in the current frame
    Detecting,
    /// Last frame had no usable face
    NoFace,
    /// Last frame had a face and landmarks
    Tracking,
    /// Loop ended; no further frames are accepted
    Terminated,
}

/// Pipeline construction parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Parameters of each of the 68 landmark stabilizers
    pub point_stabilizer: StabilizerConfig,
    /// Parameters of each of the 6 pose stabilizers
    pub pose_stabilizer: StabilizerConfig,
    /// Pose solver parameters
    pub solver: SolverConfig,
    /// Moving/still covariance switching
    pub adaptive: AdaptiveConfig,
    /// Downward face box shift as a fraction of its height
    pub face_box_shift: f64,
    /// Draw the annotation from the smoothed pose instead of the raw one
    pub annotate_with_smoothed_pose: bool,
    /// Draw regressor landmarks
    pub show_raw_marks: bool,
    /// Draw stabilized landmarks
    pub show_stable_marks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            point_stabilizer: StabilizerConfig::point(),
            pose_stabilizer: StabilizerConfig::pose(),
            solver: SolverConfig::default(),
            adaptive: AdaptiveConfig::default(),
            face_box_shift: FACE_BOX_SHIFT_RATIO,
            annotate_with_smoothed_pose: false,
            show_raw_marks: false,
            show_stable_marks: false,
        }
    }
}

/// Everything the pipeline derived from one frame
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Input frame with annotations drawn
    pub rendered: Frame,
    /// Square crop region, `None` when no face was found
    pub face: Option<FaceBox>,
    /// Regressor landmarks in frame coordinates
    pub raw_marks: Option<LandmarkSet>,
    /// Stabilized landmarks in frame coordinates
    pub stable_marks: Option<LandmarkSet>,
    /// Pose solved from the stabilized landmarks
    pub pose: Option<Pose>,
    /// Pose after per-component stabilization
    pub stable_pose: Option<Pose>,
    /// Projected annotation cuboid
    pub annotation: Option<Vec<Point2<f64>>>,
    /// Motion regime when adaptive stabilization is active
    pub regime: Option<MotionRegime>,
}

impl FrameOutput {
    fn passthrough(frame: &Frame) -> Self {
        Self {
            rendered: frame.clone(),
            face: None,
            raw_marks: None,
            stable_marks: None,
            pose: None,
            stable_pose: None,
            annotation: None,
            regime: None,
        }
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames processed
    pub frames: usize,
    /// Frames with a tracked face
    pub tracked_frames: usize,
    /// Tracked frames without a pose
    pub pose_failures: usize,
}

struct AdaptiveStabilization {
    classifier: Box<dyn MotionClassifier>,
    tuner: AdaptiveTuner,
}

/// Head pose tracking pipeline
pub struct Pipeline {
    config: PipelineConfig,
    mark_stabilizers: LandmarkStabilizers,
    pose_stabilizers: PoseStabilizers,
    solver: PoseSolver,
    face_model: FaceModel3D,
    adaptive: Option<AdaptiveStabilization>,
    previous_pose: Option<Pose>,
    state: PipelineState,
}

impl Pipeline {
    /// Build the stabilizer banks and the solver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a stabilizer configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        info!("Initializing head pose pipeline");
        let mark_stabilizers = LandmarkStabilizers::new(&config.point_stabilizer)?;
        let pose_stabilizers = PoseStabilizers::new(&config.pose_stabilizer)?;
        let solver = PoseSolver::new(config.solver);

        let adaptive = if config.adaptive.enabled {
            info!(
                "Adaptive stabilization enabled (window {}, threshold ratio {})",
                config.adaptive.window_size, config.adaptive.threshold_ratio
            );
            Some(AdaptiveStabilization {
                classifier: Box::new(MovementDetector::new(
                    config.adaptive.window_size,
                    config.adaptive.threshold_ratio,
                    config.adaptive.hysteresis_frames,
                )),
                tuner: AdaptiveTuner::new(config.adaptive.moving, config.adaptive.still),
            })
        } else {
            None
        };

        Ok(Self {
            config,
            mark_stabilizers,
            pose_stabilizers,
            solver,
            face_model: FaceModel3D::standard(),
            adaptive,
            previous_pose: None,
            state: PipelineState::Idle,
        })
    }

    /// Use a different 3D face model
    #[must_use]
    pub fn with_face_model(mut self, face_model: FaceModel3D) -> Self {
        self.face_model = face_model;
        self
    }

    /// Enable adaptive stabilization with a custom motion classifier
    #[must_use]
    pub fn with_motion_classifier(mut self, classifier: Box<dyn MotionClassifier>) -> Self {
        self.adaptive = Some(AdaptiveStabilization {
            classifier,
            tuner: AdaptiveTuner::new(self.config.adaptive.moving, self.config.adaptive.still),
        });
        self
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Last successfully solved (unsmoothed) pose
    #[must_use]
    pub fn previous_pose(&self) -> Option<&Pose> {
        self.previous_pose.as_ref()
    }

    #[must_use]
    pub fn mark_stabilizers(&self) -> &LandmarkStabilizers {
        &self.mark_stabilizers
    }

    #[must_use]
    pub fn pose_stabilizers(&self) -> &PoseStabilizers {
        &self.pose_stabilizers
    }

    /// Forget all temporal state and return to `Idle`
    pub fn reset(&mut self) {
        self.mark_stabilizers.reset();
        self.pose_stabilizers.reset();
        self.previous_pose = None;
        if let Some(adaptive) = &mut self.adaptive {
            adaptive.classifier.reset();
        }
        self.state = PipelineState::Idle;
    }

    /// Run one detection and tracking step.
    ///
    /// A failed pose solve only drops the pose for this frame; landmarks are
    /// still reported and rendered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator fails, the pipeline is terminated,
    /// or a stabilizer rejects its input.
    pub fn process_frame<D, R>(&mut self, frame: &Frame, detector: &mut D, regressor: &mut R) -> Result<FrameOutput>
    where
        D: FaceDetector + ?Sized,
        R: LandmarkRegressor + ?Sized,
    {
        if self.state == PipelineState::Terminated {
            return Err(Error::InvalidInput("Pipeline already terminated".to_string()));
        }
        self.state = PipelineState::Detecting;

        let (width, height) = frame.dimensions();
        let face = detector
            .detect(frame)?
            .and_then(|raw| prepare_face_box(&raw, width, height, self.config.face_box_shift));

        let Some(face) = face else {
            debug!("No face in frame");
            if let Some(adaptive) = &mut self.adaptive {
                adaptive.classifier.reset();
            }
            self.state = PipelineState::NoFace;
            return Ok(FrameOutput::passthrough(frame));
        };

        let crop = crop_face(frame, &face, LANDMARK_INPUT_SIZE)?;
        let local_marks = regressor.regress(&crop)?;
        let raw_marks = local_marks.to_global(&face);

        let regime = match &mut self.adaptive {
            Some(adaptive) => {
                let regime = adaptive.classifier.classify(&raw_marks, &face);
                adaptive.tuner.apply(regime, &mut self.mark_stabilizers)?;
                Some(regime)
            }
            None => None,
        };

        let stable_marks = self.mark_stabilizers.stabilize_marks(&local_marks)?.to_global(&face);
        self.state = PipelineState::Tracking;

        let camera = CameraModel::from_frame_size(width, height);
        let pose = match self
            .solver
            .solve_pose(&stable_marks, &camera, &self.face_model, self.previous_pose.as_ref())
        {
            Ok(pose) => Some(match &self.previous_pose {
                Some(previous) => pose.aligned_to(previous),
                None => pose,
            }),
            Err(e) if e.is_recoverable() => {
                warn!("Pose estimation failed for this frame: {e}");
                None
            }
            Err(e) => return Err(e),
        };

        let stable_pose = match &pose {
            Some(pose) => {
                self.previous_pose = Some(*pose);
                Some(self.pose_stabilizers.stabilize_pose(pose)?)
            }
            None => None,
        };

        let annotated_pose = if self.config.annotate_with_smoothed_pose {
            stable_pose.as_ref()
        } else {
            pose.as_ref()
        };
        let annotation = annotated_pose.map(|p| project_annotation(p, &camera, &self.face_model));

        let mut rendered = frame.clone();
        if self.config.show_raw_marks {
            draw_marks(&mut rendered, &raw_marks, RAW_MARK_COLOR);
        }
        if self.config.show_stable_marks {
            draw_marks(&mut rendered, &stable_marks, STABLE_MARK_COLOR);
        }
        if let Some(points) = &annotation {
            draw_annotation_box(&mut rendered, points, ANNOTATION_COLOR, ANNOTATION_LINE_WIDTH);
        }

        if let Some(pose) = &stable_pose {
            let angles = pose.euler_angles();
            debug!(
                "Pose: pitch {:.1}, yaw {:.1}, roll {:.1}",
                angles[0], angles[1], angles[2]
            );
        }

        Ok(FrameOutput {
            rendered,
            face: Some(face),
            raw_marks: Some(raw_marks),
            stable_marks: Some(stable_marks),
            pose,
            stable_pose,
            annotation,
            regime,
        })
    }

    /// Process frames until the source is exhausted or a termination key is pressed.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable error raised while processing.
    pub fn run<S, D, R, V>(&mut self, source: &mut S, detector: &mut D, regressor: &mut R, display: &mut V) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        D: FaceDetector + ?Sized,
        R: LandmarkRegressor + ?Sized,
        V: DisplaySink + ?Sized,
    {
        info!("Starting main processing loop");
        let mut summary = RunSummary::default();

        while let Some(frame) = source.next_frame()? {
            let output = self.process_frame(&frame, detector, regressor)?;
            summary.frames += 1;
            if output.face.is_some() {
                summary.tracked_frames += 1;
                if output.pose.is_none() {
                    summary.pose_failures += 1;
                }
            }

            display.present(&frame, &output)?;
            if display.poll_key()?.is_some_and(is_termination_key) {
                info!("Exit requested by user");
                break;
            }
        }

        self.state = PipelineState::Terminated;
        info!(
            "Processed {} frames ({} tracked, {} pose failures)",
            summary.frames, summary.tracked_frames, summary.pose_failures
        );
        Ok(summary)
    }
}
