//! Main application module: OpenCV capture and display around the pipeline.

use crate::{
    config::Config,
    constants::EYE_FLOW_WINDOW_NAME,
    eye_flow::EyeFlowWindow,
    face_detection::CaffeFaceDetector,
    mark_detection::OnnxLandmarkRegressor,
    pipeline::{DisplaySink, Frame, FrameOutput, FrameSource, Pipeline, RunSummary},
    pose_estimation::FaceModel3D,
    utils::image_conversion::{bgr_mat_to_rgb_image, rgb_image_to_bgr_mat},
    Result,
};
use log::{info, warn};
use opencv::{
    core::{self, Mat},
    highgui::{self, WINDOW_NORMAL},
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE},
};

/// Consecutive failed webcam reads tolerated before the stream is treated as ended
const MAX_CAMERA_READ_FAILURES: usize = 30;

/// Video source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// Webcam index
    Camera(i32),
    /// Video file path
    File(String),
}

/// Frames from an OpenCV video capture
pub struct CaptureSource {
    capture: VideoCapture,
    is_file: bool,
    mirror: bool,
}

impl CaptureSource {
    /// Open a webcam or video file.
    ///
    /// `mirror` flips webcam frames horizontally; video files are never mirrored.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be opened.
    pub fn open(source: &VideoSource, mirror: bool) -> Result<Self> {
        let (capture, is_file) = match source {
            VideoSource::Camera(index) => {
                info!("Opening camera {index}");
                let mut capture = VideoCapture::new(*index, videoio::CAP_ANY)?;
                // Reduce buffer size for lower latency
                capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
                (capture, false)
            }
            VideoSource::File(path) => {
                info!("Opening video file: {path}");
                (VideoCapture::from_file(path, videoio::CAP_ANY)?, true)
            }
        };
        if !capture.is_opened()? {
            return Err(crate::Error::InvalidInput(format!("Cannot open video source {source:?}")));
        }
        Ok(Self {
            capture,
            is_file,
            mirror: mirror && !is_file,
        })
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut frame = Mat::default();
        let mut failures = 0;
        while !self.capture.read(&mut frame)? || frame.empty() {
            if self.is_file {
                info!("End of video file reached");
                return Ok(None);
            }
            failures += 1;
            if failures >= MAX_CAMERA_READ_FAILURES {
                warn!("Camera stopped delivering frames");
                return Ok(None);
            }
            warn!("Failed to read frame, retrying...");
        }

        if self.mirror {
            let mut flipped = Mat::default();
            core::flip(&frame, &mut flipped, 1)?;
            frame = flipped;
        }
        bgr_mat_to_rgb_image(&frame).map(Some)
    }
}

/// HighGUI preview window, optionally with the eye flow window
pub struct HighGuiDisplay {
    window_name: String,
    wait_key_ms: i32,
    eye_flow: Option<EyeFlowWindow>,
}

impl HighGuiDisplay {
    /// Create the preview window
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be created.
    pub fn new(window_name: &str, wait_key_ms: i32) -> Result<Self> {
        highgui::named_window(window_name, WINDOW_NORMAL)?;
        Ok(Self {
            window_name: window_name.to_string(),
            wait_key_ms,
            eye_flow: None,
        })
    }

    /// Also show optical flow around the outer left eye corner
    ///
    /// # Errors
    ///
    /// Returns an error if the flow window cannot be created.
    pub fn with_eye_flow(mut self, window_name: &str) -> Result<Self> {
        self.eye_flow = Some(EyeFlowWindow::new(window_name)?);
        Ok(self)
    }
}

impl DisplaySink for HighGuiDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let bgr = rgb_image_to_bgr_mat(frame)?;
        highgui::imshow(&self.window_name, &bgr)?;
        Ok(())
    }

    fn present(&mut self, input: &Frame, output: &FrameOutput) -> Result<()> {
        if let (Some(eye_flow), Some(marks)) = (self.eye_flow.as_mut(), output.raw_marks.as_ref()) {
            eye_flow.update(input, marks)?;
        }
        self.show(&output.rendered)
    }

    fn poll_key(&mut self) -> Result<Option<i32>> {
        let key = highgui::wait_key(self.wait_key_ms)?;
        Ok((key >= 0).then_some(key))
    }
}

impl Drop for HighGuiDisplay {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.window_name) {
            warn!("Failed to close preview window: {e}");
        }
    }
}

/// Loaded inference models, created once and borrowed by every frame
pub struct RuntimeContext {
    pub detector: CaffeFaceDetector,
    pub regressor: OnnxLandmarkRegressor,
}

impl RuntimeContext {
    /// Load the face detector and the landmark regressor
    ///
    /// # Errors
    ///
    /// Returns an error if a model cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            detector: CaffeFaceDetector::new(
                &config.models.face_detector_prototxt,
                &config.models.face_detector_weights,
                config.face_detection.confidence_threshold,
            )?,
            regressor: OnnxLandmarkRegressor::new(&config.models.face_landmarks)?,
        })
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Camera index or video file path
    pub video_source: VideoSource,
    /// Loaded configuration file (or defaults)
    pub config: Config,
}

/// Main application struct
pub struct HeadPoseApp {
    pipeline: Pipeline,
    context: RuntimeContext,
    source: CaptureSource,
    display: HighGuiDisplay,
}

impl HeadPoseApp {
    /// Load models, open the video source and create the preview window
    ///
    /// # Errors
    ///
    /// Returns an error if any component fails to initialize.
    pub fn new(app_config: AppConfig) -> Result<Self> {
        info!("Initializing head pose tracker application");
        let config = &app_config.config;

        let context = RuntimeContext::from_config(config)?;
        let mut pipeline = Pipeline::new(config.pipeline_config())?;
        if let Some(path) = &config.models.face_model_3d {
            pipeline = pipeline.with_face_model(FaceModel3D::from_file(path)?);
        }

        let source = CaptureSource::open(&app_config.video_source, config.display.mirror)?;
        let mut display = HighGuiDisplay::new(&config.display.window_name, config.display.wait_key_ms)?;
        if config.display.show_eye_flow {
            display = display.with_eye_flow(EYE_FLOW_WINDOW_NAME)?;
        }

        Ok(Self {
            pipeline,
            context,
            source,
            display,
        })
    }

    /// Run the main application loop
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable error.
    pub fn run(&mut self) -> Result<RunSummary> {
        let summary = self.pipeline.run(
            &mut self.source,
            &mut self.context.detector,
            &mut self.context.regressor,
            &mut self.display,
        )?;
        info!("Application shutting down");
        Ok(summary)
    }
}
