//! Constants used throughout the tracker

/// Number of facial landmarks for full face
pub const NUM_FACIAL_LANDMARKS: usize = 68;

/// Number of scalar pose components (3 rotation + 3 translation)
pub const POSE_COMPONENTS: usize = 6;

/// Side length of the square crop fed to the landmark regressor
pub const LANDMARK_INPUT_SIZE: u32 = 128;

/// Total number of 3D model coordinates (68 points × 3 dimensions)
pub const MODEL_POINTS_TOTAL_VALUES: usize = 204;

/// Minimum number of 2D-3D correspondences accepted by the pose solver
pub const MIN_PNP_CORRESPONDENCES: usize = 4;

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Landmark stabilizer defaults (2D point with velocity)
pub const DEFAULT_POINT_STATE_NUM: usize = 4;
pub const DEFAULT_POINT_MEASURE_NUM: usize = 2;
pub const DEFAULT_POINT_COV_PROCESS: f64 = 0.001;
pub const DEFAULT_POINT_COV_MEASURE: f64 = 0.1;

/// Pose stabilizer defaults (scalar with velocity)
pub const DEFAULT_POSE_STATE_NUM: usize = 2;
pub const DEFAULT_POSE_MEASURE_NUM: usize = 1;
pub const DEFAULT_POSE_COV_PROCESS: f64 = 0.01;
pub const DEFAULT_POSE_COV_MEASURE: f64 = 0.1;

/// Noise covariances applied while the head is moving
pub const MOVING_COV_PROCESS: f64 = 0.1;
pub const MOVING_COV_MEASURE: f64 = 0.01;

/// Noise covariances applied while the head is still
pub const STILL_COV_PROCESS: f64 = 0.0001;
pub const STILL_COV_MEASURE: f64 = 0.1;

/// Motion threshold as a fraction of the face box width
pub const DEFAULT_MOTION_THRESHOLD_RATIO: f64 = 0.005;

/// Frames in the motion statistics window
pub const DEFAULT_MOTION_WINDOW: usize = 5;

/// Consecutive frames a new motion regime must persist before switching
pub const DEFAULT_MOTION_HYSTERESIS: usize = 3;

/// Pose solver defaults
pub const DEFAULT_SOLVER_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_SOLVER_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_SOLVER_DAMPING: f64 = 1e-3;

/// Face box is moved down by this fraction of its height before squaring
pub const FACE_BOX_SHIFT_RATIO: f64 = 0.1;

/// SSD face detector input size and per-channel mean (BGR)
pub const FACE_DETECTOR_INPUT_SIZE: i32 = 300;
pub const FACE_DETECTOR_MEAN: [f64; 3] = [104.0, 177.0, 123.0];

/// Side of the square patch watched around the outer left eye corner
pub const EYE_PATCH_SIZE: u32 = 24;

/// Grid spacing and first offset of the flow vectors drawn in the eye patch
pub const EYE_FLOW_GRID_STEP: usize = 6;
pub const EYE_FLOW_GRID_OFFSET: i32 = 2;

/// Side of the upscaled eye patch window and its title
pub const EYE_PATCH_DISPLAY_SIZE: i32 = 512;
pub const EYE_FLOW_WINDOW_NAME: &str = "Eye flow";

/// Key code that terminates the loop
pub const ESCAPE_KEY: i32 = 27;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
