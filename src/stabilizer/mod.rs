//! Temporal stabilization of noisy landmark and pose signals.
//!
//! Every tracked signal gets its own linear Kalman filter. Landmarks use
//! 2D point filters with velocity, pose components use scalar filters with
//! velocity. Filters are grouped in fixed-size banks owned by the pipeline.

/// Kalman filter with a constant-velocity motion model
pub mod kalman;

/// Fixed-size banks of identical stabilizers
pub mod bank;

/// Moving/still regime switching of the noise covariances
pub mod adaptive;

pub use adaptive::{AdaptiveConfig, AdaptiveTuner, MotionRegime, NoisePair};
pub use bank::{LandmarkStabilizers, PoseStabilizers, StabilizerBank};
pub use kalman::Stabilizer;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_POINT_COV_MEASURE, DEFAULT_POINT_COV_PROCESS, DEFAULT_POINT_MEASURE_NUM, DEFAULT_POINT_STATE_NUM,
        DEFAULT_POSE_COV_MEASURE, DEFAULT_POSE_COV_PROCESS, DEFAULT_POSE_MEASURE_NUM, DEFAULT_POSE_STATE_NUM,
    },
    Result,
};

/// Construction parameters of a [`Stabilizer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Model dimensionality (measured values and their derivatives)
    pub state_num: usize,
    /// Number of measured values per update
    pub measure_num: usize,
    /// Process-noise variance broadcast onto the diagonal
    pub cov_process: f64,
    /// Measurement-noise variance broadcast onto the diagonal
    pub cov_measure: f64,
}

impl StabilizerConfig {
    /// Landmark point stabilizer parameters
    #[must_use]
    pub const fn point() -> Self {
        Self {
            state_num: DEFAULT_POINT_STATE_NUM,
            measure_num: DEFAULT_POINT_MEASURE_NUM,
            cov_process: DEFAULT_POINT_COV_PROCESS,
            cov_measure: DEFAULT_POINT_COV_MEASURE,
        }
    }

    /// Pose scalar stabilizer parameters
    #[must_use]
    pub const fn pose() -> Self {
        Self {
            state_num: DEFAULT_POSE_STATE_NUM,
            measure_num: DEFAULT_POSE_MEASURE_NUM,
            cov_process: DEFAULT_POSE_COV_PROCESS,
            cov_measure: DEFAULT_POSE_COV_MEASURE,
        }
    }

    /// Build a stabilizer from these parameters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the parameters are invalid.
    pub fn build(&self) -> Result<Stabilizer> {
        Stabilizer::new(self.state_num, self.measure_num, self.cov_process, self.cov_measure)
    }
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            state_num: 4,
            measure_num: 2,
            cov_process: 1e-4,
            cov_measure: 1e-1,
        }
    }
}
