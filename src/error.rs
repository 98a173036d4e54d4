//! Error types for the head pose tracker.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[cfg(feature = "runtime")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[cfg(feature = "runtime")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Stabilizer constructed or reconfigured with invalid parameters
    #[error("Stabilizer configuration error: {0}")]
    Configuration(String),

    /// Measurement fed to a stabilizer has the wrong number of values
    #[error("Dimension mismatch: stabilizer expects {expected} measured values, got {actual}")]
    DimensionMismatch {
        /// Number of values the stabilizer measures
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },

    /// PnP refinement did not converge for this frame
    #[error("Pose solve failed after {iterations} iterations: {reason}")]
    PoseSolve {
        /// Iterations spent before giving up
        iterations: usize,
        /// What went wrong
        reason: String,
    },

    /// Not enough usable 2D-3D correspondences for PnP
    #[error("PnP requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences
        required: usize,
        /// Usable correspondences found
        actual: usize,
    },

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model loading or inference error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Model output processing error
    #[error("Model output error: {0}")]
    ModelOutputError(String),

    /// Numerical failure inside a filter
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether the error only costs the current frame its pose.
    ///
    /// The pipeline skips pose rendering for these and keeps running.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PoseSolve { .. } | Self::InsufficientCorrespondences { .. })
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
