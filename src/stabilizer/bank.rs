use nalgebra::{Point2, Vector3};

use super::{Stabilizer, StabilizerConfig};
use crate::{
    constants::{NUM_FACIAL_LANDMARKS, POSE_COMPONENTS},
    landmarks::LandmarkSet,
    pose_estimation::Pose,
    Error, Result,
};

/// Fixed-size collection of identical stabilizers, one per tracked signal.
///
/// Instances share nothing; index `i` always tracks signal `i`.
#[derive(Debug, Clone)]
pub struct StabilizerBank<const N: usize> {
    stabilizers: [Stabilizer; N],
}

/// One 2D point stabilizer per facial landmark
pub type LandmarkStabilizers = StabilizerBank<NUM_FACIAL_LANDMARKS>;

/// One scalar stabilizer per pose component
pub type PoseStabilizers = StabilizerBank<POSE_COMPONENTS>;

impl<const N: usize> StabilizerBank<N> {
    /// Build `N` stabilizers with the same parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the parameters are invalid.
    pub fn new(config: &StabilizerConfig) -> Result<Self> {
        let prototype = config.build()?;
        Ok(Self {
            stabilizers: std::array::from_fn(|_| prototype.clone()),
        })
    }

    /// Update stabilizer `index` with one measurement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an out-of-range index, otherwise
    /// whatever [`Stabilizer::update`] returns.
    pub fn update(&mut self, index: usize, measurement: &[f64]) -> Result<&[f64]> {
        self.stabilizers
            .get_mut(index)
            .ok_or_else(|| Error::InvalidInput(format!("Stabilizer index {index} out of range (0..{N})")))?
            .update(measurement)
    }

    /// Apply new noise covariances to every stabilizer in the bank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the covariances are invalid; no
    /// stabilizer is modified in that case.
    pub fn reconfigure_all(&mut self, cov_process: f64, cov_measure: f64) -> Result<()> {
        // Validate once up front so the bank never ends up half reconfigured
        Stabilizer::new(1, 1, cov_process, cov_measure)?;
        for stabilizer in &mut self.stabilizers {
            stabilizer.reconfigure(cov_process, cov_measure)?;
        }
        Ok(())
    }

    /// Check one measurement per stabilizer before any of them is updated
    fn check_frame<'a>(&self, measurements: impl IntoIterator<Item = &'a [f64]>) -> Result<()> {
        for (index, (measurement, stabilizer)) in measurements.into_iter().zip(&self.stabilizers).enumerate() {
            if measurement.len() != stabilizer.measure_num() {
                return Err(Error::DimensionMismatch {
                    expected: stabilizer.measure_num(),
                    actual: measurement.len(),
                });
            }
            if measurement.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidInput(format!(
                    "Measurement {index} must be finite, got {measurement:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for stabilizer in &mut self.stabilizers {
            stabilizer.reset();
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Stabilizer> {
        self.stabilizers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stabilizer> {
        self.stabilizers.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl StabilizerBank<NUM_FACIAL_LANDMARKS> {
    /// Smooth every landmark through its own point stabilizer.
    ///
    /// # Errors
    ///
    /// Fails if the bank was not built for 2D points or a point is not finite;
    /// no stabilizer is updated in that case.
    pub fn stabilize_marks(&mut self, marks: &LandmarkSet) -> Result<LandmarkSet> {
        let measurements: Vec<[f64; 2]> = marks.iter().map(|p| [p.x, p.y]).collect();
        self.check_frame(measurements.iter().map(|m| m.as_slice()))?;

        let mut smoothed = [Point2::origin(); NUM_FACIAL_LANDMARKS];
        for (index, (measurement, stabilizer)) in measurements.iter().zip(self.stabilizers.iter_mut()).enumerate() {
            let estimate = stabilizer.update(measurement)?;
            smoothed[index] = Point2::new(estimate[0], estimate[1]);
        }
        Ok(LandmarkSet::new(smoothed))
    }
}

impl StabilizerBank<POSE_COMPONENTS> {
    /// Smooth the six pose scalars independently.
    ///
    /// # Errors
    ///
    /// Fails if the bank was not built for scalars or the pose is not finite;
    /// no stabilizer is updated in that case.
    pub fn stabilize_pose(&mut self, pose: &Pose) -> Result<Pose> {
        let values = pose.to_array();
        self.check_frame(values.iter().map(std::slice::from_ref))?;

        let mut smoothed = [0.0; POSE_COMPONENTS];
        for (index, (value, stabilizer)) in values.iter().zip(self.stabilizers.iter_mut()).enumerate() {
            smoothed[index] = stabilizer.update(&[*value])?[0];
        }
        Ok(Pose::new(
            Vector3::new(smoothed[0], smoothed[1], smoothed[2]),
            Vector3::new(smoothed[3], smoothed[4], smoothed[5]),
        ))
    }
}
