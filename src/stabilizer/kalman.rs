use nalgebra::{DMatrix, DVector};

use crate::{Error, Result};

/// Linear Kalman filter with a constant-velocity motion model.
///
/// The state is laid out as blocks of `measure_num` values: positions first,
/// then their first derivatives, then any higher-order terms. Only the
/// position block is observed. The time step is fixed at 1 per `update`.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    state_num: usize,
    measure_num: usize,
    cov_process: f64,
    cov_measure: f64,
    // Posterior state estimate
    state: DVector<f64>,
    // Posterior error covariance
    error_cov: DMatrix<f64>,
    transition: DMatrix<f64>,
    measurement: DMatrix<f64>,
    process_noise: DMatrix<f64>,
    measurement_noise: DMatrix<f64>,
    initialized: bool,
}

impl Stabilizer {
    /// Create a new stabilizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `state_num` is not a positive
    /// multiple of `measure_num`, or if either covariance is not a positive
    /// finite number.
    pub fn new(state_num: usize, measure_num: usize, cov_process: f64, cov_measure: f64) -> Result<Self> {
        if measure_num == 0 {
            return Err(Error::Configuration("measure_num must be greater than 0".to_string()));
        }
        if state_num == 0 || state_num % measure_num != 0 {
            return Err(Error::Configuration(format!(
                "state_num ({state_num}) must be a positive multiple of measure_num ({measure_num})"
            )));
        }
        validate_covariances(cov_process, cov_measure)?;

        let transition = Self::transition_matrix(state_num, measure_num);
        let measurement = DMatrix::identity(measure_num, state_num);

        Ok(Self {
            state_num,
            measure_num,
            cov_process,
            cov_measure,
            state: DVector::zeros(state_num),
            error_cov: DMatrix::zeros(state_num, state_num),
            transition,
            measurement,
            process_noise: DMatrix::identity(state_num, state_num) * cov_process,
            measurement_noise: DMatrix::identity(measure_num, measure_num) * cov_measure,
            initialized: false,
        })
    }

    /// Kinematic transition for dt = 1: block (i, j) is `1 / (j - i)!` for `j >= i`.
    fn transition_matrix(state_num: usize, measure_num: usize) -> DMatrix<f64> {
        let orders = state_num / measure_num;
        let mut transition = DMatrix::zeros(state_num, state_num);
        for i in 0..orders {
            let mut coefficient = 1.0;
            for j in i..orders {
                if j > i {
                    coefficient /= (j - i) as f64;
                }
                for d in 0..measure_num {
                    transition[(i * measure_num + d, j * measure_num + d)] = coefficient;
                }
            }
        }
        transition
    }

    /// Fuse one measurement and return the position part of the posterior.
    ///
    /// The first measurement seeds the position with zero velocity.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if `measurement.len() != measure_num`
    /// - [`Error::InvalidInput`] if any value is not finite
    /// - [`Error::FilterError`] if the innovation covariance cannot be inverted
    pub fn update(&mut self, measurement: &[f64]) -> Result<&[f64]> {
        if measurement.len() != self.measure_num {
            return Err(Error::DimensionMismatch {
                expected: self.measure_num,
                actual: measurement.len(),
            });
        }
        if measurement.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "Stabilizer measurement must be finite, got {measurement:?}"
            )));
        }

        let z = DVector::from_column_slice(measurement);

        if !self.initialized {
            self.state.fill(0.0);
            self.state.rows_mut(0, self.measure_num).copy_from(&z);
            self.error_cov = self.process_noise.clone();
            self.initialized = true;
            return Ok(self.position());
        }

        // Predict
        let predicted = &self.transition * &self.state;
        let predicted_cov = &self.transition * &self.error_cov * self.transition.transpose() + &self.process_noise;

        // Correct
        let innovation = z - &self.measurement * &predicted;
        let innovation_cov = &self.measurement * &predicted_cov * self.measurement.transpose() + &self.measurement_noise;
        let innovation_cov_inv = innovation_cov
            .try_inverse()
            .ok_or_else(|| Error::FilterError("Innovation covariance is singular".to_string()))?;
        let gain = &predicted_cov * self.measurement.transpose() * innovation_cov_inv;

        self.state = predicted + &gain * innovation;
        let identity = DMatrix::<f64>::identity(self.state_num, self.state_num);
        self.error_cov = (identity - gain * &self.measurement) * predicted_cov;

        Ok(self.position())
    }

    /// Replace both noise covariances without touching the state estimate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if either covariance is not positive.
    pub fn reconfigure(&mut self, cov_process: f64, cov_measure: f64) -> Result<()> {
        validate_covariances(cov_process, cov_measure)?;
        self.cov_process = cov_process;
        self.cov_measure = cov_measure;
        self.process_noise = DMatrix::identity(self.state_num, self.state_num) * cov_process;
        self.measurement_noise = DMatrix::identity(self.measure_num, self.measure_num) * cov_measure;
        Ok(())
    }

    /// Forget the estimate; the next update seeds the filter again.
    pub fn reset(&mut self) {
        self.state.fill(0.0);
        self.error_cov.fill(0.0);
        self.initialized = false;
    }

    /// Position components of the posterior state
    #[must_use]
    pub fn position(&self) -> &[f64] {
        &self.state.as_slice()[..self.measure_num]
    }

    /// Full posterior state vector
    #[must_use]
    pub fn state(&self) -> &[f64] {
        self.state.as_slice()
    }

    #[must_use]
    pub fn state_num(&self) -> usize {
        self.state_num
    }

    #[must_use]
    pub fn measure_num(&self) -> usize {
        self.measure_num
    }

    #[must_use]
    pub fn cov_process(&self) -> f64 {
        self.cov_process
    }

    #[must_use]
    pub fn cov_measure(&self) -> f64 {
        self.cov_measure
    }

    /// Whether at least one measurement has been fused
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self {
            state_num: 4,
            measure_num: 2,
            cov_process: 1e-4,
            cov_measure: 1e-1,
            state: DVector::zeros(4),
            error_cov: DMatrix::zeros(4, 4),
            transition: Self::transition_matrix(4, 2),
            measurement: DMatrix::identity(2, 4),
            process_noise: DMatrix::identity(4, 4) * 1e-4,
            measurement_noise: DMatrix::identity(2, 2) * 1e-1,
            initialized: false,
        }
    }
}

fn validate_covariances(cov_process: f64, cov_measure: f64) -> Result<()> {
    if !(cov_process.is_finite() && cov_process > 0.0) {
        return Err(Error::Configuration(format!(
            "cov_process must be positive and finite, got {cov_process}"
        )));
    }
    if !(cov_measure.is_finite() && cov_measure > 0.0) {
        return Err(Error::Configuration(format!(
            "cov_measure must be positive and finite, got {cov_measure}"
        )));
    }
    Ok(())
}
