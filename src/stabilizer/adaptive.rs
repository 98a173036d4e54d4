//! Regime-dependent noise tuning for the landmark stabilizers.
//!
//! A moving head needs a responsive filter, a still head a smooth one. The
//! tuner remembers which regime the stabilizers were last configured for and
//! only calls `reconfigure` when the classifier reports a different one.

use log::debug;
use serde::{Deserialize, Serialize};

use super::StabilizerBank;
use crate::{
    constants::{
        DEFAULT_MOTION_HYSTERESIS, DEFAULT_MOTION_THRESHOLD_RATIO, DEFAULT_MOTION_WINDOW, MOVING_COV_MEASURE,
        MOVING_COV_PROCESS, STILL_COV_MEASURE, STILL_COV_PROCESS,
    },
    Result,
};

/// Motion regime of the tracked head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionRegime {
    /// Head is moving; favour the measurement
    Moving,
    /// Head is still; favour the prediction
    Still,
}

impl std::fmt::Display for MotionRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Moving => write!(f, "Moving"),
            Self::Still => write!(f, "Still"),
        }
    }
}

/// A `(cov_process, cov_measure)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoisePair {
    pub cov_process: f64,
    pub cov_measure: f64,
}

impl NoisePair {
    #[must_use]
    pub const fn new(cov_process: f64, cov_measure: f64) -> Self {
        Self {
            cov_process,
            cov_measure,
        }
    }
}

/// Settings of the moving/still covariance switching
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Switch landmark covariances by motion regime
    pub enabled: bool,
    /// Frames of displacement history used for classification
    pub window_size: usize,
    /// Motion threshold as a fraction of the face box width
    pub threshold_ratio: f64,
    /// Frames a new regime must persist before it is applied
    pub hysteresis_frames: usize,
    /// Covariances while moving
    pub moving: NoisePair,
    /// Covariances while still
    pub still: NoisePair,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_size: DEFAULT_MOTION_WINDOW,
            threshold_ratio: DEFAULT_MOTION_THRESHOLD_RATIO,
            hysteresis_frames: DEFAULT_MOTION_HYSTERESIS,
            moving: NoisePair::new(MOVING_COV_PROCESS, MOVING_COV_MEASURE),
            still: NoisePair::new(STILL_COV_PROCESS, STILL_COV_MEASURE),
        }
    }
}

/// Applies regime-specific covariances to a stabilizer bank on regime change
#[derive(Debug, Clone)]
pub struct AdaptiveTuner {
    moving: NoisePair,
    still: NoisePair,
    applied: Option<MotionRegime>,
}

impl AdaptiveTuner {
    #[must_use]
    pub fn new(moving: NoisePair, still: NoisePair) -> Self {
        Self {
            moving,
            still,
            applied: None,
        }
    }

    /// Covariances used for `regime`
    #[must_use]
    pub fn noise_for(&self, regime: MotionRegime) -> NoisePair {
        match regime {
            MotionRegime::Moving => self.moving,
            MotionRegime::Still => self.still,
        }
    }

    /// Regime the bank is currently configured for, if any
    #[must_use]
    pub fn applied(&self) -> Option<MotionRegime> {
        self.applied
    }

    /// Reconfigure `bank` if `current` differs from the applied regime.
    ///
    /// Returns `true` when the bank was reconfigured.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the regime covariances are invalid.
    pub fn apply<const N: usize>(&mut self, current: MotionRegime, bank: &mut StabilizerBank<N>) -> Result<bool> {
        if self.applied == Some(current) {
            return Ok(false);
        }
        let noise = self.noise_for(current);
        bank.reconfigure_all(noise.cov_process, noise.cov_measure)?;
        debug!(
            "Stabilizers reconfigured for {current}: cov_process={}, cov_measure={}",
            noise.cov_process, noise.cov_measure
        );
        self.applied = Some(current);
        Ok(true)
    }
}

impl Default for AdaptiveTuner {
    fn default() -> Self {
        let config = AdaptiveConfig::default();
        Self::new(config.moving, config.still)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stabilizer::StabilizerConfig;

    #[test]
    fn test_reconfigures_only_on_change() {
        let mut tuner = AdaptiveTuner::default();
        let mut bank = StabilizerBank::<2>::new(&StabilizerConfig::point()).unwrap();

        assert!(tuner.apply(MotionRegime::Moving, &mut bank).unwrap());
        assert!(bank.iter().all(|s| s.cov_process() == 0.1 && s.cov_measure() == 0.01));
        assert!(!tuner.apply(MotionRegime::Moving, &mut bank).unwrap());

        assert!(tuner.apply(MotionRegime::Still, &mut bank).unwrap());
        assert!(bank.iter().all(|s| s.cov_process() == 0.0001 && s.cov_measure() == 0.1));
        assert_eq!(tuner.applied(), Some(MotionRegime::Still));
    }

    #[test]
    fn test_invalid_pair_leaves_regime_unapplied() {
        let mut tuner = AdaptiveTuner::new(NoisePair::new(0.0, 0.1), NoisePair::new(0.01, 0.1));
        let mut bank = StabilizerBank::<2>::new(&StabilizerConfig::point()).unwrap();
        assert!(tuner.apply(MotionRegime::Moving, &mut bank).is_err());
        assert_eq!(tuner.applied(), None);
    }
}
