//! Motion classification for adaptive stabilization.
//!
//! Frame-to-frame landmark displacement is collected over a sliding window.
//! The head counts as moving while the windowed mean displacement exceeds a
//! fraction of the face box width. A regime change has to persist for a few
//! frames before it is reported.

use std::collections::VecDeque;

use crate::{
    landmarks::{FaceBox, LandmarkSet},
    stabilizer::MotionRegime,
};

/// Decides the motion regime of the tracked head from its landmarks
pub trait MotionClassifier {
    /// Feed the landmarks of a new frame and return the current regime
    fn classify(&mut self, marks: &LandmarkSet, face: &FaceBox) -> MotionRegime;

    /// Forget all history, e.g. after the face was lost
    fn reset(&mut self);
}

/// Movement detector using windowed displacement statistics
#[derive(Debug, Clone)]
pub struct MovementDetector {
    window_size: usize,
    threshold_ratio: f64,
    hysteresis_frames: usize,
    previous: Option<LandmarkSet>,
    displacement_history: VecDeque<f64>,
    regime: MotionRegime,
    pending_frames: usize,
}

impl MovementDetector {
    /// Create a new movement detector.
    ///
    /// `window_size` and `hysteresis_frames` are clamped to at least one frame.
    #[must_use]
    pub fn new(window_size: usize, threshold_ratio: f64, hysteresis_frames: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            threshold_ratio,
            hysteresis_frames: hysteresis_frames.max(1),
            previous: None,
            displacement_history: VecDeque::with_capacity(window_size),
            regime: MotionRegime::Moving,
            pending_frames: 0,
        }
    }

    /// Regime reported by the last call to `classify`
    #[must_use]
    pub fn regime(&self) -> MotionRegime {
        self.regime
    }

    /// Statistics of the displacement window, `None` until a displacement is known
    #[must_use]
    pub fn statistics(&self) -> Option<Statistics> {
        if self.displacement_history.is_empty() {
            return None;
        }
        Some(Self::calculate_stats(&self.displacement_history))
    }

    fn push_displacement(&mut self, displacement: f64) {
        if self.displacement_history.len() >= self.window_size {
            self.displacement_history.pop_front();
        }
        self.displacement_history.push_back(displacement);
    }

    /// Calculate statistics for a data window
    fn calculate_stats(data: &VecDeque<f64>) -> Statistics {
        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Statistics {
            mean,
            std_dev: variance.sqrt(),
            max,
        }
    }
}

impl MotionClassifier for MovementDetector {
    fn classify(&mut self, marks: &LandmarkSet, face: &FaceBox) -> MotionRegime {
        if let Some(previous) = &self.previous {
            let displacement = marks.mean_displacement(previous);
            if displacement.is_finite() {
                self.push_displacement(displacement);
            }
        }
        self.previous = Some(marks.clone());

        let Some(stats) = self.statistics() else {
            return self.regime;
        };

        let threshold = f64::from(face.width()) * self.threshold_ratio;
        let observed = if stats.mean > threshold {
            MotionRegime::Moving
        } else {
            MotionRegime::Still
        };

        if observed == self.regime {
            self.pending_frames = 0;
        } else {
            self.pending_frames += 1;
            if self.pending_frames >= self.hysteresis_frames {
                log::debug!(
                    "Motion regime {} -> {observed} (displacement mean {:.3}, std {:.3}, max {:.3}, threshold {threshold:.3})",
                    self.regime,
                    stats.mean,
                    stats.std_dev,
                    stats.max
                );
                self.regime = observed;
                self.pending_frames = 0;
            }
        }
        self.regime
    }

    fn reset(&mut self) {
        self.previous = None;
        self.displacement_history.clear();
        self.regime = MotionRegime::Moving;
        self.pending_frames = 0;
    }
}

/// Statistical summary of a displacement window
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    /// Mean displacement in pixels
    pub mean: f64,
    /// Standard deviation of the displacement
    pub std_dev: f64,
    /// Largest displacement in the window
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn marks_at(x: f64, y: f64) -> LandmarkSet {
        LandmarkSet::new(std::array::from_fn(|i| Point2::new(x + i as f64, y)))
    }

    #[test]
    fn test_starts_moving() {
        let mut detector = MovementDetector::new(5, 0.005, 1);
        let face = FaceBox::new(0, 0, 200, 200);
        assert_eq!(detector.classify(&marks_at(0.0, 0.0), &face), MotionRegime::Moving);
        assert!(detector.statistics().is_none());
    }

    #[test]
    fn test_still_head_detected() {
        let mut detector = MovementDetector::new(5, 0.005, 1);
        let face = FaceBox::new(0, 0, 200, 200);
        for _ in 0..5 {
            detector.classify(&marks_at(10.0, 10.0), &face);
        }
        assert_eq!(detector.regime(), MotionRegime::Still);
    }

    #[test]
    fn test_moving_head_detected() {
        let mut detector = MovementDetector::new(3, 0.005, 1);
        let face = FaceBox::new(0, 0, 200, 200);
        for _ in 0..3 {
            detector.classify(&marks_at(10.0, 10.0), &face);
        }
        assert_eq!(detector.regime(), MotionRegime::Still);

        // 3 px per frame against a 1 px threshold
        for i in 0..4 {
            detector.classify(&marks_at(10.0 + f64::from(i) * 3.0, 10.0), &face);
        }
        assert_eq!(detector.regime(), MotionRegime::Moving);
    }

    #[test]
    fn test_hysteresis_delays_switch() {
        let mut detector = MovementDetector::new(1, 0.005, 3);
        let face = FaceBox::new(0, 0, 200, 200);
        detector.classify(&marks_at(0.0, 0.0), &face);
        assert_eq!(detector.classify(&marks_at(0.0, 0.0), &face), MotionRegime::Moving);
        assert_eq!(detector.classify(&marks_at(0.0, 0.0), &face), MotionRegime::Moving);
        assert_eq!(detector.classify(&marks_at(0.0, 0.0), &face), MotionRegime::Still);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut detector = MovementDetector::new(2, 0.005, 1);
        let face = FaceBox::new(0, 0, 200, 200);
        detector.classify(&marks_at(0.0, 0.0), &face);
        detector.classify(&marks_at(0.0, 0.0), &face);
        assert_eq!(detector.regime(), MotionRegime::Still);

        detector.reset();
        assert_eq!(detector.regime(), MotionRegime::Moving);
        assert!(detector.statistics().is_none());
    }

    #[test]
    fn test_statistics_calculation() {
        let data = VecDeque::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let stats = MovementDetector::calculate_stats(&data);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.max, 5.0);
        assert!((stats.std_dev - std::f64::consts::SQRT_2).abs() < 1e-10);
    }
}
