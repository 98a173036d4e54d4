//! Face boxes and 68-point landmark sets.
//!
//! Landmark indices follow the iBUG 300-W annotation:
//! jaw 0-16, eyebrows 17-26, nose 27-35, eyes 36-47, mouth 48-67.

use nalgebra::Point2;

use crate::{constants::NUM_FACIAL_LANDMARKS, Error, Result};

/// Chin
pub const CHIN: usize = 8;
/// Nose tip
pub const NOSE_TIP: usize = 30;
/// Left eye, outer corner
pub const LEFT_EYE_OUTER: usize = 36;
/// Right eye, outer corner
pub const RIGHT_EYE_OUTER: usize = 45;
/// Left mouth corner
pub const MOUTH_LEFT: usize = 48;
/// Right mouth corner
pub const MOUTH_RIGHT: usize = 54;

/// Face bounding box `[x1, y1, x2, y2]` in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl FaceBox {
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[must_use]
    pub const fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    #[must_use]
    pub const fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    #[must_use]
    pub const fn to_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Shift the box vertically by `offset` pixels
    #[must_use]
    pub const fn shifted(&self, offset: i32) -> Self {
        Self::new(self.x1, self.y1 + offset, self.x2, self.y2 + offset)
    }

    /// Grow the shorter side symmetrically until the box is square
    #[must_use]
    pub fn squared(&self) -> Self {
        let diff = self.height() - self.width();
        let delta = diff.abs() / 2;
        let odd = diff.abs() % 2;
        match diff.signum() {
            1 => Self::new(self.x1 - delta, self.y1, self.x2 + delta + odd, self.y2),
            -1 => Self::new(self.x1, self.y1 - delta, self.x2, self.y2 + delta + odd),
            _ => *self,
        }
    }

    /// Whether the box is non-empty and lies fully inside a `width × height` frame
    #[must_use]
    pub fn is_inside(&self, width: u32, height: u32) -> bool {
        self.width() > 0
            && self.height() > 0
            && self.x1 >= 0
            && self.y1 >= 0
            && i64::from(self.x2) <= i64::from(width)
            && i64::from(self.y2) <= i64::from(height)
    }
}

/// Ordered set of 68 facial landmarks
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point2<f64>; NUM_FACIAL_LANDMARKS],
}

impl LandmarkSet {
    #[must_use]
    pub const fn new(points: [Point2<f64>; NUM_FACIAL_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Build a set from exactly 68 points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the slice does not hold 68 points.
    pub fn from_slice(points: &[Point2<f64>]) -> Result<Self> {
        let points: [Point2<f64>; NUM_FACIAL_LANDMARKS] = points.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "Expected {NUM_FACIAL_LANDMARKS} landmarks, got {}",
                points.len()
            ))
        })?;
        Ok(Self { points })
    }

    /// Build a set from a flat `[x0, y0, x1, y1, ...]` buffer of 136 values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the buffer length is not 136.
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() != NUM_FACIAL_LANDMARKS * 2 {
            return Err(Error::InvalidInput(format!(
                "Expected {} landmark coordinates, got {}",
                NUM_FACIAL_LANDMARKS * 2,
                values.len()
            )));
        }
        Ok(Self {
            points: std::array::from_fn(|i| Point2::new(f64::from(values[2 * i]), f64::from(values[2 * i + 1]))),
        })
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Point2<f64>> {
        self.points.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point2<f64>> {
        self.points.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Point2<f64>] {
        &self.points
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        NUM_FACIAL_LANDMARKS
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Map crop-local normalized coordinates to frame coordinates.
    ///
    /// Both axes are scaled by the box width (the crop is square) and then
    /// offset by the box origin.
    #[must_use]
    pub fn to_global(&self, face: &FaceBox) -> Self {
        let scale = f64::from(face.width());
        let (dx, dy) = (f64::from(face.x1), f64::from(face.y1));
        Self {
            points: self.points.map(|p| Point2::new(p.x * scale + dx, p.y * scale + dy)),
        }
    }

    /// Mean Euclidean distance between corresponding points of two sets
    #[must_use]
    pub fn mean_displacement(&self, other: &Self) -> f64 {
        let total: f64 = self
            .points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| nalgebra::distance(a, b))
            .sum();
        total / NUM_FACIAL_LANDMARKS as f64
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Point2<f64>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}
