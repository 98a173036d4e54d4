//! Checked conversions between frame dimensions, pixel coordinates and geometry.

use crate::{Error, Result};

/// Largest coordinate magnitude a face box may carry; box arithmetic stays in range
pub const MAX_COORDINATE: i32 = i32::MAX / 2;

/// Frame width or height as a signed pixel extent
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the dimension exceeds `i32::MAX`.
pub fn frame_extent(dimension: u32) -> Result<i32> {
    i32::try_from(dimension).map_err(|_| Error::InvalidInput(format!("Frame dimension {dimension} exceeds i32 range")))
}

/// Pixel coordinate as an image index
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the coordinate is negative.
pub fn pixel_index(coordinate: i32) -> Result<u32> {
    u32::try_from(coordinate).map_err(|_| Error::InvalidInput(format!("Negative pixel coordinate {coordinate}")))
}

/// Truncate a finite pixel offset towards zero
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value is not finite or outside the `i32` range.
#[allow(clippy::cast_possible_truncation)]
pub fn truncate_to_pixel(value: f64) -> Result<i32> {
    if value.is_finite() && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&value) {
        Ok(value as i32)
    } else {
        Err(Error::InvalidInput(format!("Offset {value} is not a representable pixel value")))
    }
}

/// Map a normalized `[0, 1]` coordinate onto `extent` pixels.
///
/// The result saturates at `±MAX_COORDINATE`; non-finite input maps to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn scale_to_pixel(normalized: f32, extent: i32) -> i32 {
    let scaled = f64::from(normalized) * f64::from(extent);
    if !scaled.is_finite() {
        return 0;
    }
    scaled.clamp(-f64::from(MAX_COORDINATE), f64::from(MAX_COORDINATE)) as i32
}
