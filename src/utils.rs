//! Face-box preparation and crop extraction.

pub mod safe_cast;

#[cfg(feature = "runtime")]
pub mod image_conversion;

use image::{imageops, RgbImage};

use crate::{landmarks::FaceBox, Error, Result};
use safe_cast::{pixel_index, truncate_to_pixel};

/// Turn a raw detector box into the square crop region fed to the regressor.
///
/// The box is moved down by `shift_ratio` of its height (detector boxes sit
/// high on the face) and grown to a square. Returns `None` if the result
/// does not lie fully inside the frame.
#[must_use]
pub fn prepare_face_box(raw: &FaceBox, frame_width: u32, frame_height: u32, shift_ratio: f64) -> Option<FaceBox> {
    let offset = truncate_to_pixel((f64::from(raw.height()) * shift_ratio).abs()).ok()?;
    let face = raw.shifted(offset).squared();
    face.is_inside(frame_width, frame_height).then_some(face)
}

/// Crop `face` out of `frame` and resize it to `size × size`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the box is empty or outside the frame.
pub fn crop_face(frame: &RgbImage, face: &FaceBox, size: u32) -> Result<RgbImage> {
    if !face.is_inside(frame.width(), frame.height()) {
        return Err(Error::InvalidInput(format!(
            "Face box {:?} outside {}x{} frame",
            face.to_array(),
            frame.width(),
            frame.height()
        )));
    }
    let crop = imageops::crop_imm(
        frame,
        pixel_index(face.x1)?,
        pixel_index(face.y1)?,
        pixel_index(face.width())?,
        pixel_index(face.height())?,
    )
    .to_image();
    if crop.width() == size && crop.height() == size {
        return Ok(crop);
    }
    Ok(imageops::resize(&crop, size, size, imageops::FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_prepare_face_box() {
        // 100 wide, 120 high: shifted by 12, then widened to 120
        let face = prepare_face_box(&FaceBox::new(100, 100, 200, 220), 640, 480, 0.1).unwrap();
        assert_eq!(face, FaceBox::new(90, 112, 210, 232));
        assert_eq!(face.width(), face.height());
    }

    #[test]
    fn test_prepare_face_box_outside_frame() {
        assert!(prepare_face_box(&FaceBox::new(0, 0, 50, 80), 640, 480, 0.1).is_none());
        assert!(prepare_face_box(&FaceBox::new(500, 400, 600, 480), 640, 480, 0.1).is_none());
    }

    #[test]
    fn test_prepare_face_box_degenerate() {
        assert!(prepare_face_box(&FaceBox::new(10, 10, 10, 10), 640, 480, 0.1).is_none());
    }

    #[test]
    fn test_crop_face_resizes() {
        let mut frame = RgbImage::new(64, 48);
        frame.put_pixel(20, 10, Rgb([255, 0, 0]));
        let crop = crop_face(&frame, &FaceBox::new(20, 10, 40, 30), 128).unwrap();
        assert_eq!(crop.dimensions(), (128, 128));
        assert!(crop.get_pixel(0, 0)[0] > 0);
    }

    #[test]
    fn test_crop_face_rejects_outside_box() {
        let frame = RgbImage::new(64, 48);
        assert!(crop_face(&frame, &FaceBox::new(50, 10, 80, 40), 128).is_err());
    }
}
