//! Conversion between OpenCV BGR matrices and `image` RGB buffers.

use crate::{utils::safe_cast::frame_extent, Error, Result};
use image::{GrayImage, RgbImage};
use opencv::{
    core::{Mat, CV_8UC3},
    imgproc,
    prelude::*,
};

/// Convert an 8-bit BGR `Mat` into an RGB image
///
/// # Errors
///
/// Returns an error if the matrix is not 8-bit 3-channel or OpenCV fails.
pub fn bgr_mat_to_rgb_image(mat: &Mat) -> Result<RgbImage> {
    if mat.typ() != CV_8UC3 {
        return Err(Error::InvalidInput(format!(
            "Expected 8-bit 3-channel frame, got type {}",
            mat.typ()
        )));
    }
    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let width = u32::try_from(rgb.cols()).map_err(|_| Error::InvalidInput("Negative frame width".to_string()))?;
    let height = u32::try_from(rgb.rows()).map_err(|_| Error::InvalidInput("Negative frame height".to_string()))?;
    let data = if rgb.is_continuous() {
        rgb.data_bytes()?.to_vec()
    } else {
        rgb.try_clone()?.data_bytes()?.to_vec()
    };

    RgbImage::from_raw(width, height, data)
        .ok_or_else(|| Error::InvalidInput(format!("Frame buffer does not match {width}x{height}")))
}

/// Convert an RGB image into an 8-bit BGR `Mat`
///
/// # Errors
///
/// Returns an error if the image is too large or OpenCV fails.
pub fn rgb_image_to_bgr_mat(image: &RgbImage) -> Result<Mat> {
    let rows = frame_extent(image.height())?;
    let flat = Mat::from_slice(image.as_raw())?;
    let rgb = flat.reshape(3, rows)?.try_clone()?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Copy a grayscale image into an 8-bit single-channel `Mat`
///
/// # Errors
///
/// Returns an error if the image is too large or OpenCV fails.
pub fn gray_image_to_mat(image: &GrayImage) -> Result<Mat> {
    let rows = frame_extent(image.height())?;
    let flat = Mat::from_slice(image.as_raw())?;
    Ok(flat.reshape(1, rows)?.try_clone()?)
}
