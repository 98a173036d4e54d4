//! Dense optical flow around the outer left eye corner.
//!
//! A small patch centered on the corner is cut from every tracked frame and
//! compared with the previous one. The flow field is sampled on a coarse grid
//! and drawn onto an enlarged copy of the patch in its own window.

use image::{imageops, GrayImage, RgbImage};

use crate::{
    constants::{EYE_FLOW_GRID_OFFSET, EYE_FLOW_GRID_STEP, EYE_PATCH_SIZE},
    landmarks::{FaceBox, LandmarkSet, LEFT_EYE_OUTER},
    utils::{
        crop_face,
        safe_cast::{frame_extent, truncate_to_pixel},
    },
    Result,
};

/// Patch centered on the outer left eye corner, `None` if it leaves the frame
#[must_use]
pub fn eye_patch_region(marks: &LandmarkSet, width: u32, height: u32) -> Option<FaceBox> {
    let corner = marks.get(LEFT_EYE_OUTER)?;
    let x = truncate_to_pixel(corner.x).ok()?;
    let y = truncate_to_pixel(corner.y).ok()?;
    let half = frame_extent(EYE_PATCH_SIZE / 2).ok()?;

    let region = FaceBox::new(
        x.checked_sub(half)?,
        y.checked_sub(half)?,
        x.checked_add(half)?,
        y.checked_add(half)?,
    );
    region.is_inside(width, height).then_some(region)
}

/// Color and grayscale copies of the eye patch
///
/// # Errors
///
/// Returns an error if `region` is outside the frame.
pub fn eye_patch(frame: &RgbImage, region: &FaceBox) -> Result<(RgbImage, GrayImage)> {
    let color = crop_face(frame, region, EYE_PATCH_SIZE)?;
    let gray = imageops::grayscale(&color);
    Ok((color, gray))
}

/// `(row, col)` positions where flow vectors are drawn
#[must_use]
pub fn flow_grid() -> Vec<(i32, i32)> {
    let side = frame_extent(EYE_PATCH_SIZE).unwrap_or(0);
    let steps: Vec<i32> = (EYE_FLOW_GRID_OFFSET..side).step_by(EYE_FLOW_GRID_STEP).collect();
    steps
        .iter()
        .flat_map(|&row| steps.iter().map(move |&col| (row, col)))
        .collect()
}

#[cfg(feature = "runtime")]
pub use self::window::EyeFlowWindow;

#[cfg(feature = "runtime")]
mod window {
    use log::{debug, warn};
    use opencv::{
        core::{Mat, Point, Scalar, Size, Vec2f},
        highgui::{self, WINDOW_NORMAL},
        imgproc,
        prelude::*,
        video,
    };

    use super::{eye_patch, eye_patch_region, flow_grid};
    use crate::{
        constants::EYE_PATCH_DISPLAY_SIZE,
        landmarks::LandmarkSet,
        pipeline::Frame,
        utils::{
            image_conversion::{gray_image_to_mat, rgb_image_to_bgr_mat},
            safe_cast::truncate_to_pixel,
        },
        Result,
    };

    /// HighGUI window showing the eye patch and its Farneback flow field
    pub struct EyeFlowWindow {
        window_name: String,
        previous: Option<Mat>,
    }

    impl EyeFlowWindow {
        /// Create the flow window
        ///
        /// # Errors
        ///
        /// Returns an error if the window cannot be created.
        pub fn new(window_name: &str) -> Result<Self> {
            highgui::named_window(window_name, WINDOW_NORMAL)?;
            Ok(Self {
                window_name: window_name.to_string(),
                previous: None,
            })
        }

        /// Compare the eye patch of `frame` with the last one and show the result.
        ///
        /// Frames whose patch leaves the image are skipped.
        ///
        /// # Errors
        ///
        /// Returns an error if OpenCV fails.
        pub fn update(&mut self, frame: &Frame, marks: &LandmarkSet) -> Result<()> {
            let Some(region) = eye_patch_region(marks, frame.width(), frame.height()) else {
                debug!("Eye patch outside the frame, skipping flow");
                return Ok(());
            };
            let (color, gray) = eye_patch(frame, &region)?;
            let gray = gray_image_to_mat(&gray)?;
            let mut patch = rgb_image_to_bgr_mat(&color)?;

            if let Some(previous) = &self.previous {
                let mut flow = Mat::default();
                video::calc_optical_flow_farneback(previous, &gray, &mut flow, 0.5, 3, 15, 3, 5, 1.2, 0)?;
                for (row, col) in flow_grid() {
                    let vector = *flow.at_2d::<Vec2f>(row, col)?;
                    let dx = truncate_to_pixel(f64::from(vector[0]))?;
                    let dy = truncate_to_pixel(f64::from(vector[1]))?;
                    imgproc::circle(
                        &mut patch,
                        Point::new(col.saturating_add(dx), row.saturating_add(dy)),
                        1,
                        Scalar::new(0.0, 255.0, 0.0, 0.0),
                        -1,
                        imgproc::LINE_8,
                        0,
                    )?;
                }
            }
            self.previous = Some(gray);

            let mut enlarged = Mat::default();
            imgproc::resize(
                &patch,
                &mut enlarged,
                Size::new(EYE_PATCH_DISPLAY_SIZE, EYE_PATCH_DISPLAY_SIZE),
                0.0,
                0.0,
                imgproc::INTER_AREA,
            )?;
            highgui::imshow(&self.window_name, &enlarged)?;
            Ok(())
        }
    }

    impl Drop for EyeFlowWindow {
        fn drop(&mut self) {
            if let Err(e) = highgui::destroy_window(&self.window_name) {
                warn!("Failed to close eye flow window: {e}");
            }
        }
    }
}
