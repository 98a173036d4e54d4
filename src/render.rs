//! Drawing of landmarks and the pose annotation cuboid onto RGB frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use nalgebra::Point2;

use crate::landmarks::LandmarkSet;

/// Color of the pose annotation cuboid
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
/// Color of regressor landmarks
pub const RAW_MARK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Color of stabilized landmarks
pub const STABLE_MARK_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Default cuboid line width in pixels
pub const ANNOTATION_LINE_WIDTH: u32 = 2;

/// Draw every landmark as a small filled dot
pub fn draw_marks(image: &mut RgbImage, marks: &LandmarkSet, color: Rgb<u8>) {
    for point in marks.iter().filter(|p| p.x.is_finite() && p.y.is_finite()) {
        draw_filled_circle_mut(image, (point.x.round() as i32, point.y.round() as i32), 1, color);
    }
}

/// Draw the projected annotation cuboid.
///
/// `points` holds the 10 projected vertices: the closed rear square (0-4)
/// followed by the closed front square (5-9). Anything else is ignored.
pub fn draw_annotation_box(image: &mut RgbImage, points: &[Point2<f64>], color: Rgb<u8>, line_width: u32) {
    if points.len() != 10 {
        log::warn!("Annotation box needs 10 projected vertices, got {}", points.len());
        return;
    }

    // Rear square
    for i in 0..4 {
        draw_thick_line(image, &points[i], &points[(i + 1) % 4], color, line_width);
    }
    // Front square
    for i in 0..4 {
        draw_thick_line(image, &points[i + 5], &points[(i + 1) % 4 + 5], color, line_width);
    }
    // Connecting edges
    for i in 1..4 {
        draw_thick_line(image, &points[i], &points[i + 5], color, line_width);
    }
}

fn draw_thick_line(image: &mut RgbImage, start: &Point2<f64>, end: &Point2<f64>, color: Rgb<u8>, line_width: u32) {
    if ![start.x, start.y, end.x, end.y].iter().all(|v| v.is_finite()) {
        return;
    }
    let (x0, y0, x1, y1) = (start.x as f32, start.y as f32, end.x as f32, end.y as f32);
    // Offset across the dominant direction
    let steep = (y1 - y0).abs() > (x1 - x0).abs();
    for k in 0..line_width.max(1) {
        let offset = k as f32 - (line_width.saturating_sub(1)) as f32 / 2.0;
        let (dx, dy) = if steep { (offset, 0.0) } else { (0.0, offset) };
        draw_line_segment_mut(image, (x0 + dx, y0 + dy), (x1 + dx, y1 + dy), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_FACIAL_LANDMARKS;

    #[test]
    fn test_draw_marks() {
        let mut image = RgbImage::new(20, 20);
        let marks = LandmarkSet::new([Point2::new(10.0, 10.0); NUM_FACIAL_LANDMARKS]);
        draw_marks(&mut image, &marks, RAW_MARK_COLOR);
        assert_eq!(*image.get_pixel(10, 10), RAW_MARK_COLOR);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_marks_skips_non_finite() {
        let mut image = RgbImage::new(20, 20);
        let marks = LandmarkSet::new([Point2::new(f64::NAN, 3.0); NUM_FACIAL_LANDMARKS]);
        draw_marks(&mut image, &marks, RAW_MARK_COLOR);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_draw_annotation_box() {
        let mut image = RgbImage::new(100, 100);
        let square = |s: f64| {
            vec![
                Point2::new(50.0 - s, 50.0 - s),
                Point2::new(50.0 - s, 50.0 + s),
                Point2::new(50.0 + s, 50.0 + s),
                Point2::new(50.0 + s, 50.0 - s),
                Point2::new(50.0 - s, 50.0 - s),
            ]
        };
        let mut points = square(10.0);
        points.extend(square(30.0));
        draw_annotation_box(&mut image, &points, ANNOTATION_COLOR, 1);

        assert_eq!(*image.get_pixel(40, 50), ANNOTATION_COLOR);
        assert_eq!(*image.get_pixel(20, 50), ANNOTATION_COLOR);
        assert_eq!(*image.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_annotation_box_wrong_length_is_noop() {
        let mut image = RgbImage::new(10, 10);
        draw_annotation_box(&mut image, &[Point2::new(1.0, 1.0); 4], ANNOTATION_COLOR, 2);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
