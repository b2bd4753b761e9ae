//! Color rendering of what the pipeline found, for visual inspection.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::circle::Circle;
use crate::needle::ray::ray_point;
use crate::needle::AngleCandidate;

const CIRCLE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const NEEDLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CANDIDATE_COLOR: Rgb<u8> = Rgb([60, 120, 255]);

/// Whatever the pipeline produced before it finished or gave up.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayInput<'a> {
    pub circle: Option<&'a Circle>,
    /// Final needle angle (math convention) if one was chosen.
    pub needle_angle_deg: Option<f64>,
    pub candidates: &'a [AngleCandidate],
}

/// Draw the circle, its center, the candidate rays and the needle on a copy
/// of `gray`.
pub fn render_overlay(gray: &GrayImage, input: &OverlayInput<'_>) -> RgbImage {
    let mut canvas = image::DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
    let Some(circle) = input.circle else {
        return canvas;
    };
    let center = [circle.center_x as f32, circle.center_y as f32];
    let c_i = (center[0].round() as i32, center[1].round() as i32);
    let r = circle.radius as f32;

    draw_hollow_circle_mut(&mut canvas, c_i, r.round() as i32, CIRCLE_COLOR);

    for cand in input.candidates {
        let tip = ray_point(center, 0.9 * r, cand.angle_degrees);
        draw_line_segment_mut(
            &mut canvas,
            (center[0], center[1]),
            (tip[0], tip[1]),
            CANDIDATE_COLOR,
        );
    }

    if let Some(angle) = input.needle_angle_deg {
        // Two offset strokes make the needle line readable on large images.
        for off in [-0.5f32, 0.5] {
            let tip = ray_point(center, r, angle);
            draw_line_segment_mut(
                &mut canvas,
                (center[0] + off, center[1] + off),
                (tip[0] + off, tip[1] + off),
                NEEDLE_COLOR,
            );
        }
    }

    draw_filled_circle_mut(&mut canvas, c_i, 3, CENTER_COLOR);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn without_circle_only_converts_to_rgb() {
        let gray = GrayImage::from_pixel(10, 10, Luma([90]));
        let out = render_overlay(&gray, &OverlayInput::default());
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(4, 4), &Rgb([90, 90, 90]));
    }

    #[test]
    fn draws_center_and_needle() {
        let gray = GrayImage::from_pixel(100, 100, Luma([128]));
        let circle = Circle {
            center_x: 50.0,
            center_y: 50.0,
            radius: 40.0,
            coverage: 1.0,
            votes: 1,
        };
        let out = render_overlay(
            &gray,
            &OverlayInput {
                circle: Some(&circle),
                needle_angle_deg: Some(90.0),
                candidates: &[],
            },
        );
        assert_eq!(out.get_pixel(50, 50), &CENTER_COLOR);
        // Needle points up, toward row 0.
        assert_eq!(out.get_pixel(50, 30), &NEEDLE_COLOR);
        assert_eq!(out.get_pixel(50, 70), &Rgb([128, 128, 128]));
        assert_eq!(out.get_pixel(90, 50), &CIRCLE_COLOR);
    }
}
