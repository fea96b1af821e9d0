//! Badge geometry and drawing

use super::font;
use super::surface::{CompositeSurface, Rgb};
use crate::capture::Resolution;

const RED: Rgb = [255, 0, 0];
const ORANGE: Rgb = [255, 165, 0];
const WHITE: Rgb = [255, 255, 255];

/// Circular badge in the top-right corner of the surface.
///
/// The badge sits in a square box `box_size` wide, `margin` pixels from the
/// right and top edges. Geometry depends only on the surface size.
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeLayout {
    pub box_size: f32,
    pub margin: f32,
    pub line_width: f32,
    pub glow_blur: f32,
    pub stroke_color: Rgb,
    pub glow_color: Rgb,
    pub text_color: Rgb,
}

impl Default for BadgeLayout {
    fn default() -> Self {
        Self {
            box_size: 75.0,
            margin: 20.0,
            line_width: 4.0,
            glow_blur: 4.0,
            stroke_color: RED,
            glow_color: ORANGE,
            text_color: WHITE,
        }
    }
}

impl BadgeLayout {
    /// Circle center on a surface of `resolution`
    pub fn center(&self, resolution: Resolution) -> (f32, f32) {
        let box_x = resolution.width as f32 - self.box_size - self.margin;
        let box_y = self.margin;
        (box_x + self.box_size / 2.0, box_y + self.box_size / 2.0)
    }

    pub fn radius(&self) -> f32 {
        self.box_size / 2.0
    }

    /// Glyph scale for `text`: double size when it fits the badge
    pub fn text_scale(&self, text: &str) -> u32 {
        if font::text_width(text, 2) as f32 <= self.box_size {
            2
        } else {
            1
        }
    }

    /// Top-left corner and scale of `text` centered in the badge
    pub fn text_origin(&self, resolution: Resolution, text: &str) -> (i64, i64, u32) {
        let scale = self.text_scale(text);
        let (cx, cy) = self.center(resolution);
        let x = (cx - font::text_width(text, scale) as f32 / 2.0).floor() as i64;
        let y = (cy - font::text_height(scale) as f32 / 2.0).floor() as i64;
        (x, y, scale)
    }

    /// Draw the ring (glow first, then stroke) and the centered text
    pub fn draw(&self, surface: &mut CompositeSurface, text: &str) {
        let resolution = surface.resolution();
        let (cx, cy) = self.center(resolution);
        let radius = self.radius();

        surface.glow_circle(cx, cy, radius, self.line_width, self.glow_blur, self.glow_color, 0.75);
        surface.stroke_circle(cx, cy, radius, self.line_width, self.stroke_color);

        let (x, y, scale) = self.text_origin(resolution, text);
        font::draw_text(surface, text, x, y, scale, self.text_color);
    }
}
