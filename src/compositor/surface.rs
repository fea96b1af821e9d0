//! Drawable RGBA surface

use crate::capture::{scale_nearest, Resolution, VideoFrame};

/// Opaque color
pub type Rgb = [u8; 3];

/// Fixed-size RGBA buffer painted by the compositor
#[derive(Debug, Clone)]
pub struct CompositeSurface {
    resolution: Resolution,
    data: Vec<u8>,
}

impl CompositeSurface {
    /// Fully transparent surface
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            data: vec![0u8; resolution.rgba_len()],
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        let idx = self.index(x, y);
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    /// Copy of the surface as a frame
    pub fn snapshot(&self, sequence: u64) -> VideoFrame {
        VideoFrame {
            width: self.resolution.width,
            height: self.resolution.height,
            sequence,
            data: self.data.clone(),
        }
    }

    /// Paint `frame` over the whole surface, scaling as needed
    pub fn draw_frame(&mut self, frame: &VideoFrame) {
        if frame.resolution() == self.resolution && frame.data.len() == self.data.len() {
            self.data.copy_from_slice(&frame.data);
        } else {
            scale_nearest(&frame.data, frame.resolution(), &mut self.data, self.resolution);
        }
    }

    /// Set a pixel to an opaque color. Out-of-bounds coordinates are ignored.
    pub fn fill_pixel(&mut self, x: i64, y: i64, color: Rgb) {
        if let Some(idx) = self.checked_index(x, y) {
            self.data[idx..idx + 3].copy_from_slice(&color);
            self.data[idx + 3] = 255;
        }
    }

    /// Alpha-blend `color` onto a pixel
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgb, alpha: f32) {
        if alpha <= 0.0 {
            return;
        }
        let Some(idx) = self.checked_index(x, y) else {
            return;
        };
        let alpha = alpha.min(1.0);

        for (channel, &src) in color.iter().enumerate() {
            let dst = self.data[idx + channel] as f32;
            let out = src as f32 * alpha + dst * (1.0 - alpha);
            self.data[idx + channel] = out.round().clamp(0.0, 255.0) as u8;
        }
        let dst_a = self.data[idx + 3] as f32 / 255.0;
        let out_a = alpha + dst_a * (1.0 - alpha);
        self.data[idx + 3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    /// Stroke a circle of `radius` with an anti-aliased line
    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, line_width: f32, color: Rgb) {
        let half = line_width / 2.0;
        self.for_each_near_circle(cx, cy, radius, half + 1.0, |surface, x, y, dist| {
            let coverage = (half + 0.5 - (dist - radius).abs()).clamp(0.0, 1.0);
            surface.blend_pixel(x, y, color, coverage);
        });
    }

    /// Soft halo around a circle stroke, fading out over `blur` pixels
    #[allow(clippy::too_many_arguments)]
    pub fn glow_circle(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        line_width: f32,
        blur: f32,
        color: Rgb,
        strength: f32,
    ) {
        let half = line_width / 2.0;
        let blur = blur.max(f32::EPSILON);
        self.for_each_near_circle(cx, cy, radius, half + blur, |surface, x, y, dist| {
            let outside = ((dist - radius).abs() - half).max(0.0);
            let alpha = (1.0 - outside / blur).clamp(0.0, 1.0) * strength;
            surface.blend_pixel(x, y, color, alpha);
        });
    }

    fn for_each_near_circle<F>(&mut self, cx: f32, cy: f32, radius: f32, band: f32, mut f: F)
    where
        F: FnMut(&mut Self, i64, i64, f32),
    {
        let reach = radius + band;
        let x_min = (cx - reach).floor() as i64;
        let x_max = (cx + reach).ceil() as i64;
        let y_min = (cy - reach).floor() as i64;
        let y_max = (cy + reach).ceil() as i64;

        for y in y_min..=y_max {
            for x in x_min..=x_max {
                // sample at the pixel center
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if (dist - radius).abs() <= band {
                    f(self, x, y, dist);
                }
            }
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y * self.resolution.width + x) * 4) as usize
    }

    fn checked_index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.resolution.width as i64 || y >= self.resolution.height as i64 {
            return None;
        }
        Some(self.index(x as u32, y as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_surface_is_transparent() {
        let surface = CompositeSurface::new(Resolution::new(4, 4));
        assert_eq!(surface.pixel(3, 3), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(4, 0), None);
    }

    #[test]
    fn test_blend_half_alpha() {
        let mut surface = CompositeSurface::new(Resolution::new(1, 1));
        surface.fill_pixel(0, 0, [0, 0, 0]);
        surface.blend_pixel(0, 0, [200, 100, 0], 0.5);
        assert_eq!(surface.pixel(0, 0), Some([100, 50, 0, 255]));
    }

    #[test]
    fn test_out_of_bounds_writes_ignored() {
        let mut surface = CompositeSurface::new(Resolution::new(2, 2));
        surface.fill_pixel(-1, 0, [255, 255, 255]);
        surface.fill_pixel(0, 2, [255, 255, 255]);
        surface.blend_pixel(5, 5, [255, 255, 255], 1.0);
        assert!(surface.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_stroke_circle_hits_radius_not_center() {
        let mut surface = CompositeSurface::new(Resolution::new(40, 40));
        surface.stroke_circle(20.0, 20.0, 10.0, 4.0, [255, 0, 0]);

        // pixel (20, 10) has its center 9.5 px above the circle center
        assert_eq!(surface.pixel(20, 10), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(20, 20), Some([0, 0, 0, 0]));
    }
}
