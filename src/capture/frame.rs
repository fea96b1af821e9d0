//! RGBA video frames

use super::traits::{CaptureError, Resolution};

/// One RGBA8 video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Position of this frame in its source's sequence
    pub sequence: u64,
    /// RGBA pixels, row-major, `width * height * 4` bytes
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, sequence: u64, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = Resolution::new(width, height).rgba_len();
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            sequence,
            data,
        })
    }

    /// Opaque black frame
    pub fn blank(resolution: Resolution) -> Self {
        let mut data = vec![0u8; resolution.rgba_len()];
        for pixel in data.chunks_exact_mut(4) {
            pixel[3] = 255;
        }
        Self {
            width: resolution.width,
            height: resolution.height,
            sequence: 0,
            data,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    /// Copy of this frame scaled to `target`
    pub fn resized(&self, target: Resolution) -> VideoFrame {
        if target == self.resolution() {
            return self.clone();
        }

        let mut data = vec![0u8; target.rgba_len()];
        scale_nearest(&self.data, self.resolution(), &mut data, target);
        VideoFrame {
            width: target.width,
            height: target.height,
            sequence: self.sequence,
            data,
        }
    }
}

/// Nearest-neighbour scale of an RGBA buffer into another of fixed size
pub fn scale_nearest(src: &[u8], src_res: Resolution, dst: &mut [u8], dst_res: Resolution) {
    if src_res.width == 0 || src_res.height == 0 || dst_res.width == 0 || dst_res.height == 0 {
        return;
    }

    for dy in 0..dst_res.height {
        let sy = ((dy as u64 * src_res.height as u64) / dst_res.height as u64) as u32;
        let sy = sy.min(src_res.height - 1);

        for dx in 0..dst_res.width {
            let sx = ((dx as u64 * src_res.width as u64) / dst_res.width as u64) as u32;
            let sx = sx.min(src_res.width - 1);

            let src_idx = ((sy * src_res.width + sx) * 4) as usize;
            let dst_idx = ((dy * dst_res.width + dx) * 4) as usize;

            if src_idx + 3 >= src.len() || dst_idx + 3 >= dst.len() {
                continue;
            }

            dst[dst_idx..dst_idx + 4].copy_from_slice(&src[src_idx..src_idx + 4]);
        }
    }
}
