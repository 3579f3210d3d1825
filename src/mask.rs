//! Mask builders feeding the blob locator.
//! Color mode: HSV range test per target, OR'd, then open + dilate (3x3).
//! Motion mode: grayscale + Gaussian blur, absolute difference against a stored
//! reference frame, binarize, dilate.
//! Foreground pixels are 255, background 0.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{dilate, open};

use crate::config::{ColorTarget, MotionParams};

const FOREGROUND: u8 = 255;

/// RGB to HSV using the 8-bit OpenCV convention: H in 0..=180, S and V in 0..=255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let v = max;
    if max == 0 {
        return [0, 0, 0];
    }
    let delta = (max - min) as f32;
    let s = (delta * 255.0 / max as f32).round() as u8;
    if delta == 0.0 {
        return [0, s, v];
    }

    let (r, g, b) = (r as f32, g as f32, b as f32);
    let mut h = if max as f32 == r {
        60.0 * (g - b) / delta
    } else if max as f32 == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    [(h / 2.0).round() as u8, s, v]
}

/// Pixels matching any target color, cleaned of speckle and re-joined.
pub fn color_mask(frame: &RgbaImage, targets: &[ColorTarget]) -> GrayImage {
    let raw = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.get_pixel(x, y).0;
        let hsv = rgb_to_hsv(p[0], p[1], p[2]);
        if targets.iter().any(|t| t.matches(hsv)) {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    });

    let opened = open(&raw, Norm::LInf, 1);
    dilate(&opened, Norm::LInf, 1)
}

/// Frame-difference motion masker holding the reference frame.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    params: MotionParams,
    reference: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(params: MotionParams) -> Self {
        Self {
            params,
            reference: None,
        }
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Drops the reference so the next frame is taken as the new still scene.
    pub fn reset(&mut self) {
        self.reference = None;
    }

    /// Returns `None` while (re)establishing the reference frame.
    pub fn mask(&mut self, frame: &RgbaImage) -> Option<GrayImage> {
        let gray = self.prepare(frame);

        let reference = match &self.reference {
            Some(r) if r.dimensions() == gray.dimensions() => r,
            _ => {
                self.reference = Some(gray);
                return None;
            }
        };

        let threshold = self.params.diff_threshold;
        let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let a = reference.get_pixel(x, y).0[0];
            let b = gray.get_pixel(x, y).0[0];
            if a.abs_diff(b) > threshold {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        });

        if self.params.dilate_radius == 0 {
            return Some(binary);
        }
        Some(dilate(&binary, Norm::LInf, self.params.dilate_radius))
    }

    fn prepare(&self, frame: &RgbaImage) -> GrayImage {
        let gray = image::imageops::grayscale(frame);
        if self.params.blur_sigma > 0.0 {
            gaussian_blur_f32(&gray, self.params.blur_sigma)
        } else {
            gray
        }
    }
}
