//! Working canvas built from a decoded photograph.
//!
//! The photo is fitted into a canvas whose longest side is at most
//! `max_dim` pixels (uniform downscale, never upscale). Scale references,
//! landmarks and measurements are all expressed in canvas pixels; the
//! `canvas_to_original` factor maps them back for export.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbaImage};

use crate::geometry::Point;

/// Default longest-side limit of the working canvas.
pub const DEFAULT_MAX_CANVAS_DIM: u32 = 1200;

/// Preprocessing for the coin detector's edge map.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EdgeMapConfig {
    /// Median filter radius applied before edge detection (2 -> 5x5 window).
    pub median_radius: u32,
    /// Canny hysteresis low threshold.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
}

impl Default for EdgeMapConfig {
    fn default() -> Self {
        Self {
            median_radius: 2,
            canny_low: 80.0,
            canny_high: 160.0,
        }
    }
}

/// Rec.601 luma, the weighting used by every intensity comparison here.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// One photo on the working canvas: color pixels plus a luma plane.
#[derive(Debug, Clone)]
pub struct Frame {
    rgba: RgbaImage,
    gray: GrayImage,
    canvas_to_original: f64,
}

impl Frame {
    /// Fit a decoded image into the working canvas.
    pub fn from_dynamic(image: &DynamicImage, max_dim: u32) -> Self {
        let (w, h) = (image.width(), image.height());
        let longest = w.max(h).max(1);
        let scale = (max_dim as f64 / longest as f64).min(1.0);
        let rgba = if scale < 1.0 {
            let cw = ((w as f64 * scale).round() as u32).max(1);
            let ch = ((h as f64 * scale).round() as u32).max(1);
            image::imageops::resize(&image.to_rgba8(), cw, ch, FilterType::Triangle)
        } else {
            image.to_rgba8()
        };
        let canvas_to_original = if rgba.width() > 0 {
            w as f64 / rgba.width() as f64
        } else {
            1.0
        };
        tracing::debug!(
            "working canvas {}x{} (source {}x{})",
            rgba.width(),
            rgba.height(),
            w,
            h
        );
        Self::with_scale(rgba, canvas_to_original)
    }

    /// Use an RGBA buffer as the canvas as-is.
    pub fn from_rgba(rgba: RgbaImage) -> Self {
        Self::with_scale(rgba, 1.0)
    }

    fn with_scale(rgba: RgbaImage, canvas_to_original: f64) -> Self {
        let mut gray = GrayImage::new(rgba.width(), rgba.height());
        for (dst, src) in gray.pixels_mut().zip(rgba.pixels()) {
            let [r, g, b, _] = src.0;
            *dst = Luma([luma(r, g, b).round().clamp(0.0, 255.0) as u8]);
        }
        Self {
            rgba,
            gray,
            canvas_to_original,
        }
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgba.dimensions()
    }

    /// Smaller of canvas width/height.
    pub fn min_dim(&self) -> u32 {
        self.width().min(self.height())
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Factor mapping canvas pixels to original-image pixels.
    pub fn canvas_to_original(&self) -> f64 {
        self.canvas_to_original
    }

    /// Grayscale intensity (0..255) at the nearest pixel, `None` outside.
    #[inline]
    pub fn intensity_at(&self, p: Point) -> Option<f64> {
        if !p.x.is_finite() || !p.y.is_finite() {
            return None;
        }
        let x = p.x.round();
        let y = p.y.round();
        if x < 0.0 || y < 0.0 || x >= self.width() as f64 || y >= self.height() as f64 {
            return None;
        }
        let px = self.rgba.get_pixel(x as u32, y as u32).0;
        Some(luma(px[0], px[1], px[2]))
    }

    /// Binary edge map: median-denoised luma followed by Canny.
    pub fn edge_map(&self, config: &EdgeMapConfig) -> GrayImage {
        let denoised = self.denoised_gray(config);
        imageproc::edges::canny(&denoised, config.canny_low, config.canny_high)
    }

    /// Median-denoised luma used as the circle backend input.
    pub fn denoised_gray(&self, config: &EdgeMapConfig) -> GrayImage {
        if config.median_radius > 0 {
            imageproc::filter::median_filter(&self.gray, config.median_radius, config.median_radius)
        } else {
            self.gray.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn luma_weights() {
        assert!((luma(255, 0, 0) - 76.245).abs() < 1e-9);
        assert!((luma(255, 255, 255) - 255.0).abs() < 1e-9);
    }

    #[test]
    fn large_photo_is_downscaled_to_canvas_limit() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(2400, 1200));
        let frame = Frame::from_dynamic(&img, 1200);
        assert_eq!(frame.dimensions(), (1200, 600));
        assert!((frame.canvas_to_original() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn small_photo_is_not_upscaled() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(300, 200));
        let frame = Frame::from_dynamic(&img, 1200);
        assert_eq!(frame.dimensions(), (300, 200));
        assert_eq!(frame.canvas_to_original(), 1.0);
    }

    #[test]
    fn intensity_lookup_is_bounds_checked() {
        let mut rgba = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        rgba.put_pixel(2, 1, Rgba([255, 255, 255, 255]));
        let frame = Frame::from_rgba(rgba);
        assert_eq!(frame.intensity_at(Point::new(2.2, 0.9)), Some(255.0));
        assert_eq!(frame.intensity_at(Point::new(0.0, 0.0)), Some(0.0));
        assert_eq!(frame.intensity_at(Point::new(4.0, 0.0)), None);
        assert_eq!(frame.intensity_at(Point::new(-0.6, 0.0)), None);
        assert_eq!(frame.gray().get_pixel(2, 1)[0], 255);
    }
}
