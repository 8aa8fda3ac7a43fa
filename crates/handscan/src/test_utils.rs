//! Shared synthetic images for unit tests.

use image::{GrayImage, Luma, Rgba, RgbaImage};

use crate::frame::Frame;

/// Binary edge image with a one-pixel-wide circle outline.
///
/// Pixels whose distance from `center` is within 1 px of `radius` are 255.
pub(crate) fn draw_circle_outline(w: u32, h: u32, center: [f64; 2], radius: f64) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 - center[0];
            let dy = y as f64 - center[1];
            let d = (dx * dx + dy * dy).sqrt();
            if (d - radius).abs() <= 1.0 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
    }
    img
}

/// Render a filled disk of `disk_pix` on a `bg_pix` background.
pub(crate) fn draw_disk(
    w: u32,
    h: u32,
    center: [f64; 2],
    radius: f64,
    disk_pix: u8,
    bg_pix: u8,
) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 - center[0];
            let dy = y as f64 - center[1];
            let pix = if (dx * dx + dy * dy).sqrt() <= radius {
                disk_pix
            } else {
                bg_pix
            };
            img.put_pixel(x, y, Luma([pix]));
        }
    }
    img
}

/// Gaussian-blur a `GrayImage` via `imageproc`.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut f = image::ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
    for (dst, src) in f.pixels_mut().zip(img.pixels()) {
        *dst = Luma([src[0] as f32 / 255.0]);
    }
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    let mut out = GrayImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(blurred.pixels()) {
        *dst = Luma([(src[0].clamp(0.0, 1.0) * 255.0).round() as u8]);
    }
    out
}

/// Promote a grayscale image to an opaque RGBA canvas.
pub(crate) fn gray_to_frame(gray: &GrayImage) -> Frame {
    let mut rgba = RgbaImage::new(gray.width(), gray.height());
    for (dst, src) in rgba.pixels_mut().zip(gray.pixels()) {
        let v = src[0];
        *dst = Rgba([v, v, v, 255]);
    }
    Frame::from_rgba(rgba)
}

/// A dark coin on a bright table, lightly blurred.
pub(crate) fn frame_with_disk(w: u32, h: u32, center: [f64; 2], radius: f64) -> Frame {
    gray_to_frame(&blur_gray(&draw_disk(w, h, center, radius, 60, 200), 1.0))
}

/// Horizontal shading step: rows with `y >= step_y` are dark, the rest bright.
pub(crate) fn frame_with_crease_step(w: u32, h: u32, step_y: f64) -> Frame {
    let mut rgba = RgbaImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = if (y as f64) >= step_y { 50 } else { 210 };
            rgba.put_pixel(x, y, Rgba([v, v, v, 255]));
        }
    }
    Frame::from_rgba(rgba)
}
