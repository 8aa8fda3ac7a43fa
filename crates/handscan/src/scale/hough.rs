//! Circle-detection backends.
//!
//! [`CircleBackend`] is the seam to any circle transform. [`GradientHough`]
//! is the built-in implementation: edge pixels vote along their gradient
//! direction for centers at every radius in the search band, the smoothed
//! accumulator peaks become center candidates, and each center gets the
//! radius whose edge-distance histogram bin has the best circumference
//! support.

use image::{GrayImage, ImageBuffer, Luma};

/// Geometric constraints handed to a circle backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleSearch {
    /// Minimum circle radius (pixels).
    pub min_radius: f64,
    /// Maximum circle radius (pixels).
    pub max_radius: f64,
    /// Minimum distance between two returned centers (pixels).
    pub min_center_dist: f64,
}

/// One circle returned by a backend, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CircleCandidate {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

/// Anything that can propose circles from grayscale pixels.
///
/// May return zero candidates; that is a normal outcome.
pub trait CircleBackend {
    fn detect_circles(&self, gray: &GrayImage, search: &CircleSearch) -> Vec<CircleCandidate>;
}

/// Tuning for [`GradientHough`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    /// Canny high threshold for the voting edge map (low is half of it).
    pub canny_high: f32,
    /// Minimum center peak, as a fraction of the accumulator maximum.
    pub min_vote_frac: f32,
    /// Gaussian sigma for accumulator smoothing.
    pub accum_sigma: f32,
    /// Minimum edge-pixel support for a radius bin (fraction of circumference).
    pub min_radius_support: f32,
    /// Optional cap on number of circles returned (after vote sorting).
    pub max_candidates: Option<usize>,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            canny_high: 120.0,
            min_vote_frac: 0.3,
            accum_sigma: 1.0,
            min_radius_support: 0.1,
            max_candidates: Some(16),
        }
    }
}

/// Built-in gradient-voting circle transform.
#[derive(Debug, Clone, Default)]
pub struct GradientHough {
    pub config: HoughConfig,
}

impl GradientHough {
    pub fn new(config: HoughConfig) -> Self {
        Self { config }
    }
}

impl CircleBackend for GradientHough {
    fn detect_circles(&self, gray: &GrayImage, search: &CircleSearch) -> Vec<CircleCandidate> {
        find_circles(gray, search, &self.config)
    }
}

#[derive(Debug, Clone, Copy)]
struct CenterPeak {
    x: usize,
    y: usize,
    votes: f32,
}

/// Split one unit vote over the four cells around `(x, y)`.
///
/// `(x, y)` must lie in `[0, w-1) x [0, h-1)`.
#[inline]
fn splat_vote(accum: &mut [f32], stride: usize, x: f32, y: f32) {
    let (cx, cy) = (x.floor(), y.floor());
    let (tx, ty) = (x - cx, y - cy);
    let cell = cy as usize * stride + cx as usize;
    for (step, share) in [
        (0, (1.0 - tx) * (1.0 - ty)),
        (1, tx * (1.0 - ty)),
        (stride, (1.0 - tx) * ty),
        (stride + 1, tx * ty),
    ] {
        accum[cell + step] += share;
    }
}

fn find_circles(gray: &GrayImage, search: &CircleSearch, config: &HoughConfig) -> Vec<CircleCandidate> {
    let (w, h) = gray.dimensions();
    if w < 4 || h < 4 {
        return Vec::new();
    }
    let r_min = search.min_radius.max(1.0);
    let r_max = search.max_radius;
    if !(r_max >= r_min) {
        return Vec::new();
    }

    let edges = imageproc::edges::canny(gray, config.canny_high * 0.5, config.canny_high);
    let gx = imageproc::gradients::horizontal_scharr(gray);
    let gy = imageproc::gradients::vertical_scharr(gray);
    let (gx_raw, gy_raw, edge_raw) = (gx.as_raw(), gy.as_raw(), edges.as_raw());

    let stride = w as usize;
    let h_usize = h as usize;
    let mut accum = vec![0.0f32; stride * h_usize];
    let radii: Vec<f32> = (r_min.ceil() as u32..=r_max.floor() as u32)
        .map(|r| r as f32)
        .collect();
    if radii.is_empty() {
        return Vec::new();
    }
    let x_limit = (w - 1) as f32;
    let y_limit = (h - 1) as f32;
    let mut edge_pixels: Vec<[u32; 2]> = Vec::new();

    for y in 0..h_usize {
        let y_base = y * stride;
        for x in 0..stride {
            let idx = y_base + x;
            if edge_raw[idx] == 0 {
                continue;
            }
            edge_pixels.push([x as u32, y as u32]);
            let gxv = gx_raw[idx] as f32;
            let gyv = gy_raw[idx] as f32;
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag < 1e-6 {
                continue;
            }
            let dx = gxv / mag;
            let dy = gyv / mag;
            let (xf, yf) = (x as f32, y as f32);

            // Coins can be darker or lighter than the background: vote both ways.
            for &r in &radii {
                for sign in [1.0f32, -1.0] {
                    let vx = xf + sign * dx * r;
                    let vy = yf + sign * dy * r;
                    if vx >= 0.0 && vx < x_limit && vy >= 0.0 && vy < y_limit {
                        splat_vote(&mut accum, stride, vx, vy);
                    }
                }
            }
        }
    }

    let smoothed = match ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, accum) {
        Some(img) if config.accum_sigma > 0.0 => {
            imageproc::filter::gaussian_blur_f32(&img, config.accum_sigma).into_raw()
        }
        Some(img) => img.into_raw(),
        None => return Vec::new(),
    };

    let max_vote = smoothed.iter().copied().fold(0.0f32, f32::max);
    if max_vote < 1e-6 {
        return Vec::new();
    }
    let peaks = center_peaks(
        &smoothed,
        stride,
        h_usize,
        config.min_vote_frac * max_vote,
        search.min_center_dist,
    );
    tracing::trace!("{} circle center peaks (max vote {:.1})", peaks.len(), max_vote);

    let mut circles = Vec::new();
    for peak in peaks {
        if let Some(r) = best_radius(&edge_pixels, peak, r_min, r_max, config.min_radius_support) {
            circles.push(CircleCandidate {
                x: peak.x as f64,
                y: peak.y as f64,
                r,
            });
        }
        if config.max_candidates.is_some_and(|max| circles.len() >= max) {
            break;
        }
    }
    circles
}

/// 3x3 local maxima above threshold, greedily thinned by `min_dist`
/// (strongest first).
fn center_peaks(acc: &[f32], stride: usize, h: usize, threshold: f32, min_dist: f64) -> Vec<CenterPeak> {
    let mut local = Vec::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..stride.saturating_sub(1) {
            let idx = y * stride + x;
            let v = acc[idx];
            if v < threshold {
                continue;
            }
            let mut is_max = true;
            'nbr: for dy in [-1isize, 0, 1] {
                for dx in [-1isize, 0, 1] {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nidx = idx.wrapping_add_signed(dy * stride as isize + dx);
                    if acc[nidx] > v || (acc[nidx] == v && nidx < idx) {
                        is_max = false;
                        break 'nbr;
                    }
                }
            }
            if is_max {
                local.push(CenterPeak { x, y, votes: v });
            }
        }
    }
    local.sort_by(|a, b| b.votes.total_cmp(&a.votes));

    let min_d2 = min_dist * min_dist;
    let mut kept: Vec<CenterPeak> = Vec::new();
    for p in local {
        let clear = kept.iter().all(|k| {
            let dx = k.x as f64 - p.x as f64;
            let dy = k.y as f64 - p.y as f64;
            dx * dx + dy * dy >= min_d2
        });
        if clear {
            kept.push(p);
        }
    }
    kept
}

/// Radius with the best circumference-normalized edge support around a center.
fn best_radius(edge_pixels: &[[u32; 2]], peak: CenterPeak, r_min: f64, r_max: f64, min_support: f32) -> Option<f64> {
    let n_bins = r_max.floor() as usize + 2;
    let mut hist = vec![0u32; n_bins];
    let (cx, cy) = (peak.x as f64, peak.y as f64);
    let r_max_sq = (r_max + 1.0) * (r_max + 1.0);
    for &[x, y] in edge_pixels {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let d2 = dx * dx + dy * dy;
        if d2 > r_max_sq {
            continue;
        }
        let bin = d2.sqrt().round() as usize;
        if bin < n_bins {
            hist[bin] += 1;
        }
    }

    let mut best: Option<(f64, f64)> = None;
    for r in r_min.ceil() as usize..=r_max.floor() as usize {
        let count = hist[r.saturating_sub(1)..=(r + 1).min(n_bins - 1)]
            .iter()
            .sum::<u32>() as f64;
        // Three bins span roughly three pixel rings of circumference.
        let support = count / (3.0 * std::f64::consts::TAU * r as f64);
        if support < min_support as f64 {
            continue;
        }
        // Ties go to the larger radius: the coin rim encloses any engraving.
        if best.map_or(true, |(_, s)| support >= s) {
            best = Some((r as f64, support));
        }
    }
    best.map(|(r, _)| r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blur_gray, draw_disk};

    #[test]
    fn finds_single_disk() {
        let img = blur_gray(&draw_disk(200, 160, [90.0, 70.0], 30.0, 40, 210), 1.0);
        let search = CircleSearch {
            min_radius: 5.0,
            max_radius: 40.0,
            min_center_dist: 40.0,
        };
        let circles = GradientHough::default().detect_circles(&img, &search);
        assert!(!circles.is_empty(), "expected a circle");
        let best = circles[0];
        let err = ((best.x - 90.0).powi(2) + (best.y - 70.0).powi(2)).sqrt();
        assert!(err < 3.0, "center error {err}");
        assert!((best.r - 30.0).abs() <= 2.0, "radius {}", best.r);
    }

    fn band(min_dim: f64) -> CircleSearch {
        CircleSearch {
            min_radius: 0.03 * min_dim,
            max_radius: 0.25 * min_dim,
            min_center_dist: 0.25 * min_dim,
        }
    }

    fn assert_found(circles: &[CircleCandidate], center: [f64; 2], r: f64) {
        let hit = circles.iter().any(|c| {
            let err = ((c.x - center[0]).powi(2) + (c.y - center[1]).powi(2)).sqrt();
            err < 3.0 && (c.r - r).abs() <= 2.0
        });
        assert!(hit, "no circle near {center:?} r={r} in {circles:?}");
    }

    #[test]
    fn small_coin_on_large_canvas_is_found() {
        // Radius just above the lower end of the band.
        let img = blur_gray(&draw_disk(600, 400, [420.0, 150.0], 14.0, 50, 205), 1.0);
        let circles = GradientHough::default().detect_circles(&img, &band(400.0));
        assert_found(&circles, [420.0, 150.0], 14.0);
    }

    #[test]
    fn large_coin_is_found() {
        let img = blur_gray(&draw_disk(600, 400, [260.0, 200.0], 90.0, 50, 205), 1.0);
        let circles = GradientHough::default().detect_circles(&img, &band(400.0));
        assert_found(&circles, [260.0, 200.0], 90.0);
    }

    #[test]
    fn peak_threshold_is_relative_to_strongest_center() {
        let img = blur_gray(&draw_disk(300, 200, [150.0, 100.0], 20.0, 50, 205), 1.0);
        let strict = GradientHough::new(HoughConfig {
            min_vote_frac: 1.0,
            ..HoughConfig::default()
        });
        let circles = strict.detect_circles(&img, &band(200.0));
        assert_eq!(circles.len(), 1, "only the strongest peak survives: {circles:?}");
        assert_found(&circles, [150.0, 100.0], 20.0);
    }

    #[test]
    fn flat_image_has_no_circles() {
        let img = GrayImage::from_pixel(100, 100, Luma([128]));
        let search = CircleSearch {
            min_radius: 3.0,
            max_radius: 25.0,
            min_center_dist: 25.0,
        };
        assert!(GradientHough::default().detect_circles(&img, &search).is_empty());
    }

    #[test]
    fn inverted_band_returns_nothing() {
        let img = draw_disk(100, 100, [50.0, 50.0], 20.0, 40, 210);
        let search = CircleSearch {
            min_radius: 30.0,
            max_radius: 10.0,
            min_center_dist: 25.0,
        };
        assert!(GradientHough::default().detect_circles(&img, &search).is_empty());
    }
}
