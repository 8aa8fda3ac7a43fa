//! Edge-coverage scoring of circle candidates.
//!
//! A coin leaves a closed circular trace in the edge map. Coverage measures
//! how much of a candidate circle's circumference actually lands on edge
//! pixels, which is far stronger evidence than the Hough vote alone.

use image::GrayImage;

/// Number of circumference samples used for coverage.
pub const COVERAGE_SAMPLES: usize = 48;

/// Fraction of `samples` evenly spaced circumference points that hit a
/// non-zero edge pixel.
///
/// Samples falling outside the image are skipped but still count in the
/// denominator, so a circle half outside the frame cannot reach full
/// coverage. The result is always in [0, 1].
pub fn edge_coverage(edges: &GrayImage, cx: f64, cy: f64, r: f64, samples: usize) -> f64 {
    if samples == 0 || !r.is_finite() || !cx.is_finite() || !cy.is_finite() {
        return 0.0;
    }
    let hits = (0..samples)
        .filter(|&i| {
            let theta = std::f64::consts::TAU * i as f64 / samples as f64;
            edge_hit(edges, cx, cy, r, theta)
        })
        .count();
    hits as f64 / samples as f64
}

/// Whether the circumference point at angle `theta` lands on an edge pixel.
/// Off-image points never hit.
fn edge_hit(edges: &GrayImage, cx: f64, cy: f64, r: f64, theta: f64) -> bool {
    let (w, h) = edges.dimensions();
    let px = (cx + r * theta.cos()).round();
    let py = (cy + r * theta.sin()).round();
    if px < 0.0 || py < 0.0 || px >= w as f64 || py >= h as f64 {
        return false;
    }
    edges.get_pixel(px as u32, py as u32)[0] > 0
}

/// Weights of the candidate score `coverage_weight * coverage + radius_weight * r / max_r`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub coverage: f64,
    pub radius: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            coverage: 0.7,
            radius: 0.3,
        }
    }
}

/// Rank an accepted candidate. Coverage dominates; radius breaks ties in
/// favor of larger circles.
#[inline]
pub fn score_candidate(coverage: f64, r: f64, max_radius: f64, weights: ScoreWeights) -> f64 {
    let normalized_radius = if max_radius > 0.0 { r / max_radius } else { 0.0 };
    weights.coverage * coverage + weights.radius * normalized_radius
}
