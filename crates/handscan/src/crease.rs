//! Crease refinement: 1-D line search for the finger-base skin fold.
//!
//! A coarse crease estimate sits on the knuckle→wrist line. The crease casts
//! a shading edge across the finger, so intensity changes sharply along the
//! finger axis there. Candidates along the knuckle→wrist segment are scored
//! by that change (paired samples straddling the candidate along the finger
//! axis) and the strongest wins.
//!
//! The search is local: it assumes the coarse estimate is already within
//! `window` (normalized knuckle–wrist units) of the true crease.

use nalgebra::Vector2;

use crate::frame::Frame;
use crate::geometry::{clamp, unit_vector, Point};

/// Configuration for crease refinement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CreaseRefineConfig {
    /// Lowest normalized knuckle→wrist position a crease may take.
    pub t_min: f64,
    /// Highest normalized knuckle→wrist position a crease may take.
    pub t_max: f64,
    /// Half-width of the search window around the coarse estimate.
    pub window: f64,
    /// Step between candidates.
    pub step: f64,
    /// Base sampling offset as a fraction of the knuckle→tip length.
    pub offset_frac: f64,
    /// Clamp range of the base sampling offset (pixels).
    pub offset_min_px: f64,
    pub offset_max_px: f64,
    /// Multipliers of the base offset for the sample pairs.
    pub offset_multipliers: [f64; 3],
    /// Knuckle–wrist distance below which refinement is skipped (pixels).
    pub min_palm_len_px: f64,
}

impl Default for CreaseRefineConfig {
    fn default() -> Self {
        Self {
            t_min: 0.02,
            t_max: 0.35,
            window: 0.08,
            step: 0.01,
            offset_frac: 0.03,
            offset_min_px: 4.0,
            offset_max_px: 18.0,
            offset_multipliers: [1.0, 1.6, 2.2],
            min_palm_len_px: 1.0,
        }
    }
}

/// Skeleton points guiding the search for one finger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreaseGuide {
    pub knuckle: Point,
    pub tip: Point,
    pub wrist: Point,
}

/// Outcome of one refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreaseRefinement {
    /// Refined point, or the input point when the search was skipped.
    pub point: Point,
    /// Normalized knuckle→wrist position of `point` when refined.
    pub t: Option<f64>,
    /// Contrast score of the winning candidate.
    pub contrast: f64,
}

impl CreaseRefinement {
    fn unchanged(point: Point) -> Self {
        Self {
            point,
            t: None,
            contrast: 0.0,
        }
    }

    pub fn refined(&self) -> bool {
        self.t.is_some()
    }
}

/// Sum of absolute intensity differences of sample pairs straddling `p`
/// along `axis`. Pairs with a sample off the canvas contribute nothing.
fn contrast_score(frame: &Frame, p: Point, axis: Vector2<f64>, offsets: &[f64; 3]) -> f64 {
    offsets
        .iter()
        .filter_map(|&o| {
            let a = frame.intensity_at(p.offset(axis, o))?;
            let b = frame.intensity_at(p.offset(axis, -o))?;
            Some((a - b).abs())
        })
        .sum()
}

/// Refine a coarse crease estimate along the knuckle→wrist line.
///
/// Returns the input unchanged when the finger axis or palm vector is
/// degenerate, or the knuckle–wrist distance is too short to search.
pub fn refine_crease(
    frame: &Frame,
    approx: Point,
    guide: &CreaseGuide,
    config: &CreaseRefineConfig,
) -> CreaseRefinement {
    let (Some(axis), Some(palm)) = (
        unit_vector(guide.knuckle, guide.tip),
        unit_vector(guide.knuckle, guide.wrist),
    ) else {
        tracing::debug!("crease refinement skipped: degenerate skeleton");
        return CreaseRefinement::unchanged(approx);
    };
    let palm_len = guide.knuckle.distance(guide.wrist);
    if palm_len < config.min_palm_len_px || !(config.step > 0.0) {
        return CreaseRefinement::unchanged(approx);
    }

    let along = (approx.to_vector() - guide.knuckle.to_vector()).dot(&palm) / palm_len;
    let t0 = clamp(along, config.t_min, config.t_max);
    let t_lo = config.t_min.max(t0 - config.window);
    let t_hi = config.t_max.min(t0 + config.window);

    let base = clamp(
        guide.knuckle.distance(guide.tip) * config.offset_frac,
        config.offset_min_px,
        config.offset_max_px,
    );
    let offsets = config.offset_multipliers.map(|m| base * m);

    let mut best: Option<(f64, f64, Point)> = None;
    let n_steps = ((t_hi - t_lo) / config.step + 1e-9).floor() as usize;
    for i in 0..=n_steps {
        let t = t_lo + i as f64 * config.step;
        let candidate = guide.knuckle.lerp(guide.wrist, t);
        let score = contrast_score(frame, candidate, axis, &offsets);
        // Strict comparison keeps the earliest candidate on ties.
        if best.map_or(true, |(s, _, _)| score > s) {
            best = Some((score, t, candidate));
        }
    }

    match best {
        Some((contrast, t, point)) => {
            tracing::trace!(
                "crease t0={:.3} -> t={:.3} (contrast {:.1}, shift {:.1}px)",
                t0,
                t,
                contrast,
                point.distance(approx)
            );
            CreaseRefinement {
                point,
                t: Some(t),
                contrast,
            }
        }
        None => CreaseRefinement::unchanged(approx),
    }
}
