//! Scale reference: the coin that converts pixels to centimeters.
//!
//! Stages:
//! 1. **Hough** – a [`CircleBackend`] proposes `(x, y, r)` circles inside a
//!    radius band derived from the canvas size.
//! 2. **Coverage** – each circle is checked against the edge map; poorly
//!    traced circles are rejected.
//! 3. **Select** – the best-scoring survivor becomes the [`ScaleReference`].
//!
//! Manual two-click entry ([`ScaleReference::from_manual`]) is the recovery
//! path when detection finds nothing.

pub(crate) mod coverage;
pub(crate) mod detect;
pub(crate) mod hough;

pub use coverage::{edge_coverage, score_candidate, ScoreWeights, COVERAGE_SAMPLES};
pub use detect::{CoinDetectConfig, CoinDetector, CoinOutcome};
pub use hough::{CircleBackend, CircleCandidate, CircleSearch, GradientHough, HoughConfig};

use crate::geometry::{clamp_unit, Point};

/// Minimum radius accepted from manual two-click entry (pixels).
pub const MIN_MANUAL_RADIUS_PX: f64 = 5.0;

/// Confidence assigned to a manually placed coin.
pub const MANUAL_SCALE_CONFIDENCE: f64 = 0.9;

/// How a scale reference was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSource {
    Manual,
    Auto,
}

/// The committed coin: center, pixel radius, and how much to trust it.
///
/// Replaced wholesale on re-detection; never partially mutated.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScaleReference {
    pub center: Point,
    pub radius_px: f64,
    /// Detection confidence in [0, 1].
    pub confidence: f64,
    pub source: ScaleSource,
}

impl ScaleReference {
    /// Build from a detector result; confidence is clamped into [0, 1].
    pub fn detected(center: Point, radius_px: f64, confidence: f64) -> Self {
        Self {
            center,
            radius_px,
            confidence: clamp_unit(confidence),
            source: ScaleSource::Auto,
        }
    }

    /// Manual entry from a center click and an edge click.
    ///
    /// Returns `None` when either click is invalid or the implied radius is
    /// below [`MIN_MANUAL_RADIUS_PX`] (an underspecified click pair).
    pub fn from_manual(center: Point, edge: Point) -> Option<Self> {
        if !center.is_valid() || !edge.is_valid() {
            return None;
        }
        let radius_px = center.distance(edge);
        if radius_px < MIN_MANUAL_RADIUS_PX {
            return None;
        }
        Some(Self {
            center,
            radius_px,
            confidence: MANUAL_SCALE_CONFIDENCE,
            source: ScaleSource::Manual,
        })
    }

    /// Centimeters per canvas pixel for a coin of `diameter_cm`.
    ///
    /// Derived on demand; `None` when the radius is not positive.
    pub fn cm_per_pixel(&self, diameter_cm: f64) -> Option<f64> {
        if !(self.radius_px > 0.0) || !self.radius_px.is_finite() {
            return None;
        }
        Some(diameter_cm / (2.0 * self.radius_px))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn manual_entry_sets_radius_and_confidence() {
        let s = ScaleReference::from_manual(Point::new(100.0, 100.0), Point::new(130.0, 140.0)).unwrap();
        assert_relative_eq!(s.radius_px, 50.0);
        assert_eq!(s.confidence, 0.9);
        assert_eq!(s.source, ScaleSource::Manual);
    }

    #[test]
    fn manual_entry_rejects_tiny_radius() {
        assert!(ScaleReference::from_manual(Point::new(10.0, 10.0), Point::new(13.0, 13.0)).is_none());
        assert!(ScaleReference::from_manual(Point::new(10.0, 10.0), Point::new(15.0, 10.0)).is_some());
    }

    #[test]
    fn cm_per_pixel_is_linear_in_radius() {
        let a = ScaleReference::detected(Point::new(100.0, 100.0), 50.0, 0.8);
        let b = ScaleReference::detected(Point::new(100.0, 100.0), 100.0, 0.8);
        let ka = a.cm_per_pixel(2.426).unwrap();
        let kb = b.cm_per_pixel(2.426).unwrap();
        assert_relative_eq!(ka, 0.02426, epsilon = 1e-12);
        assert_relative_eq!(ka, 2.0 * kb, epsilon = 1e-12);
    }

    #[test]
    fn non_positive_radius_has_no_calibration() {
        let s = ScaleReference::detected(Point::new(1.0, 1.0), 0.0, 0.9);
        assert!(s.cm_per_pixel(2.426).is_none());
    }
}
