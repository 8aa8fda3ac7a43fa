//! Coin detection: circle candidates filtered and ranked by edge coverage.

use crate::frame::{EdgeMapConfig, Frame};
use crate::geometry::Point;

use super::coverage::{edge_coverage, score_candidate, ScoreWeights};
use super::hough::{CircleBackend, CircleSearch};
use super::ScaleReference;

/// Configuration for coin detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CoinDetectConfig {
    /// Minimum coin radius as a fraction of the smaller canvas dimension.
    pub min_radius_frac: f64,
    /// Maximum coin radius as a fraction of the smaller canvas dimension.
    pub max_radius_frac: f64,
    /// Minimum distance between circle centers, fraction of the smaller dimension.
    pub min_center_dist_frac: f64,
    /// Number of circumference samples for edge coverage.
    pub coverage_samples: usize,
    /// Candidates below this coverage are not coin-shaped and are dropped.
    pub min_coverage: f64,
    /// Detections below this coverage are flagged as low confidence.
    pub low_confidence_below: f64,
    /// Candidate score weights.
    pub weights: ScoreWeights,
    /// Edge-map preprocessing.
    pub edges: EdgeMapConfig,
}

impl Default for CoinDetectConfig {
    fn default() -> Self {
        Self {
            min_radius_frac: 0.03,
            max_radius_frac: 0.25,
            min_center_dist_frac: 0.25,
            coverage_samples: super::COVERAGE_SAMPLES,
            min_coverage: 0.35,
            low_confidence_below: 0.55,
            weights: ScoreWeights::default(),
            edges: EdgeMapConfig::default(),
        }
    }
}

impl CoinDetectConfig {
    /// Radius band and center separation for a canvas whose smaller side is `min_dim`.
    pub fn search_for(&self, min_dim: u32) -> CircleSearch {
        let d = min_dim as f64;
        CircleSearch {
            min_radius: (d * self.min_radius_frac).round(),
            max_radius: (d * self.max_radius_frac).round(),
            min_center_dist: (d * self.min_center_dist_frac).round(),
        }
    }
}

/// Result of one detection run. `NotFound` is a normal outcome that calls
/// for manual entry, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CoinOutcome {
    Found {
        scale: ScaleReference,
        /// Coverage was below [`CoinDetectConfig::low_confidence_below`].
        low_confidence: bool,
    },
    NotFound,
}

impl CoinOutcome {
    pub fn scale(&self) -> Option<&ScaleReference> {
        match self {
            CoinOutcome::Found { scale, .. } => Some(scale),
            CoinOutcome::NotFound => None,
        }
    }

    /// Status line for this outcome.
    pub fn status(&self) -> &'static str {
        match self {
            CoinOutcome::Found {
                low_confidence: true,
                ..
            } => "Coin detected with low confidence. Consider manual coin.",
            CoinOutcome::Found { .. } => "Coin detected.",
            CoinOutcome::NotFound => "Coin not found. Try manual coin selection.",
        }
    }
}

/// Coin detector over a pluggable circle backend.
pub struct CoinDetector<B> {
    backend: B,
    config: CoinDetectConfig,
}

impl<B: CircleBackend> CoinDetector<B> {
    pub fn new(backend: B, config: CoinDetectConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &CoinDetectConfig {
        &self.config
    }

    /// Detect the coin on a working canvas.
    pub fn detect(&self, frame: &Frame) -> CoinOutcome {
        let gray = frame.denoised_gray(&self.config.edges);
        let edges = frame.edge_map(&self.config.edges);
        let search = self.config.search_for(frame.min_dim());
        let circles = self.backend.detect_circles(&gray, &search);
        tracing::info!("{} circle candidates", circles.len());
        self.select(&edges, &circles, &search)
    }

    /// Pick the best coin among backend circles using the given edge map.
    pub fn select(
        &self,
        edges: &image::GrayImage,
        circles: &[super::CircleCandidate],
        search: &CircleSearch,
    ) -> CoinOutcome {
        let mut best: Option<(f64, f64, &super::CircleCandidate)> = None;
        for c in circles {
            let coverage = edge_coverage(edges, c.x, c.y, c.r, self.config.coverage_samples);
            if coverage < self.config.min_coverage {
                tracing::trace!(
                    "reject circle ({:.1}, {:.1}) r={:.1}: coverage {:.2}",
                    c.x,
                    c.y,
                    c.r,
                    coverage
                );
                continue;
            }
            let score = score_candidate(coverage, c.r, search.max_radius, self.config.weights);
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, coverage, c));
            }
        }

        let Some((score, coverage, c)) = best else {
            tracing::info!("coin not found");
            return CoinOutcome::NotFound;
        };
        let scale = ScaleReference::detected(Point::new(c.x, c.y), c.r, coverage);
        let low_confidence = scale.confidence < self.config.low_confidence_below;
        if low_confidence {
            tracing::warn!(
                "coin detected with low coverage {:.2} at ({:.1}, {:.1}) r={:.1}",
                coverage,
                c.x,
                c.y,
                c.r
            );
        } else {
            tracing::info!(
                "coin at ({:.1}, {:.1}) r={:.1} coverage={:.2} score={:.3}",
                c.x,
                c.y,
                c.r,
                coverage,
                score
            );
        }
        CoinOutcome::Found {
            scale,
            low_confidence,
        }
    }
}
