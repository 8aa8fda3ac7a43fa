//! handscan: coin-calibrated 2D:4D finger length measurement.
//!
//! A single photo holds a hand and a coin of known diameter. The coin sets
//! the pixel→centimeter scale; four landmarks (index and ring finger, base
//! crease and tip) give the two lengths and their ratio.
//!
//! 1. **Frame** – the photo fitted into a working canvas, with a luma plane
//!    and a median+Canny edge map.
//! 2. **Scale** – circle candidates from a pluggable backend, filtered and
//!    ranked by edge coverage; manual two-click entry as the recovery path.
//! 3. **Sources** – manual clicks, a local model, a remote keypoint service,
//!    or a geometric proxy from a hand skeleton, all producing one
//!    all-or-nothing [`LandmarkSet`].
//! 4. **Crease** – 1-D contrast search that snaps proxy crease estimates to
//!    the visible skin fold.
//! 5. **Session** – owns the per-image state, sequences acquisitions and
//!    applies the fallback policy.
//! 6. **Measure** – lengths, ratio and combined confidence, derived on
//!    demand.

mod annotations;
mod coin;
mod config;
mod crease;
mod error;
mod frame;
mod geometry;
mod landmarks;
mod measure;
mod scale;
mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod test_utils;

pub use annotations::{AnnotationExport, AnnotationItem, ANNOTATION_FORMAT_VERSION};
pub use coin::{parse_diameter_mm, CoinType};
pub use config::{CanvasConfig, EngineConfig};
pub use crease::{refine_crease, CreaseGuide, CreaseRefineConfig, CreaseRefinement};
pub use error::{AcquireError, ConfigError, SessionError, SourceError};
pub use frame::{luma, EdgeMapConfig, Frame, DEFAULT_MAX_CANVAS_DIM};
pub use geometry::Point;
pub use landmarks::{LandmarkDraft, LandmarkKey, LandmarkOrigin, LandmarkSet};
pub use measure::{measure, MeasurementResult};
pub use scale::{
    edge_coverage, score_candidate, CircleBackend, CircleCandidate, CircleSearch,
    CoinDetectConfig, CoinDetector, CoinOutcome, GradientHough, HoughConfig, ScaleReference,
    ScaleSource, ScoreWeights, COVERAGE_SAMPLES, MANUAL_SCALE_CONFIDENCE, MIN_MANUAL_RADIUS_PX,
};
pub use session::{
    Acquired, ClickOutcome, CoinClick, Fallback, FallbackPolicy, Session, SessionMode, Ticket,
};
pub use source::LandmarkSource;
