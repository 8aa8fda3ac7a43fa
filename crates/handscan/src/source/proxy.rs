//! Geometric proxy: crease estimates from a hand-pose skeleton.
//!
//! Tips come straight from the skeleton. Each base crease is placed a fixed
//! fraction of the way from its knuckle toward the wrist and then, when
//! enabled, snapped to the strongest shading edge by [`refine_crease`].
//! Proxy geometry is less trustworthy than a keypoint model, so the pose
//! score is halved before it is stored.

use std::future::Future;

use crate::crease::{refine_crease, CreaseGuide, CreaseRefineConfig};
use crate::error::SourceError;
use crate::frame::Frame;
use crate::geometry::{clamp, clamp_unit, Point};
use crate::landmarks::{LandmarkDraft, LandmarkKey, LandmarkOrigin, LandmarkSet};

use super::{with_timeout, BackendError, LandmarkSource, RequestGate};

const SOURCE_NAME: &str = "Hand pose";

pub const HAND_WRIST: usize = 0;
pub const HAND_INDEX_MCP: usize = 5;
pub const HAND_INDEX_TIP: usize = 8;
pub const HAND_RING_MCP: usize = 13;
pub const HAND_RING_TIP: usize = 16;

/// Multiplier applied to the pose score.
const PROXY_CONFIDENCE_FACTOR: f64 = 0.5;
/// Upper bound of the knuckle→wrist crease fraction.
const MAX_CREASE_FRACTION: f64 = 0.3;

/// One detected hand.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HandPose {
    /// 21 joints, normalized to `[0, 1]` of the image size.
    pub landmarks: Vec<[f64; 2]>,
    /// Hand-presence score.
    pub score: Option<f64>,
    pub handedness: Option<String>,
}

/// External hand-pose detector. `Ok(None)` means no hand in the image.
pub trait HandPoseBackend: Send + Sync {
    fn estimate<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<Option<HandPose>, BackendError>> + Send + 'a;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Knuckle→wrist fraction of the initial crease estimate, in `[0, 0.3]`.
    pub crease_fraction: f64,
    /// Run crease refinement on the initial estimates.
    pub refine: bool,
    /// Presence score assumed when the backend reports none.
    pub default_score: f64,
    pub timeout_ms: Option<u64>,
    pub crease: CreaseRefineConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            crease_fraction: 0.15,
            refine: true,
            default_score: 0.6,
            timeout_ms: Some(30_000),
            crease: CreaseRefineConfig::default(),
        }
    }
}

/// Build a proxy landmark set from one pose.
pub fn proxy_landmarks(
    frame: &Frame,
    pose: &HandPose,
    config: &ProxyConfig,
) -> Result<LandmarkSet, SourceError> {
    let (w, h) = (frame.width() as f64, frame.height() as f64);
    let joint = |i: usize| -> Option<Point> {
        let [x, y] = *pose.landmarks.get(i)?;
        Some(Point::new(x * w, y * h))
    };
    let (Some(wrist), Some(index_mcp), Some(index_tip), Some(ring_mcp), Some(ring_tip)) = (
        joint(HAND_WRIST),
        joint(HAND_INDEX_MCP),
        joint(HAND_INDEX_TIP),
        joint(HAND_RING_MCP),
        joint(HAND_RING_TIP),
    ) else {
        return Err(SourceError::incomplete("Hand skeleton"));
    };

    let t = clamp(config.crease_fraction, 0.0, MAX_CREASE_FRACTION);
    let crease = |knuckle: Point, tip: Point| -> Point {
        let approx = knuckle.lerp(wrist, t);
        if !config.refine {
            return approx;
        }
        let guide = CreaseGuide { knuckle, tip, wrist };
        refine_crease(frame, approx, &guide, &config.crease).point
    };

    let mut draft = LandmarkDraft::default();
    draft.set(LandmarkKey::IndexBase, crease(index_mcp, index_tip));
    draft.set(LandmarkKey::IndexTip, index_tip);
    draft.set(LandmarkKey::RingBase, crease(ring_mcp, ring_tip));
    draft.set(LandmarkKey::RingTip, ring_tip);

    let score = clamp_unit(pose.score.unwrap_or(config.default_score));
    draft
        .finish(score * PROXY_CONFIDENCE_FACTOR, LandmarkOrigin::Proxy)
        .map_err(|_| SourceError::incomplete("Proxy landmarks"))
}

/// Landmark source backed by an optional hand-pose detector.
#[derive(Debug)]
pub struct ProxySource<H> {
    backend: Option<H>,
    config: ProxyConfig,
    gate: RequestGate,
}

impl<H: HandPoseBackend> ProxySource<H> {
    pub fn new(backend: H, config: ProxyConfig) -> Self {
        Self {
            backend: Some(backend),
            config,
            gate: RequestGate::new(SOURCE_NAME),
        }
    }

    pub fn unloaded(config: ProxyConfig) -> Self {
        Self {
            backend: None,
            config,
            gate: RequestGate::new(SOURCE_NAME),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    async fn run(&self, frame: &Frame) -> Result<LandmarkSet, SourceError> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            SourceError::Unavailable("Hand pose model not loaded.".to_string())
        })?;
        let _permit = self.gate.try_acquire()?;
        let pose = with_timeout(SOURCE_NAME, self.config.timeout_ms, async {
            backend.estimate(frame).await.map_err(SourceError::Inference)
        })
        .await?
        .ok_or(SourceError::NoHand)?;
        tracing::debug!(
            "hand pose: {} joints, score {:?}, {}",
            pose.landmarks.len(),
            pose.score,
            pose.handedness.as_deref().unwrap_or("unknown hand")
        );
        proxy_landmarks(frame, &pose, &self.config)
    }
}

impl<H: HandPoseBackend> LandmarkSource for ProxySource<H> {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn origin(&self) -> LandmarkOrigin {
        LandmarkOrigin::Proxy
    }

    fn acquire<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<LandmarkSet, SourceError>> + Send + 'a {
        self.run(frame)
    }
}
