//! Landmark source adapters.
//!
//! Four interchangeable ways to produce a complete [`LandmarkSet`]:
//! - [`manual`] – ordered clicks,
//! - [`model`] – a local inference backend,
//! - [`remote`] – an HTTP keypoint-detection service,
//! - [`proxy`] – crease estimates derived from a hand skeleton.
//!
//! Every adapter validates its candidate through [`crate::LandmarkDraft`]
//! before returning it, guards its backend with a [`RequestGate`], and turns
//! backend panics-in-spirit (errors, empty results, hangs) into a
//! [`SourceError`].

use std::future::Future;
use std::time::Duration;

use crate::error::SourceError;
use crate::frame::Frame;
use crate::landmarks::{LandmarkOrigin, LandmarkSet};

pub(crate) mod gate;
pub(crate) mod keypoints;
pub(crate) mod manual;
pub(crate) mod model;
pub(crate) mod proxy;
pub(crate) mod remote;

pub use gate::{GatePermit, RequestGate};
pub use keypoints::{map_keypoint_name, normalize_keypoint_name, parse_keypoint_response, ParsedKeypoints};
pub use manual::{ManualClicks, ManualQueue, ManualStep, MANUAL_LANDMARK_CONFIDENCE};
pub use model::{
    decode_model_output, LandmarkPredictor, LetterboxTransform, ModelConfig, ModelOutputLayout,
    ModelSource, PredictorOutput, XyOrder,
};
pub use proxy::{
    proxy_landmarks, HandPose, HandPoseBackend, ProxyConfig, ProxySource, HAND_INDEX_MCP,
    HAND_INDEX_TIP, HAND_RING_MCP, HAND_RING_TIP, HAND_WRIST,
};
pub use remote::{
    resolve_endpoint_url, HttpTransport, KeypointTransport, RemoteConfig, RemoteSource,
    TransportResponse,
};

/// Boxed error type returned by external backends.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Capability shared by all landmark providers.
pub trait LandmarkSource {
    /// Name used in status lines ("Cloud model", "Hand pose", ...).
    fn name(&self) -> &'static str;

    /// Origin tag stamped on sets this source produces.
    fn origin(&self) -> LandmarkOrigin;

    /// Produce a complete, validated landmark set for `frame`.
    fn acquire<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<LandmarkSet, SourceError>> + Send + 'a;
}

/// Await `fut`, converting an elapsed deadline into [`SourceError::Timeout`].
pub(crate) async fn with_timeout<T>(
    name: &'static str,
    timeout_ms: Option<u64>,
    fut: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| SourceError::Timeout(name, ms))?,
        None => fut.await,
    }
}
