//! Measurement session: the single owner of per-image state.
//!
//! A [`Session`] holds the working canvas, the committed scale reference and
//! landmark set, the coin diameter, and the interaction mode. Loading a new
//! frame resets all of it. Landmark acquisitions follow a ticket protocol:
//! [`Session::begin`] hands out a [`Ticket`] bound to the current frame
//! generation, and [`Session::complete`] commits the result only if that
//! generation is still current. A failed or stale acquisition never touches
//! the committed set.

use std::sync::Arc;

use crate::coin::{parse_diameter_mm, CoinType};
use crate::error::{AcquireError, SessionError, SourceError};
use crate::frame::Frame;
use crate::geometry::Point;
use crate::landmarks::{LandmarkKey, LandmarkOrigin, LandmarkSet};
use crate::measure::{measure, MeasurementResult};
use crate::scale::{CircleBackend, CoinDetector, CoinOutcome, ScaleReference};
use crate::source::{LandmarkSource, ManualQueue, ManualStep};

/// What to do after a primary landmark source fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Report the failure; the caller picks the next step.
    #[default]
    None,
    /// Chain into the geometric proxy source.
    GeometricProxy,
}

/// Per-source fallback rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    /// Applies to the local model.
    pub on_model_unavailable: Fallback,
    /// Applies to the remote service.
    pub on_remote_failure: Fallback,
}

impl FallbackPolicy {
    pub fn for_origin(&self, origin: LandmarkOrigin) -> Fallback {
        match origin {
            LandmarkOrigin::Auto => self.on_model_unavailable,
            LandmarkOrigin::Cloud => self.on_remote_failure,
            LandmarkOrigin::Manual | LandmarkOrigin::Proxy => Fallback::None,
        }
    }
}

/// Step of the two-click manual coin entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoinClick {
    Center,
    Edge { center: Point },
}

/// Interaction mode. Exactly one of these is active at a time.
#[derive(Debug, Clone, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    AwaitingManualLandmarks(ManualQueue),
    AwaitingManualCoin(CoinClick),
    /// A landmark source is running.
    Running(&'static str),
}

/// Proof that an acquisition was started on a particular frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an acquisition ticket must be completed"]
pub struct Ticket {
    generation: u64,
    source: &'static str,
}

impl Ticket {
    pub fn source(&self) -> &'static str {
        self.source
    }
}

/// Outcome of one click while awaiting manual input.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    CoinCenterSet,
    /// Center click outside the image; still waiting for the center.
    CoinCenterRejected,
    /// Edge click too close to the center; still waiting for an edge click.
    CoinRadiusTooSmall,
    CoinCommitted(ScaleReference),
    NextLandmark(LandmarkKey),
    /// Click rejected; the same landmark is still pending.
    LandmarkRejected(LandmarkKey),
    LandmarksCommitted(LandmarkSet),
}

/// A committed acquisition and whether a fallback produced it.
#[derive(Debug)]
pub struct Acquired {
    pub landmarks: LandmarkSet,
    /// Primary failure that triggered the fallback.
    pub fallback_from: Option<SourceError>,
}

/// Per-image measurement state.
#[derive(Debug)]
pub struct Session {
    frame: Option<Arc<Frame>>,
    generation: u64,
    scale: Option<ScaleReference>,
    landmarks: Option<LandmarkSet>,
    coin: CoinType,
    diameter_cm: f64,
    mode: SessionMode,
    fallback: FallbackPolicy,
    status: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            frame: None,
            generation: 0,
            scale: None,
            landmarks: None,
            coin: CoinType::Quarter,
            diameter_cm: CoinType::Quarter.diameter_mm() / 10.0,
            mode: SessionMode::Idle,
            fallback: FallbackPolicy::default(),
            status: String::new(),
        }
    }
}

impl Session {
    pub fn new(coin: CoinType, fallback: FallbackPolicy) -> Result<Self, SessionError> {
        let mut session = Self {
            fallback,
            ..Self::default()
        };
        session.set_coin(coin)?;
        Ok(session)
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scale(&self) -> Option<&ScaleReference> {
        self.scale.as_ref()
    }

    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        self.landmarks.as_ref()
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn coin(&self) -> CoinType {
        self.coin
    }

    pub fn diameter_cm(&self) -> f64 {
        self.diameter_cm
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback
    }

    pub fn set_fallback_policy(&mut self, policy: FallbackPolicy) {
        self.fallback = policy;
    }

    /// Latest human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        tracing::debug!("status: {}", self.status);
    }

    fn require_frame(&mut self) -> Result<Arc<Frame>, SessionError> {
        match &self.frame {
            Some(frame) => Ok(Arc::clone(frame)),
            None => Err(self.fail(SessionError::NoImage)),
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.set_status(err.to_string());
        err
    }

    fn ensure_not_running(&mut self) -> Result<(), SessionError> {
        match self.mode {
            SessionMode::Running(name) => Err(self.fail(SessionError::Busy(name))),
            _ => Ok(()),
        }
    }

    /// Replace the image. Scale, landmarks, mode and manual queues are reset
    /// and tickets handed out before this call become stale.
    pub fn load_frame(&mut self, frame: Frame) {
        self.generation += 1;
        tracing::info!(
            "loaded {}x{} canvas (generation {})",
            frame.width(),
            frame.height(),
            self.generation
        );
        self.frame = Some(Arc::new(frame));
        self.scale = None;
        self.landmarks = None;
        self.mode = SessionMode::Idle;
        self.set_status("Image loaded. Detect the coin or place it manually.");
    }

    /// Select a coin preset or custom diameter. An invalid diameter keeps the
    /// previous coin.
    pub fn set_coin(&mut self, coin: CoinType) -> Result<f64, SessionError> {
        let cm = coin.diameter_cm().map_err(|e| self.fail(e))?;
        self.coin = coin;
        self.diameter_cm = cm;
        Ok(cm)
    }

    /// Override the coin diameter from user input in millimetres.
    pub fn set_coin_diameter_mm(&mut self, input: &str) -> Result<f64, SessionError> {
        let mm = parse_diameter_mm(input).map_err(|e| self.fail(e))?;
        self.set_coin(CoinType::Custom(mm))
    }

    /// Run coin detection and commit a found coin. `NotFound` keeps the
    /// previous scale reference.
    pub fn detect_coin<B: CircleBackend>(
        &mut self,
        detector: &CoinDetector<B>,
    ) -> Result<CoinOutcome, SessionError> {
        let frame = self.require_frame()?;
        self.ensure_not_running()?;
        if matches!(self.mode, SessionMode::AwaitingManualCoin(_)) {
            self.mode = SessionMode::Idle;
        }
        let outcome = detector.detect(&frame);
        if let Some(scale) = outcome.scale() {
            self.scale = Some(*scale);
        }
        self.set_status(outcome.status());
        Ok(outcome)
    }

    /// Start two-click manual coin entry.
    pub fn begin_manual_coin(&mut self) -> Result<(), SessionError> {
        self.require_frame()?;
        self.ensure_not_running()?;
        self.mode = SessionMode::AwaitingManualCoin(CoinClick::Center);
        self.set_status("Click the coin center.");
        Ok(())
    }

    /// Start four-click manual landmark entry, discarding any previous queue.
    pub fn begin_manual_landmarks(&mut self) -> Result<(), SessionError> {
        self.require_frame()?;
        self.ensure_not_running()?;
        self.mode = SessionMode::AwaitingManualLandmarks(ManualQueue::new());
        self.set_status(format!("Click {}.", LandmarkKey::IndexBase.label()));
        Ok(())
    }

    /// Feed one click to whichever manual entry is in progress.
    pub fn click(&mut self, point: Point) -> Result<ClickOutcome, SessionError> {
        match std::mem::take(&mut self.mode) {
            SessionMode::AwaitingManualCoin(step) => Ok(self.coin_click(step, point)),
            SessionMode::AwaitingManualLandmarks(mut queue) => match queue.push(point) {
                Ok(ManualStep::Next(key)) => {
                    self.mode = SessionMode::AwaitingManualLandmarks(queue);
                    self.set_status(format!("Click {}.", key.label()));
                    Ok(ClickOutcome::NextLandmark(key))
                }
                Ok(ManualStep::Rejected(key)) => {
                    self.mode = SessionMode::AwaitingManualLandmarks(queue);
                    self.set_status(format!("Click {} inside the image.", key.label()));
                    Ok(ClickOutcome::LandmarkRejected(key))
                }
                Ok(ManualStep::Complete(set)) => {
                    self.landmarks = Some(set);
                    self.set_status("Landmarks set.");
                    Ok(ClickOutcome::LandmarksCommitted(set))
                }
                Err(_) => Err(self.fail(SessionError::NotAwaitingInput)),
            },
            other => {
                self.mode = other;
                Err(self.fail(SessionError::NotAwaitingInput))
            }
        }
    }

    fn coin_click(&mut self, step: CoinClick, point: Point) -> ClickOutcome {
        match step {
            CoinClick::Center if point.is_valid() => {
                self.mode = SessionMode::AwaitingManualCoin(CoinClick::Edge { center: point });
                self.set_status("Click the coin edge.");
                ClickOutcome::CoinCenterSet
            }
            CoinClick::Center => {
                self.mode = SessionMode::AwaitingManualCoin(CoinClick::Center);
                self.set_status("Click the coin center inside the image.");
                ClickOutcome::CoinCenterRejected
            }
            CoinClick::Edge { center } => match ScaleReference::from_manual(center, point) {
                Some(scale) => {
                    self.scale = Some(scale);
                    self.set_status("Coin set manually.");
                    ClickOutcome::CoinCommitted(scale)
                }
                None => {
                    self.mode = SessionMode::AwaitingManualCoin(step);
                    self.set_status("Coin radius too small. Try again.");
                    ClickOutcome::CoinRadiusTooSmall
                }
            },
        }
    }

    /// Start an acquisition from `source`. Discards any manual queue.
    pub fn begin(&mut self, source: &'static str) -> Result<Ticket, SessionError> {
        self.require_frame()?;
        self.ensure_not_running()?;
        self.mode = SessionMode::Running(source);
        self.set_status(format!("Running {source}..."));
        tracing::info!("{source}: acquisition started");
        Ok(Ticket {
            generation: self.generation,
            source,
        })
    }

    /// Finish an acquisition. A success replaces the committed set whole; a
    /// failure or a ticket from a replaced frame leaves it untouched.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<LandmarkSet, SourceError>,
    ) -> Result<LandmarkSet, AcquireError> {
        if ticket.generation != self.generation {
            tracing::warn!("{}: result discarded, frame replaced", ticket.source);
            return Err(SessionError::StaleTicket.into());
        }
        if matches!(self.mode, SessionMode::Running(name) if name == ticket.source) {
            self.mode = SessionMode::Idle;
        }
        match result {
            Ok(set) => {
                self.landmarks = Some(set);
                self.set_status(format!("{}: landmarks detected.", ticket.source));
                tracing::info!(
                    "{}: committed landmarks (confidence {:.2})",
                    ticket.source,
                    set.confidence
                );
                Ok(set)
            }
            Err(err) => {
                self.set_status(err.to_string());
                tracing::warn!("{}: {}", ticket.source, err);
                Err(err.into())
            }
        }
    }

    /// Give up on an acquisition that will never complete. Releases the
    /// running mode if it still belongs to `ticket`; the committed set stays.
    pub fn abandon(&mut self, ticket: Ticket) {
        if ticket.generation != self.generation {
            return;
        }
        if matches!(self.mode, SessionMode::Running(name) if name == ticket.source) {
            self.mode = SessionMode::Idle;
            tracing::warn!("{}: acquisition cancelled", ticket.source);
            self.set_status(format!("{} cancelled.", ticket.source));
        }
    }

    /// Run `source` on the current frame and commit its result. Dropping the
    /// returned future before it resolves abandons the acquisition.
    pub async fn acquire<S: LandmarkSource>(
        &mut self,
        source: &S,
    ) -> Result<LandmarkSet, AcquireError> {
        let ticket = self.begin(source.name())?;
        let mut run = RunGuard {
            session: self,
            ticket: Some(ticket),
        };
        let frame = run.session.require_frame()?;
        let result = source.acquire(&frame).await;
        run.finish(result)
    }

    /// Run `primary`; if it fails and the fallback policy for its origin says
    /// so, run `proxy` instead.
    pub async fn acquire_with_fallback<S, P>(
        &mut self,
        primary: &S,
        proxy: Option<&P>,
    ) -> Result<Acquired, AcquireError>
    where
        S: LandmarkSource,
        P: LandmarkSource,
    {
        let err = match self.acquire(primary).await {
            Ok(landmarks) => {
                return Ok(Acquired {
                    landmarks,
                    fallback_from: None,
                })
            }
            Err(AcquireError::Source(err)) => err,
            Err(other) => return Err(other),
        };
        let proxy = match (self.fallback.for_origin(primary.origin()), proxy) {
            (Fallback::GeometricProxy, Some(proxy)) if err.allows_fallback() => proxy,
            _ => return Err(err.into()),
        };
        tracing::warn!("{} failed ({}); falling back to {}", primary.name(), err, proxy.name());
        let landmarks = self.acquire(proxy).await?;
        self.set_status(format!(
            "{} failed; used {} landmarks instead.",
            primary.name(),
            proxy.name()
        ));
        Ok(Acquired {
            landmarks,
            fallback_from: Some(err),
        })
    }

    /// Drop the committed landmarks and any manual landmark entry.
    pub fn clear_landmarks(&mut self) {
        self.landmarks = None;
        if matches!(self.mode, SessionMode::AwaitingManualLandmarks(_)) {
            self.mode = SessionMode::Idle;
        }
        self.set_status("Landmarks cleared.");
    }

    /// Current measurement, or `None` until both coin and landmarks exist.
    pub fn measurement(&self) -> Option<MeasurementResult> {
        measure(self.scale.as_ref(), self.landmarks.as_ref(), self.diameter_cm)
    }
}

/// Completes or abandons an in-flight acquisition; dropping it unfinished
/// (the caller's future was cancelled) releases the running mode.
struct RunGuard<'s> {
    session: &'s mut Session,
    ticket: Option<Ticket>,
}

impl RunGuard<'_> {
    fn finish(
        &mut self,
        result: Result<LandmarkSet, SourceError>,
    ) -> Result<LandmarkSet, AcquireError> {
        match self.ticket.take() {
            Some(ticket) => self.session.complete(ticket, result),
            None => Err(SessionError::StaleTicket.into()),
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.session.abandon(ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::{CircleCandidate, CircleSearch};
    use crate::source::proxy::tests::{upright_pose, FixedPose};
    use crate::source::{ManualClicks, ProxyConfig, ProxySource};
    use crate::test_utils::{frame_with_crease_step, frame_with_disk};
    use approx::assert_relative_eq;

    struct Scripted(Result<LandmarkSet, &'static str>, LandmarkOrigin);

    impl LandmarkSource for Scripted {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        fn origin(&self) -> LandmarkOrigin {
            self.1
        }

        async fn acquire<'a>(&'a self, _frame: &'a Frame) -> Result<LandmarkSet, SourceError> {
            self.0.map_err(|m| SourceError::Incomplete(m.to_string()))
        }
    }

    fn quarter_hand() -> [Point; 4] {
        [
            Point::new(200.0, 200.0),
            Point::new(200.0, 150.0),
            Point::new(260.0, 200.0),
            Point::new(260.0, 130.0),
        ]
    }

    fn loaded() -> Session {
        let mut s = Session::default();
        s.load_frame(frame_with_crease_step(400, 400, 1000.0));
        s
    }

    #[test]
    fn operations_need_an_image() {
        let mut s = Session::default();
        assert_eq!(s.begin_manual_coin(), Err(SessionError::NoImage));
        assert_eq!(s.begin("x").unwrap_err(), SessionError::NoImage);
        assert_eq!(s.status(), "Upload an image first.");
        assert!(s.measurement().is_none());
    }

    #[test]
    fn manual_quarter_scenario() {
        let mut s = loaded();
        s.begin_manual_coin().unwrap();
        assert_eq!(s.click(Point::new(100.0, 100.0)), Ok(ClickOutcome::CoinCenterSet));
        // 3 px edge click: still waiting for the edge.
        assert_eq!(s.click(Point::new(103.0, 100.0)), Ok(ClickOutcome::CoinRadiusTooSmall));
        assert_eq!(s.status(), "Coin radius too small. Try again.");
        assert!(s.scale().is_none());
        let ClickOutcome::CoinCommitted(scale) = s.click(Point::new(130.0, 140.0)).unwrap() else {
            panic!("coin not committed");
        };
        assert_relative_eq!(scale.radius_px, 50.0);

        s.begin_manual_landmarks().unwrap();
        for p in quarter_hand() {
            s.click(p).unwrap();
        }
        assert!(matches!(s.mode(), SessionMode::Idle));
        let m = s.measurement().unwrap();
        assert_relative_eq!(m.length_2d_cm, 1.213, epsilon = 1e-9);
        assert_relative_eq!(m.length_4d_cm, 1.6982, epsilon = 1e-9);
        assert_relative_eq!(m.ratio.unwrap(), 0.71428, epsilon = 1e-4);
        assert_eq!(m.confidence, 0.9);
    }

    #[test]
    fn click_without_entry_is_rejected() {
        let mut s = loaded();
        assert_eq!(s.click(Point::new(1.0, 1.0)), Err(SessionError::NotAwaitingInput));
    }

    #[test]
    fn invalid_diameter_keeps_previous() {
        let mut s = Session::default();
        assert_relative_eq!(s.set_coin_diameter_mm("21.21").unwrap(), 2.121, epsilon = 1e-12);
        assert_eq!(s.set_coin_diameter_mm("-1"), Err(SessionError::InvalidDiameter));
        assert_relative_eq!(s.diameter_cm(), 2.121, epsilon = 1e-12);
        assert_eq!(s.coin(), CoinType::Custom(21.21));
    }

    #[tokio::test]
    async fn partial_result_keeps_committed_set() {
        let mut s = loaded();
        let committed = s.acquire(&ManualClicks::new(quarter_hand())).await.unwrap();

        let three = &quarter_hand()[..3];
        let err = s.acquire(&ManualClicks::new(three)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Source(SourceError::Incomplete(_))));
        assert_eq!(s.landmarks(), Some(&committed));
        assert!(matches!(s.mode(), SessionMode::Idle));
    }

    #[test]
    fn overlapping_acquisition_is_busy_and_stale_tickets_are_dropped() {
        let mut s = loaded();
        let ticket = s.begin("Cloud model").unwrap();
        assert_eq!(s.begin("Custom model"), Err(SessionError::Busy("Cloud model")));
        assert_eq!(s.begin_manual_landmarks(), Err(SessionError::Busy("Cloud model")));

        s.load_frame(frame_with_crease_step(100, 100, 1000.0));
        let set = LandmarkSet::new(quarter_hand(), 0.8, LandmarkOrigin::Cloud).unwrap();
        let err = s.complete(ticket, Ok(set)).unwrap_err();
        assert!(matches!(err, AcquireError::Session(SessionError::StaleTicket)));
        assert!(s.landmarks().is_none());
        assert!(s.begin("Custom model").is_ok());
    }

    struct Stalled;

    impl LandmarkSource for Stalled {
        fn name(&self) -> &'static str {
            "Stalled"
        }

        fn origin(&self) -> LandmarkOrigin {
            LandmarkOrigin::Cloud
        }

        async fn acquire<'a>(&'a self, _frame: &'a Frame) -> Result<LandmarkSet, SourceError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Err(SourceError::NoPrediction)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_acquisition_releases_session() {
        let mut s = loaded();
        let committed = s.acquire(&ManualClicks::new(quarter_hand())).await.unwrap();

        let res = tokio::time::timeout(std::time::Duration::from_millis(10), s.acquire(&Stalled)).await;
        assert!(res.is_err(), "acquisition should still be pending");

        assert!(matches!(s.mode(), SessionMode::Idle));
        assert_eq!(s.status(), "Stalled cancelled.");
        assert_eq!(s.landmarks(), Some(&committed));
        s.begin_manual_coin().unwrap();
        let ticket = s.begin("Cloud model").unwrap();
        s.abandon(ticket);
        assert!(matches!(s.mode(), SessionMode::Idle));
    }

    #[test]
    fn abandoning_a_stale_ticket_keeps_the_new_run() {
        let mut s = loaded();
        let old = s.begin("Cloud model").unwrap();
        s.load_frame(frame_with_crease_step(100, 100, 1000.0));
        let _current = s.begin("Custom model").unwrap();
        s.abandon(old);
        assert!(matches!(s.mode(), SessionMode::Running("Custom model")));
    }

    #[test]
    fn new_acquisition_discards_manual_queue() {
        let mut s = loaded();
        s.begin_manual_landmarks().unwrap();
        s.click(Point::new(1.0, 1.0)).unwrap();
        let ticket = s.begin("Hand pose").unwrap();
        assert!(matches!(s.mode(), SessionMode::Running("Hand pose")));
        let _ = s.complete(ticket, Err(SourceError::NoHand));
        assert!(matches!(s.mode(), SessionMode::Idle));
        assert_eq!(s.click(Point::new(2.0, 2.0)), Err(SessionError::NotAwaitingInput));
    }

    #[test]
    fn load_frame_resets_everything() {
        let mut s = loaded();
        s.begin_manual_landmarks().unwrap();
        let ticket = s.begin("x");
        assert!(ticket.is_ok());
        s.load_frame(frame_with_crease_step(10, 10, 5.0));
        assert!(s.scale().is_none());
        assert!(s.landmarks().is_none());
        assert!(matches!(s.mode(), SessionMode::Idle));
        assert_eq!(s.generation(), 2);
    }

    #[tokio::test]
    async fn fallback_follows_policy() {
        let frame = frame_with_crease_step(200, 800, 10_000.0);
        let proxy = ProxySource::new(FixedPose(Some(upright_pose(Some(0.8)))), ProxyConfig::default());
        let failing = Scripted(Err("Model landmarks incomplete or invalid."), LandmarkOrigin::Auto);

        // Default: caller-initiated, failure reported.
        let mut s = Session::default();
        s.load_frame(frame.clone());
        let err = s.acquire_with_fallback(&failing, Some(&proxy)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Source(SourceError::Incomplete(_))));
        assert!(s.landmarks().is_none());

        let policy = FallbackPolicy {
            on_model_unavailable: Fallback::GeometricProxy,
            ..Default::default()
        };
        let mut s = Session::new(CoinType::Quarter, policy).unwrap();
        s.load_frame(frame);
        let got = s.acquire_with_fallback(&failing, Some(&proxy)).await.unwrap();
        assert!(got.fallback_from.is_some());
        assert_eq!(got.landmarks.source, LandmarkOrigin::Proxy);
        assert!((got.landmarks.confidence - 0.4).abs() < 1e-12);
        assert_eq!(s.landmarks(), Some(&got.landmarks));

        // Remote failures follow their own rule (still None here).
        let remote = Scripted(Err("down"), LandmarkOrigin::Cloud);
        assert!(s.acquire_with_fallback(&remote, Some(&proxy)).await.is_err());
        assert_eq!(s.landmarks(), Some(&got.landmarks));
    }

    struct Fixed(Vec<CircleCandidate>);

    impl CircleBackend for Fixed {
        fn detect_circles(&self, _gray: &image::GrayImage, _s: &CircleSearch) -> Vec<CircleCandidate> {
            self.0.clone()
        }
    }

    #[test]
    fn coin_not_found_keeps_previous_scale() {
        let mut s = Session::default();
        s.load_frame(frame_with_disk(400, 300, [150.0, 140.0], 40.0));
        let found = CoinDetector::new(
            Fixed(vec![CircleCandidate { x: 150.0, y: 140.0, r: 40.0 }]),
            Default::default(),
        );
        let outcome = s.detect_coin(&found).unwrap();
        assert!(matches!(outcome, CoinOutcome::Found { .. }));
        let committed = *s.scale().unwrap();

        let none = CoinDetector::new(Fixed(Vec::new()), Default::default());
        assert_eq!(s.detect_coin(&none).unwrap(), CoinOutcome::NotFound);
        assert_eq!(s.scale(), Some(&committed));
        assert_eq!(s.status(), "Coin not found. Try manual coin selection.");
    }
}
