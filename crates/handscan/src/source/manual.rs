//! Manual landmark entry: four clicks in a fixed order.

use crate::error::SourceError;
use crate::frame::Frame;
use crate::geometry::Point;
use crate::landmarks::{LandmarkDraft, LandmarkKey, LandmarkOrigin, LandmarkSet};

use super::LandmarkSource;

/// Confidence assigned to hand-placed landmarks.
pub const MANUAL_LANDMARK_CONFIDENCE: f64 = 0.9;

/// Result of feeding one click into a [`ManualQueue`].
#[derive(Debug, Clone, PartialEq)]
pub enum ManualStep {
    /// Accepted; the next key to click.
    Next(LandmarkKey),
    /// Rejected (off-canvas or non-finite); the same key is still pending.
    Rejected(LandmarkKey),
    /// Fourth click accepted; the finished set.
    Complete(LandmarkSet),
}

/// Interactive queue consumed one click at a time.
///
/// Clicks are assigned strictly in [`LandmarkKey::ORDER`]. The partial draft
/// never leaves the queue, so nothing is observable until all four points
/// have been placed.
#[derive(Debug, Clone, Default)]
pub struct ManualQueue {
    draft: LandmarkDraft,
    next: usize,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key the next click will be assigned to.
    pub fn pending(&self) -> Option<LandmarkKey> {
        LandmarkKey::ORDER.get(self.next).copied()
    }

    pub fn placed(&self) -> usize {
        self.next
    }

    /// Feed one click.
    ///
    /// Once complete the queue is spent; further clicks fail with
    /// `Incomplete` so the caller has to start a new queue.
    pub fn push(&mut self, click: Point) -> Result<ManualStep, SourceError> {
        let Some(key) = self.pending() else {
            return Err(SourceError::Incomplete(
                "Manual entry already finished.".to_string(),
            ));
        };
        if !click.is_valid() {
            return Ok(ManualStep::Rejected(key));
        }
        self.draft.set(key, click);
        self.next += 1;
        match self.pending() {
            Some(next) => Ok(ManualStep::Next(next)),
            None => self
                .draft
                .finish(MANUAL_LANDMARK_CONFIDENCE, LandmarkOrigin::Manual)
                .map(ManualStep::Complete),
        }
    }
}

/// A pre-recorded list of clicks, usable wherever a [`LandmarkSource`] is.
///
/// Exactly four clicks are required; the frame is not consulted.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualClicks {
    clicks: Vec<Point>,
}

impl ManualClicks {
    pub fn new(clicks: impl Into<Vec<Point>>) -> Self {
        Self {
            clicks: clicks.into(),
        }
    }

    pub fn resolve(&self) -> Result<LandmarkSet, SourceError> {
        if self.clicks.len() != LandmarkKey::ORDER.len() {
            return Err(SourceError::Incomplete(format!(
                "Manual entry needs exactly 4 clicks, got {}.",
                self.clicks.len()
            )));
        }
        let mut queue = ManualQueue::new();
        for &click in &self.clicks {
            match queue.push(click)? {
                ManualStep::Next(_) => {}
                ManualStep::Complete(set) => return Ok(set),
                ManualStep::Rejected(key) => {
                    return Err(SourceError::Incomplete(format!(
                        "Manual click for {key} is invalid."
                    )))
                }
            }
        }
        Err(SourceError::incomplete("Manual landmarks"))
    }
}

impl LandmarkSource for ManualClicks {
    fn name(&self) -> &'static str {
        "Manual entry"
    }

    fn origin(&self) -> LandmarkOrigin {
        LandmarkOrigin::Manual
    }

    async fn acquire<'a>(&'a self, _frame: &'a Frame) -> Result<LandmarkSet, SourceError> {
        self.resolve()
    }
}
