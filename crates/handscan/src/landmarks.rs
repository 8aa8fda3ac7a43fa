//! The four finger landmarks and the all-or-nothing landmark set.

use crate::error::SourceError;
use crate::geometry::{clamp_unit, Point};

/// One of the four landmarks, in the fixed manual-entry order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkKey {
    IndexBase,
    IndexTip,
    RingBase,
    RingTip,
}

impl LandmarkKey {
    /// Manual-entry (and export) order.
    pub const ORDER: [LandmarkKey; 4] = [
        LandmarkKey::IndexBase,
        LandmarkKey::IndexTip,
        LandmarkKey::RingBase,
        LandmarkKey::RingTip,
    ];

    /// Canonical key as it appears in JSON documents.
    pub fn as_str(self) -> &'static str {
        match self {
            LandmarkKey::IndexBase => "indexBase",
            LandmarkKey::IndexTip => "indexTip",
            LandmarkKey::RingBase => "ringBase",
            LandmarkKey::RingTip => "ringTip",
        }
    }

    /// Prompt label shown during manual entry.
    pub fn label(self) -> &'static str {
        match self {
            LandmarkKey::IndexBase => "Index base (Jupiter crease)",
            LandmarkKey::IndexTip => "Index tip",
            LandmarkKey::RingBase => "Ring base (Apollo crease)",
            LandmarkKey::RingTip => "Ring tip",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for LandmarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a committed landmark set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkOrigin {
    Manual,
    Auto,
    Proxy,
    Cloud,
}

/// A fully populated landmark set.
///
/// Sources build it through [`LandmarkDraft::finish`] or
/// [`LandmarkSet::new`], both of which validate every point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkSet {
    pub index_base: Point,
    pub index_tip: Point,
    pub ring_base: Point,
    pub ring_tip: Point,
    /// Source confidence in [0, 1].
    pub confidence: f64,
    pub source: LandmarkOrigin,
}

impl LandmarkSet {
    /// Build from four points; fails unless every point is valid.
    pub fn new(
        points: [Point; 4],
        confidence: f64,
        source: LandmarkOrigin,
    ) -> Result<Self, SourceError> {
        let mut draft = LandmarkDraft::default();
        for (key, p) in LandmarkKey::ORDER.into_iter().zip(points) {
            draft.set(key, p);
        }
        draft.finish(confidence, source)
    }

    pub fn get(&self, key: LandmarkKey) -> Point {
        match key {
            LandmarkKey::IndexBase => self.index_base,
            LandmarkKey::IndexTip => self.index_tip,
            LandmarkKey::RingBase => self.ring_base,
            LandmarkKey::RingTip => self.ring_tip,
        }
    }

    /// Pixel length of the index (2D) segment.
    pub fn index_length_px(&self) -> f64 {
        self.index_base.distance(self.index_tip)
    }

    /// Pixel length of the ring (4D) segment.
    pub fn ring_length_px(&self) -> f64 {
        self.ring_base.distance(self.ring_tip)
    }
}

/// Transient, possibly partial working state of one acquisition.
///
/// Never exposed to measurement; it either finishes into a [`LandmarkSet`]
/// or is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkDraft {
    points: [Option<Point>; 4],
}

impl LandmarkDraft {
    pub fn set(&mut self, key: LandmarkKey, p: Point) {
        self.points[key.index()] = Some(p);
    }

    pub fn get(&self, key: LandmarkKey) -> Option<Point> {
        self.points[key.index()]
    }

    /// Keys that are missing or fail the validity predicate.
    pub fn missing(&self) -> Vec<LandmarkKey> {
        LandmarkKey::ORDER
            .into_iter()
            .filter(|k| !self.get(*k).is_some_and(Point::is_valid))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Finish into a committed-ready set. Confidence is clamped to [0, 1].
    pub fn finish(&self, confidence: f64, source: LandmarkOrigin) -> Result<LandmarkSet, SourceError> {
        match self.points {
            [Some(index_base), Some(index_tip), Some(ring_base), Some(ring_tip)]
                if self.is_complete() =>
            {
                Ok(LandmarkSet {
                    index_base,
                    index_tip,
                    ring_base,
                    ring_tip,
                    confidence: clamp_unit(confidence),
                    source,
                })
            }
            _ => {
                let missing: Vec<&str> = self.missing().iter().map(|k| k.as_str()).collect();
                Err(SourceError::Incomplete(format!(
                    "Landmarks incomplete or invalid (missing: {}).",
                    missing.join(", ")
                )))
            }
        }
    }
}
