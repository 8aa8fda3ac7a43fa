//! Landmark annotation export documents.
//!
//! Coordinates are stored in original-image pixels rounded to two decimals;
//! conversion to and from the working canvas goes through the frame's
//! canvas→original factor.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, SourceError};
use crate::geometry::Point;
use crate::landmarks::{LandmarkDraft, LandmarkKey, LandmarkOrigin, LandmarkSet};
use crate::source::MANUAL_LANDMARK_CONFIDENCE;

pub const ANNOTATION_FORMAT_VERSION: u32 = 1;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One annotated image.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationItem {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub landmarks: BTreeMap<LandmarkKey, [f64; 2]>,
}

impl AnnotationItem {
    /// Export a committed set. `canvas_to_original` maps canvas pixels to
    /// the original image.
    pub fn from_landmarks(
        image: impl Into<String>,
        width: u32,
        height: u32,
        set: &LandmarkSet,
        canvas_to_original: f64,
    ) -> Self {
        let landmarks = LandmarkKey::ORDER
            .into_iter()
            .map(|key| {
                let p = set.get(key).scaled(canvas_to_original);
                (key, [round2(p.x), round2(p.y)])
            })
            .collect();
        Self {
            image: image.into(),
            width,
            height,
            landmarks,
        }
    }

    /// Map back into canvas space as a manual set. All four keys must be
    /// present and valid.
    pub fn to_landmark_set(&self, canvas_to_original: f64) -> Result<LandmarkSet, SourceError> {
        if !(canvas_to_original > 0.0) {
            return Err(SourceError::incomplete("Annotation"));
        }
        let mut draft = LandmarkDraft::default();
        for (key, [x, y]) in &self.landmarks {
            draft.set(*key, Point::new(*x, *y).scaled(1.0 / canvas_to_original));
        }
        draft
            .finish(MANUAL_LANDMARK_CONFIDENCE, LandmarkOrigin::Manual)
            .map_err(|_| SourceError::incomplete(&format!("Annotation for {}", self.image)))
    }
}

/// The exported document.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationExport {
    pub version: u32,
    /// ISO-8601 timestamp supplied by the writer.
    pub created_at: String,
    pub order: Vec<LandmarkKey>,
    pub items: Vec<AnnotationItem>,
}

impl AnnotationExport {
    pub fn new(created_at: impl Into<String>, items: Vec<AnnotationItem>) -> Self {
        Self {
            version: ANNOTATION_FORMAT_VERSION,
            created_at: created_at.into(),
            order: LandmarkKey::ORDER.to_vec(),
            items,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Item whose `image` equals `name` or ends with `/name`.
    pub fn find(&self, name: &str) -> Option<&AnnotationItem> {
        self.items.iter().find(|item| {
            item.image == name || item.image.rsplit(['/', '\\']).next() == Some(name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> LandmarkSet {
        LandmarkSet::new(
            [
                Point::new(100.123, 300.0),
                Point::new(100.0, 100.456),
                Point::new(160.0, 300.0),
                Point::new(160.0, 80.0),
            ],
            0.7,
            LandmarkOrigin::Cloud,
        )
        .unwrap()
    }

    #[test]
    fn export_rounds_in_original_space() {
        let item = AnnotationItem::from_landmarks("a.jpg", 2400, 1600, &set(), 2.0);
        assert_eq!(item.landmarks[&LandmarkKey::IndexBase], [200.25, 600.0]);
        assert_eq!(item.landmarks[&LandmarkKey::IndexTip], [200.0, 200.91]);

        let doc = AnnotationExport::new("2026-01-01T00:00:00.000Z", vec![item]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["createdAt"], "2026-01-01T00:00:00.000Z");
        assert_eq!(json["order"][3], "ringTip");
        assert_eq!(json["items"][0]["landmarks"]["ringBase"][0], 320.0);
    }

    #[test]
    fn import_maps_back_to_canvas() {
        let item = AnnotationItem::from_landmarks("dir/a.jpg", 2400, 1600, &set(), 2.0);
        let back = item.to_landmark_set(2.0).unwrap();
        assert_eq!(back.source, LandmarkOrigin::Manual);
        assert!((back.index_base.x - 100.125).abs() < 1e-9);

        let doc = AnnotationExport::new("t", vec![item]);
        assert!(doc.find("a.jpg").is_some());
        assert!(doc.find("b.jpg").is_none());
    }

    #[test]
    fn import_requires_all_keys() {
        let json = r#"{"image":"x.jpg","width":10,"height":10,
            "landmarks":{"indexBase":[1,2],"indexTip":[1,1],"ringBase":[3,2]}}"#;
        let item: AnnotationItem = serde_json::from_str(json).unwrap();
        assert!(matches!(item.to_landmark_set(1.0), Err(SourceError::Incomplete(_))));
    }
}
