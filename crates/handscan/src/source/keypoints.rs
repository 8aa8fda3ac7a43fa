//! Decoding of keypoint-detection responses.
//!
//! Services disagree on shape: keypoints may hang off the best prediction
//! (`keypoints` or `keypoint`) or the response root, and come either as a
//! list of named entries or as a map from name to value. Values are
//! `{x, y, confidence|score}` objects or `[x, y, confidence]` arrays. Names
//! are normalized and resolved through a fixed alias table.

use serde_json::{Map, Value};

use crate::error::SourceError;
use crate::geometry::Point;
use crate::landmarks::{LandmarkDraft, LandmarkKey, LandmarkOrigin, LandmarkSet};

/// Confidence used when neither keypoints nor the prediction carry one.
pub const DEFAULT_PREDICTION_CONFIDENCE: f64 = 0.6;

const MISSING_KEYPOINTS: &str = "Cloud response missing required keypoints.";

const KEY_ALIASES: [(&str, LandmarkKey); 8] = [
    ("indexbase", LandmarkKey::IndexBase),
    ("index_base", LandmarkKey::IndexBase),
    ("index_base_crease", LandmarkKey::IndexBase),
    ("index_tip", LandmarkKey::IndexTip),
    ("ringbase", LandmarkKey::RingBase),
    ("ring_base", LandmarkKey::RingBase),
    ("ring_base_crease", LandmarkKey::RingBase),
    ("ring_tip", LandmarkKey::RingTip),
];

/// Lowercase, then collapse every run of characters outside `[a-z0-9]`
/// into a single `_`.
pub fn normalize_keypoint_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Resolve a service keypoint name to one of the four landmarks.
pub fn map_keypoint_name(name: &str) -> Option<LandmarkKey> {
    let normalized = normalize_keypoint_name(name);
    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, key)| *key)
        .or_else(|| {
            LandmarkKey::ORDER
                .into_iter()
                .find(|k| normalize_keypoint_name(k.as_str()) == normalized)
        })
}

/// Keypoints extracted from one response, not yet validated as a set.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedKeypoints {
    pub draft: LandmarkDraft,
    /// Mean keypoint confidence, else the prediction's own confidence.
    pub confidence: f64,
}

impl ParsedKeypoints {
    pub fn into_landmarks(self) -> Result<LandmarkSet, SourceError> {
        self.draft
            .finish(self.confidence, LandmarkOrigin::Cloud)
            .map_err(|_| SourceError::Incomplete(MISSING_KEYPOINTS.to_string()))
    }
}

enum KeypointCollection<'a> {
    List(&'a [Value]),
    Map(&'a Map<String, Value>),
}

impl<'a> KeypointCollection<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::List(items)),
            Value::Object(map) => Some(Self::Map(map)),
            _ => None,
        }
    }

    /// `(name, value)` pairs. List entries without a usable name are skipped.
    fn entries(&self) -> Vec<(&'a str, &'a Value)> {
        match *self {
            Self::List(items) => items
                .iter()
                .filter_map(|entry| {
                    let name = ["name", "class", "label", "part"]
                        .iter()
                        .find_map(|f| entry.get(*f)?.as_str().filter(|s| !s.is_empty()))?;
                    Some((name, entry))
                })
                .collect(),
            Self::Map(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        }
    }
}

fn is_present(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_null())
}

fn truthy(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

/// `(point, confidence)` from an object or array keypoint value.
fn read_keypoint(value: &Value) -> Option<(Point, Option<f64>)> {
    let (x, y, conf) = match value {
        Value::Array(items) => (items.first(), items.get(1), items.get(2)),
        Value::Object(obj) => {
            let conf = ["confidence", "score"]
                .iter()
                .map(|f| obj.get(*f))
                .find(|v| is_present(*v))
                .flatten();
            (obj.get("x"), obj.get("y"), conf)
        }
        _ => return None,
    };
    let x = x?.as_f64().filter(|v| v.is_finite())?;
    let y = y?.as_f64().filter(|v| v.is_finite())?;
    let conf = conf.and_then(Value::as_f64).filter(|c| c.is_finite());
    Some((Point::new(x, y), conf))
}

/// Decode a response body already parsed as JSON.
///
/// `NoPrediction` when `predictions` is missing or empty, `Incomplete` when
/// the best prediction carries no keypoint collection. Unknown names and
/// non-numeric coordinates are dropped silently; completeness is checked by
/// [`ParsedKeypoints::into_landmarks`].
pub fn parse_keypoint_response(payload: &Value) -> Result<ParsedKeypoints, SourceError> {
    let predictions = payload
        .get("predictions")
        .and_then(Value::as_array)
        .filter(|p| !p.is_empty())
        .ok_or(SourceError::NoPrediction)?;

    let score = |p: &Value| p.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let mut best = &predictions[0];
    for candidate in &predictions[1..] {
        if score(candidate) > score(best) {
            best = candidate;
        }
    }

    let collection = truthy(best.get("keypoints"))
        .or_else(|| truthy(best.get("keypoint")))
        .or_else(|| truthy(payload.get("keypoints")))
        .and_then(KeypointCollection::from_value)
        .ok_or_else(|| SourceError::Incomplete(MISSING_KEYPOINTS.to_string()))?;

    let mut draft = LandmarkDraft::default();
    let mut confidences = Vec::new();
    for (name, value) in collection.entries() {
        let Some(key) = map_keypoint_name(name) else {
            continue;
        };
        let Some((point, conf)) = read_keypoint(value) else {
            continue;
        };
        draft.set(key, point);
        confidences.extend(conf);
    }

    let confidence = if confidences.is_empty() {
        best.get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_PREDICTION_CONFIDENCE)
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
    tracing::debug!(
        "parsed {} keypoint(s) from {} prediction(s), confidence {:.2}",
        LandmarkKey::ORDER.len() - draft.missing().len(),
        predictions.len(),
        confidence
    );
    Ok(ParsedKeypoints { draft, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_normalize_and_resolve() {
        assert_eq!(normalize_keypoint_name("Index Base--Crease"), "index_base_crease");
        assert_eq!(map_keypoint_name("Index_Base_Crease"), Some(LandmarkKey::IndexBase));
        assert_eq!(map_keypoint_name("ring-tip"), Some(LandmarkKey::RingTip));
        assert_eq!(map_keypoint_name("indexTip"), Some(LandmarkKey::IndexTip));
        assert_eq!(map_keypoint_name("RINGBASE"), Some(LandmarkKey::RingBase));
        assert_eq!(map_keypoint_name("thumb_tip"), None);
    }

    #[test]
    fn list_form_uses_best_prediction() {
        let payload = json!({
            "predictions": [
                {"confidence": 0.3, "keypoints": [
                    {"class": "index_base", "x": 1, "y": 1, "confidence": 0.1}
                ]},
                {"confidence": 0.8, "keypoints": [
                    {"name": "Index_Base_Crease", "x": 100, "y": 300, "confidence": 0.9},
                    {"class": "index_tip", "x": 100, "y": 100, "confidence": 0.7},
                    {"label": "ring base", "x": 160, "y": 300, "score": 0.8},
                    {"part": "ringTip", "x": 160, "y": 80},
                    {"name": "thumb_tip", "x": 5, "y": 5, "confidence": 0.0},
                    null
                ]}
            ]
        });
        let parsed = parse_keypoint_response(&payload).unwrap();
        assert!((parsed.confidence - 0.8).abs() < 1e-12);
        let set = parsed.into_landmarks().unwrap();
        assert_eq!(set.index_base, Point::new(100.0, 300.0));
        assert_eq!(set.ring_tip, Point::new(160.0, 80.0));
        assert_eq!(set.source, LandmarkOrigin::Cloud);
    }

    #[test]
    fn map_form_from_root_with_arrays() {
        let payload = json!({
            "predictions": [{"confidence": 0.75}],
            "keypoints": {
                "indexBase": [10, 40],
                "indexTip": [10, 5],
                "ringBase": [30, 40],
                "ringTip": {"x": 30, "y": 2}
            }
        });
        let parsed = parse_keypoint_response(&payload).unwrap();
        // No per-keypoint confidence: falls back to the prediction's.
        assert_eq!(parsed.confidence, 0.75);
        assert!(parsed.into_landmarks().is_ok());
    }

    #[test]
    fn missing_key_is_incomplete() {
        let payload = json!({
            "predictions": [{"keypoints": {
                "index_base": [10, 40],
                "index_tip": [10, 5],
                "ring_base": [30, 40],
                "ring_tip": ["a", 2]
            }}]
        });
        let parsed = parse_keypoint_response(&payload).unwrap();
        assert_eq!(parsed.confidence, DEFAULT_PREDICTION_CONFIDENCE);
        let err = parsed.into_landmarks().unwrap_err();
        assert_eq!(err.to_string(), MISSING_KEYPOINTS);
    }

    #[test]
    fn empty_predictions_is_no_prediction() {
        assert!(matches!(
            parse_keypoint_response(&json!({"predictions": []})),
            Err(SourceError::NoPrediction)
        ));
        assert!(matches!(
            parse_keypoint_response(&json!({"detections": [1]})),
            Err(SourceError::NoPrediction)
        ));
        assert!(matches!(
            parse_keypoint_response(&json!({"predictions": [{"confidence": 0.9}]})),
            Err(SourceError::Incomplete(_))
        ));
    }
}
