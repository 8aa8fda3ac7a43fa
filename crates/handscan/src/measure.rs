//! Pixel-to-centimeter conversion and the 2D:4D ratio.

use crate::landmarks::LandmarkSet;
use crate::scale::ScaleReference;

/// One measurement, derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    #[serde(rename = "length2dCm")]
    pub length_2d_cm: f64,
    #[serde(rename = "length4dCm")]
    pub length_4d_cm: f64,
    /// `None` when the ring length is zero; serialized as `null`.
    pub ratio: Option<f64>,
    /// The weaker of scale and landmark confidence.
    pub confidence: f64,
    pub cm_per_pixel: f64,
}

impl MeasurementResult {
    /// Ratio formatted for status lines.
    pub fn ratio_display(&self) -> String {
        match self.ratio {
            Some(r) => format!("{r:.3}"),
            None => "undefined".to_string(),
        }
    }
}

/// Combine a scale reference and a landmark set into a measurement.
///
/// Returns `None` when either input is absent, the radius is not positive,
/// or the diameter is not a positive finite number.
pub fn measure(
    scale: Option<&ScaleReference>,
    landmarks: Option<&LandmarkSet>,
    diameter_cm: f64,
) -> Option<MeasurementResult> {
    let (scale, landmarks) = (scale?, landmarks?);
    if !(diameter_cm > 0.0) || !diameter_cm.is_finite() {
        return None;
    }
    let cm_per_pixel = scale.cm_per_pixel(diameter_cm)?;
    let length_2d_cm = landmarks.index_length_px() * cm_per_pixel;
    let length_4d_cm = landmarks.ring_length_px() * cm_per_pixel;
    let ratio = (length_4d_cm > 0.0).then(|| length_2d_cm / length_4d_cm);
    Some(MeasurementResult {
        length_2d_cm,
        length_4d_cm,
        ratio,
        confidence: scale.confidence.min(landmarks.confidence),
        cm_per_pixel,
    })
}
