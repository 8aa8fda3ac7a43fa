//! Local landmark model adapter.
//!
//! The inference runtime itself sits behind [`LandmarkPredictor`]. This
//! module owns what surrounds it: letterboxed input preparation, decoding of
//! a flat output tensor back to canvas coordinates, and the acquisition
//! contract shared with the other sources.

use std::future::Future;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::{ConfigError, SourceError};
use crate::frame::Frame;
use crate::geometry::{clamp, clamp_unit, Point};
use crate::landmarks::{LandmarkDraft, LandmarkKey, LandmarkOrigin, LandmarkSet};

use super::{with_timeout, BackendError, LandmarkSource, RequestGate};

const SOURCE_NAME: &str = "Custom model";

/// Raw predictor result: points in canvas pixels plus optional confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictorOutput {
    pub draft: LandmarkDraft,
    pub confidence: Option<f64>,
}

/// Pluggable inference backend.
///
/// `Ok(None)` means the model ran and found nothing.
pub trait LandmarkPredictor: Send + Sync {
    fn predict<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<Option<PredictorOutput>, BackendError>> + Send + 'a;
}

/// Order of the two coordinates inside one output record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XyOrder {
    #[default]
    Xy,
    Yx,
}

/// Layout of a flat model output buffer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelOutputLayout {
    /// Landmark assigned to each consecutive record.
    pub order: Vec<LandmarkKey>,
    /// Values per record (`x, y` or `x, y, score`).
    pub stride: usize,
    pub xy_order: XyOrder,
    /// Values to skip before the first record.
    pub offset: usize,
    /// Coordinates are in `[0, 1]` relative to the model input size.
    pub normalized: bool,
    /// Index of a global confidence value, if the model emits one.
    pub confidence_index: Option<usize>,
    /// Confidence reported when `confidence_index` is unset.
    pub default_confidence: f64,
}

impl Default for ModelOutputLayout {
    fn default() -> Self {
        Self {
            order: LandmarkKey::ORDER.to_vec(),
            stride: 2,
            xy_order: XyOrder::Xy,
            offset: 0,
            normalized: true,
            confidence_index: None,
            default_confidence: 0.65,
        }
    }
}

impl ModelOutputLayout {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.order.is_empty() {
            return Err(ConfigError::Invalid(
                "output order must list keypoints".to_string(),
            ));
        }
        if self.stride < 2 {
            return Err(ConfigError::Invalid(format!(
                "output stride must be >= 2, got {}",
                self.stride
            )));
        }
        Ok(())
    }

    /// Minimum buffer length this layout can decode.
    pub fn expected_len(&self) -> usize {
        self.offset + self.order.len() * self.stride
    }
}

/// Mapping between canvas pixels and the model's fixed input size.
///
/// With letterboxing the canvas is scaled uniformly and centered on a black
/// background; otherwise it is stretched to fill the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub input_width: u32,
    pub input_height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
    pub letterbox: bool,
}

impl LetterboxTransform {
    pub fn new(input: (u32, u32), source: (u32, u32), letterbox: bool) -> Self {
        let (iw, ih) = (input.0 as f64, input.1 as f64);
        let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
        let (scale, offset_x, offset_y) = if letterbox {
            let s = (iw / sw).min(ih / sh);
            (s, (iw - sw * s) / 2.0, (ih - sh * s) / 2.0)
        } else {
            (iw / sw, 0.0, 0.0)
        };
        Self {
            input_width: input.0,
            input_height: input.1,
            source_width: source.0,
            source_height: source.1,
            offset_x,
            offset_y,
            scale,
            letterbox,
        }
    }

    /// Render `frame` into a model-sized RGB input image.
    pub fn render(&self, frame: &Frame) -> RgbImage {
        let rgb = image::DynamicImage::ImageRgba8(frame.rgba().clone()).to_rgb8();
        if !self.letterbox {
            return imageops::resize(&rgb, self.input_width, self.input_height, FilterType::Triangle);
        }
        let dw = ((self.source_width as f64 * self.scale).round() as u32).clamp(1, self.input_width);
        let dh = ((self.source_height as f64 * self.scale).round() as u32).clamp(1, self.input_height);
        let scaled = imageops::resize(&rgb, dw, dh, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.input_width, self.input_height, Rgb([0, 0, 0]));
        imageops::overlay(
            &mut canvas,
            &scaled,
            self.offset_x.round() as i64,
            self.offset_y.round() as i64,
        );
        canvas
    }

    /// Map a model-space coordinate back to the canvas, clamped to its bounds.
    pub fn to_source(&self, raw_x: f64, raw_y: f64, normalized: bool) -> Point {
        let (iw, ih) = (self.input_width as f64, self.input_height as f64);
        let (mut x, mut y) = if normalized {
            (raw_x * iw, raw_y * ih)
        } else {
            (raw_x, raw_y)
        };
        if self.letterbox {
            x = (x - self.offset_x) / self.scale;
            y = (y - self.offset_y) / self.scale;
        } else {
            x = x / iw * self.source_width as f64;
            y = y / ih * self.source_height as f64;
        }
        Point::new(
            clamp(x, 0.0, self.source_width as f64),
            clamp(y, 0.0, self.source_height as f64),
        )
    }
}

/// Decode a flat output buffer into canvas-space landmarks.
///
/// Records with non-finite coordinates are left out of the draft.
pub fn decode_model_output(
    data: &[f32],
    transform: &LetterboxTransform,
    layout: &ModelOutputLayout,
) -> Result<PredictorOutput, SourceError> {
    let expected = layout.expected_len();
    if layout.stride < 2 || data.len() < expected {
        return Err(SourceError::Incomplete(format!(
            "Model output too small. Expected at least {expected} values."
        )));
    }
    let (xi, yi) = match layout.xy_order {
        XyOrder::Xy => (0, 1),
        XyOrder::Yx => (1, 0),
    };

    let mut draft = LandmarkDraft::default();
    for (i, key) in layout.order.iter().enumerate() {
        let base = layout.offset + i * layout.stride;
        let (rx, ry) = (data[base + xi] as f64, data[base + yi] as f64);
        if !(rx.is_finite() && ry.is_finite()) {
            continue;
        }
        draft.set(*key, transform.to_source(rx, ry, layout.normalized));
    }

    let confidence = layout
        .confidence_index
        .and_then(|i| data.get(i))
        .map(|&c| clamp_unit(c as f64))
        .unwrap_or(layout.default_confidence);
    Ok(PredictorOutput {
        draft,
        confidence: Some(confidence),
    })
}

/// Adapter settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Confidence used when the predictor reports none.
    pub default_confidence: f64,
    pub timeout_ms: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.6,
            timeout_ms: Some(30_000),
        }
    }
}

/// Landmark source backed by an optional local predictor.
#[derive(Debug)]
pub struct ModelSource<P> {
    predictor: Option<P>,
    config: ModelConfig,
    gate: RequestGate,
}

impl<P: LandmarkPredictor> ModelSource<P> {
    pub fn new(predictor: P, config: ModelConfig) -> Self {
        Self {
            predictor: Some(predictor),
            config,
            gate: RequestGate::new(SOURCE_NAME),
        }
    }

    /// A source with no predictor loaded; every acquisition is `Unavailable`.
    pub fn unloaded(config: ModelConfig) -> Self {
        Self {
            predictor: None,
            config,
            gate: RequestGate::new(SOURCE_NAME),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    async fn run(&self, frame: &Frame) -> Result<LandmarkSet, SourceError> {
        let predictor = self.predictor.as_ref().ok_or_else(|| {
            SourceError::Unavailable("Custom model not loaded.".to_string())
        })?;
        let _permit = self.gate.try_acquire()?;
        tracing::debug!("running landmark model on {}x{}", frame.width(), frame.height());

        let predicted = with_timeout(SOURCE_NAME, self.config.timeout_ms, async {
            predictor.predict(frame).await.map_err(SourceError::Inference)
        })
        .await?;
        let output = predicted.ok_or(SourceError::NoPrediction)?;
        let confidence = output.confidence.unwrap_or(self.config.default_confidence);
        output
            .draft
            .finish(confidence, LandmarkOrigin::Auto)
            .map_err(|_| SourceError::incomplete("Model landmarks"))
    }
}

impl<P: LandmarkPredictor> LandmarkSource for ModelSource<P> {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn origin(&self) -> LandmarkOrigin {
        LandmarkOrigin::Auto
    }

    fn acquire<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<LandmarkSet, SourceError>> + Send + 'a {
        self.run(frame)
    }
}
