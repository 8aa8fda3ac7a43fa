//! Engine configuration, loadable from JSON.

use std::path::Path;

use crate::coin::CoinType;
use crate::error::ConfigError;
use crate::frame::DEFAULT_MAX_CANVAS_DIM;
use crate::scale::{CoinDetectConfig, HoughConfig};
use crate::session::FallbackPolicy;
use crate::source::{ModelConfig, ModelOutputLayout, ProxyConfig, RemoteConfig};

/// Every tunable of the measurement engine.
///
/// All fields default, so a config file only needs the values it changes.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas: CanvasConfig,
    pub coin: CoinType,
    pub detection: CoinDetectConfig,
    pub hough: HoughConfig,
    pub proxy: ProxyConfig,
    pub remote: RemoteConfig,
    pub model: ModelConfig,
    pub model_output: ModelOutputLayout,
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Longest side of the working canvas in pixels.
    pub max_dim: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            max_dim: DEFAULT_MAX_CANVAS_DIM,
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

impl EngineConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.canvas.max_dim == 0 {
            return Err(invalid("canvas.max_dim must be positive"));
        }
        self.coin
            .diameter_cm()
            .map_err(|_| invalid("coin diameter must be a positive number"))?;

        let d = &self.detection;
        if !(0.0 < d.min_radius_frac && d.min_radius_frac < d.max_radius_frac) {
            return Err(invalid(format!(
                "detection radius band [{}, {}] is empty",
                d.min_radius_frac, d.max_radius_frac
            )));
        }
        if d.coverage_samples == 0 {
            return Err(invalid("detection.coverage_samples must be positive"));
        }
        for (name, v) in [
            ("detection.min_coverage", d.min_coverage),
            ("detection.low_confidence_below", d.low_confidence_below),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(format!("{name} must be within [0, 1], got {v}")));
            }
        }

        let v = self.hough.min_vote_frac;
        if !(v > 0.0 && v <= 1.0) {
            return Err(invalid(format!("hough.min_vote_frac must be within (0, 1], got {v}")));
        }

        let p = &self.proxy;
        if !(0.0..=0.3).contains(&p.crease_fraction) {
            return Err(invalid(format!(
                "proxy.crease_fraction must be within [0, 0.3], got {}",
                p.crease_fraction
            )));
        }
        let c = &p.crease;
        if !(c.step > 0.0) || c.t_min > c.t_max {
            return Err(invalid("proxy.crease search range or step is invalid"));
        }
        if c.offset_min_px > c.offset_max_px {
            return Err(invalid("proxy.crease offset clamp range is empty"));
        }

        if !(1..=100).contains(&self.remote.jpeg_quality) {
            return Err(invalid("remote.jpeg_quality must be within [1, 100]"));
        }
        self.model_output.validate()
    }
}
