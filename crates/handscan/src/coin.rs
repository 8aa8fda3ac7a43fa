//! Reference coin presets and diameter parsing.

use std::str::FromStr;

use crate::error::SessionError;

/// Known reference coins. Diameters are in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinType {
    #[default]
    Quarter,
    Nickel,
    Dime,
    Penny,
    /// User-supplied diameter in millimetres.
    Custom(f64),
}

impl CoinType {
    pub const PRESETS: [CoinType; 4] = [
        CoinType::Quarter,
        CoinType::Nickel,
        CoinType::Dime,
        CoinType::Penny,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CoinType::Quarter => "quarter",
            CoinType::Nickel => "nickel",
            CoinType::Dime => "dime",
            CoinType::Penny => "penny",
            CoinType::Custom(_) => "custom",
        }
    }

    pub fn diameter_mm(self) -> f64 {
        match self {
            CoinType::Quarter => 24.26,
            CoinType::Nickel => 21.21,
            CoinType::Dime => 17.91,
            CoinType::Penny => 19.05,
            CoinType::Custom(mm) => mm,
        }
    }

    /// Diameter in centimetres, or `InvalidDiameter` for a bad custom value.
    pub fn diameter_cm(self) -> Result<f64, SessionError> {
        validate_diameter_mm(self.diameter_mm()).map(|mm| mm / 10.0)
    }
}

impl FromStr for CoinType {
    type Err = SessionError;

    /// Accepts a preset name or a diameter in millimetres.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        CoinType::PRESETS
            .into_iter()
            .find(|c| c.name() == name)
            .map(Ok)
            .unwrap_or_else(|| parse_diameter_mm(s).map(CoinType::Custom))
    }
}

fn validate_diameter_mm(mm: f64) -> Result<f64, SessionError> {
    if mm.is_finite() && mm > 0.0 {
        Ok(mm)
    } else {
        Err(SessionError::InvalidDiameter)
    }
}

/// Parse a user-entered diameter in millimetres.
pub fn parse_diameter_mm(input: &str) -> Result<f64, SessionError> {
    let mm = input
        .trim()
        .parse::<f64>()
        .map_err(|_| SessionError::InvalidDiameter)?;
    validate_diameter_mm(mm)
}
