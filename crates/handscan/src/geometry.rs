//! Point/vector primitives shared by every stage.
//!
//! All coordinates are working-canvas pixels (see [`crate::Frame`]).

use nalgebra::Vector2;

/// A 2-D point in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The single ingestion predicate: finite and non-negative on both axes.
    ///
    /// Every landmark or scale point crossing a source boundary passes
    /// through this check before it can be committed.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x >= 0.0 && self.y >= 0.0
    }

    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Linear interpolation `self + t * (other - self)`.
    #[inline]
    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Translate by `v * s`.
    #[inline]
    pub fn offset(self, v: Vector2<f64>, s: f64) -> Point {
        Point {
            x: self.x + v.x * s,
            y: self.y + v.y * s,
        }
    }

    #[inline]
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Scale both coordinates (canvas <-> original image mapping).
    #[inline]
    pub fn scaled(self, s: f64) -> Point {
        Point {
            x: self.x * s,
            y: self.y * s,
        }
    }
}

impl From<[f64; 2]> for Point {
    fn from(xy: [f64; 2]) -> Self {
        Self { x: xy[0], y: xy[1] }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Vector from `a` to `b`.
#[inline]
pub fn vector(a: Point, b: Point) -> Vector2<f64> {
    Vector2::new(b.x - a.x, b.y - a.y)
}

/// Unit vector from `a` to `b`, or `None` when the segment is degenerate.
pub fn unit_vector(a: Point, b: Point) -> Option<Vector2<f64>> {
    let v = vector(a, b);
    let n = v.norm();
    if !n.is_finite() || n < 1e-6 {
        return None;
    }
    Some(v / n)
}

/// Clamp that maps NaN to `lo` instead of propagating it.
#[inline]
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.clamp(lo, hi)
}

/// Clamp a confidence score into [0, 1].
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}
