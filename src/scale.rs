use crate::error::DegenerateRangeError;
use crate::types::IndicatorRange;
use image::Rgba;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Viridis sampled at nine evenly spaced points.
const VIRIDIS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

/// Viridis at position `t`, clamped to [0, 1].
pub fn viridis(t: f64) -> Color {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
    let segs = (VIRIDIS.len() - 1) as f64;
    let x = t * segs;
    let i = x.floor() as usize;
    if i >= VIRIDIS.len() - 1 {
        let (r, g, b) = VIRIDIS[VIRIDIS.len() - 1];
        return Color::rgb(r, g, b);
    }
    let f = x - i as f64;
    let (r0, g0, b0) = VIRIDIS[i];
    let (r1, g1, b1) = VIRIDIS[i + 1];
    let lerp = |a: u8, b: u8| (a as f64 + f * (b as f64 - a as f64)).round() as u8;
    Color::rgb(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

/// Normalized position of `value` in [min, max]; 0.5 when the range is flat.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Color for `value` on a sequential scale spanning [min, max].
///
/// Values outside the range clamp to the end colors. A flat range
/// (`min == max`) maps every value to the scale midpoint.
pub fn color_for(value: f64, min: f64, max: f64) -> Color {
    viridis(normalize(value, min, max))
}

/// `n` evenly spaced `(value, color)` stops from `min` to `max`, n >= 2.
pub fn legend_stops(min: f64, max: f64, n: usize) -> Vec<(f64, Color)> {
    let n = n.max(2);
    let step = (max - min) / (n - 1) as f64;
    (0..n)
        .map(|i| {
            let value = if i == n - 1 { max } else { min + step * i as f64 };
            (value, color_for(value, min, max))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    min: f64,
    max: f64,
}

impl ColorScale {
    pub fn new(range: &IndicatorRange) -> Self {
        Self {
            min: range.min,
            max: range.max,
        }
    }

    pub fn color_for(&self, value: f64) -> Color {
        color_for(value, self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendStop {
    pub value: f64,
    pub color: Color,
}

/// Gradient legend: min/max labels plus an n-stop swatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub min: f64,
    pub max: f64,
    pub stops: Vec<LegendStop>,
}

impl Legend {
    pub fn new(range: &IndicatorRange, n: usize) -> Result<Self, DegenerateRangeError> {
        if range.is_degenerate() {
            return Err(DegenerateRangeError);
        }
        let stops = legend_stops(range.min, range.max, n)
            .into_iter()
            .map(|(value, color)| LegendStop { value, color })
            .collect();
        Ok(Self {
            min: range.min,
            max: range.max,
            stops,
        })
    }
}
