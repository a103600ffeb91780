//! Continuous colour scales and the legend description handed to the renderer.

use crate::color::Rgb;
use crate::error::{ChoroplethError, Result};
use serde::Serialize;

/// Piecewise-linear colour scale over ascending anchors, clamped at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearColorScale {
    anchors: Vec<f64>,
    colors: Vec<Rgb>,
}

impl LinearColorScale {
    /// `k = colors.len() - 1` equal-width intervals spanning `[min, max]`.
    pub fn uniform(min: f64, max: f64, colors: &[Rgb]) -> Result<Self> {
        if colors.len() < 2 {
            return Err(ChoroplethError::InvalidPalette(colors.len()));
        }
        if !(max > min) || !min.is_finite() || !max.is_finite() {
            return Err(ChoroplethError::DegenerateDomain { min, max });
        }
        let k = colors.len() - 1;
        let anchors = (0..=k)
            .map(|i| if i == k { max } else { min + (max - min) * i as f64 / k as f64 })
            .collect();
        Ok(Self { anchors, colors: colors.to_vec() })
    }

    pub fn anchors(&self) -> &[f64] {
        &self.anchors
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn color(&self, value: f64) -> Rgb {
        interpolate(&self.anchors, &self.colors, value)
    }
}

/// Power-law scale: anchors and input go through `sign(x) * |x|^exponent`
/// before piecewise-linear interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct PowColorScale {
    exponent: f64,
    anchors: Vec<f64>,
    transformed: Vec<f64>,
    colors: Vec<Rgb>,
}

impl PowColorScale {
    pub fn new(anchors: &[f64], colors: &[Rgb], exponent: f64) -> Result<Self> {
        if colors.len() < 2 || colors.len() != anchors.len() {
            return Err(ChoroplethError::InvalidPalette(colors.len()));
        }
        let (min, max) = (anchors[0], anchors[anchors.len() - 1]);
        if anchors.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ChoroplethError::DegenerateDomain { min, max });
        }
        let transformed = anchors.iter().map(|&a| signed_pow(a, exponent)).collect();
        Ok(Self {
            exponent,
            anchors: anchors.to_vec(),
            transformed,
            colors: colors.to_vec(),
        })
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    pub fn anchors(&self) -> &[f64] {
        &self.anchors
    }

    pub fn color(&self, value: f64) -> Rgb {
        interpolate(&self.transformed, &self.colors, signed_pow(value, self.exponent))
    }
}

fn signed_pow(x: f64, exponent: f64) -> f64 {
    x.signum() * x.abs().powf(exponent)
}

fn interpolate(anchors: &[f64], colors: &[Rgb], value: f64) -> Rgb {
    let last = anchors.len() - 1;
    if value.is_nan() || value <= anchors[0] {
        return colors[0];
    }
    if value >= anchors[last] {
        return colors[last];
    }
    // First anchor strictly above value; value > anchors[0] so i >= 1.
    let i = anchors.partition_point(|&a| a <= value);
    let (lo, hi) = (anchors[i - 1], anchors[i]);
    Rgb::lerp(colors[i - 1], colors[i], (value - lo) / (hi - lo))
}

/// `tick_count + 1` evenly spaced points from `min` to `max` inclusive.
pub fn compute_legend_ticks(min: f64, max: f64, tick_count: usize) -> Vec<f64> {
    if tick_count == 0 {
        return vec![min];
    }
    (0..=tick_count)
        .map(|i| {
            if i == tick_count {
                max
            } else {
                min + (max - min) * i as f64 / tick_count as f64
            }
        })
        .collect()
}

/// Intervals sampled along a power scale when building its legend gradient.
const POW_LEGEND_SAMPLES: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegendKind {
    Linear,
    Pow { exponent: f64 },
    /// Domain collapsed to one value; everything is drawn in one colour.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientStop {
    pub value: f64,
    pub color: Rgb,
}

/// Everything the renderer needs to draw a legend axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendSpec {
    pub title: String,
    pub kind: LegendKind,
    pub domain_min: f64,
    pub domain_max: f64,
    pub ticks: Vec<f64>,
    pub stops: Vec<GradientStop>,
}

impl LegendSpec {
    pub fn linear(title: &str, scale: &LinearColorScale, tick_count: usize) -> Self {
        let anchors = scale.anchors();
        let (min, max) = (anchors[0], anchors[anchors.len() - 1]);
        Self {
            title: title.to_string(),
            kind: LegendKind::Linear,
            domain_min: min,
            domain_max: max,
            ticks: compute_legend_ticks(min, max, tick_count),
            stops: stops(anchors, scale.colors()),
        }
    }

    pub fn pow(title: &str, scale: &PowColorScale, tick_count: usize) -> Self {
        let anchors = scale.anchors();
        let (min, max) = (anchors[0], anchors[anchors.len() - 1]);
        Self {
            title: title.to_string(),
            kind: LegendKind::Pow { exponent: scale.exponent() },
            domain_min: min,
            domain_max: max,
            ticks: compute_legend_ticks(min, max, tick_count),
            // A gradient blends linearly between stops, so sample the curve densely.
            stops: compute_legend_ticks(min, max, POW_LEGEND_SAMPLES)
                .into_iter()
                .map(|value| GradientStop { value, color: scale.color(value) })
                .collect(),
        }
    }

    pub fn flat(title: &str, value: f64, color: Rgb) -> Self {
        Self {
            title: title.to_string(),
            kind: LegendKind::Flat,
            domain_min: value,
            domain_max: value,
            ticks: vec![value],
            stops: vec![GradientStop { value, color }],
        }
    }

    /// Position of `value` along the legend axis in [0, 1].
    pub fn offset(&self, value: f64) -> f64 {
        let span = self.domain_max - self.domain_min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.domain_min) / span).clamp(0.0, 1.0)
    }
}

fn stops(anchors: &[f64], colors: &[Rgb]) -> Vec<GradientStop> {
    anchors
        .iter()
        .zip(colors)
        .map(|(&value, &color)| GradientStop { value, color })
        .collect()
}
