//! Legend ramp and tick-value computation.

use colorgrad::CustomGradient;
use serde::{Deserialize, Serialize};

use crate::error::{EkmanError, Result};

use super::palette::named_gradient;

/// A layer's color scale: either a registry name or a literal ordered
/// color array (CSS color strings) interpolated directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Named(String),
    Literal(Vec<String>),
}

impl ColorSpec {
    /// The registry name, when this is a named scale.
    pub fn name(&self) -> Option<&str> {
        match self {
            ColorSpec::Named(name) => Some(name),
            ColorSpec::Literal(_) => None,
        }
    }
}

/// One legend swatch. Named scales yield CSS color strings; literal
/// scales yield explicit RGB triples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Swatch {
    Css(String),
    Rgb([u8; 3]),
}

/// A derived legend: `steps` swatches with their linearly spaced tick
/// values across the numeric range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub swatches: Vec<Swatch>,
    pub values: Vec<f64>,
}

/// Build the legend ramp for a color scale over a numeric range.
///
/// Tick value `i` is `range[0] + (range[1]-range[0])/(steps-1) * i`
/// regardless of color mode. Callers validate `steps >= 2` and
/// `range[0] < range[1]` upstream; this function does not re-validate.
pub fn build_legend(spec: &ColorSpec, range: [f64; 2], steps: usize) -> Result<Legend> {
    let span = range[1] - range[0];
    let values: Vec<f64> = (0..steps)
        .map(|i| range[0] + span / (steps - 1) as f64 * i as f64)
        .collect();

    let swatches = match spec {
        ColorSpec::Named(name) => {
            let gradient = named_gradient(name)?;
            (0..steps)
                .map(|i| {
                    let t = i as f64 / (steps - 1) as f64;
                    Swatch::Css(gradient.at(t).to_hex_string())
                })
                .collect()
        }
        ColorSpec::Literal(colors) => {
            let refs: Vec<&str> = colors.iter().map(|c| c.as_str()).collect();
            let gradient = CustomGradient::new()
                .html_colors(&refs)
                .domain(&range)
                .build()
                .map_err(|e| EkmanError::InvalidParameter {
                    param: "colormap".to_string(),
                    message: e.to_string(),
                })?;
            values
                .iter()
                .map(|&v| {
                    let [r, g, b, _] = gradient.at(v).to_rgba8();
                    Swatch::Rgb([r, g, b])
                })
                .collect()
        }
    };

    Ok(Legend { swatches, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_named_legend_tick_values() {
        let legend = build_legend(&ColorSpec::Named("jet".to_string()), [10.0, 20.0], 30).unwrap();

        assert_eq!(legend.values.len(), 30);
        assert_eq!(legend.swatches.len(), 30);
        assert!((legend.values[0] - 10.0).abs() < 1e-9);
        assert!((legend.values[29] - 20.0).abs() < 1e-9);

        // Linear spacing throughout
        let step = 10.0 / 29.0;
        for (i, v) in legend.values.iter().enumerate() {
            assert!((v - (10.0 + step * i as f64)).abs() < 1e-9);
        }

        // Named mode yields CSS strings
        assert!(matches!(legend.swatches[0], Swatch::Css(_)));
    }

    #[test]
    fn test_literal_legend_rgb_endpoints() {
        let spec = ColorSpec::Literal(vec!["#000000".to_string(), "#ffffff".to_string()]);
        let legend = build_legend(&spec, [0.0, 1.0], 3).unwrap();

        assert_eq!(legend.swatches[0], Swatch::Rgb([0, 0, 0]));
        assert_eq!(legend.swatches[2], Swatch::Rgb([255, 255, 255]));
        assert_eq!(legend.values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_unknown_named_scale_errors() {
        let result = build_legend(&ColorSpec::Named("nope".to_string()), [0.0, 1.0], 5);
        assert!(result.is_err());
    }

    #[test]
    fn test_color_spec_serde() {
        let named: ColorSpec = serde_json::from_str(r#""jet""#).unwrap();
        assert_eq!(named, ColorSpec::Named("jet".to_string()));

        let literal: ColorSpec = serde_json::from_str(r##"["#ff0000", "#0000ff"]"##).unwrap();
        assert_eq!(
            literal,
            ColorSpec::Literal(vec!["#ff0000".to_string(), "#0000ff".to_string()])
        );
    }
}
