//! Named palette registry.
//!
//! Palettes the catalog refers to by name. A few come straight from
//! colorgrad's presets; the oceanographic ones (ocean, thermal, haline,
//! balance) are defined from control colors. Any name with a `_r` suffix
//! resolves to the reversed form of its base palette.

use colorgrad::{Color, CustomGradient, Gradient};

use crate::error::{EkmanError, Result};

/// Color-scale names accepted by the registry, in UI display order.
pub fn all_color_scales() -> Vec<&'static str> {
    vec![
        "viridis", "plasma", "turbo", "gray", "jet", "ocean", "ocean_r", "thermal", "haline",
        "balance",
    ]
}

/// Resolve a palette name to a gradient over the domain [0, 1].
pub fn named_gradient(name: &str) -> Result<Gradient> {
    let lower = name.to_lowercase();

    if let Some(base) = lower.strip_suffix("_r") {
        return reversed(named_gradient(base)?);
    }

    match lower.as_str() {
        "viridis" => Ok(colorgrad::viridis()),
        "plasma" => Ok(colorgrad::plasma()),
        "turbo" => Ok(colorgrad::turbo()),
        "gray" => Ok(colorgrad::greys()),
        "jet" => from_html(&[
            "#00007f", "#0000ff", "#00ffff", "#ffff00", "#ff0000", "#7f0000",
        ]),
        "ocean" => from_html(&["#007f00", "#0000b2", "#00b2e5", "#ffffff"]),
        "thermal" => from_html(&[
            "#032333", "#28308e", "#7140a2", "#b0568c", "#e97158", "#f9a93d", "#e8fa5b",
        ]),
        "haline" => from_html(&[
            "#2a186c", "#14439c", "#206e8b", "#3c9387", "#60b887", "#a4dc7c", "#fdef9a",
        ]),
        "balance" => from_html(&[
            "#181c43", "#2e5f98", "#8fb3cf", "#f5f5f5", "#d88d6d", "#a42f29", "#3c0911",
        ]),
        _ => Err(EkmanError::InvalidParameter {
            param: "colormap".to_string(),
            message: format!("Unknown color scale: {}", name),
        }),
    }
}

fn from_html(colors: &[&str]) -> Result<Gradient> {
    CustomGradient::new()
        .html_colors(colors)
        .build()
        .map_err(|e| EkmanError::InvalidParameter {
            param: "colormap".to_string(),
            message: e.to_string(),
        })
}

/// Reverse an existing gradient by resampling its control points.
fn reversed(gradient: Gradient) -> Result<Gradient> {
    let mut colors: Vec<Color> = (0..16)
        .map(|i| gradient.at(i as f64 / 15.0))
        .collect();
    colors.reverse();

    CustomGradient::new()
        .colors(&colors)
        .build()
        .map_err(|e| EkmanError::InvalidParameter {
            param: "colormap".to_string(),
            message: e.to_string(),
        })
}

/// Sample `n` evenly spaced RGB triples from a named palette, for
/// client-rendered layers that take an explicit colormap array.
pub fn sample_rgb(name: &str, n: usize) -> Result<Vec<[u8; 3]>> {
    let gradient = named_gradient(name)?;
    Ok((0..n)
        .map(|i| {
            let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
            let [r, g, b, _] = gradient.at(t).to_rgba8();
            [r, g, b]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_palettes_resolve() {
        for name in all_color_scales() {
            assert!(named_gradient(name).is_ok(), "palette {} failed", name);
        }
    }

    #[test]
    fn test_unknown_palette_is_rejected() {
        assert!(named_gradient("sunburst").is_err());
    }

    #[test]
    fn test_reversed_palette() {
        let fwd = named_gradient("ocean").unwrap();
        let rev = named_gradient("ocean_r").unwrap();
        assert_eq!(fwd.at(0.0).to_rgba8(), rev.at(1.0).to_rgba8());
    }

    #[test]
    fn test_sample_rgb_endpoints() {
        let samples = sample_rgb("jet", 5).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], [0, 0, 127]);
        assert_eq!(samples[4], [127, 0, 0]);
    }
}
