//! Selector payload for layers rendered client-side from the chunked
//! store.

use std::collections::BTreeMap;

use crate::colormaps::{sample_rgb, ColorSpec};
use crate::error::Result;
use crate::layer::LayerDescriptor;

use super::BackendRequest;

/// Number of ramp samples handed to the shader-side renderer.
const COLORMAP_SAMPLES: usize = 255;

/// Build the selector request for a direct zarr layer.
///
/// Dimensions with no enumerated values default to index 1 so a pristine
/// descriptor still pins every declared axis (index 0 often holds a
/// degenerate first slice in the feed these stores come from).
pub fn zarr_selector_request(
    descriptor: &LayerDescriptor,
    default_opacity: f64,
) -> Result<BackendRequest> {
    let mut selector = BTreeMap::new();
    for (name, dim) in &descriptor.dimensions {
        let index = if dim.values.is_empty() { 1 } else { dim.selected };
        selector.insert(name.clone(), index);
    }

    let colormap_name = match &descriptor.colors {
        Some(ColorSpec::Named(name)) => name.as_str(),
        _ => "viridis",
    };
    let colormap = sample_rgb(colormap_name, COLORMAP_SAMPLES)?;
    let scale = descriptor.scale.unwrap_or([0.0, 1.0]);

    Ok(BackendRequest::Selector {
        variable: descriptor.variable_or_stem(),
        selector,
        colormap,
        vmin: scale[0],
        vmax: scale[1],
        opacity: if descriptor.opacity > 0.0 {
            descriptor.opacity
        } else {
            default_opacity
        },
    })
}
