//! WMS GetMap and WCS GetCoverage URL construction.

use url::form_urlencoded;

use crate::error::{EkmanError, Result};
use crate::layer::LayerDescriptor;

use super::{join_url, BackendRequest};

/// Build a GetMap tile template for a WMS layer.
///
/// Every active dimension selector is carried as a query parameter named
/// after the dimension, so time- and elevation-aware services serve the
/// selected slice. The `{bbox-epsg-3857}` placeholder stays literal; the
/// map engine substitutes the tile bounds per request.
pub fn wms_tile_template(descriptor: &LayerDescriptor) -> Result<BackendRequest> {
    let base = descriptor.primary_url();
    let layer = descriptor.wms_map_layer().ok_or_else(|| EkmanError::InvalidParameter {
        param: "layers".to_string(),
        message: format!("Layer {} declares no WMS layer name", descriptor.id),
    })?;

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("service", "WMS")
        .append_pair("request", "GetMap")
        .append_pair("version", "1.3.0")
        .append_pair("layers", layer)
        .append_pair("styles", descriptor.params.style.as_deref().unwrap_or(""))
        .append_pair("format", "image/png")
        .append_pair("transparent", "true")
        .append_pair("height", "256")
        .append_pair("width", "256")
        .append_pair("crs", "EPSG:3857");

    for (name, selector) in &descriptor.dimensions {
        if let Some(value) = selector.selected_value() {
            query.append_pair(name, &value.as_query_value());
        }
    }

    let url_template = format!("{}?{}&bbox={{bbox-epsg-3857}}", base, query.finish());
    Ok(BackendRequest::TileTemplate {
        url_template,
        tile_size: 256,
        bounds: descriptor.bbox,
    })
}

/// Build a WCS GetCoverage URL for one coverage, scaled to the given
/// output grid, with every active dimension pinned through `subset`
/// clauses.
pub fn wcs_coverage_url(
    descriptor: &LayerDescriptor,
    coverage: &str,
    width: u32,
    height: u32,
) -> Result<String> {
    let base = descriptor.primary_url();

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("service", "WCS")
        .append_pair("version", "2.0.1")
        .append_pair("request", "GetCoverage")
        .append_pair("coverageId", coverage)
        .append_pair("format", "application/json");

    let mut subsets = String::new();
    for (name, selector) in &descriptor.dimensions {
        if let Some(value) = selector.selected_value() {
            subsets.push_str(&format!("&subset={}({})", name, value.as_query_value()));
        }
    }

    Ok(format!(
        "{}?{}&SCALESIZE=i({}),j({}){}",
        join_url(base, "wcs"),
        query.finish(),
        width,
        height,
        subsets
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{DimensionSelector, DimensionValue};
    use crate::layer::{DataKind, LayerId, LayerParams};
    use std::collections::BTreeMap;

    fn wms_descriptor() -> LayerDescriptor {
        let mut dimensions = BTreeMap::new();
        dimensions.insert(
            "time".to_string(),
            DimensionSelector {
                values: vec![
                    DimensionValue::Text("2024-01-01T00:00:00Z".to_string()),
                    DimensionValue::Text("2024-01-02T00:00:00Z".to_string()),
                ],
                selected: 1,
            },
        );
        LayerDescriptor {
            id: LayerId::new("forecast", "temperature"),
            kind: DataKind::Wms,
            urls: vec!["https://wms.example.org/ncWMS".to_string()],
            signed_url: None,
            params: LayerParams {
                layers: vec!["temp_surface".to_string(), "temp_anom".to_string()],
                variables: vec![],
                style: Some("boxfill/occam".to_string()),
                additional_dims: vec![],
            },
            colors: None,
            scale: None,
            opacity: 0.7,
            dimensions,
            z_order: 0,
            bbox: Some([-4.0, 50.0, 4.0, 58.0]),
            data_description: None,
        }
    }

    #[test]
    fn getmap_template_uses_first_layer_and_selected_time() {
        let request = wms_tile_template(&wms_descriptor()).unwrap();
        let BackendRequest::TileTemplate { url_template, tile_size, bounds } = request else {
            panic!("expected tile template");
        };
        assert_eq!(tile_size, 256);
        assert_eq!(bounds, Some([-4.0, 50.0, 4.0, 58.0]));
        assert!(url_template.starts_with("https://wms.example.org/ncWMS?"));
        assert!(url_template.contains("layers=temp_surface"));
        assert!(!url_template.contains("temp_anom"));
        assert!(url_template.contains("time=2024-01-02T00%3A00%3A00Z"));
        assert!(url_template.contains("crs=EPSG%3A3857"));
        assert!(url_template.ends_with("&bbox={bbox-epsg-3857}"));
    }

    #[test]
    fn coverage_url_pins_dimensions_and_scales_output() {
        let url = wcs_coverage_url(&wms_descriptor(), "temp_surface", 256, 256).unwrap();
        assert!(url.contains("/wcs?"));
        assert!(url.contains("request=GetCoverage"));
        assert!(url.contains("coverageId=temp_surface"));
        assert!(url.contains("SCALESIZE=i(256),j(256)"));
        assert!(url.contains("&subset=time(2024-01-02T00:00:00Z)"));
    }
}
