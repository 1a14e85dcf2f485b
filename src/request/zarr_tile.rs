//! Zarr tile-server request construction and dimension enumeration.

use async_trait::async_trait;
use url::form_urlencoded;
use url::Url;

use crate::colormaps::ColorSpec;
use crate::dimensions::{resolve_dimension_roles, DimensionRole, DimensionValue};
use crate::error::Result;
use crate::layer::LayerDescriptor;

use super::{join_url, BackendRequest};

/// Build the slippy-map tile template for a zarr-backed layer.
///
/// The time selection is carried date-truncated (`date_time=YYYY-MM-DD`),
/// every other non-spatial dimension is pinned through a single
/// `drop_dim=name=value,...` parameter.
pub fn zarr_tile_template(descriptor: &LayerDescriptor, base_url: &str) -> Result<BackendRequest> {
    let (store_url, encoded) = descriptor.effective_url();
    let variable = descriptor.variable_or_stem();
    let scale = descriptor.scale.unwrap_or([0.0, 1.0]);
    let colormap = match &descriptor.colors {
        Some(ColorSpec::Named(name)) => name.clone(),
        _ => "jet".to_string(),
    };

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("url", store_url)
        .append_pair("variable", &variable)
        .append_pair("reference", "false")
        .append_pair("decode_times", "true")
        .append_pair("colormap_name", &colormap)
        .append_pair("rescale", &format!("{},{}", scale[0], scale[1]));
    if encoded {
        query.append_pair("encoded", "true");
    }

    let dim_names: Vec<String> = descriptor.dimensions.keys().cloned().collect();
    let roles = resolve_dimension_roles(&dim_names);
    let time_name = roles.get(&DimensionRole::Time).map(|d| d.name.clone());

    if let Some(time_name) = &time_name {
        if let Some(value) = descriptor
            .dimensions
            .get(time_name)
            .and_then(|s| s.selected_value())
        {
            query.append_pair("date_time", date_part(&value.as_query_value()));
        }
    }

    let mut pinned = Vec::new();
    for (name, selector) in &descriptor.dimensions {
        if Some(name) == time_name.as_ref() {
            continue;
        }
        if let Some(value) = selector.selected_value() {
            pinned.push(format!("{}={}", name, value.as_query_value()));
        }
    }
    if !pinned.is_empty() {
        query.append_pair("drop_dim", &pinned.join(","));
    }

    let url_template = format!(
        "{}?{}",
        join_url(base_url, "tiles/WebMercatorQuad/{z}/{x}/{y}@1x"),
        query.finish()
    );
    Ok(BackendRequest::TileTemplate {
        url_template,
        tile_size: 256,
        bounds: descriptor.bbox,
    })
}

/// WCS-style export URL for a zarr layer, used for data downloads.
pub fn zarr_wcs_url(descriptor: &LayerDescriptor, base_url: &str) -> Result<String> {
    let (store_url, _) = descriptor.effective_url();

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("service", "WCS")
        .append_pair("version", "2.0.1")
        .append_pair("request", "GetCoverage")
        .append_pair("url", store_url)
        .append_pair("variable", &descriptor.variable_or_stem())
        .append_pair("format", "application/json");

    let mut subsets = String::new();
    for (name, selector) in &descriptor.dimensions {
        if let Some(value) = selector.selected_value() {
            subsets.push_str(&format!("&subset={}({})", name, value.as_query_value()));
        }
    }

    Ok(format!(
        "{}?{}{}",
        join_url(base_url, "wcs"),
        query.finish(),
        subsets
    ))
}

fn date_part(value: &str) -> &str {
    value.split('T').next().unwrap_or(value)
}

/// Dimension-value enumeration against the zarr tile backend.
#[async_trait]
pub trait ZarrTiles: Send + Sync {
    /// Declared time-axis values of the store at `url`.
    async fn time_values(&self, url: &str) -> Result<Vec<DimensionValue>>;
    /// Values of an arbitrary named dimension.
    async fn dimension_values(&self, name: &str, url: &str) -> Result<Vec<DimensionValue>>;
}

pub struct ZarrTileClient {
    http: reqwest::Client,
    base_url: String,
}

impl ZarrTileClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn fetch_values(&self, path: &str, url: &str) -> Result<Vec<DimensionValue>> {
        let mut endpoint = Url::parse(&join_url(&self.base_url, path))?;
        endpoint.query_pairs_mut().append_pair("url", url);
        let values = self
            .http
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(values)
    }
}

#[async_trait]
impl ZarrTiles for ZarrTileClient {
    async fn time_values(&self, url: &str) -> Result<Vec<DimensionValue>> {
        self.fetch_values("time_values", url).await
    }

    async fn dimension_values(&self, name: &str, url: &str) -> Result<Vec<DimensionValue>> {
        self.fetch_values(&format!("dimension/{}", name), url).await
    }
}
