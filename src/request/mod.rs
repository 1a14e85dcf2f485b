//! Backend request builders.
//!
//! Turns a fully-specified `LayerDescriptor` into the concrete request a
//! map backend needs: a tile URL template for raster sources, a selector
//! payload for in-browser-style scalar rendering, or a decoded U/V field
//! pair for velocity animation.

pub mod cog;
pub mod velocity;
pub mod wms;
pub mod zarr_direct;
pub mod zarr_tile;

pub use cog::{
    build_tile_request, BandStats, CogInfo, CogOutcome, CogTileClient, CogTiles, InfoOutcome,
    StatsOutcome, TileQuery,
};
pub use velocity::{VelocityField, VelocityHeader, VelocityPair};
pub use wms::{wcs_coverage_url, wms_tile_template};
pub use zarr_direct::zarr_selector_request;
pub use zarr_tile::{zarr_tile_template, zarr_wcs_url, ZarrTileClient, ZarrTiles};

use std::collections::BTreeMap;

/// What a backend needs to render one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    /// Raster source: a slippy-map tile URL template with `{z}/{x}/{y}`
    /// (or `{bbox-epsg-3857}`) placeholders left for the map engine.
    TileTemplate {
        url_template: String,
        tile_size: u32,
        bounds: Option<[f64; 4]>,
    },
    /// Scalar source rendered client-side from the chunked store.
    Selector {
        variable: String,
        /// Dimension name to pinned index, spatial axes excluded.
        selector: BTreeMap<String, usize>,
        /// Sampled RGB ramp for value-to-colour mapping.
        colormap: Vec<[u8; 3]>,
        vmin: f64,
        vmax: f64,
        opacity: f64,
    },
    /// Decoded U/V component grids for a particle animation overlay.
    VelocityPair(Box<VelocityPair>),
}

/// Join a base URL and a path, tolerating a trailing slash on the base.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
