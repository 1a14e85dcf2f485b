//! Layer descriptors: the per-catalog-entry state the engine manages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::colormaps::ColorSpec;
use crate::dimensions::DimensionSelector;

/// Composite layer identity: catalog-group name plus sub-layer name,
/// unique within the active set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId {
    pub group: String,
    pub name: String,
}

impl LayerId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.group, self.name)
    }
}

/// Backend family a layer is served from. Closed set; request building
/// and legend handling match exhaustively on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    /// Cloud-Optimized GeoTIFF behind a tiling backend
    Cog,
    /// Zarr store rendered to tiles by a backend
    ZarrTile,
    /// Zarr store rendered client-side as a scalar field
    ZarrScalar,
    /// Zarr store rendered client-side as a vector field
    ZarrVector,
    /// OGC WMS layer
    Wms,
    /// Two-component current field read from zarr stores
    VelocityZarr,
    /// Two-component current field served over WMS/WCS
    VelocityWms,
}

impl DataKind {
    /// Whether this layer needs a numeric scale and colormap by default.
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            DataKind::Cog | DataKind::ZarrTile | DataKind::ZarrScalar | DataKind::ZarrVector
        )
    }

    /// Whether this is one of the two velocity regimes.
    pub fn is_velocity(&self) -> bool {
        matches!(self, DataKind::VelocityZarr | DataKind::VelocityWms)
    }
}

/// Backend naming parameters: WMS/WCS layer names, array variable names,
/// the chosen WMS style, and auxiliary dimensions to enumerate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    /// WMS layer names or per-component zarr sub-paths
    #[serde(default)]
    pub layers: Vec<String>,
    /// Array variable names (one, or an eastward/northward pair)
    #[serde(default)]
    pub variables: Vec<String>,
    /// Currently selected WMS style
    #[serde(default)]
    pub style: Option<String>,
    /// Non-time dimensions to enumerate from the zarr tile backend
    #[serde(default)]
    pub additional_dims: Vec<String>,
}

/// One active layer. Owned exclusively by the layer store; the map
/// renderer only ever sees derived render instructions.
///
/// `Clone` is a deep structural copy: every nested map and sequence is
/// copied. All fields are plain data, so nothing is lost in the copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub id: LayerId,
    pub kind: DataKind,
    /// One backend URL, or several for multi-band velocity fields
    pub urls: Vec<String>,
    /// Pre-signed substitute URL for protected layers
    #[serde(default)]
    pub signed_url: Option<String>,
    #[serde(default)]
    pub params: LayerParams,
    /// Color scale; populated with a per-kind default on activation
    #[serde(default)]
    pub colors: Option<ColorSpec>,
    /// Numeric [min, max] range driving color mapping
    #[serde(default)]
    pub scale: Option<[f64; 2]>,
    pub opacity: f64,
    /// Dimension name -> selector state, populated lazily on activation
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionSelector>,
    /// Paint-order key; unique per active set, higher paints later
    #[serde(default)]
    pub z_order: u64,
    /// [min_lon, min_lat, max_lon, max_lat] for viewport fitting
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    /// Human-facing (quantity, unit) pair for chart axes
    #[serde(default)]
    pub data_description: Option<(String, String)>,
}

impl LayerDescriptor {
    /// Minimal descriptor; callers fill in kind-specific fields.
    pub fn new(id: LayerId, kind: DataKind, url: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            urls: vec![url.into()],
            signed_url: None,
            params: LayerParams::default(),
            colors: None,
            scale: None,
            opacity: 1.0,
            dimensions: BTreeMap::new(),
            z_order: 0,
            bbox: None,
            data_description: None,
        }
    }

    /// First backend URL.
    pub fn primary_url(&self) -> &str {
        self.urls.first().map(String::as_str).unwrap_or("")
    }

    /// The URL actually handed to tiling backends, plus whether it is a
    /// pre-signed (encoded) URL.
    pub fn effective_url(&self) -> (&str, bool) {
        match &self.signed_url {
            Some(signed) => (signed.as_str(), true),
            None => (self.primary_url(), false),
        }
    }

    /// Array variable name, defaulting to the filename stem of the URL
    /// when the catalog leaves it unspecified.
    pub fn variable_or_stem(&self) -> String {
        if let Some(var) = self.params.variables.first() {
            return var.clone();
        }
        self.primary_url()
            .rsplit('/')
            .next()
            .and_then(|name| name.split('.').next())
            .unwrap_or("")
            .to_string()
    }

    /// The layer name used for GetMap requests: the first element of a
    /// multi-valued layer list.
    pub fn wms_map_layer(&self) -> Option<&str> {
        self.params.layers.first().map(String::as_str)
    }

    /// The layer name used for legend/capability lookups: element index 2
    /// of a multi-valued layer list, per the catalog's array convention.
    pub fn wms_legend_layer(&self) -> Option<&str> {
        if self.params.layers.len() >= 3 {
            self.params.layers.get(2).map(String::as_str)
        } else {
            self.params.layers.first().map(String::as_str)
        }
    }

    /// Merge enumerated dimension values into this descriptor, keeping
    /// any previously selected indices that are still in range.
    pub fn merge_dimensions(&mut self, dimensions: BTreeMap<String, DimensionSelector>) {
        for (name, mut selector) in dimensions {
            if let Some(existing) = self.dimensions.get(&name) {
                if existing.selected < selector.values.len() {
                    selector.selected = existing.selected;
                }
            }
            self.dimensions.insert(name, selector);
        }
    }
}
