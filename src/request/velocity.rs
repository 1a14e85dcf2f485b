//! Velocity field assembly for particle-animation overlays.
//!
//! The overlay consumes GRIB-style component records: a flat row-major
//! grid scanning west-to-east starting at the northern edge, plus a
//! header describing the grid geometry. Both the zarr and the WCS-JSON
//! regimes produce the same `VelocityPair`.

use serde::{Deserialize, Serialize};

use crate::chunked::ChunkedStore;
use crate::dimensions::{resolve_dimension_roles, DimensionRole};
use crate::error::{EkmanError, Result};
use crate::layer::LayerDescriptor;

use super::wms::wcs_coverage_url;

/// Fill value marking dry cells in the model output feeds.
const FILL_VALUE: f64 = -32768.0;

/// Output grid for the WCS regime.
const WCS_GRID: (u32, u32) = (256, 256);

/// Grid geometry header, serialized with the field names the animation
/// library expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityHeader {
    pub parameter_unit: String,
    /// 2 = eastward component, 3 = northward component
    pub parameter_number: u8,
    pub parameter_number_name: String,
    pub parameter_category: u8,
    /// Cell size in degrees
    pub dx: f64,
    pub dy: f64,
    /// Northern edge latitude
    pub la1: f64,
    /// Southern edge latitude
    pub la2: f64,
    /// Western edge longitude
    pub lo1: f64,
    /// Eastern edge longitude
    pub lo2: f64,
    pub nx: usize,
    pub ny: usize,
}

/// One decoded component grid. `None` marks masked cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityField {
    pub header: VelocityHeader,
    pub data: Vec<Option<f64>>,
}

/// Eastward and northward component pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityPair {
    pub u: VelocityField,
    pub v: VelocityField,
}

#[derive(Clone, Copy)]
enum Component {
    U,
    V,
}

impl Component {
    fn parameter_number(self) -> u8 {
        match self {
            Component::U => 2,
            Component::V => 3,
        }
    }

    fn parameter_name(self) -> &'static str {
        match self {
            Component::U => "eastward_velocity",
            Component::V => "northward_velocity",
        }
    }

    fn index(self) -> usize {
        match self {
            Component::U => 0,
            Component::V => 1,
        }
    }
}

fn header(component: Component, extent: GridExtent) -> VelocityHeader {
    VelocityHeader {
        parameter_unit: "m.s-1".to_string(),
        parameter_number: component.parameter_number(),
        parameter_number_name: component.parameter_name().to_string(),
        parameter_category: 2,
        dx: extent.dx,
        dy: extent.dy,
        la1: extent.north,
        la2: extent.south,
        lo1: extent.west,
        lo2: extent.east,
        nx: extent.nx,
        ny: extent.ny,
    }
}

#[derive(Clone, Copy)]
struct GridExtent {
    dx: f64,
    dy: f64,
    north: f64,
    south: f64,
    west: f64,
    east: f64,
    nx: usize,
    ny: usize,
}

impl GridExtent {
    /// Whole-world fallback when coordinate arrays are unreadable.
    fn world(nx: usize, ny: usize) -> Self {
        Self {
            dx: 1.0,
            dy: 1.0,
            north: 90.0,
            south: -90.0,
            west: -180.0,
            east: 180.0,
            nx,
            ny,
        }
    }

    fn from_coordinates(lats: &[f64], lons: &[f64]) -> Self {
        let spacing = |coords: &[f64]| {
            if coords.len() >= 2 {
                (coords[1] - coords[0]).abs()
            } else {
                1.0
            }
        };
        let min = |coords: &[f64]| coords.iter().copied().fold(f64::INFINITY, f64::min);
        let max = |coords: &[f64]| coords.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            dx: spacing(lons),
            dy: spacing(lats),
            north: max(lats),
            south: min(lats),
            west: min(lons),
            east: max(lons),
            nx: lons.len(),
            ny: lats.len(),
        }
    }
}

fn mask(value: f64) -> Option<f64> {
    if value.is_nan() || value == FILL_VALUE {
        None
    } else {
        Some(value)
    }
}

/// Read both component grids from zarr stores.
///
/// The selected time index is honored, depth is pinned to the surface
/// slice, and rows are emitted north-first to match the header's `la1`
/// convention regardless of the store's latitude ordering.
pub async fn build_zarr(
    descriptor: &LayerDescriptor,
    store: &dyn ChunkedStore,
) -> Result<VelocityPair> {
    let u = read_component(descriptor, store, Component::U).await?;
    let v = read_component(descriptor, store, Component::V).await?;
    Ok(VelocityPair { u, v })
}

async fn read_component(
    descriptor: &LayerDescriptor,
    store: &dyn ChunkedStore,
    component: Component,
) -> Result<VelocityField> {
    let i = component.index();
    let url = descriptor
        .urls
        .get(i)
        .or_else(|| descriptor.urls.first())
        .map(String::as_str)
        .ok_or_else(|| EkmanError::InvalidParameter {
            param: "urls".to_string(),
            message: format!("Velocity layer {} declares no store URL", descriptor.id),
        })?;
    let variable = descriptor
        .params
        .variables
        .get(i)
        .cloned()
        .ok_or_else(|| EkmanError::InvalidParameter {
            param: "variables".to_string(),
            message: format!(
                "Velocity layer {} declares no component variable {}",
                descriptor.id, i
            ),
        })?;

    let array = store.open(url, &variable).await?;
    let dims = array
        .dimension_names()
        .ok_or_else(|| EkmanError::ChunkedStore {
            message: "No dimension information found in store metadata".to_string(),
        })?;
    let roles = resolve_dimension_roles(&dims);
    let (lat, lon) = match (roles.get(&DimensionRole::Lat), roles.get(&DimensionRole::Lon)) {
        (Some(lat), Some(lon)) => (lat.clone(), lon.clone()),
        _ => {
            return Err(EkmanError::ChunkedStore {
                message: format!("Array {} lacks spatial dimensions", variable),
            })
        }
    };

    let shape = array.shape();
    let selected = |role: DimensionRole| {
        roles
            .get(&role)
            .and_then(|d| descriptor.dimensions.get(&d.name))
            .map(|s| s.selected)
            .unwrap_or(0)
    };
    let mut index = vec![0usize; shape.len()];
    if let Some(time) = roles.get(&DimensionRole::Time) {
        index[time.index] = selected(DimensionRole::Time).min(shape[time.index].saturating_sub(1));
    }
    // Depth stays at the surface slice for the overlay.
    if let Some(depth) = roles.get(&DimensionRole::Depth) {
        index[depth.index] = 0;
    }

    let plane = array.read_plane(&index, lat.index, lon.index).await?;
    let (ny, nx) = plane.dim();

    let extent = match (
        store.read_coordinates(url, &lat.name).await,
        store.read_coordinates(url, &lon.name).await,
    ) {
        (Ok(lats), Ok(lons)) => GridExtent::from_coordinates(&lats, &lons),
        _ => GridExtent::world(nx, ny),
    };

    // Ascending latitude axes scan south-first; flip to north-first.
    let north_first = match store.read_coordinates(url, &lat.name).await {
        Ok(lats) if lats.len() >= 2 => lats[0] > lats[1],
        _ => true,
    };
    let mut data = Vec::with_capacity(nx * ny);
    let rows: Box<dyn Iterator<Item = usize>> = if north_first {
        Box::new(0..ny)
    } else {
        Box::new((0..ny).rev())
    };
    for row in rows {
        for col in 0..nx {
            data.push(mask(plane[(row, col)]));
        }
    }

    Ok(VelocityField {
        header: header(component, extent),
        data,
    })
}

/// WCS-JSON grid response shape.
#[derive(Debug, Deserialize)]
struct CoverageGrid {
    data: Vec<Option<f64>>,
    /// [min_lon, min_lat, max_lon, max_lat]
    bounds: [f64; 4],
    width: usize,
    height: usize,
}

/// Fetch both component grids from the WCS JSON backend.
pub async fn build_wms(
    descriptor: &LayerDescriptor,
    http: &reqwest::Client,
) -> Result<VelocityPair> {
    let u = fetch_component(descriptor, http, Component::U).await?;
    let v = fetch_component(descriptor, http, Component::V).await?;
    Ok(VelocityPair { u, v })
}

async fn fetch_component(
    descriptor: &LayerDescriptor,
    http: &reqwest::Client,
    component: Component,
) -> Result<VelocityField> {
    let coverage = descriptor
        .params
        .layers
        .get(component.index())
        .map(String::as_str)
        .ok_or_else(|| EkmanError::InvalidParameter {
            param: "layers".to_string(),
            message: format!(
                "Velocity layer {} declares no coverage {}",
                descriptor.id,
                component.index()
            ),
        })?;

    let url = wcs_coverage_url(descriptor, coverage, WCS_GRID.0, WCS_GRID.1)?;
    let grid: CoverageGrid = http
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let [west, south, east, north] = grid.bounds;
    let extent = GridExtent {
        dx: (east - west).abs() / grid.width as f64,
        dy: (north - south).abs() / grid.height as f64,
        north,
        south,
        west,
        east,
        nx: grid.width,
        ny: grid.height,
    };
    Ok(VelocityField {
        header: header(component, extent),
        data: grid.data,
    })
}
