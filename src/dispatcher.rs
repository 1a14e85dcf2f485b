//! Gesture-to-mutation dispatch.
//!
//! User gestures are tagged into a single pending slot (last writer
//! wins) and applied one at a time by `reconcile`: each pass resolves at
//! most one action into store mutations plus render instructions, then
//! clears the slot and reconciles the legend store. The map renderer is
//! an injected collaborator and never sees descriptors directly, only
//! derived instructions.

use std::sync::Arc;
use tracing::{debug, info};

use crate::capabilities::{fallback_legend_url, legend_graphic_url, WmsCapabilities};
use crate::chunked::ChunkedStore;
use crate::colormaps::{build_legend, ColorSpec};
use crate::config::Config;
use crate::dimensions::{parse_range_string, DimensionSelector, DimensionValue};
use crate::error::{EkmanError, Result};
use crate::geo::padded_bounds;
use crate::layer::{DataKind, LayerDescriptor, LayerId};
use crate::request::{
    self, velocity, wms, zarr_direct, zarr_tile, BackendRequest, CogOutcome, CogTiles, ZarrTiles,
};
use crate::store::{LayerStore, LegendEntry, LegendStore};

/// The closed set of user gestures the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerAction {
    Add,
    Remove,
    Zoom,
    Opacity,
    UpdateColors,
    UpdateDimensions,
}

/// A tagged gesture waiting for the next reconcile pass.
#[derive(Debug, Clone)]
enum PendingAction {
    Add(Box<LayerDescriptor>),
    Remove(LayerId),
    Zoom(LayerId),
    Opacity(LayerId, f64),
    UpdateColors(LayerId, Option<ColorSpec>, Option<[f64; 2]>),
    UpdateDimensions(LayerId, String, usize),
}

impl PendingAction {
    fn action(&self) -> LayerAction {
        match self {
            PendingAction::Add(_) => LayerAction::Add,
            PendingAction::Remove(_) => LayerAction::Remove,
            PendingAction::Zoom(_) => LayerAction::Zoom,
            PendingAction::Opacity(..) => LayerAction::Opacity,
            PendingAction::UpdateColors(..) => LayerAction::UpdateColors,
            PendingAction::UpdateDimensions(..) => LayerAction::UpdateDimensions,
        }
    }

    fn layer(&self) -> &LayerId {
        match self {
            PendingAction::Add(d) => &d.id,
            PendingAction::Remove(id)
            | PendingAction::Zoom(id)
            | PendingAction::Opacity(id, _)
            | PendingAction::UpdateColors(id, ..)
            | PendingAction::UpdateDimensions(id, ..) => id,
        }
    }
}

/// Rendered geometry family, used to pick the backend paint property
/// for opacity updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Fill,
    Line,
    Circle,
    Symbol,
    Raster,
    FillExtrusion,
    Custom,
}

/// Backend paint property names for an opacity change on the given
/// geometry. Symbol layers carry two.
pub fn paint_properties(geometry: GeometryType) -> &'static [&'static str] {
    match geometry {
        GeometryType::Fill => &["fill-opacity"],
        GeometryType::Line => &["line-opacity"],
        GeometryType::Circle => &["circle-opacity"],
        GeometryType::Symbol => &["icon-opacity", "text-opacity"],
        GeometryType::Raster => &["raster-opacity"],
        GeometryType::FillExtrusion => &["fill-extrusion-opacity"],
        GeometryType::Custom => &["custom-opacity"],
    }
}

fn geometry_for(kind: DataKind) -> GeometryType {
    match kind {
        DataKind::Cog | DataKind::ZarrTile | DataKind::Wms => GeometryType::Raster,
        DataKind::ZarrScalar
        | DataKind::ZarrVector
        | DataKind::VelocityZarr
        | DataKind::VelocityWms => GeometryType::Custom,
    }
}

/// One resolved layer handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInstruction {
    pub id: LayerId,
    pub kind: DataKind,
    pub request: BackendRequest,
    pub opacity: f64,
}

/// External map renderer collaborator. Implementations translate
/// instructions into whatever the rendering backend needs.
pub trait MapRenderer: Send + Sync {
    fn add_layer(&self, instruction: &RenderInstruction);
    fn remove_layer(&self, id: &LayerId);
    fn fit_bounds(&self, bounds: [[f64; 2]; 2]);
    fn set_paint_opacity(&self, id: &LayerId, property: &str, value: f64);
}

/// A user-facing outcome that is not an error: the gesture was handled
/// but the user should be told something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The backend refused statistics/info access with this status.
    NotAuthorized(u16),
}

/// Reject a scale edit before it reaches any store.
pub fn validate_scale_edit(min: f64, max: f64) -> Result<()> {
    if min.is_nan() || max.is_nan() {
        return Err(EkmanError::InvalidParameter {
            param: "scale".to_string(),
            message: "Scale bounds must be numbers".to_string(),
        });
    }
    if min >= max {
        return Err(EkmanError::InvalidParameter {
            param: "scale".to_string(),
            message: "Minimum must be less than maximum".to_string(),
        });
    }
    Ok(())
}

pub struct Dispatcher {
    config: Config,
    http: reqwest::Client,
    cog: Arc<dyn CogTiles>,
    zarr_tiles: Arc<dyn ZarrTiles>,
    chunked: Arc<dyn ChunkedStore>,
    capabilities: Arc<dyn WmsCapabilities>,
    renderer: Arc<dyn MapRenderer>,
    pub layers: Arc<LayerStore>,
    pub legends: Arc<LegendStore>,
    pending: parking_lot::Mutex<Option<PendingAction>>,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        renderer: Arc<dyn MapRenderer>,
        cog: Arc<dyn CogTiles>,
        zarr_tiles: Arc<dyn ZarrTiles>,
        chunked: Arc<dyn ChunkedStore>,
        capabilities: Arc<dyn WmsCapabilities>,
    ) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cog,
            zarr_tiles,
            chunked,
            capabilities,
            renderer,
            layers: Arc::new(LayerStore::new()),
            legends: Arc::new(LegendStore::new()),
            pending: parking_lot::Mutex::new(None),
        }
    }

    /// The pending gesture, if any, as (action, layer id).
    pub fn pending(&self) -> Option<(LayerAction, LayerId)> {
        self.pending
            .lock()
            .as_ref()
            .map(|p| (p.action(), p.layer().clone()))
    }

    fn set_pending(&self, action: PendingAction) {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.replace(action) {
            debug!(
                action = ?previous.action(),
                layer = %previous.layer(),
                "Pending action superseded"
            );
        }
    }

    pub fn toggle_on(&self, descriptor: LayerDescriptor) {
        self.set_pending(PendingAction::Add(Box::new(descriptor)));
    }

    pub fn toggle_off(&self, id: LayerId) {
        self.set_pending(PendingAction::Remove(id));
    }

    pub fn zoom_to(&self, id: LayerId) {
        self.set_pending(PendingAction::Zoom(id));
    }

    pub fn set_opacity(&self, id: LayerId, opacity: f64) {
        self.set_pending(PendingAction::Opacity(id, opacity));
    }

    /// Queue a color/scale edit. Invalid scale bounds are rejected here,
    /// before anything is queued or mutated.
    pub fn edit_colors(
        &self,
        id: LayerId,
        colors: Option<ColorSpec>,
        scale: Option<[f64; 2]>,
    ) -> Result<()> {
        if let Some([min, max]) = scale {
            validate_scale_edit(min, max)?;
        }
        self.set_pending(PendingAction::UpdateColors(id, colors, scale));
        Ok(())
    }

    pub fn select_dimension(&self, id: LayerId, dimension: impl Into<String>, selected: usize) {
        self.set_pending(PendingAction::UpdateDimensions(id, dimension.into(), selected));
    }

    /// Apply at most one pending gesture. The slot is cleared before
    /// handling, so a gesture arriving mid-pass waits for the next one.
    pub async fn reconcile(&self) -> Result<Option<Notice>> {
        let Some(action) = self.pending.lock().take() else {
            return Ok(None);
        };
        info!(action = ?action.action(), layer = %action.layer(), "Reconciling");

        let notice = match action {
            PendingAction::Add(descriptor) => self.activate(*descriptor).await?,
            PendingAction::Remove(id) => {
                self.layers.remove(&id);
                self.renderer.remove_layer(&id);
                None
            }
            PendingAction::Zoom(id) => {
                self.layers.touch(&id)?;
                let layer = self.layers.get(&id).ok_or_else(|| EkmanError::DataNotFound {
                    message: format!("Layer not found: {}", id),
                })?;
                self.renderer.fit_bounds(padded_bounds(
                    layer.bbox.as_ref(),
                    &self.config.layers.default_bounds,
                ));
                None
            }
            PendingAction::Opacity(id, opacity) => {
                self.layers.update_opacity(&id, opacity)?;
                let layer = self.layers.get(&id).ok_or_else(|| EkmanError::DataNotFound {
                    message: format!("Layer not found: {}", id),
                })?;
                // Custom shader layers take opacity at build time only.
                if matches!(layer.kind, DataKind::ZarrVector) || layer.kind.is_velocity() {
                    self.rebuild(&layer).await?
                } else {
                    for property in paint_properties(geometry_for(layer.kind)) {
                        self.renderer.set_paint_opacity(&id, property, opacity);
                    }
                    None
                }
            }
            PendingAction::UpdateColors(id, colors, scale) => {
                self.layers.update_colors(&id, colors, scale)?;
                let layer = self.layers.get(&id).ok_or_else(|| EkmanError::DataNotFound {
                    message: format!("Layer not found: {}", id),
                })?;
                self.rebuild(&layer).await?
            }
            PendingAction::UpdateDimensions(id, dimension, selected) => {
                self.layers.update_dimension(&id, &dimension, selected)?;
                let layer = self.layers.get(&id).ok_or_else(|| EkmanError::DataNotFound {
                    message: format!("Layer not found: {}", id),
                })?;
                self.rebuild(&layer).await?
            }
        };

        self.legends.reconcile(&self.layers);
        Ok(notice)
    }

    /// Full activation of a freshly toggled-on layer: enumerate its
    /// dimensions, settle defaults, resolve the backend request, then
    /// insert and render.
    async fn activate(&self, mut descriptor: LayerDescriptor) -> Result<Option<Notice>> {
        self.populate_dimensions(&mut descriptor).await?;
        if descriptor.opacity <= 0.0 {
            descriptor.opacity = self.config.layers.default_opacity;
        }

        let request = match self.resolve(&mut descriptor).await? {
            Resolved::Request(request) => request,
            Resolved::Denied(status) => {
                debug!(layer = %descriptor.id, status = status, "Activation denied");
                return Ok(Some(Notice::NotAuthorized(status)));
            }
        };

        self.layers.add(descriptor.clone());
        self.renderer.add_layer(&RenderInstruction {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            request,
            opacity: descriptor.opacity,
        });
        let entry = self.legend_entry(&descriptor).await;
        self.legends.upsert(entry);
        Ok(None)
    }

    /// Re-resolve and re-render a layer in place, without reordering.
    async fn rebuild(&self, layer: &LayerDescriptor) -> Result<Option<Notice>> {
        let mut descriptor = layer.clone();
        let request = match self.resolve(&mut descriptor).await? {
            Resolved::Request(request) => request,
            Resolved::Denied(status) => return Ok(Some(Notice::NotAuthorized(status))),
        };
        // Resolution may have settled colors/scale that were edited away.
        self.layers
            .update_colors(&layer.id, descriptor.colors.clone(), descriptor.scale)?;
        self.renderer.remove_layer(&layer.id);
        self.renderer.add_layer(&RenderInstruction {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            request,
            opacity: descriptor.opacity,
        });
        let entry = self.legend_entry(&descriptor).await;
        self.legends.upsert(entry);
        Ok(None)
    }

    /// Resolve the backend request for a descriptor, settling per-kind
    /// defaults (colors, scale) as a side effect.
    async fn resolve(&self, descriptor: &mut LayerDescriptor) -> Result<Resolved> {
        match descriptor.kind {
            DataKind::Cog => {
                match request::build_tile_request(self.cog.as_ref(), descriptor).await? {
                    CogOutcome::Request { request, scale } => {
                        descriptor.scale.get_or_insert(scale);
                        descriptor
                            .colors
                            .get_or_insert_with(|| ColorSpec::Named("ocean_r".to_string()));
                        Ok(Resolved::Request(request))
                    }
                    CogOutcome::Denied(status) => Ok(Resolved::Denied(status)),
                }
            }
            DataKind::ZarrTile => {
                self.zarr_defaults(descriptor);
                Ok(Resolved::Request(zarr_tile::zarr_tile_template(
                    descriptor,
                    &self.config.endpoints.zarr_tile_server_url,
                )?))
            }
            DataKind::ZarrScalar | DataKind::ZarrVector => {
                self.zarr_defaults(descriptor);
                Ok(Resolved::Request(zarr_direct::zarr_selector_request(
                    descriptor,
                    self.config.layers.default_opacity,
                )?))
            }
            DataKind::Wms => Ok(Resolved::Request(wms::wms_tile_template(descriptor)?)),
            DataKind::VelocityZarr => {
                let pair = velocity::build_zarr(descriptor, self.chunked.as_ref()).await?;
                Ok(Resolved::Request(BackendRequest::VelocityPair(Box::new(pair))))
            }
            DataKind::VelocityWms => {
                let pair = velocity::build_wms(descriptor, &self.http).await?;
                Ok(Resolved::Request(BackendRequest::VelocityPair(Box::new(pair))))
            }
        }
    }

    fn zarr_defaults(&self, descriptor: &mut LayerDescriptor) {
        descriptor
            .colors
            .get_or_insert_with(|| ColorSpec::Named("jet".to_string()));
        descriptor.scale.get_or_insert([0.0, 1.0]);
    }

    /// Enumerate the dimension value lists a fresh descriptor is missing,
    /// preserving in-range selections it already carries.
    async fn populate_dimensions(&self, descriptor: &mut LayerDescriptor) -> Result<()> {
        let mut discovered = std::collections::BTreeMap::new();

        match descriptor.kind {
            DataKind::Wms | DataKind::VelocityWms => {
                let capabilities = self
                    .capabilities
                    .capabilities(descriptor.primary_url())
                    .await?;
                if let Some(layer) = descriptor.wms_legend_layer() {
                    if let Some(capability) = capabilities.get(layer) {
                        for (name, values) in &capability.dimensions {
                            let values =
                                values.iter().map(|v| parse_dimension_value(v)).collect();
                            discovered.insert(name.clone(), DimensionSelector::new(values));
                        }
                        if descriptor.bbox.is_none() {
                            descriptor.bbox = capability.bbox;
                        }
                    }
                }
            }
            DataKind::ZarrTile
            | DataKind::ZarrScalar
            | DataKind::ZarrVector
            | DataKind::VelocityZarr => {
                let (url, _) = descriptor.effective_url();
                let url = url.to_string();
                if !descriptor.dimensions.contains_key("time") {
                    let values = self.zarr_tiles.time_values(&url).await?;
                    if !values.is_empty() {
                        discovered.insert("time".to_string(), DimensionSelector::new(values));
                    }
                }
                for declared in descriptor.params.additional_dims.clone() {
                    // Catalog entries either name a backend dimension or
                    // carry an inline "name=range(a,b,step)" declaration.
                    if let Some((name, range)) = declared.split_once('=') {
                        let values = parse_range_string(range)?
                            .into_iter()
                            .map(DimensionValue::Number)
                            .collect();
                        discovered.insert(name.to_string(), DimensionSelector::new(values));
                    } else {
                        let values =
                            self.zarr_tiles.dimension_values(&declared, &url).await?;
                        discovered.insert(declared, DimensionSelector::new(values));
                    }
                }
            }
            DataKind::Cog => {}
        }

        descriptor.merge_dimensions(discovered);
        Ok(())
    }

    /// Build the legend snapshot for an active layer.
    async fn legend_entry(&self, descriptor: &LayerDescriptor) -> LegendEntry {
        let mut legend = None;
        let mut legend_url = None;

        match descriptor.kind {
            DataKind::Wms | DataKind::VelocityWms => {
                if let Some(layer) = descriptor.wms_legend_layer() {
                    let from_capabilities =
                        match self.capabilities.capabilities(descriptor.primary_url()).await {
                            Ok(capabilities) => legend_graphic_url(&capabilities, layer),
                            Err(_) => None,
                        };
                    legend_url = Some(from_capabilities.unwrap_or_else(|| {
                        fallback_legend_url(descriptor.primary_url(), layer)
                    }));
                }
            }
            kind if kind.is_continuous() => {
                if let (Some(colors), Some(scale)) = (&descriptor.colors, descriptor.scale) {
                    legend = build_legend(colors, scale, self.config.layers.legend_steps).ok();
                }
            }
            // Velocity-zarr overlays show only the textual description.
            _ => {}
        }

        LegendEntry {
            layer: descriptor.id.clone(),
            kind: descriptor.kind,
            legend,
            legend_url,
            scale: descriptor.scale,
            data_description: descriptor.data_description.clone(),
            dimensions: descriptor.dimensions.clone(),
        }
    }
}

enum Resolved {
    Request(BackendRequest),
    Denied(u16),
}

fn parse_dimension_value(raw: &str) -> DimensionValue {
    match raw.trim().parse::<f64>() {
        Ok(n) => DimensionValue::Number(n),
        Err(_) => DimensionValue::Text(raw.trim().to_string()),
    }
}
