//! Layer and legend stores.
//!
//! `LayerStore` owns the ordered set of active layers. Its iteration
//! order is the authoritative paint-order contract: always descending by
//! `z_order`, and every structural mutation (add, zoom-to-top, opacity
//! edit) reassigns the touched layer's `z_order` to `max(existing) + 1`
//! so the last-touched layer rises to the top. Color, scale and
//! dimension edits never reorder.
//!
//! The z-order read-modify-write is guarded by one mutex; it must never
//! be split across an await point.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::colormaps::{ColorSpec, Legend};
use crate::dimensions::DimensionSelector;
use crate::error::{EkmanError, Result};
use crate::layer::{DataKind, LayerDescriptor, LayerId};

/// Ordered, mutable collection of active layers.
#[derive(Debug, Default)]
pub struct LayerStore {
    /// Sorted descending by `z_order` at all times
    layers: Mutex<Vec<LayerDescriptor>>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a layer, assigning it the top `z_order`. If the identity is
    /// already present the old entry is overwritten: last write wins,
    /// no duplicate error is raised.
    pub fn add(&self, mut descriptor: LayerDescriptor) -> u64 {
        let mut layers = self.layers.lock();
        // Top z is relative to the set as it stood, duplicate included.
        let z = Self::next_z(&layers);
        layers.retain(|l| l.id != descriptor.id);
        descriptor.z_order = z;
        debug!(layer = %descriptor.id, z_order = z, "Layer added");
        layers.push(descriptor);
        Self::sort(&mut layers);
        z
    }

    /// Remove a layer. The remainder keeps its relative order.
    pub fn remove(&self, id: &LayerId) -> Option<LayerDescriptor> {
        let mut layers = self.layers.lock();
        let pos = layers.iter().position(|l| &l.id == id)?;
        debug!(layer = %id, "Layer removed");
        Some(layers.remove(pos))
    }

    /// Set a layer's opacity and float it to the top of the paint order.
    pub fn update_opacity(&self, id: &LayerId, opacity: f64) -> Result<u64> {
        let mut layers = self.layers.lock();
        let z = Self::next_z(&layers);
        let layer = Self::find_mut(&mut layers, id)?;
        layer.opacity = opacity;
        layer.z_order = z;
        Self::sort(&mut layers);
        Ok(z)
    }

    /// Float a layer to the top of the paint order without touching any
    /// other field (the zoom-to-layer gesture).
    pub fn touch(&self, id: &LayerId) -> Result<u64> {
        let mut layers = self.layers.lock();
        let z = Self::next_z(&layers);
        let layer = Self::find_mut(&mut layers, id)?;
        layer.z_order = z;
        Self::sort(&mut layers);
        Ok(z)
    }

    /// Update color scale and/or numeric range in place. Does NOT
    /// reorder.
    pub fn update_colors(
        &self,
        id: &LayerId,
        colors: Option<ColorSpec>,
        scale: Option<[f64; 2]>,
    ) -> Result<()> {
        let mut layers = self.layers.lock();
        let layer = Self::find_mut(&mut layers, id)?;
        if let Some(colors) = colors {
            layer.colors = Some(colors);
        }
        if let Some(scale) = scale {
            layer.scale = Some(scale);
        }
        Ok(())
    }

    /// Update one dimension's selected index in place. Does NOT reorder.
    pub fn update_dimension(&self, id: &LayerId, dimension: &str, selected: usize) -> Result<()> {
        let mut layers = self.layers.lock();
        let layer = Self::find_mut(&mut layers, id)?;
        let selector =
            layer
                .dimensions
                .get_mut(dimension)
                .ok_or_else(|| EkmanError::DataNotFound {
                    message: format!("Layer {} has no dimension {}", id, dimension),
                })?;
        if selected >= selector.values.len() {
            return Err(EkmanError::InvalidParameter {
                param: "selected".to_string(),
                message: format!(
                    "Index {} out of range for dimension {} ({} values)",
                    selected,
                    dimension,
                    selector.values.len()
                ),
            });
        }
        selector.selected = selected;
        Ok(())
    }

    /// Empty the active set.
    pub fn clear(&self) {
        self.layers.lock().clear();
    }

    /// Clone of a single layer.
    pub fn get(&self, id: &LayerId) -> Option<LayerDescriptor> {
        self.layers.lock().iter().find(|l| &l.id == id).cloned()
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.layers.lock().iter().any(|l| &l.id == id)
    }

    pub fn len(&self) -> usize {
        self.layers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.lock().is_empty()
    }

    /// Snapshot of the active set in paint order (descending z-order,
    /// i.e. front-to-back).
    pub fn snapshot(&self) -> Vec<LayerDescriptor> {
        self.layers.lock().clone()
    }

    /// Identities only, in paint order.
    pub fn paint_order(&self) -> Vec<LayerId> {
        self.layers.lock().iter().map(|l| l.id.clone()).collect()
    }

    fn next_z(layers: &[LayerDescriptor]) -> u64 {
        layers.iter().map(|l| l.z_order).max().unwrap_or(0) + 1
    }

    fn find_mut<'a>(
        layers: &'a mut Vec<LayerDescriptor>,
        id: &LayerId,
    ) -> Result<&'a mut LayerDescriptor> {
        layers
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| EkmanError::DataNotFound {
                message: format!("Layer not found: {}", id),
            })
    }

    fn sort(layers: &mut [LayerDescriptor]) {
        layers.sort_by(|a, b| b.z_order.cmp(&a.z_order));
    }
}

/// Read-only legend snapshot for one active, legend-eligible layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub layer: LayerId,
    pub kind: DataKind,
    /// Computed ramp for continuous layers
    pub legend: Option<Legend>,
    /// Legend-image URL for WMS-style layers
    pub legend_url: Option<String>,
    pub scale: Option<[f64; 2]>,
    /// Human-facing (quantity, unit) label
    pub data_description: Option<(String, String)>,
    /// Selector state echoed for the legend's dimension controls
    pub dimensions: BTreeMap<String, DimensionSelector>,
}

/// The set of legend snapshots, reconciled against the layer store
/// rather than deleted explicitly.
#[derive(Debug, Default)]
pub struct LegendStore {
    entries: Mutex<BTreeMap<LayerId, LegendEntry>>,
}

impl LegendStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a layer.
    pub fn upsert(&self, entry: LegendEntry) {
        self.entries.lock().insert(entry.layer.clone(), entry);
    }

    pub fn remove(&self, id: &LayerId) -> Option<LegendEntry> {
        self.entries.lock().remove(id)
    }

    pub fn get(&self, id: &LayerId) -> Option<LegendEntry> {
        self.entries.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry whose owning layer has left the active set.
    pub fn reconcile(&self, layers: &LayerStore) {
        let mut entries = self.entries.lock();
        entries.retain(|id, _| layers.contains(id));
    }

    pub fn snapshot(&self) -> Vec<LegendEntry> {
        self.entries.lock().values().cloned().collect()
    }
}
