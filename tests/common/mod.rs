//! Shared fixtures for integration tests: an in-memory chunked store
//! with a deterministic value function, stub tile backends, and a
//! renderer that records the instructions it receives.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use ekman::capabilities::{LayerCapability, WmsCapabilities};
use ekman::chunked::{ChunkedArray, ChunkedStore};
use ekman::dimensions::DimensionValue;
use ekman::dispatcher::{MapRenderer, RenderInstruction};
use ekman::error::{EkmanError, Result};
use ekman::layer::LayerId;
use ekman::request::{
    BandStats, CogInfo, CogTiles, InfoOutcome, StatsOutcome, TileQuery, ZarrTiles,
};

/// Deterministic cell value: encodes every index that produced it.
pub fn cell_value(time: usize, row: usize, col: usize) -> f64 {
    time as f64 * 1000.0 + row as f64 + col as f64 / 1000.0
}

/// In-memory (time, lat, lon) grid backing the sampler tests.
pub struct OceanStore {
    pub time_steps: usize,
    pub rows: usize,
    pub cols: usize,
}

impl OceanStore {
    pub fn new() -> Self {
        Self {
            time_steps: 24,
            rows: 180,
            cols: 360,
        }
    }
}

struct OceanArray {
    shape: Vec<usize>,
}

#[async_trait]
impl ChunkedArray for OceanArray {
    fn shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn dimension_names(&self) -> Option<Vec<String>> {
        Some(vec!["time".to_string(), "lat".to_string(), "lon".to_string()])
    }

    async fn read_scalar(&self, index: &[usize]) -> Result<f64> {
        Ok(cell_value(index[0], index[1], index[2]))
    }

    async fn read_plane(
        &self,
        index: &[usize],
        row_axis: usize,
        col_axis: usize,
    ) -> Result<ndarray::Array2<f64>> {
        let (rows, cols) = (self.shape[row_axis], self.shape[col_axis]);
        Ok(ndarray::Array2::from_shape_fn((rows, cols), |(r, c)| {
            cell_value(index[0], r, c)
        }))
    }
}

#[async_trait]
impl ChunkedStore for OceanStore {
    async fn open(&self, _url: &str, _variable: &str) -> Result<Arc<dyn ChunkedArray>> {
        Ok(Arc::new(OceanArray {
            shape: vec![self.time_steps, self.rows, self.cols],
        }))
    }

    async fn read_coordinates(&self, _url: &str, name: &str) -> Result<Vec<f64>> {
        match name {
            "lat" => Ok((0..self.rows).map(|r| 90.0 - r as f64).collect()),
            "lon" => Ok((0..self.cols).map(|c| c as f64 - 180.0).collect()),
            other => Err(EkmanError::DataNotFound {
                message: format!("No coordinate array {}", other),
            }),
        }
    }
}

/// COG backend stub serving fixed single-band statistics.
pub struct StubCogBackend;

#[async_trait]
impl CogTiles for StubCogBackend {
    async fn statistics(&self, _url: &str, _encoded: bool) -> Result<StatsOutcome> {
        Ok(StatsOutcome::Stats(BTreeMap::from([(
            "b1".to_string(),
            BandStats {
                percentile_2: 12.0,
                percentile_98: 34.0,
            },
        )])))
    }

    async fn info(&self, _url: &str, _encoded: bool) -> Result<InfoOutcome> {
        Ok(InfoOutcome::Info(CogInfo {
            band_descriptions: vec![vec!["b1".to_string()]],
            bounds: Some([-4.0, 50.0, 4.0, 58.0]),
        }))
    }

    async fn tile_template(&self, query: &TileQuery) -> Result<String> {
        Ok(format!(
            "https://tiles.test/cog/{{z}}/{{x}}/{{y}}?url={}",
            query.url
        ))
    }
}

/// Zarr tile backend stub with a fixed two-step time axis.
pub struct StubZarrBackend;

#[async_trait]
impl ZarrTiles for StubZarrBackend {
    async fn time_values(&self, _url: &str) -> Result<Vec<DimensionValue>> {
        Ok(vec![
            DimensionValue::Text("2024-06-01T00:00:00".to_string()),
            DimensionValue::Text("2024-06-02T00:00:00".to_string()),
        ])
    }

    async fn dimension_values(&self, _name: &str, _url: &str) -> Result<Vec<DimensionValue>> {
        Ok(vec![
            DimensionValue::Number(0.0),
            DimensionValue::Number(5.0),
            DimensionValue::Number(10.0),
        ])
    }
}

/// Capabilities stub advertising one layer with a time dimension.
pub struct StubWmsBackend;

#[async_trait]
impl WmsCapabilities for StubWmsBackend {
    async fn capabilities(&self, _base_url: &str) -> Result<BTreeMap<String, LayerCapability>> {
        let mut cap = LayerCapability::default();
        cap.styles.push("boxfill/rainbow".to_string());
        cap.legend_urls
            .push("https://wms.test/legend?layer=sst".to_string());
        cap.bbox = Some([-10.0, 45.0, 10.0, 60.0]);
        cap.dimensions.insert(
            "time".to_string(),
            vec![
                "2024-06-01T00:00:00Z".to_string(),
                "2024-06-02T00:00:00Z".to_string(),
            ],
        );
        Ok(BTreeMap::from([("sst".to_string(), cap)]))
    }
}

/// Records every renderer call in order.
#[derive(Default)]
pub struct RecordingRenderer {
    pub events: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl MapRenderer for RecordingRenderer {
    fn add_layer(&self, instruction: &RenderInstruction) {
        self.events
            .lock()
            .push(format!("add {} {:?}", instruction.id, instruction.kind));
    }

    fn remove_layer(&self, id: &LayerId) {
        self.events.lock().push(format!("remove {}", id));
    }

    fn fit_bounds(&self, bounds: [[f64; 2]; 2]) {
        self.events.lock().push(format!("fit {:?}", bounds));
    }

    fn set_paint_opacity(&self, id: &LayerId, property: &str, value: f64) {
        self.events
            .lock()
            .push(format!("paint {} {} {}", id, property, value));
    }
}
