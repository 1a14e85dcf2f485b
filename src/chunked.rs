//! Remote chunked-array store access.
//!
//! The sampler and the velocity builder read remote zarr stores through
//! the `ChunkedStore`/`ChunkedArray` traits, so tests can substitute an
//! in-memory store and the engine stays independent of the transport.
//! `RemoteZarrStore` is the production implementation over zarrs with an
//! HTTP object store.

use async_trait::async_trait;
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs_object_store::AsyncObjectStore;

use crate::error::{EkmanError, Result};

/// Attribute carrying the axis names of a zarr array, aligned with its
/// shape.
pub const ARRAY_DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";

/// An opened variable array in a chunked store.
#[async_trait]
pub trait ChunkedArray: Send + Sync {
    /// Array shape, one extent per axis.
    fn shape(&self) -> Vec<usize>;

    /// Declared axis names from the `_ARRAY_DIMENSIONS` attribute, if
    /// present.
    fn dimension_names(&self) -> Option<Vec<String>>;

    /// Read a single element at the given per-axis index vector.
    async fn read_scalar(&self, index: &[usize]) -> Result<f64>;

    /// Read a full 2-D plane: the given axes vary over their whole
    /// extent, every other axis is pinned to `index`. Returns rows along
    /// `row_axis` and columns along `col_axis`.
    async fn read_plane(&self, index: &[usize], row_axis: usize, col_axis: usize)
        -> Result<Array2<f64>>;
}

/// A remote chunked-array store, addressed by group URL.
#[async_trait]
pub trait ChunkedStore: Send + Sync {
    /// Open the named variable array inside the group at `url`.
    async fn open(&self, url: &str, variable: &str) -> Result<Arc<dyn ChunkedArray>>;

    /// Read a 1-D coordinate array (e.g. the lat or lon axis) from the
    /// group at `url`.
    async fn read_coordinates(&self, url: &str, name: &str) -> Result<Vec<f64>>;
}

type ZarrsStorage = AsyncObjectStore<object_store::http::HttpStore>;

/// Production store: zarr groups served over plain HTTP.
///
/// Opened arrays are cached per (url, variable) so repeated sampling
/// sessions against the same layer skip the metadata round-trips. Each
/// session still owns its own read cursor; the cache only shares the
/// immutable array handle.
pub struct RemoteZarrStore {
    cache: Mutex<HashMap<(String, String), Arc<ZarrsArray>>>,
}

impl RemoteZarrStore {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn storage(url: &str) -> Result<Arc<ZarrsStorage>> {
        let store = object_store::http::HttpBuilder::new()
            .with_url(url)
            .build()
            .map_err(EkmanError::store)?;
        Ok(Arc::new(AsyncObjectStore::new(store)))
    }

    async fn open_array(&self, url: &str, variable: &str) -> Result<Arc<ZarrsArray>> {
        let key = (url.to_string(), variable.to_string());
        let mut cache = self.cache.lock().await;
        if let Some(array) = cache.get(&key) {
            return Ok(Arc::clone(array));
        }

        debug!(url = url, variable = variable, "Opening remote zarr array");
        let storage = Self::storage(url)?;
        let array = Array::async_open(storage, &format!("/{}", variable))
            .await
            .map_err(EkmanError::store)?;
        let array = Arc::new(ZarrsArray { array });
        cache.insert(key, Arc::clone(&array));
        Ok(array)
    }
}

impl Default for RemoteZarrStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkedStore for RemoteZarrStore {
    async fn open(&self, url: &str, variable: &str) -> Result<Arc<dyn ChunkedArray>> {
        let array = self.open_array(url, variable).await?;
        Ok(array as Arc<dyn ChunkedArray>)
    }

    async fn read_coordinates(&self, url: &str, name: &str) -> Result<Vec<f64>> {
        let array = self.open_array(url, name).await?;
        let shape = array.shape();
        if shape.len() != 1 {
            return Err(EkmanError::ChunkedStore {
                message: format!("Coordinate array {} is not one-dimensional", name),
            });
        }
        let subset = ArraySubset::new_with_ranges(&[0..shape[0] as u64]);
        array.retrieve_f64(&subset).await
    }
}

/// A zarrs-backed array handle.
pub struct ZarrsArray {
    array: Array<ZarrsStorage>,
}

impl ZarrsArray {
    /// Retrieve a subset as f64 regardless of the stored element type.
    async fn retrieve_f64(&self, subset: &ArraySubset) -> Result<Vec<f64>> {
        match self.array.data_type() {
            DataType::Float64 => self
                .array
                .async_retrieve_array_subset_elements::<f64>(subset)
                .await
                .map(|v| v.to_vec())
                .map_err(EkmanError::store),
            DataType::Float32 => self
                .array
                .async_retrieve_array_subset_elements::<f32>(subset)
                .await
                .map(|v| v.iter().map(|&x| x as f64).collect())
                .map_err(EkmanError::store),
            DataType::Int16 => self
                .array
                .async_retrieve_array_subset_elements::<i16>(subset)
                .await
                .map(|v| v.iter().map(|&x| x as f64).collect())
                .map_err(EkmanError::store),
            DataType::Int32 => self
                .array
                .async_retrieve_array_subset_elements::<i32>(subset)
                .await
                .map(|v| v.iter().map(|&x| x as f64).collect())
                .map_err(EkmanError::store),
            other => Err(EkmanError::ChunkedStore {
                message: format!("Unsupported array data type: {}", other),
            }),
        }
    }

    fn subset_for_index(&self, index: &[usize]) -> Result<ArraySubset> {
        let shape = self.array.shape();
        if index.len() != shape.len() {
            return Err(EkmanError::InvalidParameter {
                param: "index".to_string(),
                message: format!(
                    "Index rank {} does not match array rank {}",
                    index.len(),
                    shape.len()
                ),
            });
        }
        let ranges: Vec<std::ops::Range<u64>> = index
            .iter()
            .map(|&i| i as u64..i as u64 + 1)
            .collect();
        Ok(ArraySubset::new_with_ranges(&ranges))
    }
}

#[async_trait]
impl ChunkedArray for ZarrsArray {
    fn shape(&self) -> Vec<usize> {
        self.array.shape().iter().map(|&s| s as usize).collect()
    }

    fn dimension_names(&self) -> Option<Vec<String>> {
        let names = self.array.attributes().get(ARRAY_DIMENSIONS_ATTR)?;
        let names = names.as_array()?;
        names
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    async fn read_scalar(&self, index: &[usize]) -> Result<f64> {
        let subset = self.subset_for_index(index)?;
        let values = self.retrieve_f64(&subset).await?;
        values.first().copied().ok_or_else(|| EkmanError::ChunkedStore {
            message: "Empty read for scalar subset".to_string(),
        })
    }

    async fn read_plane(
        &self,
        index: &[usize],
        row_axis: usize,
        col_axis: usize,
    ) -> Result<Array2<f64>> {
        let shape = self.shape();
        if index.len() != shape.len() || row_axis >= shape.len() || col_axis >= shape.len() {
            return Err(EkmanError::InvalidParameter {
                param: "index".to_string(),
                message: "Plane axes out of range for array rank".to_string(),
            });
        }

        let ranges: Vec<std::ops::Range<u64>> = (0..shape.len())
            .map(|axis| {
                if axis == row_axis || axis == col_axis {
                    0..shape[axis] as u64
                } else {
                    index[axis] as u64..index[axis] as u64 + 1
                }
            })
            .collect();
        let subset = ArraySubset::new_with_ranges(&ranges);
        let values = self.retrieve_f64(&subset).await?;

        let (rows, cols) = (shape[row_axis], shape[col_axis]);
        // zarrs returns elements in C order; with every other axis pinned
        // the plane is contiguous. Transpose when the column axis comes
        // before the row axis in the array's layout.
        let plane = if row_axis < col_axis {
            Array2::from_shape_vec((rows, cols), values)
        } else {
            Array2::from_shape_vec((cols, rows), values).map(|a| a.reversed_axes())
        }
        .map_err(EkmanError::store)?;

        Ok(plane)
    }
}
