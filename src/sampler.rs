//! Chunked-series sampling: point time series and spatial transects.
//!
//! Sampling streams element reads from a remote chunked store into a
//! watch channel, batched so partial results render while the rest is
//! still in flight. Sessions are single-flight per sampler: starting a
//! new one cancels the previous session, whose state simply freezes.
//! Read failures finish the session in the `Failed` phase instead of
//! surfacing as errors; the chart boundary only ever observes states.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::chunked::{ChunkedArray, ChunkedStore};
use crate::config::SamplerConfig;
use crate::dimensions::{resolve_dimension_roles, DimensionRole, ResolvedDimension};
use crate::error::{EkmanError, Result};
use crate::geo::{geo_to_pixel, haversine_km, GeoPoint};
use crate::layer::LayerDescriptor;
use crate::logging::{generate_session_id, log_session_progress};

/// Cooperative cancellation flag for one sampling session.
///
/// Cloned into the session task; checked before opening the array,
/// before each batch, and before each element read. Tripping it stops
/// the session silently.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a sampling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePhase {
    Idle,
    Opening,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

/// What is being sampled.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleTarget {
    Point { lat: f64, lng: f64 },
    Transect { points: Vec<GeoPoint> },
}

/// Observable state of one sampling session, published through a watch
/// channel. `x`/`y` grow batch by batch while `is_loading` holds.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesState {
    pub session_id: String,
    pub phase: SamplePhase,
    pub target: SampleTarget,
    pub variable: String,
    pub data_description: Option<(String, String)>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub total_steps: usize,
    pub current_step: usize,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SeriesState {
    fn idle(layer: &LayerDescriptor, target: SampleTarget) -> Self {
        Self {
            session_id: generate_session_id(),
            phase: SamplePhase::Idle,
            target,
            variable: layer.variable_or_stem(),
            data_description: layer.data_description.clone(),
            x: Vec::new(),
            y: Vec::new(),
            total_steps: 0,
            current_step: 0,
            is_loading: false,
            error: None,
        }
    }
}

/// Time-series request: one geographic point, all time steps.
#[derive(Debug, Clone)]
pub struct PointRequest {
    pub layer: LayerDescriptor,
    pub lat: f64,
    pub lng: f64,
}

/// Transect request: `count + 1` points interpolated between the two
/// endpoints, sampled at the layer's selected time.
#[derive(Debug, Clone)]
pub struct TransectRequest {
    pub layer: LayerDescriptor,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub count: usize,
}

impl TransectRequest {
    /// Evenly spaced points from start to end, endpoints included.
    fn points(&self) -> Vec<GeoPoint> {
        let n = self.count.max(1);
        (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                (
                    self.start.0 + (self.end.0 - self.start.0) * t,
                    self.start.1 + (self.end.1 - self.start.1) * t,
                )
            })
            .collect()
    }
}

/// Streams point and transect samples out of a chunked store.
pub struct Sampler {
    store: Arc<dyn ChunkedStore>,
    config: SamplerConfig,
    current: parking_lot::Mutex<Option<CancelToken>>,
}

impl Sampler {
    pub fn new(store: Arc<dyn ChunkedStore>, config: SamplerConfig) -> Self {
        Self {
            store,
            config,
            current: parking_lot::Mutex::new(None),
        }
    }

    /// Cancel the in-flight session, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    /// Replace the current session token, cancelling its predecessor.
    fn begin(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Start streaming a time series at the given point. The returned
    /// receiver observes every state transition of the session.
    pub fn time_series(&self, request: PointRequest) -> watch::Receiver<SeriesState> {
        let token = self.begin();
        let target = SampleTarget::Point {
            lat: request.lat,
            lng: request.lng,
        };
        let state = SeriesState::idle(&request.layer, target);
        let (tx, rx) = watch::channel(state);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        tokio::spawn(async move {
            run_time_series(store, config, request, token, tx).await;
        });
        rx
    }

    /// Start streaming a spatial transect at the layer's selected time.
    pub fn transect(&self, request: TransectRequest) -> watch::Receiver<SeriesState> {
        let token = self.begin();
        let points = request.points();
        let state = SeriesState::idle(
            &request.layer,
            SampleTarget::Transect {
                points: points.clone(),
            },
        );
        let (tx, rx) = watch::channel(state);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        tokio::spawn(async move {
            run_transect(store, config, request, points, token, tx).await;
        });
        rx
    }
}

struct OpenedArray {
    array: Arc<dyn ChunkedArray>,
    shape: Vec<usize>,
    roles: std::collections::HashMap<DimensionRole, ResolvedDimension>,
}

async fn open_array(
    store: &dyn ChunkedStore,
    layer: &LayerDescriptor,
) -> Result<OpenedArray> {
    let (url, _) = layer.effective_url();
    let array = store.open(url, &layer.variable_or_stem()).await?;
    let dims = array
        .dimension_names()
        .ok_or_else(|| EkmanError::ChunkedStore {
            message: "No dimension information found in store metadata".to_string(),
        })?;
    let roles = resolve_dimension_roles(&dims);
    let shape = array.shape();
    Ok(OpenedArray {
        array,
        shape,
        roles,
    })
}

fn publish(tx: &watch::Sender<SeriesState>, state: &SeriesState) {
    // Receivers may all be gone; the session still runs to completion.
    let _ = tx.send(state.clone());
}

fn fail(tx: &watch::Sender<SeriesState>, state: &mut SeriesState, error: EkmanError) {
    warn!(session = %state.session_id, error = %error, "Sampling session failed");
    state.phase = SamplePhase::Failed;
    state.is_loading = false;
    state.error = Some(error.to_string());
    publish(tx, state);
}

/// Base index vector: depth pinned to the surface, every axis at 0.
fn base_index(opened: &OpenedArray) -> Vec<usize> {
    vec![0; opened.shape.len()]
}

async fn run_time_series(
    store: Arc<dyn ChunkedStore>,
    config: SamplerConfig,
    request: PointRequest,
    token: CancelToken,
    tx: watch::Sender<SeriesState>,
) {
    let mut state = tx.borrow().clone();
    state.phase = SamplePhase::Opening;
    publish(&tx, &state);

    if token.is_cancelled() {
        return;
    }
    let opened = match open_array(store.as_ref(), &request.layer).await {
        Ok(opened) => opened,
        Err(e) => return fail(&tx, &mut state, e),
    };

    let (time, lat, lon) = match (
        opened.roles.get(&DimensionRole::Time),
        opened.roles.get(&DimensionRole::Lat),
        opened.roles.get(&DimensionRole::Lon),
    ) {
        (Some(t), Some(la), Some(lo)) => (t.clone(), la.clone(), lo.clone()),
        _ => {
            return fail(
                &tx,
                &mut state,
                EkmanError::ChunkedStore {
                    message: "Array lacks a resolvable time/lat/lon axis".to_string(),
                },
            )
        }
    };

    let (col, row) = geo_to_pixel(
        request.lat,
        request.lng,
        opened.shape[lat.index],
        opened.shape[lon.index],
    );
    let mut index = base_index(&opened);
    index[lat.index] = row;
    index[lon.index] = col;

    // Epoch-seconds x axis from the layer's declared time values, step
    // index as the fallback.
    let time_axis: Vec<f64> = {
        let declared = request
            .layer
            .dimensions
            .get(&time.name)
            .map(|s| s.values.as_slice())
            .unwrap_or(&[]);
        (0..opened.shape[time.index])
            .map(|t| {
                declared
                    .get(t)
                    .and_then(|v| v.epoch_seconds())
                    .unwrap_or(t as f64)
            })
            .collect()
    };

    let total = opened.shape[time.index];
    state.phase = SamplePhase::Streaming;
    state.total_steps = total;
    state.is_loading = true;
    publish(&tx, &state);

    let mut t = 0;
    while t < total {
        if token.is_cancelled() {
            debug!(session = %state.session_id, "Sampling session superseded");
            return;
        }
        let end = (t + config.batch_size).min(total);
        let mut batch = Vec::with_capacity(end - t);
        for step in t..end {
            if token.is_cancelled() {
                return;
            }
            index[time.index] = step;
            match opened.array.read_scalar(&index).await {
                Ok(value) => batch.push((time_axis[step], value)),
                Err(e) => return fail(&tx, &mut state, e),
            }
        }
        if token.is_cancelled() {
            return;
        }
        for (x, y) in batch {
            state.x.push(x);
            state.y.push(y);
        }
        state.current_step = end;
        state.is_loading = end < total;
        publish(&tx, &state);
        log_session_progress(&state.session_id, end, total);
        t = end;

        if t < total {
            tokio::time::sleep(Duration::from_millis(config.batch_delay_ms)).await;
        }
    }

    state.phase = SamplePhase::Completed;
    state.is_loading = false;
    publish(&tx, &state);
}

async fn run_transect(
    store: Arc<dyn ChunkedStore>,
    config: SamplerConfig,
    request: TransectRequest,
    points: Vec<GeoPoint>,
    token: CancelToken,
    tx: watch::Sender<SeriesState>,
) {
    let mut state = tx.borrow().clone();
    state.phase = SamplePhase::Opening;
    publish(&tx, &state);

    if token.is_cancelled() {
        return;
    }
    let opened = match open_array(store.as_ref(), &request.layer).await {
        Ok(opened) => opened,
        Err(e) => return fail(&tx, &mut state, e),
    };

    let (lat, lon) = match (
        opened.roles.get(&DimensionRole::Lat),
        opened.roles.get(&DimensionRole::Lon),
    ) {
        (Some(la), Some(lo)) => (la.clone(), lo.clone()),
        _ => {
            return fail(
                &tx,
                &mut state,
                EkmanError::ChunkedStore {
                    message: "Array lacks a resolvable lat/lon axis".to_string(),
                },
            )
        }
    };

    let mut index = base_index(&opened);
    // Transects sample the layer's currently selected time slice.
    if let Some(time) = opened.roles.get(&DimensionRole::Time) {
        let selected = request
            .layer
            .dimensions
            .get(&time.name)
            .map(|s| s.selected)
            .unwrap_or(0);
        index[time.index] = selected.min(opened.shape[time.index].saturating_sub(1));
    }

    let total = points.len();
    state.phase = SamplePhase::Streaming;
    state.total_steps = total;
    state.is_loading = true;
    publish(&tx, &state);

    let origin = points[0];
    let mut i = 0;
    while i < total {
        if token.is_cancelled() {
            debug!(session = %state.session_id, "Sampling session superseded");
            return;
        }
        let end = (i + config.batch_size).min(total);
        let mut batch = Vec::with_capacity(end - i);
        for p in i..end {
            if token.is_cancelled() {
                return;
            }
            let (plat, plng) = points[p];
            let (col, row) = geo_to_pixel(
                plat,
                plng,
                opened.shape[lat.index],
                opened.shape[lon.index],
            );
            index[lat.index] = row;
            index[lon.index] = col;
            match opened.array.read_scalar(&index).await {
                Ok(value) => batch.push((haversine_km(origin, (plat, plng)), value)),
                Err(e) => return fail(&tx, &mut state, e),
            }
        }
        if token.is_cancelled() {
            return;
        }
        for (x, y) in batch {
            state.x.push(x);
            state.y.push(y);
        }
        state.current_step = end;
        state.is_loading = end < total;
        publish(&tx, &state);
        log_session_progress(&state.session_id, end, total);
        i = end;

        if i < total {
            tokio::time::sleep(Duration::from_millis(config.batch_delay_ms)).await;
        }
    }

    state.phase = SamplePhase::Completed;
    state.is_loading = false;
    publish(&tx, &state);
}
