//! # ekman
//!
//! Layer-state and dimension-resolution engine for an oceanographic map
//! explorer.
//!
//! This library keeps the authoritative model of every active map layer
//! (COG, zarr, WMS, and velocity regimes), builds the backend requests
//! each layer kind needs, and streams point/transect samples out of
//! remote chunked stores.
//!
//! ## Key Features
//!
//! - **One descriptor model**: every layer kind flows through the same
//!   `LayerDescriptor`, so stores, legends, and renderers stay generic
//! - **Deterministic paint order**: the last-acted-on layer always rises
//!   to the top of the z-order
//! - **Cancellable sampling**: chunked time-series and transect reads
//!   stream in batches and stop cooperatively when superseded
//!
//! ## Architecture
//!
//! - **State Layer**: `LayerStore` and `LegendStore` own descriptors and
//!   their legend snapshots
//! - **Request Layer**: per-kind builders resolve descriptors into tile
//!   templates, selector payloads, or velocity field pairs
//! - **Sampling**: `Sampler` reads remote chunked arrays into watch
//!   channels, one single-flight session at a time

pub mod capabilities;
pub mod chunked;
pub mod colormaps;
pub mod config;
pub mod dimensions;
pub mod dispatcher;
pub mod error;
pub mod geo;
pub mod layer;
pub mod logging;
pub mod request;
pub mod sampler;
pub mod store;

pub use capabilities::{HttpCapabilities, WmsCapabilities};
pub use config::Config;
pub use dispatcher::{Dispatcher, LayerAction, MapRenderer, Notice, RenderInstruction};
pub use error::{EkmanError, Result};
pub use layer::{DataKind, LayerDescriptor, LayerId, LayerParams};
pub use logging::{generate_session_id, init_tracing};
pub use request::BackendRequest;
pub use sampler::{CancelToken, PointRequest, SamplePhase, Sampler, SeriesState, TransectRequest};
pub use store::{LayerStore, LegendEntry, LegendStore};
