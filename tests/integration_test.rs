//! Integration tests for the ekman engine.
//!
//! These exercise the dispatcher, the stores, the request builders, and
//! the sampler together, with in-memory backends standing in for the
//! HTTP tile servers and the remote chunked store.

mod common;

use std::sync::Arc;

use common::{
    cell_value, OceanStore, RecordingRenderer, StubCogBackend, StubWmsBackend, StubZarrBackend,
};
use ekman::colormaps::ColorSpec;
use ekman::config::SamplerConfig;
use ekman::dispatcher::{Dispatcher, MapRenderer};
use ekman::layer::{DataKind, LayerDescriptor, LayerId};
use ekman::sampler::{PointRequest, SamplePhase, Sampler, SeriesState, TransectRequest};
use ekman::Config;
use tokio::sync::watch;

fn build_dispatcher() -> (Dispatcher, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let dispatcher = Dispatcher::new(
        Config::default(),
        Arc::clone(&renderer) as Arc<dyn MapRenderer>,
        Arc::new(StubCogBackend),
        Arc::new(StubZarrBackend),
        Arc::new(OceanStore::new()),
        Arc::new(StubWmsBackend),
    );
    (dispatcher, renderer)
}

fn cog_layer() -> LayerDescriptor {
    LayerDescriptor::new(
        LayerId::new("seabed", "substrate"),
        DataKind::Cog,
        "https://data.test/substrate.tif",
    )
}

fn zarr_layer() -> LayerDescriptor {
    let mut layer = LayerDescriptor::new(
        LayerId::new("model", "salinity"),
        DataKind::ZarrTile,
        "https://data.test/sos_abs.zarr",
    );
    layer.params.variables = vec!["sos_abs".to_string()];
    layer
}

async fn wait_for_phase(rx: &mut watch::Receiver<SeriesState>, phase: SamplePhase) -> SeriesState {
    loop {
        if rx.borrow().phase == phase {
            return rx.borrow().clone();
        }
        rx.changed().await.expect("sampler task ended early");
    }
}

#[tokio::test]
async fn layer_lifecycle_keeps_stores_and_renderer_in_sync() {
    let (dispatcher, renderer) = build_dispatcher();
    let zarr_id = LayerId::new("model", "salinity");
    let cog_id = LayerId::new("seabed", "substrate");

    dispatcher.toggle_on(zarr_layer());
    dispatcher.reconcile().await.unwrap();
    dispatcher.toggle_on(cog_layer());
    dispatcher.reconcile().await.unwrap();

    // Most recently added paints on top
    assert_eq!(
        dispatcher.layers.paint_order(),
        vec![cog_id.clone(), zarr_id.clone()]
    );
    assert_eq!(dispatcher.legends.len(), 2);
    assert_eq!(
        renderer.take(),
        vec!["add model_salinity ZarrTile", "add seabed_substrate Cog"]
    );

    // Zooming floats the layer to the top and fits its padded bounds
    dispatcher.zoom_to(zarr_id.clone());
    dispatcher.reconcile().await.unwrap();
    assert_eq!(
        dispatcher.layers.paint_order(),
        vec![zarr_id.clone(), cog_id.clone()]
    );
    let events = renderer.take();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("fit "));

    // Raster opacity is a paint update, not a rebuild
    dispatcher.set_opacity(cog_id.clone(), 0.5);
    dispatcher.reconcile().await.unwrap();
    assert_eq!(
        renderer.take(),
        vec!["paint seabed_substrate raster-opacity 0.5"]
    );
    // ...and floats the touched layer back to the top
    assert_eq!(
        dispatcher.layers.paint_order(),
        vec![cog_id.clone(), zarr_id.clone()]
    );

    // Removal drops the layer, its render state, and its legend
    dispatcher.toggle_off(cog_id.clone());
    dispatcher.reconcile().await.unwrap();
    dispatcher.toggle_off(zarr_id.clone());
    dispatcher.reconcile().await.unwrap();
    assert!(dispatcher.layers.is_empty());
    assert!(dispatcher.legends.is_empty());
}

#[tokio::test]
async fn cog_activation_settles_scale_and_legend() {
    let (dispatcher, _) = build_dispatcher();
    dispatcher.toggle_on(cog_layer());
    dispatcher.reconcile().await.unwrap();

    let layer = dispatcher
        .layers
        .get(&LayerId::new("seabed", "substrate"))
        .unwrap();
    assert_eq!(layer.scale, Some([12.0, 34.0]));
    assert_eq!(layer.colors, Some(ColorSpec::Named("ocean_r".to_string())));
    assert_eq!(layer.bbox, None);

    let entry = dispatcher
        .legends
        .get(&LayerId::new("seabed", "substrate"))
        .unwrap();
    assert_eq!(entry.scale, Some([12.0, 34.0]));
    let legend = entry.legend.expect("continuous layer builds a ramp");
    assert_eq!(legend.values.len(), 30);
    assert_eq!(legend.values[0], 12.0);
    assert!((legend.values.last().unwrap() - 34.0).abs() < 1e-9);
}

#[tokio::test]
async fn wms_activation_fills_dimensions_bbox_and_legend_url() {
    let (dispatcher, renderer) = build_dispatcher();
    let mut layer = LayerDescriptor::new(
        LayerId::new("physics", "sst"),
        DataKind::Wms,
        "https://wms.test/wms",
    );
    layer.params.layers = vec![
        "sst_map".to_string(),
        "sst_contours".to_string(),
        "sst".to_string(),
    ];

    dispatcher.toggle_on(layer);
    dispatcher.reconcile().await.unwrap();
    assert_eq!(renderer.take(), vec!["add physics_sst Wms"]);

    let id = LayerId::new("physics", "sst");
    let layer = dispatcher.layers.get(&id).unwrap();
    assert_eq!(layer.dimensions["time"].values.len(), 2);
    assert_eq!(layer.bbox, Some([-10.0, 45.0, 10.0, 60.0]));

    let entry = dispatcher.legends.get(&id).unwrap();
    assert_eq!(
        entry.legend_url.as_deref(),
        Some("https://wms.test/legend?layer=sst")
    );
    assert!(entry.legend.is_none());
}

#[tokio::test]
async fn zarr_activation_enumerates_backend_and_range_dimensions() {
    let (dispatcher, _) = build_dispatcher();
    let mut layer = zarr_layer();
    layer.params.additional_dims = vec!["depth".to_string(), "elev=range(0,3,1)".to_string()];

    dispatcher.toggle_on(layer);
    dispatcher.reconcile().await.unwrap();

    let layer = dispatcher
        .layers
        .get(&LayerId::new("model", "salinity"))
        .unwrap();
    assert_eq!(layer.dimensions["time"].values.len(), 2);
    assert_eq!(layer.dimensions["depth"].values.len(), 3);
    assert_eq!(
        layer.dimensions["elev"]
            .values
            .iter()
            .map(|v| v.as_query_value())
            .collect::<Vec<_>>(),
        vec!["0", "1", "2"]
    );
    // Freshly enumerated selectors start at the first value
    assert_eq!(layer.dimensions["time"].selected, 0);
}

#[tokio::test]
async fn dimension_selection_survives_rebuild() {
    let (dispatcher, renderer) = build_dispatcher();
    dispatcher.toggle_on(zarr_layer());
    dispatcher.reconcile().await.unwrap();
    renderer.take();

    let id = LayerId::new("model", "salinity");
    dispatcher.select_dimension(id.clone(), "time", 1);
    dispatcher.reconcile().await.unwrap();

    assert_eq!(
        renderer.take(),
        vec!["remove model_salinity", "add model_salinity ZarrTile"]
    );
    let layer = dispatcher.layers.get(&id).unwrap();
    assert_eq!(layer.dimensions["time"].selected, 1);
    // The legend snapshot follows the new selector state
    let entry = dispatcher.legends.get(&id).unwrap();
    assert_eq!(entry.dimensions["time"].selected, 1);
}

fn sampling_layer() -> LayerDescriptor {
    let mut layer = LayerDescriptor::new(
        LayerId::new("model", "sst"),
        DataKind::ZarrScalar,
        "https://data.test/sst.zarr",
    );
    layer.params.variables = vec!["sst".to_string()];
    layer
}

#[tokio::test]
async fn point_sampling_streams_the_full_time_axis() {
    let store = Arc::new(OceanStore::new());
    let sampler = Sampler::new(
        store,
        SamplerConfig {
            batch_size: 10,
            batch_delay_ms: 0,
        },
    );

    let mut rx = sampler.time_series(PointRequest {
        layer: sampling_layer(),
        lat: 0.0,
        lng: 0.0,
    });
    let done = wait_for_phase(&mut rx, SamplePhase::Completed).await;

    assert_eq!(done.y.len(), 24);
    // (0, 0) maps to row 90, col 180 of the 180x360 grid
    assert_eq!(done.y[5], cell_value(5, 90, 180));
    // No declared time values: the x axis falls back to step indices
    assert_eq!(done.x[23], 23.0);
    assert!(!done.is_loading);
}

#[tokio::test]
async fn transect_sampling_reports_cumulative_distance() {
    let sampler = Sampler::new(
        Arc::new(OceanStore::new()),
        SamplerConfig {
            batch_size: 10,
            batch_delay_ms: 0,
        },
    );

    let mut rx = sampler.transect(TransectRequest {
        layer: sampling_layer(),
        start: (54.0, -2.0),
        end: (54.0, 2.0),
        count: 8,
    });
    let done = wait_for_phase(&mut rx, SamplePhase::Completed).await;

    assert_eq!(done.x.len(), 9);
    assert_eq!(done.x[0], 0.0);
    assert!(done.x.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn new_session_supersedes_the_previous_one() {
    let sampler = Sampler::new(
        Arc::new(OceanStore::new()),
        SamplerConfig {
            batch_size: 1,
            batch_delay_ms: 40,
        },
    );

    let rx_series = sampler.time_series(PointRequest {
        layer: sampling_layer(),
        lat: 10.0,
        lng: 10.0,
    });
    let mut rx_transect = sampler.transect(TransectRequest {
        layer: sampling_layer(),
        start: (50.0, 0.0),
        end: (58.0, 0.0),
        count: 4,
    });

    let done = wait_for_phase(&mut rx_transect, SamplePhase::Completed).await;
    assert_eq!(done.x.len(), 5);

    let frozen = rx_series.borrow().clone();
    assert_ne!(frozen.phase, SamplePhase::Completed);
    assert!(frozen.y.len() < 24);
}
