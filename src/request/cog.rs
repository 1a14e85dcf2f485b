//! Cloud-Optimized GeoTIFF tiling backend client.
//!
//! Statistics and info calls distinguish two failure regimes: an HTTP
//! error status is a recoverable authorization outcome (`Denied`), while
//! transport failures propagate as errors. Layer activation maps
//! `Denied` to a user-facing message without aborting other layers.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::colormaps::ColorSpec;
use crate::config::Config;
use crate::error::{EkmanError, Result};
use crate::layer::LayerDescriptor;

use super::{join_url, BackendRequest};

/// Per-band statistics, as reported by the tiling backend. Only the
/// percentile pair drives the visual range.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BandStats {
    pub percentile_2: f64,
    pub percentile_98: f64,
}

/// Statistics call result: band map, or an HTTP error status.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsOutcome {
    Stats(BTreeMap<String, BandStats>),
    Denied(u16),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CogInfo {
    #[serde(default)]
    pub band_descriptions: Vec<Vec<String>>,
    /// [min_lon, min_lat, max_lon, max_lat]
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
}

/// Info call result: metadata, or an HTTP error status.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoOutcome {
    Info(CogInfo),
    Denied(u16),
}

/// Parameters of one tilejson request.
#[derive(Debug, Clone, PartialEq)]
pub struct TileQuery {
    pub url: String,
    pub encoded: bool,
    /// 1-based band indices, repeated as `bidx` parameters.
    pub bidx: Vec<u32>,
    /// Per-band [min, max], aligned with `bidx`.
    pub rescale: Vec<[f64; 2]>,
    /// Only meaningful for single-band output.
    pub colormap_name: Option<String>,
}

/// Raster-statistics and tiling provider.
#[async_trait]
pub trait CogTiles: Send + Sync {
    async fn statistics(&self, url: &str, encoded: bool) -> Result<StatsOutcome>;
    async fn info(&self, url: &str, encoded: bool) -> Result<InfoOutcome>;
    /// Resolve the tile URL template for the given query.
    async fn tile_template(&self, query: &TileQuery) -> Result<String>;
}

/// HTTP implementation against a titiler-style `cog/` endpoint family.
pub struct CogTileClient {
    http: reqwest::Client,
    base_url: String,
}

impl CogTileClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Build a client against the configured COG tiling endpoint.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            reqwest::Client::new(),
            config.endpoints.tile_server_url.clone(),
        )
    }

    fn endpoint(&self, path: &str, cog_url: &str, encoded: bool) -> Result<Url> {
        let mut url = Url::parse(&join_url(&self.base_url, path))?;
        url.query_pairs_mut().append_pair("url", cog_url);
        if encoded {
            url.query_pairs_mut().append_pair("encoded", "true");
        }
        Ok(url)
    }

    /// Tilejson requests go through the tile matrix set path.
    fn tilejson_endpoint(&self, query: &TileQuery) -> Result<Url> {
        let mut endpoint =
            self.endpoint("cog/WebMercatorQuad/tilejson.json", &query.url, query.encoded)?;
        {
            let mut pairs = endpoint.query_pairs_mut();
            for band in &query.bidx {
                pairs.append_pair("bidx", &band.to_string());
            }
            for range in &query.rescale {
                pairs.append_pair("rescale", &format!("{},{}", range[0], range[1]));
            }
            if let Some(name) = &query.colormap_name {
                pairs.append_pair("colormap_name", name);
            }
        }
        Ok(endpoint)
    }
}

#[derive(Debug, Deserialize)]
struct TileJson {
    #[serde(default)]
    tiles: Vec<String>,
}

#[async_trait]
impl CogTiles for CogTileClient {
    async fn statistics(&self, url: &str, encoded: bool) -> Result<StatsOutcome> {
        let endpoint = self.endpoint("cog/statistics", url, encoded)?;
        let response = self.http.get(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url = url, status = status.as_u16(), "Statistics request denied");
            return Ok(StatsOutcome::Denied(status.as_u16()));
        }
        Ok(StatsOutcome::Stats(response.json().await?))
    }

    async fn info(&self, url: &str, encoded: bool) -> Result<InfoOutcome> {
        let endpoint = self.endpoint("cog/info", url, encoded)?;
        let response = self.http.get(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url = url, status = status.as_u16(), "Info request denied");
            return Ok(InfoOutcome::Denied(status.as_u16()));
        }
        Ok(InfoOutcome::Info(response.json().await?))
    }

    async fn tile_template(&self, query: &TileQuery) -> Result<String> {
        let endpoint = self.tilejson_endpoint(query)?;
        let tilejson: TileJson = self
            .http
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tilejson
            .tiles
            .into_iter()
            .next()
            .ok_or_else(|| EkmanError::DataNotFound {
                message: format!("Tilejson for {} carried no tile template", query.url),
            })
    }
}

/// Resolved COG activation: a render request plus the visual range that
/// was settled on, or an authorization denial.
#[derive(Debug, Clone, PartialEq)]
pub enum CogOutcome {
    Request {
        request: BackendRequest,
        scale: [f64; 2],
    },
    Denied(u16),
}

/// Build the tile request for a COG layer.
///
/// When the descriptor carries no scale, statistics are fetched for
/// every file URL and joined before aggregating, so the resulting range
/// is [min of percentile_2s, max of percentile_98s] regardless of
/// response arrival order.
pub async fn build_tile_request(
    client: &dyn CogTiles,
    descriptor: &LayerDescriptor,
) -> Result<CogOutcome> {
    let (primary, encoded) = descriptor.effective_url();

    let info = match client.info(primary, encoded).await? {
        InfoOutcome::Info(info) => info,
        InfoOutcome::Denied(status) => return Ok(CogOutcome::Denied(status)),
    };
    let bands = info.band_descriptions.len().max(1);
    let visible_bands = bands.min(3);

    let (scale, band_scales) = match descriptor.scale {
        Some(scale) => (scale, vec![scale; visible_bands]),
        None => {
            let fetches = descriptor.urls.iter().enumerate().map(|(i, url)| {
                let (u, enc) = if i == 0 {
                    (primary, encoded)
                } else {
                    (url.as_str(), false)
                };
                client.statistics(u, enc)
            });
            let mut per_file = Vec::with_capacity(descriptor.urls.len());
            for outcome in try_join_all(fetches).await? {
                match outcome {
                    StatsOutcome::Stats(stats) => per_file.push(stats),
                    StatsOutcome::Denied(status) => return Ok(CogOutcome::Denied(status)),
                }
            }

            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for stats in &per_file {
                if let Some(band) = stats.values().next() {
                    lo = lo.min(band.percentile_2);
                    hi = hi.max(band.percentile_98);
                }
            }
            if !lo.is_finite() || !hi.is_finite() {
                return Err(EkmanError::DataNotFound {
                    message: format!("Statistics for {} carried no bands", primary),
                });
            }

            let band_scales: Vec<[f64; 2]> = per_file[0]
                .values()
                .take(visible_bands)
                .map(|b| [b.percentile_2, b.percentile_98])
                .collect();
            ([lo, hi], band_scales)
        }
    };

    let bidx: Vec<u32> = if bands >= 3 {
        vec![1, 2, 3]
    } else {
        vec![1]
    };
    let mut rescale = band_scales;
    rescale.resize(bidx.len(), scale);

    // A colour ramp only applies to single-band output; multi-band
    // composites carry their own colours.
    let colormap_name = (bands == 1).then(|| match &descriptor.colors {
        Some(ColorSpec::Named(name)) => name.clone(),
        _ => "ocean_r".to_string(),
    });

    let query = TileQuery {
        url: primary.to_string(),
        encoded,
        bidx,
        rescale,
        colormap_name,
    };
    let url_template = client.tile_template(&query).await?;

    Ok(CogOutcome::Request {
        request: BackendRequest::TileTemplate {
            url_template,
            tile_size: 256,
            bounds: info.bounds.or(descriptor.bbox),
        },
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{DataKind, LayerId};
    use parking_lot::Mutex;

    struct FakeCog {
        stats: Vec<StatsOutcome>,
        info: InfoOutcome,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CogTiles for FakeCog {
        async fn statistics(&self, url: &str, _encoded: bool) -> Result<StatsOutcome> {
            let mut calls = self.calls.lock();
            calls.push(format!("stats {}", url));
            let index = calls.iter().filter(|c| c.starts_with("stats")).count() - 1;
            Ok(self.stats[index].clone())
        }

        async fn info(&self, url: &str, _encoded: bool) -> Result<InfoOutcome> {
            self.calls.lock().push(format!("info {}", url));
            Ok(self.info.clone())
        }

        async fn tile_template(&self, query: &TileQuery) -> Result<String> {
            self.calls.lock().push(format!("tilejson {:?}", query));
            Ok("https://tiles.example.org/cog/tiles/{z}/{x}/{y}".to_string())
        }
    }

    fn band(p2: f64, p98: f64) -> BandStats {
        BandStats {
            percentile_2: p2,
            percentile_98: p98,
        }
    }

    fn single_band_info() -> InfoOutcome {
        InfoOutcome::Info(CogInfo {
            band_descriptions: vec![vec!["b1".to_string(), String::new()]],
            bounds: Some([-5.0, 49.0, 5.0, 59.0]),
        })
    }

    fn cog_descriptor(urls: Vec<&str>) -> LayerDescriptor {
        let mut descriptor = LayerDescriptor::new(
            LayerId::new("seabed", "substrate"),
            DataKind::Cog,
            urls[0],
        );
        descriptor.urls = urls.into_iter().map(String::from).collect();
        descriptor
    }

    #[test]
    fn client_from_config_targets_the_configured_tile_server() {
        let mut config = Config::default();
        config.endpoints.tile_server_url = "https://tiles.example.org".to_string();
        let client = CogTileClient::from_config(&config);
        let endpoint = client.endpoint("cog/info", "https://data.test/a.tif", false).unwrap();
        assert_eq!(endpoint.host_str(), Some("tiles.example.org"));
        assert_eq!(endpoint.path(), "/cog/info");
    }

    #[test]
    fn tilejson_endpoint_uses_tile_matrix_set_path() {
        let client = CogTileClient::new(reqwest::Client::new(), "https://tiles.example.org");
        let endpoint = client
            .tilejson_endpoint(&TileQuery {
                url: "https://data.test/a.tif".to_string(),
                encoded: false,
                bidx: vec![1],
                rescale: vec![[0.0, 1.0]],
                colormap_name: Some("ocean_r".to_string()),
            })
            .unwrap();

        assert_eq!(endpoint.path(), "/cog/WebMercatorQuad/tilejson.json");
        assert_eq!(
            endpoint.query(),
            Some("url=https%3A%2F%2Fdata.test%2Fa.tif&bidx=1&rescale=0%2C1&colormap_name=ocean_r")
        );
    }

    #[tokio::test]
    async fn two_band_query_omits_colormap() {
        let client = FakeCog {
            stats: vec![StatsOutcome::Stats(BTreeMap::from([
                ("b1".to_string(), band(0.0, 1.0)),
                ("b2".to_string(), band(0.0, 2.0)),
            ]))],
            info: InfoOutcome::Info(CogInfo {
                band_descriptions: vec![vec!["b1".to_string()], vec!["b2".to_string()]],
                bounds: None,
            }),
            calls: Mutex::new(Vec::new()),
        };
        let descriptor = cog_descriptor(vec!["https://a/uv.tif"]);

        build_tile_request(&client, &descriptor).await.unwrap();
        let calls = client.calls.lock();
        let tilejson = calls.iter().find(|c| c.starts_with("tilejson")).unwrap();
        assert!(tilejson.contains("bidx: [1]"));
        assert!(tilejson.contains("colormap_name: None"));
    }

    #[tokio::test]
    async fn multi_file_scale_is_envelope_of_percentiles() {
        let client = FakeCog {
            stats: vec![
                StatsOutcome::Stats(BTreeMap::from([("b1".to_string(), band(2.5, 40.0))])),
                StatsOutcome::Stats(BTreeMap::from([("b1".to_string(), band(5.0, 97.5))])),
            ],
            info: single_band_info(),
            calls: Mutex::new(Vec::new()),
        };
        let descriptor = cog_descriptor(vec!["https://a/x.tif", "https://a/y.tif"]);

        let outcome = build_tile_request(&client, &descriptor).await.unwrap();
        let CogOutcome::Request { request, scale } = outcome else {
            panic!("expected resolved request");
        };
        assert_eq!(scale, [2.5, 97.5]);
        let BackendRequest::TileTemplate { bounds, .. } = request else {
            panic!("expected tile template");
        };
        assert_eq!(bounds, Some([-5.0, 49.0, 5.0, 59.0]));
    }

    #[tokio::test]
    async fn denied_statistics_surface_as_sentinel() {
        let client = FakeCog {
            stats: vec![StatsOutcome::Denied(500)],
            info: single_band_info(),
            calls: Mutex::new(Vec::new()),
        };
        let descriptor = cog_descriptor(vec!["https://a/locked.tif"]);

        let outcome = build_tile_request(&client, &descriptor).await.unwrap();
        assert_eq!(outcome, CogOutcome::Denied(500));
    }

    #[tokio::test]
    async fn provided_scale_skips_statistics() {
        let client = FakeCog {
            stats: vec![],
            info: single_band_info(),
            calls: Mutex::new(Vec::new()),
        };
        let mut descriptor = cog_descriptor(vec!["https://a/x.tif"]);
        descriptor.scale = Some([0.0, 10.0]);

        let outcome = build_tile_request(&client, &descriptor).await.unwrap();
        let CogOutcome::Request { scale, .. } = outcome else {
            panic!("expected resolved request");
        };
        assert_eq!(scale, [0.0, 10.0]);
        assert!(client.calls.lock().iter().all(|c| !c.starts_with("stats")));
    }

    #[tokio::test]
    async fn three_band_query_omits_colormap() {
        let client = FakeCog {
            stats: vec![StatsOutcome::Stats(BTreeMap::from([
                ("b1".to_string(), band(0.0, 1.0)),
                ("b2".to_string(), band(0.0, 2.0)),
                ("b3".to_string(), band(0.0, 3.0)),
            ]))],
            info: InfoOutcome::Info(CogInfo {
                band_descriptions: vec![
                    vec!["b1".to_string()],
                    vec!["b2".to_string()],
                    vec!["b3".to_string()],
                ],
                bounds: None,
            }),
            calls: Mutex::new(Vec::new()),
        };
        let descriptor = cog_descriptor(vec!["https://a/rgb.tif"]);

        build_tile_request(&client, &descriptor).await.unwrap();
        let calls = client.calls.lock();
        let tilejson = calls.iter().find(|c| c.starts_with("tilejson")).unwrap();
        assert!(tilejson.contains("bidx: [1, 2, 3]"));
        assert!(tilejson.contains("colormap_name: None"));
    }
}
