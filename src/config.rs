//! Configuration management for ekman.
//!
//! The engine is embedded in a host application, so configuration is a
//! plain struct with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. JSON config file
//! 3. Default values (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EkmanError, Result};

/// Backend endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the COG tiling backend (titiler-style)
    #[serde(default = "default_tile_server")]
    pub tile_server_url: String,

    /// Base URL of the zarr tiling backend
    #[serde(default = "default_zarr_tile_server")]
    pub zarr_tile_server_url: String,
}

/// Layer presentation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Opacity applied to freshly activated layers
    #[serde(default = "default_opacity")]
    pub default_opacity: f64,

    /// Number of swatches/ticks in generated legends
    #[serde(default = "default_legend_steps")]
    pub legend_steps: usize,

    /// Fallback viewport bounds [min_lon, min_lat, max_lon, max_lat]
    /// used when a layer carries no bounding box
    #[serde(default = "default_bounds")]
    pub default_bounds: [f64; 4],
}

/// Sampler tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Elements read per batch before yielding to the scheduler
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Cooperative delay between batches, in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Layer defaults
    #[serde(default)]
    pub layers: LayerConfig,

    /// Sampler tuning
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from an optional JSON file, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Apply `EKMAN_*` environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("EKMAN_TILE_SERVER") {
            self.endpoints.tile_server_url = v;
        }
        if let Ok(v) = std::env::var("EKMAN_ZARR_TILE_SERVER") {
            self.endpoints.zarr_tile_server_url = v;
        }
        if let Ok(v) = std::env::var("EKMAN_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.tile_server_url.is_empty() {
            return Err(EkmanError::Config {
                message: "Tile server URL cannot be empty".to_string(),
            });
        }

        if self.endpoints.zarr_tile_server_url.is_empty() {
            return Err(EkmanError::Config {
                message: "Zarr tile server URL cannot be empty".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.layers.default_opacity) {
            return Err(EkmanError::Config {
                message: format!(
                    "Default opacity must be in [0, 1], got {}",
                    self.layers.default_opacity
                ),
            });
        }

        if self.layers.legend_steps < 2 {
            return Err(EkmanError::Config {
                message: format!(
                    "Legend steps must be at least 2, got {}",
                    self.layers.legend_steps
                ),
            });
        }

        if self.sampler.batch_size == 0 {
            return Err(EkmanError::Config {
                message: "Sampler batch size cannot be 0".to_string(),
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(EkmanError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            layers: LayerConfig::default(),
            sampler: SamplerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            tile_server_url: default_tile_server(),
            zarr_tile_server_url: default_zarr_tile_server(),
        }
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            default_opacity: default_opacity(),
            legend_steps: default_legend_steps(),
            default_bounds: default_bounds(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

// Default value functions for serde
fn default_tile_server() -> String {
    "https://imfe-pilot-tileserver.noc.ac.uk/".to_string()
}

fn default_zarr_tile_server() -> String {
    "https://atlantis44.xyz/".to_string()
}

fn default_opacity() -> f64 {
    0.7
}

fn default_legend_steps() -> usize {
    30
}

fn default_bounds() -> [f64; 4] {
    [-4.0, 50.0, 4.0, 58.0]
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
