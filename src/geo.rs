//! Geographic utility functions.
//!
//! This module provides utilities for geographic coordinates: great-circle
//! distances for transect sampling, the coarse equirectangular
//! geo-to-pixel mapping used for point sampling, and viewport bounds
//! handling.

use crate::error::{EkmanError, Result};

/// Mean earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A geographic point as (latitude, longitude) in degrees
pub type GeoPoint = (f64, f64);

/// Great-circle (haversine) distance between two points, in kilometers,
/// rounded to 4 decimals.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let d = 2.0 * EARTH_RADIUS_KM * h.sqrt().asin();

    (d * 10_000.0).round() / 10_000.0
}

/// Map a geographic coordinate onto pixel/index space of an equirectangular
/// grid of the given height and width.
///
/// This ignores true grid spacing and projection, which is acceptable for
/// coarse point sampling only.
pub fn geo_to_pixel(lat: f64, lon: f64, height: usize, width: usize) -> (usize, usize) {
    let x = (((lon + 180.0) / 360.0) * width as f64).floor();
    let y = (((90.0 - lat) / 180.0) * height as f64).floor();

    // Clamp so points exactly on the antimeridian/pole stay in range
    let x = (x.max(0.0) as usize).min(width.saturating_sub(1));
    let y = (y.max(0.0) as usize).min(height.saturating_sub(1));
    (x, y)
}

/// Normalize a longitude value to the range [-180, 180)
pub fn normalize_longitude(lon: f64) -> f64 {
    let mut normalized = ((lon + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;

    if normalized == 180.0 {
        normalized = -180.0;
    }

    normalized
}

/// Parse a bounding box string "min_lon,min_lat,max_lon,max_lat" into its
/// components. Malformed input is a contract violation from upstream.
pub fn parse_bbox(bbox: &str) -> Result<[f64; 4]> {
    let parts: Vec<&str> = bbox.split(',').collect();
    if parts.len() != 4 {
        return Err(EkmanError::InvalidParameter {
            param: "bbox".to_string(),
            message: "Bounding box must be in format 'min_lon,min_lat,max_lon,max_lat'".to_string(),
        });
    }

    let mut values = [0.0f64; 4];
    for (i, part) in parts.iter().enumerate() {
        values[i] = part
            .trim()
            .parse::<f64>()
            .map_err(|_| EkmanError::InvalidParameter {
                param: "bbox".to_string(),
                message: format!("Invalid bbox component: {}", part),
            })?;
    }

    if values[1] > values[3] {
        return Err(EkmanError::InvalidCoordinates {
            message: format!("min_lat ({}) must be <= max_lat ({})", values[1], values[3]),
        });
    }

    if !(-90.0..=90.0).contains(&values[1]) || !(-90.0..=90.0).contains(&values[3]) {
        return Err(EkmanError::InvalidCoordinates {
            message: "Latitude must be in the range -90 to 90".to_string(),
        });
    }

    Ok(values)
}

/// Viewport-fit bounds for a layer: the bounding box padded by 0.1 degree
/// on each side, clamped to world bounds, as [[west, south], [east, north]].
///
/// Falls back to `default_bounds` when the layer carries no bounding box.
pub fn padded_bounds(bbox: Option<&[f64; 4]>, default_bounds: &[f64; 4]) -> [[f64; 2]; 2] {
    let pad = 0.1;
    match bbox {
        Some(b) => {
            let west = (b[0] - pad).max(-180.0);
            let south = (b[1] - pad).max(-90.0);
            let east = (b[2] + pad).min(180.0);
            let north = (b[3] + pad).min(90.0);
            [[west, south], [east, north]]
        }
        None => [
            [default_bounds[0], default_bounds[1]],
            [default_bounds[2], default_bounds[3]],
        ],
    }
}
