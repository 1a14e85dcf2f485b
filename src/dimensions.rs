//! Dimension-role resolution for multidimensional arrays.
//!
//! Array stores declare dimension names that vary between producers
//! ("time" vs "time_counter", "lat" vs "y", ...). This module maps those
//! names onto semantic roles so the rest of the engine can index arrays
//! without caring about the producer's naming convention.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EkmanError, Result};

/// Semantic role of an array dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionRole {
    Time,
    Lat,
    Lon,
    Depth,
}

/// A dimension name resolved to a role, with its axis position in the
/// array's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDimension {
    /// Declared dimension name, lowercased
    pub name: String,
    /// Axis index within the array shape
    pub index: usize,
}

/// Alias tables per role. Matching is case-insensitive; the first
/// dimension name (in declaration order) matching any alias wins.
static DIMENSION_ALIASES: Lazy<Vec<(DimensionRole, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            DimensionRole::Time,
            vec!["time", "t", "time_counter"],
        ),
        (
            DimensionRole::Lat,
            vec!["lat", "latitude", "y"],
        ),
        (
            DimensionRole::Lon,
            vec!["lon", "longitude", "x", "lng"],
        ),
        (
            DimensionRole::Depth,
            vec!["depth", "z", "level", "lev", "deptht"],
        ),
    ]
});

/// Resolve declared dimension names to semantic roles.
///
/// A role with no matching name yields no entry; callers treat a missing
/// role as "feature unsupported for this array", not as an error.
pub fn resolve_dimension_roles(dim_names: &[String]) -> HashMap<DimensionRole, ResolvedDimension> {
    let mut roles = HashMap::new();

    for (role, aliases) in DIMENSION_ALIASES.iter() {
        for (i, dim_name) in dim_names.iter().enumerate() {
            let name = dim_name.to_lowercase();
            if aliases.iter().any(|a| a.eq_ignore_ascii_case(&name)) {
                roles.insert(*role, ResolvedDimension { name, index: i });
                break;
            }
        }
    }

    roles
}

/// A single value along a dimension axis. Time axes usually carry ISO
/// timestamp strings, auxiliary axes numeric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Number(f64),
    Text(String),
}

impl DimensionValue {
    /// Normalize to epoch seconds. Numeric values are assumed to already
    /// be epoch seconds; strings are parsed as RFC 3339 / ISO 8601
    /// timestamps or bare dates.
    pub fn epoch_seconds(&self) -> Option<f64> {
        match self {
            DimensionValue::Number(n) => Some(*n),
            DimensionValue::Text(s) => parse_epoch_seconds(s),
        }
    }

    /// Render for use in a backend query parameter.
    pub fn as_query_value(&self) -> String {
        match self {
            DimensionValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            DimensionValue::Text(s) => s.clone(),
        }
    }
}

fn parse_epoch_seconds(s: &str) -> Option<f64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp() as f64);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc().timestamp() as f64);
    }
    if let Ok(nd) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(nd.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    s.parse::<f64>().ok()
}

/// Per-dimension selector state: the ordered value sequence enumerated
/// from the backend and the currently selected index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSelector {
    pub values: Vec<DimensionValue>,
    pub selected: usize,
}

impl DimensionSelector {
    pub fn new(values: Vec<DimensionValue>) -> Self {
        Self {
            values,
            selected: 0,
        }
    }

    /// The currently selected value, if the index is in range.
    pub fn selected_value(&self) -> Option<&DimensionValue> {
        self.values.get(self.selected)
    }
}

/// Parse a compact `range(start, end, step)` declaration into its value
/// sequence. The end bound is exclusive. Malformed syntax indicates a
/// broken catalog entry, which is a contract violation.
pub fn parse_range_string(range_str: &str) -> Result<Vec<f64>> {
    let invalid = || EkmanError::InvalidParameter {
        param: "range".to_string(),
        message: format!("Invalid range format: {}", range_str),
    };

    let inner = range_str
        .trim()
        .strip_prefix("range(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(invalid)?;

    let parts: Vec<&str> = inner.split(',').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let start: i64 = parts[0].trim().parse().map_err(|_| invalid())?;
    let end: i64 = parts[1].trim().parse().map_err(|_| invalid())?;
    let step: i64 = parts[2].trim().parse().map_err(|_| invalid())?;
    if step <= 0 {
        return Err(invalid());
    }

    let mut result = Vec::new();
    let mut i = start;
    while i < end {
        result.push(i as f64);
        i += step;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_nemo_dimension_names() {
        let roles = resolve_dimension_roles(&names(&["time_counter", "y", "x", "deptht"]));

        assert_eq!(roles[&DimensionRole::Time].index, 0);
        assert_eq!(roles[&DimensionRole::Lat].index, 1);
        assert_eq!(roles[&DimensionRole::Lon].index, 2);
        assert_eq!(roles[&DimensionRole::Depth].index, 3);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let roles = resolve_dimension_roles(&names(&["Time", "Latitude", "Longitude"]));

        assert_eq!(roles[&DimensionRole::Time].index, 0);
        assert_eq!(roles[&DimensionRole::Lat].index, 1);
        assert_eq!(roles[&DimensionRole::Lon].index, 2);
        assert!(!roles.contains_key(&DimensionRole::Depth));
    }

    #[test]
    fn test_resolve_first_match_wins() {
        // Both "lon" and "x" alias Lon; declaration order decides
        let roles = resolve_dimension_roles(&names(&["x", "lon"]));
        assert_eq!(roles[&DimensionRole::Lon].index, 0);
        assert_eq!(roles[&DimensionRole::Lon].name, "x");
    }

    #[test]
    fn test_missing_roles_yield_no_entry() {
        let roles = resolve_dimension_roles(&names(&["ensemble", "member"]));
        assert!(roles.is_empty());
    }

    #[test]
    fn test_epoch_seconds_normalization() {
        assert_eq!(DimensionValue::Number(42.0).epoch_seconds(), Some(42.0));
        assert_eq!(
            DimensionValue::Text("1970-01-02T00:00:00Z".to_string()).epoch_seconds(),
            Some(86400.0)
        );
        assert_eq!(
            DimensionValue::Text("1970-01-02".to_string()).epoch_seconds(),
            Some(86400.0)
        );
        assert_eq!(
            DimensionValue::Text("not a date".to_string()).epoch_seconds(),
            None
        );
    }

    #[test]
    fn test_parse_range_string() {
        let values = parse_range_string("range(1, 10, 2)").unwrap();
        assert_eq!(values, vec![1.0, 3.0, 5.0, 7.0, 9.0]);

        // End bound is exclusive
        let values = parse_range_string("range(1,152,1)").unwrap();
        assert_eq!(values.len(), 151);
        assert_eq!(values[0], 1.0);
        assert_eq!(*values.last().unwrap(), 151.0);

        assert!(parse_range_string("1..10").is_err());
        assert!(parse_range_string("range(1,10)").is_err());
        assert!(parse_range_string("range(1,10,0)").is_err());
    }

    #[test]
    fn test_selector_selected_value() {
        let sel = DimensionSelector::new(vec![
            DimensionValue::Number(0.0),
            DimensionValue::Number(50.0),
        ]);
        assert_eq!(sel.selected_value(), Some(&DimensionValue::Number(0.0)));

        let mut sel = sel;
        sel.selected = 5;
        assert_eq!(sel.selected_value(), None);
    }
}
