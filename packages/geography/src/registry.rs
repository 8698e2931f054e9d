//! National stop registry loader.
//!
//! Reads `stop_id, latitude, longitude, name[, classification]` rows.
//! Rows with an empty id or unusable coordinates are skipped and counted;
//! when an id repeats, the first row wins.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use transit_equity_geography_models::{LatLng, RegistryStop, StopClass};

use crate::{GeoError, read_file};

#[derive(Debug, Deserialize)]
struct RegistryRow {
    stop_id: String,
    latitude: String,
    longitude: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    classification: Option<String>,
}

/// Counts from loading the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryLoadStats {
    /// Rows loaded.
    pub loaded: usize,
    /// Rows skipped for a missing id, bad coordinates, or malformed CSV.
    pub skipped: usize,
    /// Rows ignored because their id was already loaded.
    pub duplicate_ids: usize,
}

/// The canonical stop catalogue, keyed by registry id.
#[derive(Debug, Clone, Default)]
pub struct StopRegistry {
    stops: BTreeMap<String, RegistryStop>,
}

impl StopRegistry {
    /// Builds a registry from already-validated stops. Later duplicates are
    /// ignored.
    #[must_use]
    pub fn from_stops(stops: impl IntoIterator<Item = RegistryStop>) -> Self {
        let mut map = BTreeMap::new();
        for stop in stops {
            map.entry(stop.stop_id.clone()).or_insert(stop);
        }
        Self { stops: map }
    }

    /// Looks up a stop by registry id.
    #[must_use]
    pub fn get(&self, stop_id: &str) -> Option<&RegistryStop> {
        self.stops.get(stop_id)
    }

    /// Number of stops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Iterates stops in id order.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryStop> {
        self.stops.values()
    }
}

/// Loads the registry CSV at `path`.
///
/// # Errors
///
/// Returns [`GeoError`] if the file cannot be read or its header row is
/// unreadable. Individual bad rows are counted, not fatal.
pub fn load_registry(path: &Path) -> Result<(StopRegistry, RegistryLoadStats), GeoError> {
    let text = read_file(path)?;
    let (registry, stats) = parse_registry(&text)?;
    log::info!(
        "Loaded {} registry stops from {} ({} skipped, {} duplicate ids)",
        stats.loaded,
        path.display(),
        stats.skipped,
        stats.duplicate_ids
    );
    Ok((registry, stats))
}

/// Parses registry CSV text.
///
/// # Errors
///
/// Returns [`GeoError::Csv`] if the header row cannot be read.
pub fn parse_registry(text: &str) -> Result<(StopRegistry, RegistryLoadStats), GeoError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    reader.headers()?;

    let mut stops: BTreeMap<String, RegistryStop> = BTreeMap::new();
    let mut stats = RegistryLoadStats::default();

    for (i, row) in reader.deserialize::<RegistryRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                log::debug!("Registry row {}: {e}", i + 2);
                stats.skipped += 1;
                continue;
            }
        };
        if row.stop_id.is_empty() {
            stats.skipped += 1;
            continue;
        }
        let location = match (row.latitude.parse::<f64>(), row.longitude.parse::<f64>()) {
            (Ok(lat), Ok(lng)) => LatLng::new(lat, lng),
            _ => None,
        };
        let Some(location) = location else {
            log::debug!(
                "Registry stop {} has unusable coordinates ({}, {})",
                row.stop_id,
                row.latitude,
                row.longitude
            );
            stats.skipped += 1;
            continue;
        };
        if stops.contains_key(&row.stop_id) {
            stats.duplicate_ids += 1;
            continue;
        }

        let class = row
            .classification
            .as_deref()
            .map_or(StopClass::Unclassified, StopClass::from_cell);
        stops.insert(
            row.stop_id.clone(),
            RegistryStop {
                stop_id: row.stop_id,
                location,
                name: row.name,
                class,
            },
        );
        stats.loaded += 1;
    }

    Ok((StopRegistry { stops }, stats))
}
