//! Area boundary loader.
//!
//! Reads a `GeoJSON` `FeatureCollection` where every feature is one area:
//! `Polygon`/`MultiPolygon` geometry plus a string area-code property.
//! Features that cannot be used are skipped and counted. Features sharing a
//! code are merged into one multi-polygon.

use std::{collections::BTreeMap, path::Path};

use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use serde::Serialize;
use transit_equity_geography_models::{Area, AreaCode};

use crate::{CodeFormat, GeoError, read_file};

/// One area with its geometry.
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    /// Area code and name.
    pub area: Area,
    /// Geometry in (longitude, latitude) order.
    pub polygon: MultiPolygon<f64>,
}

/// Counts from loading the boundary dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryLoadStats {
    /// Distinct areas loaded.
    pub loaded: usize,
    /// Features without a usable area code.
    pub missing_code: usize,
    /// Features without polygon geometry.
    pub non_polygon: usize,
    /// Extra features merged into an already-seen code.
    pub merged_parts: usize,
    /// Codes that do not match the vintage's code pattern (kept, reported).
    pub malformed_codes: Vec<String>,
}

/// All areas of one geography vintage.
#[derive(Debug, Clone)]
pub struct BoundaryDataset {
    /// Code scheme the areas belong to.
    pub format: CodeFormat,
    /// Areas in code order.
    pub features: Vec<BoundaryFeature>,
    /// Load counts.
    pub stats: BoundaryLoadStats,
}

impl BoundaryDataset {
    /// Area codes in sorted order.
    pub fn codes(&self) -> impl Iterator<Item = &AreaCode> {
        self.features.iter().map(|f| &f.area.code)
    }
}

/// Loads boundaries from a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`GeoError`] if the file cannot be read, is not valid `GeoJSON`,
/// or is not a `FeatureCollection`.
pub fn load_boundaries(
    path: &Path,
    code_property: &str,
    format: CodeFormat,
) -> Result<BoundaryDataset, GeoError> {
    let text = read_file(path)?;
    let dataset = parse_boundaries(&text, code_property, format)?;
    log::info!(
        "Loaded {} areas (vintage {}) from {}",
        dataset.stats.loaded,
        dataset.format.vintage,
        path.display()
    );
    if dataset.stats.missing_code + dataset.stats.non_polygon > 0 {
        log::warn!(
            "Skipped {} boundary features without an area code and {} without polygon geometry",
            dataset.stats.missing_code,
            dataset.stats.non_polygon
        );
    }
    if !dataset.stats.malformed_codes.is_empty() {
        log::warn!(
            "{} boundary codes do not match the {} code pattern",
            dataset.stats.malformed_codes.len(),
            dataset.format.vintage
        );
    }
    Ok(dataset)
}

/// Parses `GeoJSON` text into a [`BoundaryDataset`].
///
/// # Errors
///
/// Returns [`GeoError`] if the text is not a `GeoJSON` `FeatureCollection`.
pub fn parse_boundaries(
    text: &str,
    code_property: &str,
    format: CodeFormat,
) -> Result<BoundaryDataset, GeoError> {
    let geojson: GeoJson = text.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(GeoError::Conversion {
            message: "boundary file is not a GeoJSON FeatureCollection".to_string(),
        });
    };

    let mut stats = BoundaryLoadStats::default();
    let mut by_code: BTreeMap<AreaCode, BoundaryFeature> = BTreeMap::new();

    for feature in collection.features {
        let Some(code) = property_text(&feature, code_property).and_then(|c| AreaCode::parse(&c))
        else {
            stats.missing_code += 1;
            continue;
        };
        let name = property_text(&feature, "name");
        let Some(polygon) = feature_to_multipolygon(feature) else {
            log::debug!("Boundary {code} has no polygon geometry");
            stats.non_polygon += 1;
            continue;
        };

        if let Some(existing) = by_code.get_mut(&code) {
            existing.polygon.0.extend(polygon.0);
            if existing.area.name.is_none() {
                existing.area.name = name;
            }
            stats.merged_parts += 1;
            continue;
        }
        by_code.insert(
            code.clone(),
            BoundaryFeature {
                area: Area { code, name },
                polygon,
            },
        );
    }

    stats.loaded = by_code.len();
    stats.malformed_codes = by_code
        .keys()
        .filter(|code| !format.matches(code))
        .map(ToString::to_string)
        .collect();

    Ok(BoundaryDataset {
        format,
        features: by_code.into_values().collect(),
        stats,
    })
}

/// Reads a property as text; numeric codes are accepted and stringified.
fn property_text(feature: &Feature, name: &str) -> Option<String> {
    match feature.property(name)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts a feature's geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn feature_to_multipolygon(feature: Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry?;
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use transit_equity_geography_models::CodeVintage;

    use super::*;

    fn format(pattern: Option<&str>) -> CodeFormat {
        CodeFormat::new(CodeVintage::new("2021"), pattern).unwrap()
    }

    const GEOJSON: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"area_code": "E02", "name": "East"},
         "geometry": {"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}},
        {"type": "Feature", "properties": {"area_code": "E01", "name": "West"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
        {"type": "Feature", "properties": {"name": "No code"},
         "geometry": {"type": "Polygon", "coordinates": [[[5,5],[6,5],[6,6],[5,5]]]}},
        {"type": "Feature", "properties": {"area_code": "P1"},
         "geometry": {"type": "Point", "coordinates": [0.5, 0.5]}},
        {"type": "Feature", "properties": {"area_code": "E01"},
         "geometry": {"type": "MultiPolygon", "coordinates": [[[[0,2],[1,2],[1,3],[0,3],[0,2]]]]}},
        {"type": "Feature", "properties": {"area_code": "w99"},
         "geometry": {"type": "Polygon", "coordinates": [[[3,0],[4,0],[4,1],[3,1],[3,0]]]}}
      ]
    }"#;

    #[test]
    fn loads_and_merges_features() {
        let dataset = parse_boundaries(GEOJSON, "area_code", format(Some("E[0-9]{2}"))).unwrap();
        let codes: Vec<&str> = dataset.codes().map(AreaCode::as_str).collect();
        assert_eq!(codes, vec!["E01", "E02", "W99"]);
        assert_eq!(dataset.stats.loaded, 3);
        assert_eq!(dataset.stats.missing_code, 1);
        assert_eq!(dataset.stats.non_polygon, 1);
        assert_eq!(dataset.stats.merged_parts, 1);
        assert_eq!(dataset.stats.malformed_codes, vec!["W99".to_string()]);

        let west = &dataset.features[0];
        assert_eq!(west.area.name.as_deref(), Some("West"));
        assert_eq!(west.polygon.0.len(), 2);
    }

    #[test]
    fn custom_code_property() {
        let text = GEOJSON.replace("area_code", "LSOA21CD");
        let dataset = parse_boundaries(&text, "LSOA21CD", format(None)).unwrap();
        assert_eq!(dataset.stats.loaded, 3);
        assert!(dataset.stats.malformed_codes.is_empty());
    }

    #[test]
    fn rejects_non_collection() {
        let err = parse_boundaries(
            r#"{"type": "Point", "coordinates": [0, 0]}"#,
            "area_code",
            format(None),
        )
        .unwrap_err();
        assert!(matches!(err, GeoError::Conversion { .. }));
    }

    #[test]
    fn numeric_codes_are_accepted() {
        let text = r#"{"type": "FeatureCollection", "features": [
          {"type": "Feature", "properties": {"area_code": 36061},
           "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;
        let dataset = parse_boundaries(text, "area_code", format(None)).unwrap();
        assert_eq!(dataset.features[0].area.code.as_str(), "36061");
    }
}
