#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Demographic merge engine.
//!
//! Joins externally supplied per-area tables onto the boundary areas by
//! area code. Every source declares the code vintage it was published
//! against; a source from another vintage is only merged through an
//! explicit crosswalk. Success is measured by how many areas actually
//! received values, never by how many rows were read.

pub mod crosswalk;
pub mod merge;
pub mod table;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use transit_equity_geography_models::CodeVintage;

pub use crosswalk::{Crosswalk, Translation, load_crosswalk};
pub use merge::{
    AreaDemographics, DemographicMerge, FieldOverride, MergeCoverage, SourceCoverage,
    SourceStatus, merge_demographics,
};
pub use table::{DemographicRecord, DemographicTable, TableStats, load_table};

/// Errors raised by the demographic merge engine.
#[derive(Debug, Error)]
pub enum DemographicMergeError {
    /// A table or crosswalk file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A declared column is not in the table header.
    #[error("Source {source_id}: column '{column}' not found")]
    MissingColumn {
        /// Source id.
        source_id: String,
        /// Missing column.
        column: String,
    },

    /// The source uses another code vintage and declares no crosswalk.
    #[error(
        "Source {source_id}: area codes are vintage {source_vintage} but boundaries are \
         vintage {area_vintage}, and no crosswalk is declared"
    )]
    VintageMismatch {
        /// Source id.
        source_id: String,
        /// Vintage declared by the source.
        source_vintage: CodeVintage,
        /// Vintage of the boundary dataset.
        area_vintage: CodeVintage,
    },

    /// No area received a single value.
    #[error("Source {source_id}: {rows} rows read but no area received a value")]
    NoMatches {
        /// Source id.
        source_id: String,
        /// Rows read from the table.
        rows: usize,
    },

    /// Too few areas received values.
    #[error(
        "Source {source_id}: matched {matched} of {total} areas ({coverage_ratio:.3}), \
         below the minimum of {min_match_rate:.3}"
    )]
    BelowThreshold {
        /// Source id.
        source_id: String,
        /// Areas matched.
        matched: usize,
        /// Areas in the boundary dataset.
        total: usize,
        /// `matched / total`.
        coverage_ratio: f64,
        /// Configured minimum.
        min_match_rate: f64,
    },
}

fn default_area_code_column() -> String {
    "area_code".to_string()
}

const fn default_required() -> bool {
    true
}

/// A configured demographic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"imd_2019"`).
    pub id: String,
    /// CSV file.
    pub path: PathBuf,
    /// Code vintage the table was published against.
    pub vintage: CodeVintage,
    /// Publication year; when two sources supply the same field for the
    /// same area, the more recent one wins.
    #[serde(default)]
    pub year: Option<i32>,
    /// Header of the area-code column.
    #[serde(default = "default_area_code_column")]
    pub area_code_column: String,
    /// Value columns to merge. Empty means every non-key column.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Whether a failed merge stops the run.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Optional `from_code,to_code` CSV translating this source's codes to
    /// the boundary vintage.
    #[serde(default)]
    pub crosswalk: Option<PathBuf>,
    /// Per-source override of the minimum match rate.
    #[serde(default)]
    pub min_match_rate: Option<f64>,
}

impl SourceDefinition {
    /// Returns a copy with relative paths resolved against `base`.
    #[must_use]
    pub fn resolved_against(&self, base: &Path) -> Self {
        Self {
            path: base.join(&self.path),
            crosswalk: self.crosswalk.as_ref().map(|p| base.join(p)),
            ..self.clone()
        }
    }
}

/// A source with its table (and crosswalk, when declared) loaded.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    /// Configuration.
    pub definition: SourceDefinition,
    /// Parsed table.
    pub table: DemographicTable,
    /// Parsed crosswalk.
    pub crosswalk: Option<Crosswalk>,
}

/// Loads a source's table and crosswalk from disk.
///
/// # Errors
///
/// Returns [`DemographicMergeError`] if a file cannot be read or parsed,
/// or a declared field column is missing.
pub fn load_source(definition: &SourceDefinition) -> Result<LoadedSource, DemographicMergeError> {
    let table = load_table(definition)?;
    let crosswalk = definition
        .crosswalk
        .as_deref()
        .map(load_crosswalk)
        .transpose()?;
    Ok(LoadedSource {
        definition: definition.clone(),
        table,
        crosswalk,
    })
}

pub(crate) fn read_file(path: &Path) -> Result<String, DemographicMergeError> {
    std::fs::read_to_string(path).map_err(|source| DemographicMergeError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use transit_equity_geography_models::CodeVintage;

    use crate::SourceDefinition;

    pub fn definition(id: &str, vintage: &str) -> SourceDefinition {
        SourceDefinition {
            id: id.to_string(),
            path: PathBuf::from(format!("{id}.csv")),
            vintage: CodeVintage::new(vintage),
            year: None,
            area_code_column: "area_code".to_string(),
            fields: Vec::new(),
            required: true,
            crosswalk: None,
            min_match_rate: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_input() {
        let mut def = test_support::definition("census", "2021");
        def.crosswalk = Some(PathBuf::from("xwalk.csv"));
        let resolved = def.resolved_against(Path::new("/data/in"));
        assert_eq!(resolved.path, PathBuf::from("/data/in/census.csv"));
        assert_eq!(resolved.crosswalk, Some(PathBuf::from("/data/in/xwalk.csv")));
        assert_eq!(resolved.id, "census");
    }

    #[test]
    fn load_source_reads_table_and_crosswalk() {
        let dir = std::env::temp_dir().join("transit_equity_demographics_load_source");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("pop.csv"), "area_code,population\nE01,100\n").unwrap();
        std::fs::write(dir.join("xwalk.csv"), "from_code,to_code\nOLD1,E01\n").unwrap();

        let mut def = test_support::definition("pop", "2011");
        def.crosswalk = Some(PathBuf::from("xwalk.csv"));
        let loaded = load_source(&def.resolved_against(&dir)).unwrap();
        assert_eq!(loaded.table.records.len(), 1);
        assert_eq!(loaded.crosswalk.unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_read_error() {
        let def = test_support::definition("absent", "2021")
            .resolved_against(Path::new("/nonexistent/transit_equity"));
        let err = load_source(&def).unwrap_err();
        assert!(matches!(err, DemographicMergeError::Read { .. }));
    }

    #[test]
    fn definition_defaults_from_toml_shape() {
        let def: SourceDefinition = serde_json::from_str(
            r#"{"id": "imd", "path": "imd.csv", "vintage": "2021"}"#,
        )
        .unwrap();
        assert_eq!(def.area_code_column, "area_code");
        assert!(def.required);
        assert!(def.fields.is_empty());
        assert!(def.year.is_none());
    }
}
