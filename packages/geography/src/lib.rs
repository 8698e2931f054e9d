#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loaders for the reference geography: the national stop registry (CSV)
//! and the area boundary dataset (`GeoJSON`).
//!
//! Both are loaded once per run and never mutated afterwards.

pub mod boundaries;
pub mod registry;

use regex::Regex;
use thiserror::Error;
use transit_equity_geography_models::{AreaCode, CodeVintage};

pub use boundaries::{BoundaryDataset, BoundaryFeature, BoundaryLoadStats, load_boundaries};
pub use registry::{RegistryLoadStats, StopRegistry, load_registry};

/// Errors that can occur while loading reference geography.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A file could not be read.
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

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// An area-code pattern is not a valid regular expression.
    #[error("Invalid area code pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// The code scheme of one geography vintage: its label plus an optional
/// pattern every well-formed code matches.
#[derive(Debug, Clone)]
pub struct CodeFormat {
    /// Vintage label.
    pub vintage: CodeVintage,
    pattern: Option<Regex>,
}

impl CodeFormat {
    /// Builds a format. The pattern is anchored at both ends.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Pattern`] if `pattern` does not compile.
    pub fn new(vintage: CodeVintage, pattern: Option<&str>) -> Result<Self, GeoError> {
        let pattern = pattern
            .map(|p| Regex::new(&format!("^(?:{p})$")))
            .transpose()?;
        Ok(Self { vintage, pattern })
    }

    /// Whether `code` is well formed for this vintage. Always true when no
    /// pattern is configured.
    #[must_use]
    pub fn matches(&self, code: &AreaCode) -> bool {
        self.pattern
            .as_ref()
            .is_none_or(|p| p.is_match(code.as_str()))
    }

    /// The configured pattern, if any.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }
}

pub(crate) fn read_file(path: &std::path::Path) -> Result<String, GeoError> {
    std::fs::read_to_string(path).map_err(|source| GeoError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_format_is_anchored() {
        let format = CodeFormat::new(CodeVintage::new("2021"), Some(r"E0[0-9]{7}")).unwrap();
        assert!(format.matches(&AreaCode::parse("E01000001").unwrap()));
        assert!(!format.matches(&AreaCode::parse("XE01000001").unwrap()));
        assert!(!format.matches(&AreaCode::parse("E010000011").unwrap()));
    }

    #[test]
    fn missing_pattern_accepts_everything() {
        let format = CodeFormat::new(CodeVintage::new("2021"), None).unwrap();
        assert!(format.matches(&AreaCode::parse("anything").unwrap()));
        assert!(format.pattern().is_none());
    }

    #[test]
    fn invalid_pattern_is_error() {
        let err = CodeFormat::new(CodeVintage::new("2021"), Some("(")).unwrap_err();
        assert!(matches!(err, GeoError::Pattern(_)));
    }
}
