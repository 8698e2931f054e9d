//! Pipeline configuration.
//!
//! Read from `pipeline.toml` in the input directory (or an explicit path).
//! Every key has a default, so a missing file means "all defaults".
//! Relative paths are resolved against the input directory.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use transit_equity_demographics::SourceDefinition;
use transit_equity_geography_models::CodeVintage;
use transit_equity_metrics::MetricsConfig;

use crate::PipelineError;

/// Config file looked up in the input directory.
pub const CONFIG_FILE_NAME: &str = "pipeline.toml";

/// Comma-separated demographic source ids to merge when `--demographics`
/// is not given.
pub const DEMOGRAPHICS_ENV_VAR: &str = "TRANSIT_EQUITY_DEMOGRAPHICS";

/// `[boundaries]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundariesConfig {
    /// `GeoJSON` `FeatureCollection` of areas.
    pub path: PathBuf,
    /// Code vintage of the areas.
    pub vintage: CodeVintage,
    /// Feature property holding the area code.
    pub area_code_property: String,
    /// Regex every well-formed code matches.
    pub code_pattern: Option<String>,
}

impl Default for BoundariesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("boundaries.geojson"),
            vintage: CodeVintage::new("2021"),
            area_code_property: "area_code".to_string(),
            code_pattern: None,
        }
    }
}

/// `[registry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Stop registry CSV.
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stops.csv"),
        }
    }
}

/// `[schedules]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulesConfig {
    /// Root of the schedule documents; first-level subdirectories are
    /// ingestion batches.
    pub directory: PathBuf,
    /// Per-document parse timeout.
    pub parse_timeout_secs: u64,
    /// Documents parsed concurrently. Defaults to the available
    /// parallelism.
    pub workers: Option<usize>,
}

impl Default for SchedulesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("schedules"),
            parse_timeout_secs: 60,
            workers: None,
        }
    }
}

/// `[metrics]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Demographic field holding resident population.
    pub population_field: String,
    /// Demographic field holding the deprivation decile.
    pub deprivation_field: String,
    /// Demographic field holding the car-free households percentage.
    pub car_free_field: String,
    /// Formula parameters.
    #[serde(flatten)]
    pub formula: MetricsConfig,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            population_field: "population".to_string(),
            deprivation_field: "deprivation_decile".to_string(),
            car_free_field: "car_free_pct".to_string(),
            formula: MetricsConfig::default(),
        }
    }
}

/// `[thresholds]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum share of areas a demographic source must match.
    pub min_match_rate: f64,
    /// Maximum share of stops left without an area.
    pub max_unassigned_fraction: f64,
    /// Snap stops outside every polygon to one within this many metres.
    /// Disabled when unset.
    pub max_snap_distance_m: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_match_rate: 0.8,
            max_unassigned_fraction: 0.05,
            max_snap_distance_m: None,
        }
    }
}

/// The whole `pipeline.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Area boundaries.
    pub boundaries: BoundariesConfig,
    /// Stop registry.
    pub registry: RegistryConfig,
    /// Schedule documents.
    pub schedules: SchedulesConfig,
    /// Demographic tables, in declaration order.
    pub demographics: Vec<SourceDefinition>,
    /// Metric inputs and parameters.
    pub metrics: MetricsSection,
    /// Failure thresholds.
    pub thresholds: Thresholds,
}

/// Values given on the command line. Each one replaces the file value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Comma-separated demographic source ids.
    pub demographics: Option<String>,
    /// `thresholds.min_match_rate`
    pub min_match_rate: Option<f64>,
    /// `thresholds.max_unassigned_fraction`
    pub max_unassigned: Option<f64>,
    /// `schedules.parse_timeout_secs`
    pub parse_timeout_secs: Option<u64>,
}

impl PipelineConfig {
    /// Loads the config for `input_dir`.
    ///
    /// With `explicit` set, that file must exist. Otherwise
    /// `<input_dir>/pipeline.toml` is used when present, else defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(input_dir: &Path, explicit: Option<&Path>) -> Result<Self, PipelineError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = input_dir.join(CONFIG_FILE_NAME);
                if !path.exists() {
                    log::info!("No {CONFIG_FILE_NAME} in {}, using defaults", input_dir.display());
                    return Ok(Self::default());
                }
                path
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| PipelineError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Toml`] on invalid TOML or unexpected types.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies command-line overrides and the demographic source selection
    /// (`--demographics`, else the `TRANSIT_EQUITY_DEMOGRAPHICS` env var).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when a selected source id is not
    /// configured.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), PipelineError> {
        if let Some(rate) = overrides.min_match_rate {
            self.thresholds.min_match_rate = rate;
        }
        if let Some(fraction) = overrides.max_unassigned {
            self.thresholds.max_unassigned_fraction = fraction;
        }
        if let Some(secs) = overrides.parse_timeout_secs {
            self.schedules.parse_timeout_secs = secs;
        }

        let filter = overrides
            .demographics
            .clone()
            .or_else(|| std::env::var(DEMOGRAPHICS_ENV_VAR).ok());
        if let Some(filter) = filter {
            self.select_demographics(&filter)?;
        }
        Ok(())
    }

    /// Keeps only the listed demographic sources, preserving declaration
    /// order. A blank list keeps nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for ids that are not configured.
    pub fn select_demographics(&mut self, filter: &str) -> Result<(), PipelineError> {
        let ids: BTreeSet<&str> = filter
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();
        let unknown: Vec<&str> = ids
            .iter()
            .copied()
            .filter(|id| !self.demographics.iter().any(|d| d.id == *id))
            .collect();
        if !unknown.is_empty() {
            let available: Vec<&str> = self.demographics.iter().map(|d| d.id.as_str()).collect();
            return Err(PipelineError::Config {
                message: format!(
                    "unknown demographic sources {unknown:?}; configured: {available:?}"
                ),
            });
        }
        self.demographics.retain(|d| ids.contains(d.id.as_str()));
        log::info!(
            "Merging {} selected demographic sources",
            self.demographics.len()
        );
        Ok(())
    }

    /// Checks value ranges and uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first problem.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |message: String| Err(PipelineError::Config { message });
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.min_match_rate) {
            return fail(format!("min_match_rate must be within [0, 1], got {}", t.min_match_rate));
        }
        if !(0.0..=1.0).contains(&t.max_unassigned_fraction) {
            return fail(format!(
                "max_unassigned_fraction must be within [0, 1], got {}",
                t.max_unassigned_fraction
            ));
        }
        if let Some(snap) = t.max_snap_distance_m {
            if !(snap.is_finite() && snap >= 0.0) {
                return fail(format!(
                    "max_snap_distance_m must be a non-negative distance, got {snap}"
                ));
            }
        }
        let saturation = self.metrics.formula.coverage_saturation;
        if !(saturation.is_finite() && saturation > 0.0) {
            return fail(format!("coverage_saturation must be positive, got {saturation}"));
        }
        if self.schedules.parse_timeout_secs == 0 {
            return fail("parse_timeout_secs must be at least 1".to_string());
        }
        if self.schedules.workers == Some(0) {
            return fail("workers must be at least 1".to_string());
        }

        let mut seen = BTreeSet::new();
        for source in &self.demographics {
            if !seen.insert(source.id.as_str()) {
                return fail(format!("demographic source id '{}' is declared twice", source.id));
            }
            if source
                .min_match_rate
                .is_some_and(|rate| !(0.0..=1.0).contains(&rate))
            {
                return fail(format!(
                    "demographic source '{}': min_match_rate must be within [0, 1]",
                    source.id
                ));
            }
        }
        Ok(())
    }

    /// Returns a copy with every relative path joined onto `input_dir`.
    #[must_use]
    pub fn resolved_against(&self, input_dir: &Path) -> Self {
        let mut resolved = self.clone();
        resolved.boundaries.path = input_dir.join(&self.boundaries.path);
        resolved.registry.path = input_dir.join(&self.registry.path);
        resolved.schedules.directory = input_dir.join(&self.schedules.directory);
        resolved.demographics = self
            .demographics
            .iter()
            .map(|d| d.resolved_against(input_dir))
            .collect();
        resolved
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;

    const TOML: &str = r#"
[boundaries]
path = "geo/lsoa.geojson"
vintage = "2021"
area_code_property = "LSOA21CD"
code_pattern = "[EW]0[0-9]{7}"

[schedules]
parse_timeout_secs = 5
workers = 2

[[demographics]]
id = "census"
path = "census.csv"
vintage = "2021"
year = 2021

[[demographics]]
id = "imd"
path = "imd.csv"
vintage = "2011"
crosswalk = "lsoa11_lsoa21.csv"
required = false

[metrics]
deprivation_field = "imd_decile"
reference_day = "Tue"
coverage_saturation = 3.0

[thresholds]
min_match_rate = 0.6
max_snap_distance_m = 25.0
"#;

    #[test]
    fn parses_sections_and_fills_defaults() {
        let config = PipelineConfig::parse(TOML).unwrap();
        assert_eq!(config.boundaries.area_code_property, "LSOA21CD");
        assert_eq!(config.registry.path, PathBuf::from("stops.csv"));
        assert_eq!(config.schedules.workers, Some(2));
        assert_eq!(config.demographics.len(), 2);
        assert!(config.demographics[0].required);
        assert!(!config.demographics[1].required);
        assert_eq!(config.metrics.deprivation_field, "imd_decile");
        assert_eq!(config.metrics.population_field, "population");
        assert_eq!(config.metrics.formula.reference_day, Weekday::Tue);
        assert_eq!(config.metrics.formula.min_reliable_stops, 5);
        assert!((config.thresholds.min_match_rate - 0.6).abs() < f64::EPSILON);
        assert!((config.thresholds.max_unassigned_fraction - 0.05).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(PipelineConfig::parse("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn missing_default_file_uses_defaults_but_explicit_must_exist() {
        let dir = std::env::temp_dir().join("transit_equity_config_missing");
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(PipelineConfig::load(&dir, None).unwrap(), PipelineConfig::default());
        assert!(matches!(
            PipelineConfig::load(&dir, Some(&dir.join("absent.toml"))).unwrap_err(),
            PipelineError::Read { .. }
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = PipelineConfig::parse(TOML).unwrap();
        config
            .apply_overrides(&ConfigOverrides {
                demographics: Some("imd".to_string()),
                min_match_rate: Some(0.9),
                max_unassigned: Some(0.2),
                parse_timeout_secs: Some(1),
            })
            .unwrap();
        assert_eq!(config.demographics.len(), 1);
        assert_eq!(config.demographics[0].id, "imd");
        assert!((config.thresholds.min_match_rate - 0.9).abs() < f64::EPSILON);
        assert!((config.thresholds.max_unassigned_fraction - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.schedules.parse_timeout_secs, 1);
    }

    #[test]
    fn unknown_demographic_source_is_rejected() {
        let mut config = PipelineConfig::parse(TOML).unwrap();
        let err = config.select_demographics("census, nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert_eq!(config.demographics.len(), 2);
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = PipelineConfig::default();
        config.thresholds.min_match_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::parse(TOML).unwrap();
        config.demographics[1].id = "census".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("twice"));

        let mut config = PipelineConfig::default();
        config.metrics.formula.coverage_saturation = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn paths_resolve_against_input_dir() {
        let config = PipelineConfig::parse(TOML).unwrap().resolved_against(Path::new("/in"));
        assert_eq!(config.boundaries.path, PathBuf::from("/in/geo/lsoa.geojson"));
        assert_eq!(config.schedules.directory, PathBuf::from("/in/schedules"));
        assert_eq!(
            config.demographics[1].crosswalk,
            Some(PathBuf::from("/in/lsoa11_lsoa21.csv"))
        );
    }

    #[test]
    fn renders_back_to_toml() {
        let config = PipelineConfig::parse(TOML).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::parse(&text).unwrap(), config);
    }
}
