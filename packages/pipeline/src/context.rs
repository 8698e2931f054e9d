//! Immutable per-run context.
//!
//! Everything loaded once and only read afterwards: configuration, stop
//! registry, boundary index and demographic tables. Stages borrow it.

use std::path::{Path, PathBuf};

use transit_equity_demographics::{LoadedSource, load_source};
use transit_equity_geography::{
    BoundaryLoadStats, CodeFormat, RegistryLoadStats, StopRegistry, load_boundaries, load_registry,
};
use transit_equity_spatial::BoundaryIndex;

use crate::{PipelineError, config::PipelineConfig};

/// Shared read-only inputs of one run.
pub struct RunContext {
    /// Configuration with paths resolved against the input directory.
    pub config: PipelineConfig,
    /// Input directory.
    pub input_dir: PathBuf,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Stop registry.
    pub registry: StopRegistry,
    /// Registry load counts.
    pub registry_stats: RegistryLoadStats,
    /// Code scheme of the boundary areas.
    pub boundary_format: CodeFormat,
    /// Boundary load counts.
    pub boundary_stats: BoundaryLoadStats,
    /// Spatial index over the areas.
    pub index: BoundaryIndex,
    /// Demographic tables selected for this run.
    pub demographic_sources: Vec<LoadedSource>,
}

impl RunContext {
    /// Validates `config` and loads every reference input.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the configuration is invalid or a
    /// reference file cannot be loaded.
    pub fn load(
        config: &PipelineConfig,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let config = config.resolved_against(input_dir);

        let format = CodeFormat::new(
            config.boundaries.vintage.clone(),
            config.boundaries.code_pattern.as_deref(),
        )?;
        let dataset = load_boundaries(
            &config.boundaries.path,
            &config.boundaries.area_code_property,
            format,
        )?;
        if dataset.features.is_empty() {
            log::warn!(
                "Boundary dataset {} contains no usable areas",
                config.boundaries.path.display()
            );
        }
        let index = BoundaryIndex::new(&dataset);

        let (registry, registry_stats) = load_registry(&config.registry.path)?;

        let demographic_sources = config
            .demographics
            .iter()
            .map(load_source)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            registry,
            registry_stats,
            boundary_format: dataset.format,
            boundary_stats: dataset.stats,
            index,
            demographic_sources,
            config,
        })
    }
}
