//! Run report (`run_report.json`).
//!
//! The primary surface for every anomaly of a run: parse failures,
//! duplicate conflicts, unassigned stops, demographic coverage and metric
//! edge cases, plus the threshold verdicts that decide the exit code.

use std::{collections::BTreeMap, io::Write as _, path::Path};

use serde::Serialize;
use transit_equity_dedup::DedupReport;
use transit_equity_demographics::{FieldOverride, SourceCoverage};
use transit_equity_geography::{BoundaryLoadStats, RegistryLoadStats};
use transit_equity_geography_models::CodeVintage;
use transit_equity_schedule::DocumentFailure;
use transit_equity_spatial::AssignmentReport;

use crate::PipelineError;

/// Schedule documents seen by the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    /// Documents found on disk.
    pub discovered: usize,
    /// Documents parsed.
    pub parsed: usize,
    /// Documents that failed.
    pub failed: usize,
    /// One entry per failure.
    pub failures: Vec<DocumentFailure>,
}

/// Boundary dataset summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundarySummary {
    /// Code vintage.
    pub vintage: CodeVintage,
    /// Load counts.
    #[serde(flatten)]
    pub stats: BoundaryLoadStats,
}

/// Demographic merge summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicSummary {
    /// Per-source coverage, in declaration order.
    pub sources: Vec<SourceCoverage>,
    /// Values dropped in favour of a higher-precedence source.
    pub overrides: Vec<FieldOverride>,
}

/// Metric summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    /// Rows in `routes.csv`.
    pub routes: usize,
    /// Rows in `area_metrics.csv`.
    pub areas: usize,
    /// Null-valued edge cases by kind.
    pub edge_cases: BTreeMap<String, usize>,
}

/// Threshold checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdVerdicts {
    /// Share of stops without an area.
    pub unassigned_fraction: f64,
    /// Configured maximum.
    pub max_unassigned_fraction: f64,
    /// `unassigned_fraction <= max_unassigned_fraction`.
    pub unassigned_within_limit: bool,
    /// Rendered errors of required demographic sources that failed.
    pub demographic_failures: Vec<String>,
    /// Every check passed.
    pub passed: bool,
}

/// Everything `run_report.json` contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Schedule documents.
    pub documents: DocumentSummary,
    /// Stop registry load counts.
    pub registry: RegistryLoadStats,
    /// Boundary load counts.
    pub boundaries: BoundarySummary,
    /// Duplicate resolution.
    pub dedup: DedupReport,
    /// Spatial assignment.
    pub assignment: AssignmentReport,
    /// Demographic merge.
    pub demographics: DemographicSummary,
    /// Metric computation.
    pub metrics: MetricSummary,
    /// Threshold verdicts.
    pub thresholds: ThresholdVerdicts,
}

impl RunReport {
    /// Whether every threshold passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.thresholds.passed
    }
}

/// Writes the report as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be created or written.
pub fn write_report(path: &Path, report: &RunReport) -> Result<(), PipelineError> {
    let file = std::fs::File::create(path).map_err(|source| PipelineError::Write {
        path: path.display().to_string(),
        source,
    })?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
