#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Transit supply and equity pipeline.
//!
//! Chains parse -> resolve -> assign -> merge -> metrics over a
//! [`RunContext`] loaded once per run, then writes the output tables and
//! `run_report.json`. Stage-local anomalies are collected into the
//! [`RunReport`]; only configured thresholds decide whether the run passed.

pub mod config;
pub mod context;
pub mod output;
pub mod report;

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use transit_equity_dedup::resolve_duplicates;
use transit_equity_demographics::{DemographicMerge, DemographicMergeError, merge_demographics};
use transit_equity_geography::GeoError;
use transit_equity_geography_models::AreaCode;
use transit_equity_metrics::{AreaDemographicInputs, MetricInputs, compute_metrics};
use transit_equity_schedule::{
    ParseOptions, discover_documents, parse_batch,
    progress::{ProgressCallback, null_progress},
};
use transit_equity_spatial::assign_stops;

use crate::{
    config::MetricsSection,
    context::RunContext,
    report::{
        BoundarySummary, DemographicSummary, DocumentSummary, MetricSummary, RunReport,
        ThresholdVerdicts,
    },
};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An output file could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV output error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON output error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file is not valid TOML for [`config::PipelineConfig`].
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Boundary or registry loading failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// A demographic table could not be loaded.
    #[error(transparent)]
    Demographics(#[from] DemographicMergeError),

    /// The configuration is inconsistent.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Number of stages reported on [`Progress::stages`].
pub const STAGE_COUNT: u64 = 6;

/// Progress reporters for a run.
#[derive(Clone)]
pub struct Progress {
    /// Advanced once per completed stage.
    pub stages: Arc<dyn ProgressCallback>,
    /// Tracks schedule document parsing.
    pub documents: Arc<dyn ProgressCallback>,
}

impl Progress {
    /// Reporters that discard everything.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            stages: null_progress(),
            documents: null_progress(),
        }
    }
}

/// Runs every stage over `ctx` and writes all outputs to
/// `ctx.output_dir`.
///
/// Returns the report even when a threshold fails; check
/// [`RunReport::passed`].
///
/// # Errors
///
/// Returns [`PipelineError`] if the schedules directory cannot be walked
/// or an output cannot be written.
#[allow(clippy::too_many_lines)]
pub async fn run(ctx: &RunContext, progress: &Progress) -> Result<RunReport, PipelineError> {
    let start = Instant::now();
    let config = &ctx.config;
    progress.stages.set_total(STAGE_COUNT);

    // --- 1. Parse schedule documents ---
    progress.stages.set_message("Parsing schedules".to_string());
    let sources = discover_documents(&config.schedules.directory)?;
    let options = ParseOptions {
        timeout: Duration::from_secs(config.schedules.parse_timeout_secs),
        workers: config
            .schedules
            .workers
            .unwrap_or_else(|| ParseOptions::default().workers),
    };
    let batch = parse_batch(sources, options, progress.documents.clone()).await;
    progress
        .documents
        .finish(format!("Parsed {} documents", batch.parsed()));
    log::info!(
        "Parsed {}/{} schedule documents ({} failed)",
        batch.parsed(),
        batch.discovered,
        batch.failed()
    );
    progress.stages.inc(1);

    // --- 2. Resolve duplicates ---
    progress.stages.set_message("Resolving duplicates".to_string());
    let (dataset, dedup) = resolve_duplicates(&batch.documents, &ctx.registry);
    progress.stages.inc(1);

    // --- 3. Assign stops to areas ---
    progress.stages.set_message("Assigning stops".to_string());
    let (assignments, assignment) = assign_stops(
        &ctx.index,
        &dataset.stops,
        config.thresholds.max_snap_distance_m,
    );
    progress.stages.inc(1);

    // --- 4. Merge demographics ---
    progress.stages.set_message("Merging demographics".to_string());
    let merge = merge_demographics(
        ctx.index.areas(),
        &ctx.boundary_format,
        &ctx.demographic_sources,
        config.thresholds.min_match_rate,
    );
    progress.stages.inc(1);

    // --- 5. Compute metrics ---
    progress.stages.set_message("Computing metrics".to_string());
    let demographics = demographic_inputs(ctx, &merge, &config.metrics);
    let metrics = compute_metrics(
        &MetricInputs {
            areas: ctx.index.areas(),
            stops: &dataset.stops,
            assignments: &assignments,
            routes: &dataset.routes,
            trips: &dataset.trips,
            demographics: &demographics,
        },
        &config.metrics.formula,
    );
    progress.stages.inc(1);

    // --- 6. Write outputs ---
    progress.stages.set_message("Writing outputs".to_string());
    let out = &ctx.output_dir;
    std::fs::create_dir_all(out).map_err(|source| PipelineError::Write {
        path: out.display().to_string(),
        source,
    })?;
    output::write_stops(&out.join(output::STOPS_FILE), &dataset.stops, &assignments)?;
    output::write_routes(&out.join(output::ROUTES_FILE), &metrics.routes)?;
    output::write_area_metrics(&out.join(output::AREA_METRICS_FILE), &metrics.areas)?;

    let thresholds = verdicts(ctx, assignment.unassigned_fraction(), &merge);
    let report = RunReport {
        documents: DocumentSummary {
            discovered: batch.discovered,
            parsed: batch.parsed(),
            failed: batch.failed(),
            failures: batch.failures,
        },
        registry: ctx.registry_stats,
        boundaries: BoundarySummary {
            vintage: ctx.boundary_format.vintage.clone(),
            stats: ctx.boundary_stats.clone(),
        },
        dedup,
        assignment,
        demographics: DemographicSummary {
            sources: merge.sources,
            overrides: merge.overrides,
        },
        metrics: MetricSummary {
            routes: metrics.routes.len(),
            areas: metrics.areas.len(),
            edge_cases: metrics.edge_case_counts(),
        },
        thresholds,
    };
    report::write_report(&out.join(output::REPORT_FILE), &report)?;
    progress.stages.inc(1);

    let elapsed = start.elapsed();
    if report.passed() {
        progress.stages.finish(format!(
            "Pipeline complete in {:.1}s",
            elapsed.as_secs_f64()
        ));
        log::info!(
            "Pipeline complete in {:.1}s, outputs in {}",
            elapsed.as_secs_f64(),
            out.display()
        );
    } else {
        progress
            .stages
            .finish("Pipeline finished with failed thresholds".to_string());
    }

    Ok(report)
}

/// Picks the metric input fields out of the merged demographics for every
/// boundary area.
fn demographic_inputs(
    ctx: &RunContext,
    merge: &DemographicMerge,
    fields: &MetricsSection,
) -> BTreeMap<AreaCode, AreaDemographicInputs> {
    ctx.index
        .areas()
        .iter()
        .map(|area| {
            let merged = merge.area(&area.code);
            let value = |field: &str| merged.and_then(|m| m.get(field));
            (
                area.code.clone(),
                AreaDemographicInputs {
                    population: value(&fields.population_field),
                    deprivation_decile: value(&fields.deprivation_field),
                    car_free_pct: value(&fields.car_free_field),
                    match_confidence: merge.confidence(&area.code),
                },
            )
        })
        .collect()
}

fn verdicts(
    ctx: &RunContext,
    unassigned_fraction: f64,
    merge: &DemographicMerge,
) -> ThresholdVerdicts {
    let max_unassigned_fraction = ctx.config.thresholds.max_unassigned_fraction;
    let unassigned_within_limit = unassigned_fraction <= max_unassigned_fraction;
    if !unassigned_within_limit {
        log::error!(
            "{:.1}% of stops are unassigned (limit {:.1}%)",
            unassigned_fraction * 100.0,
            max_unassigned_fraction * 100.0
        );
    }

    let demographic_failures: Vec<String> = merge
        .sources
        .iter()
        .filter(|s| s.is_fatal())
        .filter_map(|s| s.error(&ctx.boundary_format.vintage))
        .map(|e| e.to_string())
        .collect();
    for failure in &demographic_failures {
        log::error!("{failure}");
    }

    ThresholdVerdicts {
        unassigned_fraction,
        max_unassigned_fraction,
        unassigned_within_limit,
        passed: unassigned_within_limit && demographic_failures.is_empty(),
        demographic_failures,
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use crate::config::PipelineConfig;

    use super::*;

    const EPS: f64 = 1e-9;

    fn txc(operator: &str, name: &str, stops: [&str; 2], journeys: usize) -> String {
        let journeys: String = (0..journeys)
            .map(|i| {
                format!(
                    "<VehicleJourney><VehicleJourneyCode>{operator}-VJ{i}</VehicleJourneyCode>\
                     <ServiceRef>SVC1</ServiceRef><JourneyPatternRef>JP1</JourneyPatternRef>\
                     <DepartureTime>{:02}:00:00</DepartureTime></VehicleJourney>",
                    7 + i
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<TransXChange xmlns="http://www.transxchange.org.uk/" SchemaVersion="2.4">
  <StopPoints>
    <AnnotatedStopPointRef><StopPointRef>{s1}</StopPointRef><CommonName>First</CommonName></AnnotatedStopPointRef>
    <AnnotatedStopPointRef><StopPointRef>{s2}</StopPointRef><CommonName>Second</CommonName></AnnotatedStopPointRef>
  </StopPoints>
  <JourneyPatternSections>
    <JourneyPatternSection id="JPS1">
      <JourneyPatternTimingLink id="L1">
        <From><StopPointRef>{s1}</StopPointRef></From>
        <To><StopPointRef>{s2}</StopPointRef></To>
        <RunTime>PT5M</RunTime>
      </JourneyPatternTimingLink>
    </JourneyPatternSection>
  </JourneyPatternSections>
  <Operators>
    <Operator id="O1">
      <NationalOperatorCode>{operator}</NationalOperatorCode>
      <OperatorShortName>{name}</OperatorShortName>
    </Operator>
  </Operators>
  <Services>
    <Service>
      <ServiceCode>SVC1</ServiceCode>
      <Lines><Line id="LN1"><LineName>1</LineName></Line></Lines>
      <Description>{name} Line</Description>
      <RegisteredOperatorRef>O1</RegisteredOperatorRef>
      <OperatingProfile>
        <RegularDayType><DaysOfWeek><MondayToFriday/></DaysOfWeek></RegularDayType>
      </OperatingProfile>
      <StandardService>
        <JourneyPattern id="JP1"><JourneyPatternSectionRefs>JPS1</JourneyPatternSectionRefs></JourneyPattern>
      </StandardService>
    </Service>
  </Services>
  <VehicleJourneys>{journeys}</VehicleJourneys>
</TransXChange>"#,
            s1 = stops[0],
            s2 = stops[1],
        )
    }

    const BOUNDARIES: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"area_code": "X"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
        {"type": "Feature", "properties": {"area_code": "Y"},
         "geometry": {"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}}
      ]
    }"#;

    const REGISTRY: &str = "\
stop_id,latitude,longitude,name,classification
S1,0.5,0.5,First,urban
S2,0.4,0.6,Second,urban
S3,0.5,1.5,Third,rural
";

    const CONFIG: &str = r#"
[boundaries]
path = "boundaries.geojson"
vintage = "2021"

[registry]
path = "stops.csv"

[schedules]
directory = "schedules"
workers = 2

[[demographics]]
id = "census"
path = "census.csv"
vintage = "2021"

[thresholds]
min_match_rate = 0.5
max_unassigned_fraction = 0.0
"#;

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn fixture(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        let input = dir.join("input");
        let operator_a = txc("OPA", "Alpha", ["S1", "S2"], 2);
        write(&input.join("schedules/region-1/alpha.xml"), &operator_a);
        write(&input.join("schedules/region-2/alpha.xml"), &operator_a);
        write(
            &input.join("schedules/region-1/beta.xml"),
            &txc("OPB", "Beta", ["S2", "S3"], 3),
        );
        write(&input.join("boundaries.geojson"), BOUNDARIES);
        write(&input.join("stops.csv"), REGISTRY);
        write(
            &input.join("census.csv"),
            "area_code,population,deprivation_decile,car_free_pct\nX,1000,1,50\n",
        );
        write(&input.join(config::CONFIG_FILE_NAME), CONFIG);
        dir
    }

    async fn run_fixture(dir: &Path, output: &str) -> RunReport {
        let input = dir.join("input");
        let config = PipelineConfig::load(&input, None).unwrap();
        let ctx = RunContext::load(&config, &input, &dir.join(output)).unwrap();
        run(&ctx, &Progress::silent()).await.unwrap()
    }

    fn read(dir: &Path, output: &str, file: &str) -> String {
        std::fs::read_to_string(dir.join(output).join(file)).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_run_resolves_and_merges() {
        let dir = fixture("transit_equity_pipeline_e2e");
        let report = run_fixture(&dir, "out").await;

        assert_eq!(report.documents.discovered, 3);
        assert_eq!(report.documents.parsed, 3);
        assert_eq!(report.dedup.documents_kept, 2);
        assert_eq!(report.assignment.total, 3);
        assert_eq!(report.assignment.unassigned, 0);
        assert!(report.passed());

        let stops = read(&dir, "out", output::STOPS_FILE);
        assert_eq!(stops.lines().count(), 4);
        assert!(stops.contains("S3,0.5,1.5,Y,Third,contained"));

        let routes = read(&dir, "out", output::ROUTES_FILE);
        let lines: Vec<&str> = routes.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("OPA,1,Alpha Line,"));
        assert!(lines[1].ends_with(",2,720.0,region-1;region-2"));
        assert!(lines[2].starts_with("OPB,1,Beta Line,"));

        let areas = read(&dir, "out", output::AREA_METRICS_FILE);
        let mut rows = csv::Reader::from_reader(areas.as_bytes());
        let headers = rows.headers().unwrap().clone();
        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
        let records: Vec<csv::StringRecord> = rows.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);

        let x = &records[0];
        assert_eq!(&x[col("area_code")], "X");
        assert_eq!(&x[col("active_stops")], "2");
        assert_eq!(&x[col("total_daily_trips")], "5");
        let confidence: f64 = x[col("demographic_match_confidence")].parse().unwrap();
        assert!((confidence - 1.0).abs() < EPS);
        assert_eq!(&x[col("population")], "1000.0");

        let y = &records[1];
        assert_eq!(&y[col("area_code")], "Y");
        assert_eq!(&y[col("population")], "");
        assert_eq!(&y[col("coverage_score")], "");
        let confidence: f64 = y[col("demographic_match_confidence")].parse().unwrap();
        assert!(confidence.abs() < EPS);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_outputs() {
        let dir = fixture("transit_equity_pipeline_idempotent");
        run_fixture(&dir, "out-a").await;
        run_fixture(&dir, "out-b").await;

        for file in [
            output::STOPS_FILE,
            output::ROUTES_FILE,
            output::AREA_METRICS_FILE,
            output::REPORT_FILE,
        ] {
            assert_eq!(read(&dir, "out-a", file), read(&dir, "out-b", file), "{file}");
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn failed_threshold_still_writes_outputs() {
        let dir = fixture("transit_equity_pipeline_threshold");
        let input = dir.join("input");
        let mut config = PipelineConfig::load(&input, None).unwrap();
        config.thresholds.min_match_rate = 0.9;
        let ctx = RunContext::load(&config, &input, &dir.join("out")).unwrap();
        let report = run(&ctx, &Progress::silent()).await.unwrap();

        assert!(!report.passed());
        assert!(report.thresholds.unassigned_within_limit);
        assert_eq!(report.thresholds.demographic_failures.len(), 1);
        assert!(report.thresholds.demographic_failures[0].contains("census"));
        assert!(dir.join("out").join(output::REPORT_FILE).exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
