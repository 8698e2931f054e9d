//! Output tables.
//!
//! `stops.csv`, `routes.csv` and `area_metrics.csv`, each sorted by key.
//! Nulls are written as empty cells.

use std::path::Path;

use serde::Serialize;
use transit_equity_geography_models::{AreaAssignment, AreaCode, StopPoint};
use transit_equity_metrics::{AreaMetrics, RouteMetrics};

use crate::PipelineError;

/// File name of the stops table.
pub const STOPS_FILE: &str = "stops.csv";
/// File name of the routes table.
pub const ROUTES_FILE: &str = "routes.csv";
/// File name of the area metrics table.
pub const AREA_METRICS_FILE: &str = "area_metrics.csv";
/// File name of the run report.
pub const REPORT_FILE: &str = "run_report.json";

const STOPS_HEADER: &[&str] = &[
    "stop_id",
    "latitude",
    "longitude",
    "area_code",
    "name",
    "assignment",
];

const ROUTES_HEADER: &[&str] = &[
    "operator_id",
    "route_id",
    "name",
    "length",
    "trips_per_day",
    "avg_headway_minutes",
    "regions",
];

const AREA_METRICS_HEADER: &[&str] = &[
    "area_code",
    "active_stops",
    "routes_serving",
    "total_daily_trips",
    "avg_headway_minutes",
    "coverage_score",
    "equity_index",
    "urban_pct",
    "rural_pct",
    "demographic_match_confidence",
    "population",
    "deprivation_decile",
    "car_free_pct",
    "urban_stops",
    "rural_stops",
    "unclassified_stops",
    "urban_rural_unreliable",
    "equity_low_confidence",
];

#[derive(Serialize)]
struct StopRow<'a> {
    stop_id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    area_code: Option<&'a str>,
    name: Option<&'a str>,
    assignment: &'static str,
}

#[derive(Serialize)]
struct RouteRow<'a> {
    operator_id: &'a str,
    route_id: &'a str,
    name: &'a str,
    length: Option<f64>,
    trips_per_day: usize,
    avg_headway_minutes: Option<f64>,
    regions: String,
}

#[derive(Serialize)]
struct AreaRow<'a> {
    area_code: &'a str,
    active_stops: usize,
    routes_serving: usize,
    total_daily_trips: usize,
    avg_headway_minutes: Option<f64>,
    coverage_score: Option<f64>,
    equity_index: Option<f64>,
    urban_pct: Option<f64>,
    rural_pct: Option<f64>,
    demographic_match_confidence: Option<f64>,
    population: Option<f64>,
    deprivation_decile: Option<f64>,
    car_free_pct: Option<f64>,
    urban_stops: usize,
    rural_stops: usize,
    unclassified_stops: usize,
    urban_rural_unreliable: bool,
    equity_low_confidence: bool,
}

/// Writes one row per stop (same order as `stops`, which is id order).
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_stops(
    path: &Path,
    stops: &[StopPoint],
    assignments: &[AreaAssignment],
) -> Result<(), PipelineError> {
    let rows = stops.iter().zip(assignments).map(|(stop, assignment)| StopRow {
        stop_id: stop.stop_id(),
        latitude: stop.location.map(|l| l.latitude),
        longitude: stop.location.map(|l| l.longitude),
        area_code: assignment.area().map(AreaCode::as_str),
        name: stop.name.as_deref(),
        assignment: assignment.label(),
    });
    write_rows(path, STOPS_HEADER, rows)
}

/// Writes one row per route.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_routes(path: &Path, routes: &[RouteMetrics]) -> Result<(), PipelineError> {
    let rows = routes.iter().map(|r| RouteRow {
        operator_id: &r.key.operator_id,
        route_id: &r.key.route_id,
        name: &r.name,
        length: r.length_km,
        trips_per_day: r.trips_per_day,
        avg_headway_minutes: r.avg_headway_minutes,
        regions: r
            .regions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";"),
    });
    write_rows(path, ROUTES_HEADER, rows)
}

/// Writes one row per area.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_area_metrics(path: &Path, areas: &[AreaMetrics]) -> Result<(), PipelineError> {
    let rows = areas.iter().map(|a| AreaRow {
        area_code: a.area_code.as_str(),
        active_stops: a.active_stops,
        routes_serving: a.routes_serving,
        total_daily_trips: a.total_daily_trips,
        avg_headway_minutes: a.avg_headway_minutes,
        coverage_score: a.coverage_score,
        equity_index: a.equity_index,
        urban_pct: a.urban_pct,
        rural_pct: a.rural_pct,
        demographic_match_confidence: a.demographic_match_confidence,
        population: a.population,
        deprivation_decile: a.deprivation_decile,
        car_free_pct: a.car_free_pct,
        urban_stops: a.urban_stops,
        rural_stops: a.rural_stops,
        unclassified_stops: a.unclassified_stops,
        urban_rural_unreliable: a.urban_rural_unreliable,
        equity_low_confidence: a.equity_low_confidence,
    });
    write_rows(path, AREA_METRICS_HEADER, rows)
}

/// The header is written up front so an empty table still carries its
/// columns.
fn write_rows<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl Iterator<Item = T>,
) -> Result<(), PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    log::info!("Wrote {count} rows to {}", path.display());
    Ok(())
}
