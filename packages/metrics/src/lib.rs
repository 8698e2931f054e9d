#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Metric computation engine.
//!
//! Turns the resolved, assigned and merged dataset into the per-route and
//! per-area output tables. Everything here is a deterministic function of
//! its inputs: no clocks, no randomness, and every collection is iterated
//! in key order.
//!
//! Undefined values (zero population, no trips) are `None` and recorded as
//! [`MetricEdgeCase`]s; they are never errors.

pub mod areas;
pub mod formulas;
pub mod routes;

use std::collections::BTreeMap;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use transit_equity_dedup::CanonicalTrip;
use transit_equity_geography_models::{Area, AreaAssignment, AreaCode, LatLng, StopPoint};
use transit_equity_schedule_models::{Route, RouteKey};

pub use areas::{AreaMetrics, area_metrics};
pub use routes::{RouteMetrics, route_metrics};

const fn default_reference_day() -> Weekday {
    Weekday::Wed
}

const fn default_coverage_saturation() -> f64 {
    2.0
}

const fn default_min_reliable_stops() -> usize {
    5
}

/// Formula parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Weekday whose trips make up the service day.
    #[serde(default = "default_reference_day")]
    pub reference_day: Weekday,
    /// Active stops per 1 000 residents at which coverage reaches 1.0.
    #[serde(default = "default_coverage_saturation")]
    pub coverage_saturation: f64,
    /// Classified stops below which the urban/rural split is unreliable.
    #[serde(default = "default_min_reliable_stops")]
    pub min_reliable_stops: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            reference_day: default_reference_day(),
            coverage_saturation: default_coverage_saturation(),
            min_reliable_stops: default_min_reliable_stops(),
        }
    }
}

/// Demographic values an area's metrics are computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AreaDemographicInputs {
    /// Resident population.
    pub population: Option<f64>,
    /// Deprivation decile (1 = most deprived).
    pub deprivation_decile: Option<f64>,
    /// Households without a car, in percent.
    pub car_free_pct: Option<f64>,
    /// Share of demographic sources that matched the area.
    pub match_confidence: Option<f64>,
}

/// A value that could not be computed and was set to null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricEdgeCase {
    /// No population value for the area.
    MissingPopulation {
        /// Area.
        area_code: AreaCode,
    },
    /// Population is zero or negative.
    ZeroPopulation {
        /// Area.
        area_code: AreaCode,
    },
    /// No reference-day trip calls in the area.
    NoService {
        /// Area.
        area_code: AreaCode,
    },
    /// The route has no reference-day trips.
    ZeroTrips {
        /// Route.
        route: RouteKey,
    },
}

/// Everything metrics are computed from.
#[derive(Debug, Clone, Copy)]
pub struct MetricInputs<'a> {
    /// Boundary areas.
    pub areas: &'a [Area],
    /// Resolved stops.
    pub stops: &'a [StopPoint],
    /// One assignment per stop, same order.
    pub assignments: &'a [AreaAssignment],
    /// Resolved routes.
    pub routes: &'a [Route],
    /// Resolved trips.
    pub trips: &'a [CanonicalTrip],
    /// Per-area demographic inputs.
    pub demographics: &'a BTreeMap<AreaCode, AreaDemographicInputs>,
}

/// Computed tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsOutput {
    /// One row per route, in key order.
    pub routes: Vec<RouteMetrics>,
    /// One row per area, in code order.
    pub areas: Vec<AreaMetrics>,
    /// Values set to null.
    pub edge_cases: Vec<MetricEdgeCase>,
}

impl MetricsOutput {
    /// Edge cases counted by kind.
    #[must_use]
    pub fn edge_case_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for case in &self.edge_cases {
            *counts.entry(case.as_ref().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Computes route and area metrics.
#[must_use]
pub fn compute_metrics(inputs: &MetricInputs<'_>, config: &MetricsConfig) -> MetricsOutput {
    let stop_locations: BTreeMap<String, LatLng> = inputs
        .stops
        .iter()
        .filter_map(|s| s.location.map(|l| (s.stop_id(), l)))
        .collect();

    let mut edge_cases = Vec::new();
    let routes = route_metrics(
        inputs.routes,
        inputs.trips,
        &stop_locations,
        config.reference_day,
        &mut edge_cases,
    );
    let areas = area_metrics(inputs, &routes, config, &mut edge_cases);

    for case in &edge_cases {
        log::debug!("Metric edge case: {case:?}");
    }
    log::info!(
        "Computed metrics for {} routes and {} areas on {} ({} null-valued edge cases)",
        routes.len(),
        areas.len(),
        config.reference_day,
        edge_cases.len()
    );

    MetricsOutput {
        routes,
        areas,
        edge_cases,
    }
}
