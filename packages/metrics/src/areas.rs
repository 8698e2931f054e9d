//! Per-area supply, coverage and equity.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use transit_equity_geography_models::{AreaCode, StopClass};
use transit_equity_schedule_models::RouteKey;

use crate::{
    AreaDemographicInputs, MetricEdgeCase, MetricInputs, MetricsConfig,
    formulas::{coverage_score, equity_index, urban_rural},
    routes::RouteMetrics,
};

/// One row of the `area_metrics` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMetrics {
    /// Area.
    pub area_code: AreaCode,
    /// Stops in the area visited by at least one reference-day trip.
    pub active_stops: usize,
    /// Distinct routes calling at those stops.
    pub routes_serving: usize,
    /// Distinct reference-day trips calling in the area.
    pub total_daily_trips: usize,
    /// Mean approximate headway of the routes serving the area.
    pub avg_headway_minutes: Option<f64>,
    /// Bounded stop density relative to population.
    pub coverage_score: Option<f64>,
    /// Composite of coverage and need.
    pub equity_index: Option<f64>,
    /// Equity index computed with missing need inputs.
    pub equity_low_confidence: bool,
    /// Share of classified active stops that are urban.
    pub urban_pct: Option<f64>,
    /// Share of classified active stops that are rural.
    pub rural_pct: Option<f64>,
    /// Urban active stops.
    pub urban_stops: usize,
    /// Rural active stops.
    pub rural_stops: usize,
    /// Active stops without a classification.
    pub unclassified_stops: usize,
    /// Too few classified stops for the split to be meaningful.
    pub urban_rural_unreliable: bool,
    /// Merged population.
    pub population: Option<f64>,
    /// Merged deprivation decile.
    pub deprivation_decile: Option<f64>,
    /// Merged car-free households percentage.
    pub car_free_pct: Option<f64>,
    /// Share of demographic sources that matched the area.
    pub demographic_match_confidence: Option<f64>,
}

#[derive(Default)]
struct Supply<'a> {
    stops: BTreeSet<&'a str>,
    routes: BTreeSet<&'a RouteKey>,
    trips: BTreeSet<&'a str>,
}

/// Computes one row per boundary area, in area code order.
pub fn area_metrics(
    inputs: &MetricInputs<'_>,
    route_metrics: &[RouteMetrics],
    config: &MetricsConfig,
    edge_cases: &mut Vec<MetricEdgeCase>,
) -> Vec<AreaMetrics> {
    let stop_area: BTreeMap<String, &AreaCode> = inputs
        .stops
        .iter()
        .zip(inputs.assignments)
        .filter_map(|(stop, assignment)| assignment.area().map(|a| (stop.stop_id(), a)))
        .collect();
    let stop_class: BTreeMap<String, StopClass> = inputs
        .stops
        .iter()
        .map(|s| (s.stop_id(), s.class))
        .collect();
    let headways: BTreeMap<_, f64> = route_metrics
        .iter()
        .filter_map(|r| r.avg_headway_minutes.map(|h| (&r.key, h)))
        .collect();

    let mut supply: BTreeMap<&AreaCode, Supply<'_>> = BTreeMap::new();
    for trip in inputs
        .trips
        .iter()
        .filter(|t| t.days.runs_on(config.reference_day))
    {
        for visit in &trip.visits {
            let Some(area) = stop_area.get(&visit.stop_ref) else {
                continue;
            };
            let entry = supply.entry(*area).or_default();
            entry.stops.insert(visit.stop_ref.as_str());
            entry.routes.insert(&trip.route);
            entry.trips.insert(trip.trip_id.as_str());
        }
    }

    let empty_supply = Supply::default();
    let no_demographics = AreaDemographicInputs::default();
    let mut codes: Vec<&AreaCode> = inputs.areas.iter().map(|a| &a.code).collect();
    codes.sort();
    codes.dedup();

    codes
        .into_iter()
        .map(|code| {
            let s = supply.get(code).unwrap_or(&empty_supply);
            let demo = inputs.demographics.get(code).unwrap_or(&no_demographics);

            let mut classes = [0usize; 3];
            for stop in &s.stops {
                let slot = match stop_class.get(*stop).copied().unwrap_or_default() {
                    StopClass::Urban => 0,
                    StopClass::Rural => 1,
                    StopClass::Unclassified => 2,
                };
                classes[slot] += 1;
            }
            let split = urban_rural(classes[0], classes[1], classes[2], config.min_reliable_stops);

            let serving_headways: Vec<f64> = s
                .routes
                .iter()
                .filter_map(|r| headways.get(*r).copied())
                .collect();
            #[allow(clippy::cast_precision_loss)]
            let avg_headway_minutes = (!serving_headways.is_empty())
                .then(|| serving_headways.iter().sum::<f64>() / serving_headways.len() as f64);

            match demo.population {
                None => edge_cases.push(MetricEdgeCase::MissingPopulation {
                    area_code: code.clone(),
                }),
                Some(p) if p <= 0.0 => edge_cases.push(MetricEdgeCase::ZeroPopulation {
                    area_code: code.clone(),
                }),
                Some(_) => {}
            }
            if s.trips.is_empty() {
                edge_cases.push(MetricEdgeCase::NoService {
                    area_code: code.clone(),
                });
            }

            let coverage = coverage_score(s.stops.len(), demo.population, config.coverage_saturation);
            let equity = equity_index(coverage, demo.deprivation_decile, demo.car_free_pct);

            AreaMetrics {
                area_code: code.clone(),
                active_stops: s.stops.len(),
                routes_serving: s.routes.len(),
                total_daily_trips: s.trips.len(),
                avg_headway_minutes,
                coverage_score: coverage,
                equity_index: equity.map(|e| e.value),
                equity_low_confidence: equity.is_none_or(|e| e.low_confidence),
                urban_pct: split.urban_pct,
                rural_pct: split.rural_pct,
                urban_stops: split.urban,
                rural_stops: split.rural,
                unclassified_stops: split.unclassified,
                urban_rural_unreliable: split.unreliable,
                population: demo.population,
                deprivation_decile: demo.deprivation_decile,
                car_free_pct: demo.car_free_pct,
                demographic_match_confidence: demo.match_confidence,
            }
        })
        .collect()
}
