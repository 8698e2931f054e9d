//! Per-route statistics.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Weekday;
use serde::Serialize;
use transit_equity_dedup::CanonicalTrip;
use transit_equity_geography_models::LatLng;
use transit_equity_schedule_models::{Route, RouteKey};

use crate::{MetricEdgeCase, formulas::approximate_headway_minutes};

/// One row of the `routes` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetrics {
    /// Route identity.
    pub key: RouteKey,
    /// Published name.
    pub name: String,
    /// Ingestion batches the route was published in.
    pub regions: BTreeSet<String>,
    /// Length in km along the stop sequence of the route's longest trip.
    /// `None` when no trip has two located stops.
    pub length_km: Option<f64>,
    /// Trips running on the reference day.
    pub trips_per_day: usize,
    /// `1440 / trips_per_day` (uniform-day approximation).
    pub avg_headway_minutes: Option<f64>,
}

/// Computes route statistics for the reference day, in route key order.
pub fn route_metrics(
    routes: &[Route],
    trips: &[CanonicalTrip],
    stop_locations: &BTreeMap<String, LatLng>,
    reference_day: Weekday,
    edge_cases: &mut Vec<MetricEdgeCase>,
) -> Vec<RouteMetrics> {
    let mut daily: BTreeMap<&RouteKey, usize> = BTreeMap::new();
    let mut lengths: BTreeMap<&RouteKey, f64> = BTreeMap::new();
    for trip in trips {
        if trip.days.runs_on(reference_day) {
            *daily.entry(&trip.route).or_default() += 1;
        }
        if let Some(length) = trip_length_km(trip, stop_locations) {
            let longest = lengths.entry(&trip.route).or_insert(length);
            *longest = longest.max(length);
        }
    }

    let mut metrics: Vec<RouteMetrics> = routes
        .iter()
        .map(|route| {
            let trips_per_day = daily.get(&route.key).copied().unwrap_or(0);
            if trips_per_day == 0 {
                log::debug!("Route {} has no trips on {reference_day}", route.key);
                edge_cases.push(MetricEdgeCase::ZeroTrips {
                    route: route.key.clone(),
                });
            }
            RouteMetrics {
                key: route.key.clone(),
                name: route.name.clone(),
                regions: route.regions.clone(),
                length_km: lengths.get(&route.key).copied(),
                trips_per_day,
                avg_headway_minutes: approximate_headway_minutes(trips_per_day),
            }
        })
        .collect();
    metrics.sort_by(|a, b| a.key.cmp(&b.key));
    metrics
}

/// Haversine length along the located stops of a trip.
fn trip_length_km(trip: &CanonicalTrip, stop_locations: &BTreeMap<String, LatLng>) -> Option<f64> {
    let located: Vec<LatLng> = trip
        .visits
        .iter()
        .filter_map(|v| stop_locations.get(&v.stop_ref).copied())
        .collect();
    if located.len() < 2 {
        return None;
    }
    let metres: f64 = located.windows(2).map(|w| w[0].distance_m(&w[1])).sum();
    Some(metres / 1000.0)
}

#[cfg(test)]
mod tests {
    use transit_equity_schedule_models::{DaysOfWeek, ScheduledTime, StopVisit};

    use super::*;

    fn trip(id: &str, route: &RouteKey, days: DaysOfWeek, stops: &[&str]) -> CanonicalTrip {
        CanonicalTrip {
            trip_id: id.to_string(),
            route: route.clone(),
            days,
            visits: stops
                .iter()
                .zip(0u32..)
                .map(|(s, i)| StopVisit {
                    stop_ref: (*s).to_string(),
                    sequence: i,
                    scheduled_time: ScheduledTime::from_hms(8, i, 0),
                })
                .collect(),
        }
    }

    fn route(key: &RouteKey) -> Route {
        Route {
            key: key.clone(),
            name: format!("Route {}", key.route_id),
            regions: BTreeSet::from(["default".to_string()]),
        }
    }

    fn locations() -> BTreeMap<String, LatLng> {
        BTreeMap::from([
            ("S1".to_string(), LatLng::new(0.0, 0.0).unwrap()),
            ("S2".to_string(), LatLng::new(0.0, 0.01).unwrap()),
            ("S3".to_string(), LatLng::new(0.0, 0.02).unwrap()),
        ])
    }

    #[test]
    fn trips_per_day_and_headway() {
        let key = RouteKey::new("OPA", "1");
        let mut trips: Vec<CanonicalTrip> = (0..48)
            .map(|i| trip(&format!("t{i}"), &key, DaysOfWeek::WEEKDAYS, &["S1", "S2"]))
            .collect();
        trips.push(trip("sat", &key, DaysOfWeek::only(Weekday::Sat), &["S1", "S2"]));

        let mut edge = Vec::new();
        let metrics = route_metrics(&[route(&key)], &trips, &locations(), Weekday::Wed, &mut edge);
        assert_eq!(metrics[0].trips_per_day, 48);
        assert!((metrics[0].avg_headway_minutes.unwrap() - 30.0).abs() < 1e-9);
        assert!(edge.is_empty());
    }

    #[test]
    fn route_without_service_has_null_headway() {
        let key = RouteKey::new("OPA", "2");
        let trips = vec![trip("sun", &key, DaysOfWeek::only(Weekday::Sun), &["S1", "S2"])];
        let mut edge = Vec::new();
        let metrics = route_metrics(&[route(&key)], &trips, &locations(), Weekday::Wed, &mut edge);
        assert_eq!(metrics[0].trips_per_day, 0);
        assert_eq!(metrics[0].avg_headway_minutes, None);
        assert_eq!(edge, vec![MetricEdgeCase::ZeroTrips { route: key }]);
    }

    #[test]
    fn length_uses_longest_trip_and_skips_unlocated_stops() {
        let key = RouteKey::new("OPA", "3");
        let trips = vec![
            trip("short", &key, DaysOfWeek::EVERY_DAY, &["S1", "S2"]),
            trip("long", &key, DaysOfWeek::EVERY_DAY, &["S1", "UNKNOWN", "S2", "S3"]),
        ];
        let mut edge = Vec::new();
        let metrics = route_metrics(&[route(&key)], &trips, &locations(), Weekday::Wed, &mut edge);
        // 0.02° of longitude at the equator.
        assert!((metrics[0].length_km.unwrap() - 2.2239).abs() < 1e-3);

        let lone = vec![trip("lone", &key, DaysOfWeek::EVERY_DAY, &["S1", "UNKNOWN"])];
        let metrics = route_metrics(&[route(&key)], &lone, &locations(), Weekday::Wed, &mut edge);
        assert_eq!(metrics[0].length_km, None);
    }

    #[test]
    fn same_route_code_for_two_operators_is_two_rows() {
        let a = RouteKey::new("OPA", "1");
        let b = RouteKey::new("OPB", "1");
        let trips = vec![
            trip("a1", &a, DaysOfWeek::EVERY_DAY, &["S1", "S2"]),
            trip("b1", &b, DaysOfWeek::EVERY_DAY, &["S1", "S2"]),
            trip("b2", &b, DaysOfWeek::EVERY_DAY, &["S2", "S3"]),
        ];
        let mut edge = Vec::new();
        let metrics = route_metrics(&[route(&b), route(&a)], &trips, &locations(), Weekday::Wed, &mut edge);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].key, a);
        assert_eq!(metrics[0].trips_per_day, 1);
        assert_eq!(metrics[1].trips_per_day, 2);
    }
}
