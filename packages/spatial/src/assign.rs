//! Stop-to-area assignment.
//!
//! Every stop ends up either in exactly one area or explicitly unassigned.
//! Assignment looks only at coordinates; where a stop was collected from
//! plays no part.

use serde::Serialize;
use transit_equity_geography_models::{AreaAssignment, LatLng, MissReason, StopPoint};

use crate::BoundaryIndex;

/// A stop that could not be placed in any area.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialAssignmentMiss {
    /// Canonical stop id.
    pub stop_id: String,
    /// Why no area was found.
    pub reason: MissReason,
    /// Coordinates that were tried, if any.
    pub location: Option<LatLng>,
}

/// Effect of an assignment pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReport {
    /// Stops considered.
    pub total: usize,
    /// Stops that received an area (including snapped ones).
    pub assigned: usize,
    /// Stops assigned through the snap tolerance.
    pub snapped: usize,
    /// Stops left without an area.
    pub unassigned: usize,
    /// One entry per unassigned stop.
    pub misses: Vec<SpatialAssignmentMiss>,
}

impl AssignmentReport {
    /// Share of stops left unassigned; `0.0` when there are no stops.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn unassigned_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.unassigned as f64 / self.total as f64
    }
}

impl BoundaryIndex {
    /// Assigns a single location.
    ///
    /// Containment always wins. Snapping to a nearby polygon only happens
    /// when `max_snap_distance_m` is set.
    #[must_use]
    pub fn assign(
        &self,
        location: Option<LatLng>,
        max_snap_distance_m: Option<f64>,
    ) -> AreaAssignment {
        let Some(location) = location else {
            return AreaAssignment::Unassigned {
                reason: MissReason::NoCoordinates,
            };
        };
        if let Some(code) = self.lookup(location) {
            return AreaAssignment::Contained { area: code.clone() };
        }
        max_snap_distance_m
            .and_then(|max| self.nearest_within(location, max))
            .map_or(
                AreaAssignment::Unassigned {
                    reason: MissReason::OutsideAllAreas,
                },
                |(code, distance_m)| AreaAssignment::Snapped {
                    area: code.clone(),
                    distance_m,
                },
            )
    }
}

/// Assigns every stop, returning one assignment per stop (same order) and
/// the pass's report.
#[must_use]
pub fn assign_stops(
    index: &BoundaryIndex,
    stops: &[StopPoint],
    max_snap_distance_m: Option<f64>,
) -> (Vec<AreaAssignment>, AssignmentReport) {
    let mut report = AssignmentReport {
        total: stops.len(),
        ..AssignmentReport::default()
    };

    let assignments: Vec<AreaAssignment> = stops
        .iter()
        .map(|stop| {
            let assignment = index.assign(stop.location, max_snap_distance_m);
            match &assignment {
                AreaAssignment::Contained { .. } => report.assigned += 1,
                AreaAssignment::Snapped { area, distance_m } => {
                    log::debug!(
                        "Stop {} snapped to {area} ({distance_m:.1} m outside)",
                        stop.stop_id()
                    );
                    report.assigned += 1;
                    report.snapped += 1;
                }
                AreaAssignment::Unassigned { reason } => {
                    report.unassigned += 1;
                    report.misses.push(SpatialAssignmentMiss {
                        stop_id: stop.stop_id(),
                        reason: *reason,
                        location: stop.location,
                    });
                }
            }
            assignment
        })
        .collect();

    log::info!(
        "Assigned {} of {} stops to areas ({} snapped, {} unassigned)",
        report.assigned,
        report.total,
        report.snapped,
        report.unassigned
    );
    if report.unassigned > 0 {
        log::warn!(
            "{} stops are outside every area or lack coordinates",
            report.unassigned
        );
    }
    (assignments, report)
}

#[cfg(test)]
mod tests {
    use transit_equity_geography_models::{StopClass, StopIdentity};

    use super::*;
    use crate::test_support::dataset;

    fn stop(id: &str, location: Option<(f64, f64)>) -> StopPoint {
        StopPoint {
            identity: StopIdentity::Registry {
                stop_id: id.to_string(),
            },
            location: location.and_then(|(lat, lng)| LatLng::new(lat, lng)),
            name: None,
            class: StopClass::Unclassified,
        }
    }

    #[test]
    fn every_stop_gets_exactly_one_outcome() {
        let index = BoundaryIndex::new(&dataset());
        let stops = vec![
            stop("in-b", Some((0.5, 0.5))),
            stop("in-a", Some((0.5, 1.5))),
            stop("gap", Some((0.5, 2.5))),
            stop("nowhere", None),
        ];
        let (assignments, report) = assign_stops(&index, &stops, None);

        assert_eq!(assignments.len(), 4);
        assert_eq!(assignments[0].area().unwrap().as_str(), "B");
        assert_eq!(assignments[1].area().unwrap().as_str(), "A");
        assert_eq!(
            assignments[2],
            AreaAssignment::Unassigned {
                reason: MissReason::OutsideAllAreas
            }
        );
        assert_eq!(
            assignments[3],
            AreaAssignment::Unassigned {
                reason: MissReason::NoCoordinates
            }
        );

        assert_eq!(report.total, 4);
        assert_eq!(report.assigned, 2);
        assert_eq!(report.unassigned, 2);
        assert_eq!(report.misses[0].stop_id, "gap");
        assert!((report.unassigned_fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn snap_tolerance_is_opt_in() {
        let index = BoundaryIndex::new(&dataset());
        let near = Some(LatLng::new(0.5, 2.001).unwrap());
        assert!(matches!(
            index.assign(near, None),
            AreaAssignment::Unassigned { .. }
        ));
        match index.assign(near, Some(500.0)) {
            AreaAssignment::Snapped { area, distance_m } => {
                assert_eq!(area.as_str(), "A");
                assert!(distance_m < 500.0);
            }
            other => panic!("expected snap, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_has_zero_fraction() {
        let index = BoundaryIndex::new(&dataset());
        let (assignments, report) = assign_stops(&index, &[], Some(10.0));
        assert!(assignments.is_empty());
        assert!(report.unassigned_fraction().abs() < f64::EPSILON);
    }
}
