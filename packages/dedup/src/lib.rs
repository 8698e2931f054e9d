#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Duplicate resolution across ingestion batches.
//!
//! The same operator document is often collected into several batches.
//! Documents are grouped by content identity (primary operator + content
//! hash) before any entity is merged, so a document present in N batches
//! contributes its stops, routes and trips exactly once. Precedence is
//! always (batch ordinal, path): the lowest wins.
//!
//! Stop identities are derived from (operator, content hash, native id) and
//! then reconciled against the stop registry; batch and folder names never
//! take part in identity.

pub mod report;

use std::collections::{BTreeMap, BTreeSet, btree_map::Entry};

use serde::Serialize;
use transit_equity_geography::StopRegistry;
use transit_equity_geography_models::{LatLng, StopClass, StopIdentity, StopPoint};
use transit_equity_schedule_models::{
    DaysOfWeek, Operator, ParsedDocument, Route, RouteKey, StopVisit,
};

pub use report::{DedupReport, DocumentVersion, DuplicateConflict, DuplicateDocument};

/// Inline coordinates further apart than this are a conflict.
pub const STOP_LOCATION_TOLERANCE_M: f64 = 25.0;

/// Length of the content-hash prefix embedded in canonical trip ids.
const HASH_PREFIX_LEN: usize = 12;

/// A trip after resolution. Visit `stop_ref`s hold canonical stop ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTrip {
    /// `operator:hash-prefix:native-id`.
    pub trip_id: String,
    /// Route identity.
    pub route: RouteKey,
    /// Regular days of operation.
    pub days: DaysOfWeek,
    /// Ordered visits.
    pub visits: Vec<StopVisit>,
}

/// The deduplicated entity set.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDataset {
    /// Operators in id order.
    pub operators: Vec<Operator>,
    /// Stops in canonical id order.
    pub stops: Vec<StopPoint>,
    /// Routes in key order.
    pub routes: Vec<Route>,
    /// Trips in trip id order.
    pub trips: Vec<CanonicalTrip>,
}

struct StopAccumulator {
    point: StopPoint,
    inline: Option<(LatLng, String)>,
}

/// Collapses duplicate documents and merges their entities.
#[must_use]
pub fn resolve_duplicates(
    documents: &[ParsedDocument],
    registry: &StopRegistry,
) -> (ResolvedDataset, DedupReport) {
    let mut report = DedupReport {
        documents_in: documents.len(),
        ..DedupReport::default()
    };

    let kept = select_documents(documents, &mut report);
    report.documents_kept = kept.len();

    let mut operators: BTreeMap<String, Operator> = BTreeMap::new();
    let mut stops: BTreeMap<String, StopAccumulator> = BTreeMap::new();
    let mut routes: BTreeMap<RouteKey, (Route, String)> = BTreeMap::new();
    let mut trips: BTreeMap<String, CanonicalTrip> = BTreeMap::new();

    for (doc, batches) in &kept {
        let operator_id = doc.primary_operator_id();
        let hash = doc.meta.content_hash.as_str();
        let identity_of = |native: &str| stop_identity(registry, operator_id, hash, native);

        for op in &doc.operators {
            operators.entry(op.id.clone()).or_insert_with(|| op.clone());
        }

        let mut local_ids: BTreeMap<&str, String> = BTreeMap::new();
        for stop in &doc.stops {
            let identity = identity_of(&stop.native_id);
            let id = identity.canonical_id();
            local_ids.insert(stop.native_id.as_str(), id.clone());

            match stops.entry(id) {
                Entry::Vacant(e) => {
                    let registry_stop = registry.get(&stop.native_id);
                    let name = registry_stop
                        .map(|r| r.name.clone())
                        .filter(|n| !n.is_empty())
                        .or_else(|| stop.name.clone());
                    e.insert(StopAccumulator {
                        point: StopPoint {
                            identity,
                            location: registry_stop.map(|r| r.location).or(stop.location),
                            name,
                            class: registry_stop.map_or(StopClass::Unclassified, |r| r.class),
                        },
                        inline: stop.location.map(|l| (l, doc.meta.path.clone())),
                    });
                }
                Entry::Occupied(mut e) => {
                    let stop_id = e.key().clone();
                    let acc = e.get_mut();
                    if acc.point.name.is_none() {
                        acc.point.name.clone_from(&stop.name);
                    }
                    let Some(location) = stop.location else {
                        continue;
                    };
                    match &acc.inline {
                        Some((kept, kept_document)) => {
                            let distance_m = kept.distance_m(&location);
                            if distance_m > STOP_LOCATION_TOLERANCE_M {
                                report.conflicts.push(DuplicateConflict::StopLocation {
                                    stop_id,
                                    kept: *kept,
                                    kept_document: kept_document.clone(),
                                    other: location,
                                    other_document: doc.meta.path.clone(),
                                    distance_m,
                                });
                            }
                        }
                        None => {
                            acc.point.location = acc.point.location.or(Some(location));
                            acc.inline = Some((location, doc.meta.path.clone()));
                        }
                    }
                }
            }
        }

        for route in &doc.routes {
            merge_route(
                &mut routes,
                &route.key,
                &route.name,
                batches,
                &doc.meta.path,
                &mut report,
            );
        }

        for trip in &doc.trips {
            let trip_id = format!(
                "{operator_id}:{}:{}",
                hash.get(..HASH_PREFIX_LEN).unwrap_or(hash),
                trip.native_id
            );
            if trips.contains_key(&trip_id) {
                log::debug!("{}: duplicate trip {}", doc.meta.path, trip.native_id);
                continue;
            }
            if !routes.contains_key(&trip.route) {
                let name = trip.route.route_id.clone();
                merge_route(&mut routes, &trip.route, &name, batches, &doc.meta.path, &mut report);
            }

            let visits = trip
                .visits
                .iter()
                .map(|v| StopVisit {
                    stop_ref: local_ids
                        .get(v.stop_ref.as_str())
                        .cloned()
                        .unwrap_or_else(|| identity_of(&v.stop_ref).canonical_id()),
                    sequence: v.sequence,
                    scheduled_time: v.scheduled_time,
                })
                .collect();
            trips.insert(
                trip_id.clone(),
                CanonicalTrip {
                    trip_id,
                    route: trip.route.clone(),
                    days: trip.days,
                    visits,
                },
            );
        }
    }

    let stop_entries: usize = documents.iter().map(|d| d.stops.len()).sum();
    let trip_entries: usize = documents.iter().map(|d| d.trips.len()).sum();
    report.stops_removed = stop_entries.saturating_sub(stops.len());
    report.trips_removed = trip_entries.saturating_sub(trips.len());

    for conflict in &report.conflicts {
        log::warn!("Duplicate conflict ({}): {conflict:?}", conflict.kind());
    }
    log::info!(
        "Duplicate resolution: {} of {} documents kept ({} identical copies, {} superseded), \
         {} stops and {} trips removed, {} conflicts",
        report.documents_kept,
        report.documents_in,
        report.duplicate_documents,
        report.superseded_documents,
        report.stops_removed,
        report.trips_removed,
        report.conflicts.len()
    );

    let dataset = ResolvedDataset {
        operators: operators.into_values().collect(),
        stops: stops.into_values().map(|acc| acc.point).collect(),
        routes: routes.into_values().map(|(route, _)| route).collect(),
        trips: trips.into_values().collect(),
    };
    (dataset, report)
}

/// Picks the canonical documents, in precedence order, each with every
/// batch its identical copies were found in.
fn select_documents<'a>(
    documents: &'a [ParsedDocument],
    report: &mut DedupReport,
) -> Vec<(&'a ParsedDocument, BTreeSet<String>)> {
    let mut ordered: Vec<&ParsedDocument> = documents.iter().collect();
    ordered.sort_by(|a, b| a.meta.precedence().cmp(&b.meta.precedence()));

    let mut by_content: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    let mut unique: Vec<(&ParsedDocument, BTreeSet<String>)> = Vec::new();
    for doc in ordered {
        let key = (doc.primary_operator_id(), doc.meta.content_hash.as_str());
        if let Some(&i) = by_content.get(&key) {
            let (canonical, batches) = &mut unique[i];
            log::debug!(
                "{} is an identical copy of {}",
                doc.meta.path,
                canonical.meta.path
            );
            batches.insert(doc.meta.batch.clone());
            report.duplicate_documents += 1;
            report.duplicates.push(DuplicateDocument {
                path: doc.meta.path.clone(),
                canonical_path: canonical.meta.path.clone(),
            });
            continue;
        }
        by_content.insert(key, unique.len());
        unique.push((doc, BTreeSet::from([doc.meta.batch.clone()])));
    }

    let mut by_name: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    let mut kept: Vec<(&ParsedDocument, BTreeSet<String>)> = Vec::new();
    for (doc, batches) in unique {
        let key = (doc.primary_operator_id(), doc.meta.file_name.as_str());
        if let Some(&i) = by_name.get(&key) {
            let winner = kept[i].0;
            report.superseded_documents += 1;
            report.conflicts.push(DuplicateConflict::DocumentVersion {
                operator_id: key.0.to_string(),
                file_name: key.1.to_string(),
                kept: version_of(winner),
                superseded: version_of(doc),
            });
            continue;
        }
        by_name.insert(key, kept.len());
        kept.push((doc, batches));
    }
    kept
}

fn version_of(doc: &ParsedDocument) -> DocumentVersion {
    DocumentVersion {
        path: doc.meta.path.clone(),
        batch: doc.meta.batch.clone(),
        content_hash: doc.meta.content_hash.clone(),
        trips: doc.trips.len(),
    }
}

fn stop_identity(
    registry: &StopRegistry,
    operator_id: &str,
    content_hash: &str,
    native_id: &str,
) -> StopIdentity {
    if registry.get(native_id).is_some() {
        StopIdentity::Registry {
            stop_id: native_id.to_string(),
        }
    } else {
        StopIdentity::Inferred {
            operator_id: operator_id.to_string(),
            content_hash: content_hash.to_string(),
            native_id: native_id.to_string(),
        }
    }
}

/// Merges one published route. The first name seen (lowest precedence)
/// wins; a different name later is a conflict, reported once per name.
fn merge_route(
    routes: &mut BTreeMap<RouteKey, (Route, String)>,
    key: &RouteKey,
    name: &str,
    batches: &BTreeSet<String>,
    document: &str,
    report: &mut DedupReport,
) {
    match routes.entry(key.clone()) {
        Entry::Vacant(e) => {
            e.insert((
                Route {
                    key: key.clone(),
                    name: name.to_string(),
                    regions: batches.clone(),
                },
                document.to_string(),
            ));
        }
        Entry::Occupied(mut e) => {
            let (route, _) = e.get_mut();
            route.regions.extend(batches.iter().cloned());
            if route.name == name {
                return;
            }
            let seen = report.conflicts.iter().any(|c| {
                matches!(c, DuplicateConflict::RouteName { route: r, other_name, .. }
                    if r == key && other_name == name)
            });
            if !seen {
                report.conflicts.push(DuplicateConflict::RouteName {
                    route: key.clone(),
                    kept_name: route.name.clone(),
                    other_name: name.to_string(),
                    other_document: document.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use transit_equity_geography_models::RegistryStop;
    use transit_equity_schedule_models::{
        Dialect, DocumentMeta, DocumentRoute, DocumentStop, ScheduledTime, Trip,
    };

    use super::*;

    fn doc(batch_ordinal: usize, batch: &str, file: &str, op: &str, hash: &str) -> ParsedDocument {
        let stop = |id: &str, lat: f64| DocumentStop {
            native_id: id.to_string(),
            name: Some(format!("{id} doc name")),
            location: LatLng::new(lat, -2.0),
        };
        let visit = |stop: &str, seq: u32| StopVisit {
            stop_ref: stop.to_string(),
            sequence: seq,
            scheduled_time: ScheduledTime::from_hms(7, seq, 0),
        };
        let route = RouteKey::new(op, "1");
        ParsedDocument {
            meta: DocumentMeta {
                path: format!("{batch}/{file}"),
                batch: batch.to_string(),
                batch_ordinal,
                file_name: file.to_string(),
                content_hash: hash.to_string(),
                size_bytes: 10,
            },
            dialect: Dialect::TransXChange,
            operators: vec![Operator {
                id: op.to_string(),
                name: format!("Operator {op}"),
            }],
            stops: vec![stop("REG1", 53.0), stop("LOCAL1", 53.1)],
            routes: vec![DocumentRoute {
                key: route.clone(),
                name: "Circular".to_string(),
            }],
            trips: vec![Trip {
                native_id: "VJ1".to_string(),
                route,
                days: DaysOfWeek::WEEKDAYS,
                visits: vec![visit("REG1", 0), visit("LOCAL1", 1)],
            }],
        }
    }

    fn registry() -> StopRegistry {
        StopRegistry::from_stops([RegistryStop {
            stop_id: "REG1".to_string(),
            location: LatLng::new(52.0, -1.0).unwrap(),
            name: "Registry Name".to_string(),
            class: StopClass::Urban,
        }])
    }

    #[test]
    fn identical_copies_in_many_batches_contribute_once() {
        let docs = vec![
            doc(1, "region-2", "opa.xml", "OPA", "aaaa"),
            doc(0, "region-1", "opa.xml", "OPA", "aaaa"),
            doc(2, "region-3", "copy.xml", "OPA", "aaaa"),
        ];
        let (data, report) = resolve_duplicates(&docs, &registry());

        assert_eq!(report.documents_in, 3);
        assert_eq!(report.documents_kept, 1);
        assert_eq!(report.duplicate_documents, 2);
        assert_eq!(report.duplicates[0].canonical_path, "region-1/opa.xml");
        assert!(report.conflicts.is_empty());

        assert_eq!(data.stops.len(), 2);
        assert_eq!(data.trips.len(), 1);
        assert_eq!(data.routes.len(), 1);
        assert_eq!(report.stops_removed, 4);
        assert_eq!(report.trips_removed, 2);

        let regions: Vec<&str> = data.routes[0].regions.iter().map(String::as_str).collect();
        assert_eq!(regions, vec!["region-1", "region-2", "region-3"]);
    }

    #[test]
    fn registry_reconciliation_uses_registry_values() {
        let docs = vec![doc(0, "b", "opa.xml", "OPA", "0123456789abcdef")];
        let (data, _) = resolve_duplicates(&docs, &registry());

        let reg = data.stops.iter().find(|s| s.stop_id() == "REG1").unwrap();
        assert!((reg.location.unwrap().latitude - 52.0).abs() < f64::EPSILON);
        assert_eq!(reg.name.as_deref(), Some("Registry Name"));
        assert_eq!(reg.class, StopClass::Urban);

        let local = data
            .stops
            .iter()
            .find(|s| matches!(s.identity, StopIdentity::Inferred { .. }))
            .unwrap();
        assert_eq!(local.stop_id(), "OPA:0123456789ab:LOCAL1");

        let trip = &data.trips[0];
        assert_eq!(trip.trip_id, "OPA:0123456789ab:VJ1");
        assert_eq!(trip.visits[0].stop_ref, "REG1");
        assert_eq!(trip.visits[1].stop_ref, "OPA:0123456789ab:LOCAL1");
    }

    #[test]
    fn same_native_route_for_two_operators_stays_distinct() {
        let docs = vec![
            doc(0, "b", "opa.xml", "OPA", "aaaa"),
            doc(0, "b", "opb.xml", "OPB", "bbbb"),
        ];
        let (data, report) = resolve_duplicates(&docs, &registry());
        let keys: Vec<String> = data.routes.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["OPA/1", "OPB/1"]);
        assert_eq!(data.trips.len(), 2);
        assert_eq!(report.documents_kept, 2);
    }

    #[test]
    fn differing_versions_are_a_conflict() {
        let mut newer = doc(1, "region-2", "opa.xml", "OPA", "bbbb");
        newer.trips.push(Trip {
            native_id: "VJ2".to_string(),
            ..newer.trips[0].clone()
        });
        let docs = vec![doc(0, "region-1", "opa.xml", "OPA", "aaaa"), newer];
        let (data, report) = resolve_duplicates(&docs, &registry());

        assert_eq!(report.superseded_documents, 1);
        assert_eq!(data.trips.len(), 1);
        match &report.conflicts[0] {
            DuplicateConflict::DocumentVersion {
                kept, superseded, ..
            } => {
                assert_eq!(kept.batch, "region-1");
                assert_eq!(kept.trips, 1);
                assert_eq!(superseded.batch, "region-2");
                assert_eq!(superseded.trips, 2);
            }
            other => panic!("unexpected conflict {other:?}"),
        }
    }

    #[test]
    fn distant_inline_coordinates_conflict() {
        let a = doc(0, "b", "a.xml", "OPA", "aaaa");
        let mut b = doc(0, "b", "b.xml", "OPA", "bbbb");
        // Same registry stop, different inline coordinates (~11 km apart).
        b.stops[0].location = LatLng::new(53.1, -2.0);
        let (data, report) = resolve_duplicates(&[a, b], &registry());

        assert_eq!(data.stops.iter().filter(|s| s.stop_id() == "REG1").count(), 1);
        let conflict = report
            .conflicts
            .iter()
            .find(|c| matches!(c, DuplicateConflict::StopLocation { .. }))
            .unwrap();
        match conflict {
            DuplicateConflict::StopLocation {
                stop_id,
                distance_m,
                kept_document,
                ..
            } => {
                assert_eq!(stop_id, "REG1");
                assert_eq!(kept_document, "b/a.xml");
                assert!(*distance_m > 10_000.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn route_name_disagreement_is_reported_once() {
        let a = doc(0, "b", "a.xml", "OPA", "aaaa");
        let mut b = doc(0, "b", "b.xml", "OPA", "bbbb");
        b.routes[0].name = "Express".to_string();
        let mut c = doc(0, "b", "c.xml", "OPA", "cccc");
        c.routes[0].name = "Express".to_string();
        let (data, report) = resolve_duplicates(&[a, b, c], &registry());

        assert_eq!(data.routes[0].name, "Circular");
        let names: Vec<&DuplicateConflict> = report
            .conflicts
            .iter()
            .filter(|c| c.kind() == "route_name")
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn duplicate_trip_within_document_is_dropped() {
        let mut d = doc(0, "b", "a.xml", "OPA", "aaaa");
        d.trips.push(d.trips[0].clone());
        let (data, report) = resolve_duplicates(&[d], &registry());
        assert_eq!(data.trips.len(), 1);
        assert_eq!(report.trips_removed, 1);
    }
}
