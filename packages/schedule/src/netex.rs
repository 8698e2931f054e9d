//! NeTEx parser.
//!
//! Reads the calls-based timetable profile: operators, scheduled stop
//! points, lines, day types, and service journeys whose `calls` carry
//! explicit arrival and departure times. Frames are not interpreted; all
//! entities are collected from anywhere in the delivery.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};
use transit_equity_schedule_models::{
    DaysOfWeek, DocumentRoute, DocumentStop, Operator, RouteKey, ScheduledTime, StopVisit, Trip,
};

use crate::{
    DialectOutput, ParseErrorKind,
    parsing::{day_set, parse_clock_time, parse_lat_lng},
    xml::{attr, child, child_text, children, descendants, path, path_text, text},
};

const SECONDS_PER_DAY: u32 = 86_400;

/// Parses a NeTEx `PublicationDelivery`.
///
/// # Errors
///
/// Returns a [`ParseErrorKind`] describing the first structural problem
/// found; the document is rejected as a whole.
pub fn parse(doc: &Document<'_>) -> Result<DialectOutput, ParseErrorKind> {
    let root = doc.root_element();

    let mut operators: Vec<Operator> = Vec::new();
    let mut operator_ids = BTreeMap::new();
    for node in descendants(root, "Operator") {
        let local = attr(node, "id").ok_or(ParseErrorKind::MissingElement {
            element: "Operator@id",
        })?;
        let id = child_text(node, "PublicCode").unwrap_or(local);
        let name = child_text(node, "Name").unwrap_or(id);
        operator_ids.insert(local, id.to_string());
        if !operators.iter().any(|o| o.id == id) {
            operators.push(Operator {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
    }
    let Some(default_operator) = operators.first().map(|o| o.id.clone()) else {
        return Err(ParseErrorKind::MissingElement {
            element: "Operator",
        });
    };

    let mut stops: Vec<DocumentStop> = Vec::new();
    let mut stop_ids = BTreeMap::new();
    for node in descendants(root, "ScheduledStopPoint") {
        let local = attr(node, "id").ok_or(ParseErrorKind::MissingElement {
            element: "ScheduledStopPoint@id",
        })?;
        let native_id = child_text(node, "PrivateCode").unwrap_or(local);
        let location = parse_lat_lng(
            path_text(node, &["Location", "Latitude"]),
            path_text(node, &["Location", "Longitude"]),
        )
        .map_err(|value| ParseErrorKind::InvalidValue {
            field: "stop coordinates",
            value,
        })?;
        stop_ids.insert(local, native_id.to_string());
        if !stops.iter().any(|s| s.native_id == native_id) {
            stops.push(DocumentStop {
                native_id: native_id.to_string(),
                name: child_text(node, "Name").map(str::to_string),
                location,
            });
        }
    }

    let mut routes: Vec<DocumentRoute> = Vec::new();
    let mut lines: BTreeMap<&str, (String, String)> = BTreeMap::new();
    for node in descendants(root, "Line") {
        let local = attr(node, "id").ok_or(ParseErrorKind::MissingElement {
            element: "Line@id",
        })?;
        let native = child_text(node, "PublicCode").unwrap_or(local);
        let name = child_text(node, "Name").unwrap_or(native);
        let operator_id = resolve_operator(&operator_ids, node, || format!("Line '{local}'"))?
            .unwrap_or_else(|| default_operator.clone());
        push_route(&mut routes, RouteKey::new(operator_id.clone(), native), name);
        lines.insert(local, (operator_id, native.to_string()));
    }

    let mut day_types: BTreeMap<&str, DaysOfWeek> = BTreeMap::new();
    for node in descendants(root, "DayType") {
        let local = attr(node, "id").ok_or(ParseErrorKind::MissingElement {
            element: "DayType@id",
        })?;
        day_types.insert(local, day_type_days(node)?);
    }

    let mut trips = Vec::new();
    for journey in descendants(root, "ServiceJourney") {
        let id = attr(journey, "id").ok_or(ParseErrorKind::MissingElement {
            element: "ServiceJourney@id",
        })?;
        let from = || format!("ServiceJourney '{id}'");

        let line_ref = child(journey, "LineRef")
            .and_then(|r| attr(r, "ref"))
            .ok_or(ParseErrorKind::MissingElement {
                element: "ServiceJourney/LineRef",
            })?;
        let (line_operator, native_route) =
            lines
                .get(line_ref)
                .ok_or_else(|| ParseErrorKind::DanglingReference {
                    from: from(),
                    target: "line",
                    reference: line_ref.to_string(),
                })?;
        let operator_id =
            resolve_operator(&operator_ids, journey, from)?.unwrap_or_else(|| line_operator.clone());
        let route = RouteKey::new(operator_id, native_route.clone());
        if !routes.iter().any(|r| r.key == route) {
            let name = routes
                .iter()
                .find(|r| r.key.route_id == *native_route && r.key.operator_id == *line_operator)
                .map_or_else(|| native_route.clone(), |r| r.name.clone());
            push_route(&mut routes, route.clone(), &name);
        }

        let mut days = DaysOfWeek::NONE;
        let mut any_day_type = false;
        for r in path(journey, &["dayTypes"])
            .into_iter()
            .flat_map(|n| children(n, "DayTypeRef"))
            .filter_map(|n| attr(n, "ref"))
        {
            let set = day_types
                .get(r)
                .ok_or_else(|| ParseErrorKind::DanglingReference {
                    from: from(),
                    target: "day type",
                    reference: r.to_string(),
                })?;
            days = days.union(*set);
            any_day_type = true;
        }
        if !any_day_type {
            days = DaysOfWeek::EVERY_DAY;
        }

        let visits = parse_calls(journey, &stop_ids, &from)?;
        if visits.len() < 2 {
            return Err(ParseErrorKind::TooFewVisits {
                trip: id.to_string(),
                visits: visits.len(),
            });
        }

        trips.push(Trip {
            native_id: id.to_string(),
            route,
            days,
            visits,
        });
    }

    Ok(DialectOutput {
        operators,
        stops,
        routes,
        trips,
    })
}

/// Resolves an optional `OperatorRef@ref` child to an operator id.
fn resolve_operator(
    operator_ids: &BTreeMap<&str, String>,
    node: Node<'_, '_>,
    from: impl FnOnce() -> String,
) -> Result<Option<String>, ParseErrorKind> {
    let Some(r) = child(node, "OperatorRef").and_then(|r| attr(r, "ref")) else {
        return Ok(None);
    };
    operator_ids
        .get(r)
        .cloned()
        .map(Some)
        .ok_or_else(|| ParseErrorKind::DanglingReference {
            from: from(),
            target: "operator",
            reference: r.to_string(),
        })
}

fn push_route(routes: &mut Vec<DocumentRoute>, key: RouteKey, name: &str) {
    if !routes.iter().any(|r| r.key == key) {
        routes.push(DocumentRoute {
            key,
            name: name.to_string(),
        });
    }
}

fn day_type_days(node: Node<'_, '_>) -> Result<DaysOfWeek, ParseErrorKind> {
    let mut found = false;
    let mut days = DaysOfWeek::NONE;
    for value in descendants(node, "DaysOfWeek").filter_map(text) {
        found = true;
        for token in value.split_whitespace() {
            let set = day_set(token).ok_or_else(|| ParseErrorKind::InvalidValue {
                field: "DaysOfWeek",
                value: token.to_string(),
            })?;
            days = days.union(set);
        }
    }
    Ok(if found { days } else { DaysOfWeek::EVERY_DAY })
}

/// Reads `calls/Call` in `@order` (document order when absent).
fn parse_calls(
    journey: Node<'_, '_>,
    stop_ids: &BTreeMap<&str, String>,
    from: &dyn Fn() -> String,
) -> Result<Vec<StopVisit>, ParseErrorKind> {
    let mut calls = Vec::new();
    for (position, call) in path(journey, &["calls"])
        .into_iter()
        .flat_map(|n| children(n, "Call"))
        .enumerate()
    {
        let order = match attr(call, "order") {
            Some(o) => o.parse::<u32>().map_err(|_| ParseErrorKind::InvalidValue {
                field: "Call@order",
                value: o.to_string(),
            })?,
            None => u32::try_from(position).unwrap_or(u32::MAX),
        };

        let stop_ref = child(call, "ScheduledStopPointRef")
            .and_then(|r| attr(r, "ref"))
            .ok_or(ParseErrorKind::MissingElement {
                element: "Call/ScheduledStopPointRef",
            })?;
        let native = stop_ids
            .get(stop_ref)
            .ok_or_else(|| ParseErrorKind::DanglingReference {
                from: from(),
                target: "scheduled stop point",
                reference: stop_ref.to_string(),
            })?;

        let time = call_time(call, "Departure")?
            .or(call_time(call, "Arrival")?)
            .ok_or(ParseErrorKind::MissingElement {
                element: "Call/Departure/Time",
            })?;

        calls.push((order, native.clone(), time));
    }

    calls.sort_by_key(|(order, _, _)| *order);
    Ok(calls
        .into_iter()
        .enumerate()
        .map(|(i, (_, stop_ref, scheduled_time))| StopVisit {
            stop_ref,
            sequence: u32::try_from(i).unwrap_or(u32::MAX),
            scheduled_time,
        })
        .collect())
}

fn call_time(call: Node<'_, '_>, which: &str) -> Result<Option<ScheduledTime>, ParseErrorKind> {
    let Some(node) = child(call, which) else {
        return Ok(None);
    };
    let Some(text) = child_text(node, "Time") else {
        return Ok(None);
    };
    let time = parse_clock_time(text).ok_or_else(|| ParseErrorKind::InvalidValue {
        field: "Call time",
        value: text.to_string(),
    })?;
    let offset = match child_text(node, "DayOffset") {
        Some(o) => o.parse::<u32>().map_err(|_| ParseErrorKind::InvalidValue {
            field: "DayOffset",
            value: o.to_string(),
        })?,
        None => 0,
    };
    Ok(Some(time.plus(offset.saturating_mul(SECONDS_PER_DAY))))
}
