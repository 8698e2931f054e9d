//! TransXChange parser.
//!
//! Handles the subset of TransXChange used for registered bus services:
//! operators, stop points, journey pattern sections with run and wait
//! times, services with lines and standard journey patterns, and vehicle
//! journeys. Stop visit times are derived by accumulating run and wait
//! times from the journey's departure time.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::{Document, Node};
use transit_equity_schedule_models::{
    DaysOfWeek, DocumentRoute, DocumentStop, Operator, RouteKey, ScheduledTime, StopVisit, Trip,
};

use crate::{
    DialectOutput, ParseErrorKind,
    parsing::{day_set, parse_clock_time, parse_iso_duration, parse_lat_lng},
    xml::{attr, child, child_text, children, elements, path, path_text, text},
};

struct TimingLink {
    from: String,
    to: String,
    run_seconds: u32,
    from_wait: u32,
    to_wait: u32,
}

struct ServiceDef {
    days: Option<DaysOfWeek>,
    /// Line id attribute -> route key.
    lines: BTreeMap<String, RouteKey>,
    /// Journey pattern id -> referenced section ids, in order.
    patterns: BTreeMap<String, Vec<String>>,
}

/// Parses a TransXChange document.
///
/// # Errors
///
/// Returns a [`ParseErrorKind`] describing the first structural problem
/// found; the document is rejected as a whole.
pub fn parse(doc: &Document<'_>) -> Result<DialectOutput, ParseErrorKind> {
    let root = doc.root_element();

    let (operators, operator_refs) = parse_operators(root)?;
    let stops = parse_stops(root)?;
    let known_stops: BTreeSet<&str> = stops.iter().map(|s| s.native_id.as_str()).collect();
    let sections = parse_sections(root, &known_stops)?;

    let mut routes: Vec<DocumentRoute> = Vec::new();
    let mut services: BTreeMap<String, ServiceDef> = BTreeMap::new();
    let default_operator = operators[0].id.clone();

    for service in child(root, "Services")
        .into_iter()
        .flat_map(|n| children(n, "Service"))
    {
        let code = child_text(service, "ServiceCode").ok_or(ParseErrorKind::MissingElement {
            element: "Service/ServiceCode",
        })?;

        let operator_id = match child_text(service, "RegisteredOperatorRef") {
            Some(r) => operator_refs
                .get(r)
                .cloned()
                .ok_or_else(|| ParseErrorKind::DanglingReference {
                    from: format!("Service '{code}'"),
                    target: "operator",
                    reference: r.to_string(),
                })?,
            None => default_operator.clone(),
        };

        let description = child_text(service, "Description");
        let mut lines = BTreeMap::new();
        for line in child(service, "Lines")
            .into_iter()
            .flat_map(|n| children(n, "Line"))
        {
            let line_name = child_text(line, "LineName").ok_or(ParseErrorKind::MissingElement {
                element: "Line/LineName",
            })?;
            let line_id = attr(line, "id").unwrap_or(line_name);
            let key = RouteKey::new(operator_id.clone(), line_name);
            if !routes.iter().any(|r| r.key == key) {
                routes.push(DocumentRoute {
                    key: key.clone(),
                    name: description.unwrap_or(line_name).to_string(),
                });
            }
            lines.insert(line_id.to_string(), key);
        }
        if lines.is_empty() {
            return Err(ParseErrorKind::MissingElement {
                element: "Service/Lines/Line",
            });
        }

        let mut patterns = BTreeMap::new();
        for pattern in path(service, &["StandardService"])
            .into_iter()
            .flat_map(|n| children(n, "JourneyPattern"))
        {
            let id = attr(pattern, "id").ok_or(ParseErrorKind::MissingElement {
                element: "JourneyPattern@id",
            })?;
            let mut refs = Vec::new();
            for r in children(pattern, "JourneyPatternSectionRefs") {
                let Some(section_id) = text(r) else {
                    continue;
                };
                if !sections.contains_key(section_id) {
                    return Err(ParseErrorKind::DanglingReference {
                        from: format!("JourneyPattern '{id}'"),
                        target: "journey pattern section",
                        reference: section_id.to_string(),
                    });
                }
                refs.push(section_id.to_string());
            }
            patterns.insert(id.to_string(), refs);
        }

        let days = child(service, "OperatingProfile")
            .map(operating_profile)
            .transpose()?;

        services.insert(
            code.to_string(),
            ServiceDef {
                days,
                lines,
                patterns,
            },
        );
    }

    let mut trips = Vec::new();
    for journey in child(root, "VehicleJourneys")
        .into_iter()
        .flat_map(|n| children(n, "VehicleJourney"))
    {
        trips.push(parse_journey(journey, &services, &sections)?);
    }

    Ok(DialectOutput {
        operators,
        stops,
        routes,
        trips,
    })
}

/// Returns the declared operators plus a map from each operator's local
/// `id` attribute to its resolved operator id.
fn parse_operators(
    root: Node<'_, '_>,
) -> Result<(Vec<Operator>, BTreeMap<String, String>), ParseErrorKind> {
    let mut operators = Vec::new();
    let mut refs = BTreeMap::new();

    for node in child(root, "Operators")
        .into_iter()
        .flat_map(elements)
        .filter(|n| matches!(n.tag_name().name(), "Operator" | "LicensedOperator"))
    {
        let local_id = attr(node, "id");
        let id = child_text(node, "NationalOperatorCode")
            .or_else(|| child_text(node, "OperatorCode"))
            .or(local_id)
            .ok_or(ParseErrorKind::MissingElement {
                element: "Operator/OperatorCode",
            })?;
        let name = child_text(node, "OperatorShortName")
            .or_else(|| child_text(node, "TradingName"))
            .or_else(|| child_text(node, "OperatorNameOnLicence"))
            .unwrap_or(id);

        refs.insert(local_id.unwrap_or(id).to_string(), id.to_string());
        if !operators.iter().any(|o: &Operator| o.id == id) {
            operators.push(Operator {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
    }

    if operators.is_empty() {
        return Err(ParseErrorKind::MissingElement {
            element: "Operators/Operator",
        });
    }
    Ok((operators, refs))
}

fn parse_stops(root: Node<'_, '_>) -> Result<Vec<DocumentStop>, ParseErrorKind> {
    let mut stops: Vec<DocumentStop> = Vec::new();

    for node in child(root, "StopPoints").into_iter().flat_map(elements) {
        let (native_id, name, location_node) = match node.tag_name().name() {
            "AnnotatedStopPointRef" => (
                child_text(node, "StopPointRef"),
                child_text(node, "CommonName"),
                child(node, "Location"),
            ),
            "StopPoint" => (
                child_text(node, "AtcoCode"),
                path_text(node, &["Descriptor", "CommonName"]),
                path(node, &["Place", "Location"]),
            ),
            _ => continue,
        };
        let native_id = native_id.ok_or(ParseErrorKind::MissingElement {
            element: "StopPoints/StopPointRef",
        })?;

        let location = match location_node {
            Some(loc) => {
                let coords = child(loc, "Translation").unwrap_or(loc);
                parse_lat_lng(
                    child_text(coords, "Latitude"),
                    child_text(coords, "Longitude"),
                )
                .map_err(|value| ParseErrorKind::InvalidValue {
                    field: "stop coordinates",
                    value,
                })?
            }
            None => None,
        };

        if stops.iter().any(|s| s.native_id == native_id) {
            continue;
        }
        stops.push(DocumentStop {
            native_id: native_id.to_string(),
            name: name.map(str::to_string),
            location,
        });
    }

    Ok(stops)
}

fn parse_sections(
    root: Node<'_, '_>,
    known_stops: &BTreeSet<&str>,
) -> Result<BTreeMap<String, Vec<TimingLink>>, ParseErrorKind> {
    let mut sections = BTreeMap::new();

    for section in child(root, "JourneyPatternSections")
        .into_iter()
        .flat_map(|n| children(n, "JourneyPatternSection"))
    {
        let id = attr(section, "id").ok_or(ParseErrorKind::MissingElement {
            element: "JourneyPatternSection@id",
        })?;

        let mut links = Vec::new();
        for link in children(section, "JourneyPatternTimingLink") {
            let stop_ref = |end: &str| -> Result<String, ParseErrorKind> {
                let r = path_text(link, &[end, "StopPointRef"]).ok_or(
                    ParseErrorKind::MissingElement {
                        element: "JourneyPatternTimingLink/StopPointRef",
                    },
                )?;
                if !known_stops.contains(r) {
                    return Err(ParseErrorKind::DanglingReference {
                        from: format!("JourneyPatternSection '{id}'"),
                        target: "stop point",
                        reference: r.to_string(),
                    });
                }
                Ok(r.to_string())
            };

            let run = child_text(link, "RunTime").ok_or(ParseErrorKind::MissingElement {
                element: "JourneyPatternTimingLink/RunTime",
            })?;
            links.push(TimingLink {
                from: stop_ref("From")?,
                to: stop_ref("To")?,
                run_seconds: duration(run)?,
                from_wait: path_text(link, &["From", "WaitTime"])
                    .map(duration)
                    .transpose()?
                    .unwrap_or(0),
                to_wait: path_text(link, &["To", "WaitTime"])
                    .map(duration)
                    .transpose()?
                    .unwrap_or(0),
            });
        }
        sections.insert(id.to_string(), links);
    }

    Ok(sections)
}

fn parse_journey(
    journey: Node<'_, '_>,
    services: &BTreeMap<String, ServiceDef>,
    sections: &BTreeMap<String, Vec<TimingLink>>,
) -> Result<Trip, ParseErrorKind> {
    let code = child_text(journey, "VehicleJourneyCode").ok_or(
        ParseErrorKind::MissingElement {
            element: "VehicleJourney/VehicleJourneyCode",
        },
    )?;
    let from = || format!("VehicleJourney '{code}'");

    let service_ref = child_text(journey, "ServiceRef").ok_or(ParseErrorKind::MissingElement {
        element: "VehicleJourney/ServiceRef",
    })?;
    let service = services
        .get(service_ref)
        .ok_or_else(|| ParseErrorKind::DanglingReference {
            from: from(),
            target: "service",
            reference: service_ref.to_string(),
        })?;

    let route = match child_text(journey, "LineRef") {
        Some(line_ref) => service.lines.get(line_ref).ok_or_else(|| {
            ParseErrorKind::DanglingReference {
                from: from(),
                target: "line",
                reference: line_ref.to_string(),
            }
        })?,
        None if service.lines.len() == 1 => service
            .lines
            .values()
            .next()
            .ok_or(ParseErrorKind::MissingElement {
                element: "VehicleJourney/LineRef",
            })?,
        None => {
            return Err(ParseErrorKind::MissingElement {
                element: "VehicleJourney/LineRef",
            });
        }
    };

    let pattern_ref = child_text(journey, "JourneyPatternRef").ok_or(
        ParseErrorKind::MissingElement {
            element: "VehicleJourney/JourneyPatternRef",
        },
    )?;
    let section_ids = service
        .patterns
        .get(pattern_ref)
        .ok_or_else(|| ParseErrorKind::DanglingReference {
            from: from(),
            target: "journey pattern",
            reference: pattern_ref.to_string(),
        })?;

    let departure_text = child_text(journey, "DepartureTime").ok_or(
        ParseErrorKind::MissingElement {
            element: "VehicleJourney/DepartureTime",
        },
    )?;
    let departure =
        parse_clock_time(departure_text).ok_or_else(|| ParseErrorKind::InvalidValue {
            field: "DepartureTime",
            value: departure_text.to_string(),
        })?;

    let days = match child(journey, "OperatingProfile") {
        Some(profile) => operating_profile(profile)?,
        None => service.days.unwrap_or(DaysOfWeek::EVERY_DAY),
    };

    let links: Vec<&TimingLink> = section_ids
        .iter()
        .filter_map(|id| sections.get(id))
        .flatten()
        .collect();
    let visits = visits_from_links(departure, &links)?;
    if visits.len() < 2 {
        return Err(ParseErrorKind::TooFewVisits {
            trip: code.to_string(),
            visits: visits.len(),
        });
    }

    Ok(Trip {
        native_id: code.to_string(),
        route: route.clone(),
        days,
        visits,
    })
}

/// Walks timing links from the journey's departure. Intermediate stops
/// record their departure (arrival plus any dwell); the final stop records
/// its arrival.
///
/// Each link must start where the previous one ended.
fn visits_from_links(
    departure: ScheduledTime,
    links: &[&TimingLink],
) -> Result<Vec<StopVisit>, ParseErrorKind> {
    let Some(first) = links.first() else {
        return Ok(Vec::new());
    };
    if let Some(pair) = links.windows(2).find(|pair| pair[0].to != pair[1].from) {
        return Err(ParseErrorKind::InvalidValue {
            field: "JourneyPatternTimingLink/From",
            value: format!("{} (previous link ends at {})", pair[1].from, pair[0].to),
        });
    }

    let mut visits = vec![StopVisit {
        stop_ref: first.from.clone(),
        sequence: 0,
        scheduled_time: departure,
    }];
    let mut t = departure;

    for (i, link) in links.iter().enumerate() {
        if i > 0 && link.from_wait > 0 {
            t = t.plus(link.from_wait);
            if let Some(last) = visits.last_mut() {
                last.scheduled_time = t;
            }
        }
        t = t.plus(link.run_seconds);
        let arrival = t;
        if i + 1 < links.len() {
            t = t.plus(link.to_wait);
        }
        let sequence = u32::try_from(visits.len()).unwrap_or(u32::MAX);
        visits.push(StopVisit {
            stop_ref: link.to.clone(),
            sequence,
            scheduled_time: if i + 1 < links.len() { t } else { arrival },
        });
    }

    Ok(visits)
}

fn operating_profile(profile: Node<'_, '_>) -> Result<DaysOfWeek, ParseErrorKind> {
    let Some(regular) = child(profile, "RegularDayType") else {
        return Ok(DaysOfWeek::EVERY_DAY);
    };
    if child(regular, "HolidaysOnly").is_some() {
        return Ok(DaysOfWeek::NONE);
    }
    let Some(days) = child(regular, "DaysOfWeek") else {
        return Ok(DaysOfWeek::EVERY_DAY);
    };

    elements(days).try_fold(DaysOfWeek::NONE, |acc, day| {
        let name = day.tag_name().name();
        day_set(name)
            .map(|set| acc.union(set))
            .ok_or_else(|| ParseErrorKind::InvalidValue {
                field: "DaysOfWeek",
                value: name.to_string(),
            })
    })
}

fn duration(text: &str) -> Result<u32, ParseErrorKind> {
    parse_iso_duration(text).ok_or_else(|| ParseErrorKind::InvalidValue {
        field: "duration",
        value: text.to_string(),
    })
}
