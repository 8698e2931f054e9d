#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Normalized schedule entities.
//!
//! Every schedule dialect (TransXChange, NeTEx, ...) is parsed into a
//! [`ParsedDocument`] built from these types. Entities carry the
//! document-native identifiers they were published with; canonical
//! identities are established later by duplicate resolution.

pub mod calendar;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use transit_equity_geography_models::LatLng;

pub use calendar::{DaysOfWeek, ScheduledTime};

/// Supported schedule document dialects.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dialect {
    /// UK TransXChange.
    #[serde(rename = "transxchange")]
    #[strum(serialize = "transxchange")]
    TransXChange,
    /// CEN NeTEx (calls-based journey profile).
    Netex,
}

/// Identity of a route: operator plus the operator's own route id.
///
/// Short public route codes like `"1"` are reused by many operators, so the
/// native route id alone is never a key. Every place that deduplicates,
/// joins, or counts routes uses this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteKey {
    /// Operator identifier.
    pub operator_id: String,
    /// Route identifier as published by the operator.
    pub route_id: String,
}

impl RouteKey {
    /// Builds a key from its parts.
    #[must_use]
    pub fn new(operator_id: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            route_id: route_id.into(),
        }
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.operator_id, self.route_id)
    }
}

/// A transit provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    /// Operator identifier (national operator code where available).
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A stop as referenced by one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStop {
    /// Identifier used inside the document (usually a registry code).
    pub native_id: String,
    /// Name given by the document.
    pub name: Option<String>,
    /// Inline coordinates, when the document carries them.
    pub location: Option<LatLng>,
}

/// A route as published by one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRoute {
    /// Composite identity.
    pub key: RouteKey,
    /// Display name.
    pub name: String,
}

/// A route after duplicate resolution, merged across documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Composite identity.
    pub key: RouteKey,
    /// Display name (from the highest-precedence document).
    pub name: String,
    /// Ingestion batches the route was published in. Collection metadata
    /// only; never used for geography.
    pub regions: BTreeSet<String>,
}

/// One call of a trip at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopVisit {
    /// Native id of the visited stop (see [`DocumentStop::native_id`]).
    pub stop_ref: String,
    /// Zero-based position within the trip.
    pub sequence: u32,
    /// Scheduled departure (arrival at the final stop).
    pub scheduled_time: ScheduledTime,
}

/// One scheduled run of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Identifier used inside the document.
    pub native_id: String,
    /// Route this trip belongs to.
    pub route: RouteKey,
    /// Regular days of operation.
    pub days: DaysOfWeek,
    /// Ordered stop visits (at least two).
    pub visits: Vec<StopVisit>,
}

/// Where a document came from and what it contains, byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    /// Path relative to the schedules directory, `/`-separated.
    pub path: String,
    /// Ingestion batch (first-level directory) name.
    pub batch: String,
    /// Position of the batch in lexicographic batch order.
    pub batch_ordinal: usize,
    /// File name without directories.
    pub file_name: String,
    /// SHA-256 of the raw bytes, hex encoded.
    pub content_hash: String,
    /// Raw size in bytes.
    pub size_bytes: u64,
}

impl DocumentMeta {
    /// Deterministic precedence key: lower sorts first and wins.
    #[must_use]
    pub fn precedence(&self) -> (usize, &str) {
        (self.batch_ordinal, self.path.as_str())
    }
}

/// All entities parsed from one schedule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDocument {
    /// Provenance.
    pub meta: DocumentMeta,
    /// Dialect the document was written in.
    pub dialect: Dialect,
    /// Operators declared by the document (at least one).
    pub operators: Vec<Operator>,
    /// Stops referenced by the document.
    pub stops: Vec<DocumentStop>,
    /// Routes published by the document.
    pub routes: Vec<DocumentRoute>,
    /// Trips published by the document.
    pub trips: Vec<Trip>,
}

impl ParsedDocument {
    /// The operator the document is attributed to (the first declared).
    #[must_use]
    pub fn primary_operator_id(&self) -> &str {
        self.operators.first().map_or("", |o| o.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_keys_with_same_native_id_differ_by_operator() {
        let a = RouteKey::new("OPA", "1");
        let b = RouteKey::new("OPB", "1");
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.to_string(), "OPA/1");
    }

    #[test]
    fn dialect_string_forms() {
        assert_eq!(Dialect::TransXChange.to_string(), "transxchange");
        assert_eq!("netex".parse::<Dialect>().unwrap(), Dialect::Netex);
    }

    #[test]
    fn precedence_orders_by_batch_then_path() {
        let meta = |batch_ordinal, path: &str| DocumentMeta {
            path: path.to_string(),
            batch: String::new(),
            batch_ordinal,
            file_name: String::new(),
            content_hash: String::new(),
            size_bytes: 0,
        };
        assert!(meta(0, "b.xml").precedence() < meta(1, "a.xml").precedence());
        assert!(meta(1, "a.xml").precedence() < meta(1, "b.xml").precedence());
    }
}
