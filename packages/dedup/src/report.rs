//! Duplicate-resolution report types.

use serde::Serialize;
use transit_equity_geography_models::LatLng;
use transit_equity_schedule_models::RouteKey;

/// One side of a document-version conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    /// Path relative to the schedules root.
    pub path: String,
    /// Ingestion batch.
    pub batch: String,
    /// Content hash.
    pub content_hash: String,
    /// Trips published by this version.
    pub trips: usize,
}

/// Two sources disagree about the same nominal entity. Resolved by
/// document precedence, with both values kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateConflict {
    /// Same operator and file name, different content.
    DocumentVersion {
        /// Operator the documents belong to.
        operator_id: String,
        /// Shared file name.
        file_name: String,
        /// Version that was used.
        kept: DocumentVersion,
        /// Version that was dropped.
        superseded: DocumentVersion,
    },
    /// Inline coordinates for one stop differ by more than the tolerance.
    StopLocation {
        /// Canonical stop id.
        stop_id: String,
        /// Coordinates from the first document.
        kept: LatLng,
        /// Document that supplied `kept`.
        kept_document: String,
        /// Conflicting coordinates.
        other: LatLng,
        /// Document that supplied `other`.
        other_document: String,
        /// Distance between the two, in metres.
        distance_m: f64,
    },
    /// One route key published under different names.
    RouteName {
        /// Route identity.
        route: RouteKey,
        /// Name that was used.
        kept_name: String,
        /// Conflicting name.
        other_name: String,
        /// Document that supplied `other_name`.
        other_document: String,
    },
}

impl DuplicateConflict {
    /// Short kind label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DocumentVersion { .. } => "document_version",
            Self::StopLocation { .. } => "stop_location",
            Self::RouteName { .. } => "route_name",
        }
    }
}

/// A document dropped because an identical copy was already kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDocument {
    /// Dropped copy.
    pub path: String,
    /// Copy that was kept.
    pub canonical_path: String,
}

/// Effect of duplicate resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupReport {
    /// Parsed documents received.
    pub documents_in: usize,
    /// Documents whose entities were used.
    pub documents_kept: usize,
    /// Byte-identical copies removed.
    pub duplicate_documents: usize,
    /// Older/lower-precedence versions removed after a version conflict.
    pub superseded_documents: usize,
    /// Stop entries across all input documents that did not become a new
    /// stop.
    pub stops_removed: usize,
    /// Trip entries across all input documents that did not become a new
    /// trip.
    pub trips_removed: usize,
    /// Every removed copy and the copy it duplicates.
    pub duplicates: Vec<DuplicateDocument>,
    /// Substantive disagreements.
    pub conflicts: Vec<DuplicateConflict>,
}
