#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Physical stop, area, and area-assignment types.
//!
//! These types describe where things are: the national stop registry, the
//! administrative/statistical areas stops are aggregated into, and the
//! outcome of assigning a stop to an area. They carry no behaviour beyond
//! small conversions so every pipeline stage can share them.

pub mod area_code;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use area_code::{AreaCode, CodeVintage};

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatLng {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl LatLng {
    /// Creates a coordinate pair, returning `None` when either component is
    /// non-finite or outside the valid WGS84 range.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle (haversine) distance to `other` in metres.
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lng = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Stop-level urban/rural classification carried by the registry.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StopClass {
    /// Stop located in an urban settlement.
    Urban,
    /// Stop located in a rural settlement.
    Rural,
    /// No classification available.
    #[default]
    Unclassified,
}

impl StopClass {
    /// Parses a registry classification cell. Anything unrecognized is
    /// [`StopClass::Unclassified`].
    #[must_use]
    pub fn from_cell(cell: &str) -> Self {
        cell.trim().parse().unwrap_or_default()
    }
}

/// A row of the canonical national stop registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStop {
    /// Registry identifier (e.g. an ATCO code).
    pub stop_id: String,
    /// Canonical location.
    pub location: LatLng,
    /// Common name.
    pub name: String,
    /// Urban/rural classification.
    pub class: StopClass,
}

/// How a [`StopPoint`]'s canonical identity was established.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopIdentity {
    /// The stop exists in the national registry.
    Registry {
        /// Registry identifier.
        stop_id: String,
    },
    /// The stop is only known from a schedule document.
    Inferred {
        /// Operator that published the document.
        operator_id: String,
        /// Content hash of the publishing document.
        content_hash: String,
        /// Identifier used inside the document.
        native_id: String,
    },
}

impl StopIdentity {
    /// Returns the stable identifier written to output tables.
    ///
    /// Inferred identities embed a 12-character hash prefix so the same
    /// native id from two different documents never collides.
    #[must_use]
    pub fn canonical_id(&self) -> String {
        match self {
            Self::Registry { stop_id } => stop_id.clone(),
            Self::Inferred {
                operator_id,
                content_hash,
                native_id,
            } => {
                let prefix = content_hash.get(..12).unwrap_or(content_hash);
                format!("{operator_id}:{prefix}:{native_id}")
            }
        }
    }
}

/// A physical stop after duplicate resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPoint {
    /// Canonical identity.
    pub identity: StopIdentity,
    /// Location, when known from the registry or the document.
    pub location: Option<LatLng>,
    /// Display name.
    pub name: Option<String>,
    /// Urban/rural classification (registry stops only).
    pub class: StopClass,
}

impl StopPoint {
    /// Shorthand for [`StopIdentity::canonical_id`].
    #[must_use]
    pub fn stop_id(&self) -> String {
        self.identity.canonical_id()
    }
}

/// An administrative/statistical area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Area code.
    pub code: AreaCode,
    /// Optional human-readable name.
    pub name: Option<String>,
}

/// Why a stop could not be placed in any area.
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
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissReason {
    /// Neither the registry nor the document gave coordinates.
    NoCoordinates,
    /// The coordinates fall outside every polygon (and the snap tolerance).
    OutsideAllAreas,
}

/// The outcome of assigning one stop to an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AreaAssignment {
    /// The area polygon contains (or touches) the stop.
    Contained {
        /// Assigned area.
        area: AreaCode,
    },
    /// No polygon contains the stop; the nearest one within the configured
    /// tolerance was used.
    Snapped {
        /// Assigned area.
        area: AreaCode,
        /// Distance from the stop to the polygon boundary in metres.
        distance_m: f64,
    },
    /// The stop has no area.
    Unassigned {
        /// Why no area was found.
        reason: MissReason,
    },
}

impl AreaAssignment {
    /// Returns the assigned area code, if any.
    #[must_use]
    pub const fn area(&self) -> Option<&AreaCode> {
        match self {
            Self::Contained { area } | Self::Snapped { area, .. } => Some(area),
            Self::Unassigned { .. } => None,
        }
    }

    /// Short label written to the `stops` table.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Contained { .. } => "contained",
            Self::Snapped { .. } => "snapped",
            Self::Unassigned { .. } => "unassigned",
        }
    }
}
