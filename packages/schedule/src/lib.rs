#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Schedule document discovery and parsing.
//!
//! Walks the schedules directory, detects each document's dialect from its
//! root element, and parses it into a [`ParsedDocument`]. Documents are
//! parsed independently on blocking worker threads (see [`batch`]); a
//! failure on one document is recorded and never aborts the others.
//!
//! Parsers are strict: a document that references undefined entities or
//! carries unparseable values is rejected as a whole rather than producing
//! partially populated entities.

pub mod batch;
pub mod discover;
pub mod netex;
pub mod parsing;
pub mod progress;
pub mod transxchange;
pub mod xml;

use sha2::{Digest as _, Sha256};
use thiserror::Error;
use transit_equity_schedule_models::{Dialect, DocumentMeta, ParsedDocument};

pub use batch::{BatchParseResult, DocumentFailure, ParseOptions, parse_batch};
pub use discover::{DocumentSource, discover_documents};

/// A document that could not be parsed, with the document it came from.
#[derive(Debug, Error)]
#[error("{document}: {kind}")]
pub struct ParseError {
    /// Path of the offending document, relative to the schedules directory.
    pub document: String,
    /// What went wrong.
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Attaches a document path to an error kind.
    #[must_use]
    pub fn new(document: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            document: document.into(),
            kind,
        }
    }
}

/// Reasons a schedule document is rejected.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid UTF-8.
    #[error("document is not valid UTF-8")]
    Encoding,

    /// The XML is malformed.
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The root element does not belong to a supported dialect.
    #[error("unsupported dialect (root element <{root}>)")]
    UnsupportedDialect {
        /// Local name of the root element.
        root: String,
    },

    /// A required element or attribute is absent.
    #[error("missing required {element}")]
    MissingElement {
        /// Element path, e.g. `VehicleJourney/DepartureTime`.
        element: &'static str,
    },

    /// An entity refers to an identifier the document never defines.
    #[error("{from} references unknown {target} '{reference}'")]
    DanglingReference {
        /// The referencing entity, e.g. `VehicleJourney 'vj1'`.
        from: String,
        /// Kind of the referenced entity.
        target: &'static str,
        /// The unresolved identifier.
        reference: String,
    },

    /// A value could not be interpreted.
    #[error("invalid {field} '{value}'")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Raw text.
        value: String,
    },

    /// A trip visits fewer than two stops.
    #[error("trip '{trip}' has {visits} stop visit(s); at least 2 are required")]
    TooFewVisits {
        /// Native trip id.
        trip: String,
        /// Number of visits found.
        visits: usize,
    },

    /// Parsing exceeded the per-document timeout.
    #[error("parse did not finish within {seconds}s")]
    Timeout {
        /// Configured timeout.
        seconds: u64,
    },

    /// The parser task panicked or was cancelled.
    #[error("parser task failed: {0}")]
    Task(String),
}

/// Hex-encoded SHA-256 of a document's raw bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Detects the dialect of a parsed XML tree from its root element.
///
/// # Errors
///
/// Returns [`ParseErrorKind::UnsupportedDialect`] for unknown roots.
pub fn detect_dialect(doc: &roxmltree::Document<'_>) -> Result<Dialect, ParseErrorKind> {
    match doc.root_element().tag_name().name() {
        "TransXChange" => Ok(Dialect::TransXChange),
        "PublicationDelivery" => Ok(Dialect::Netex),
        other => Err(ParseErrorKind::UnsupportedDialect {
            root: other.to_string(),
        }),
    }
}

/// Parses one schedule document from its raw bytes.
///
/// # Errors
///
/// Returns a [`ParseError`] naming `meta.path` if the document is not
/// UTF-8, not well-formed XML, of an unsupported dialect, or violates the
/// dialect's required structure.
pub fn parse_document(meta: DocumentMeta, bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let fail = |kind| ParseError::new(meta.path.clone(), kind);

    let text = std::str::from_utf8(bytes).map_err(|_| fail(ParseErrorKind::Encoding))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let doc = roxmltree::Document::parse(text).map_err(|e| fail(e.into()))?;
    let dialect = detect_dialect(&doc).map_err(fail)?;

    let parsed = match dialect {
        Dialect::TransXChange => transxchange::parse(&doc),
        Dialect::Netex => netex::parse(&doc),
    }
    .map_err(fail)?;

    log::debug!(
        "{}: parsed {} ({} routes, {} trips, {} stops)",
        meta.path,
        dialect,
        parsed.routes.len(),
        parsed.trips.len(),
        parsed.stops.len()
    );

    Ok(ParsedDocument {
        meta,
        dialect,
        operators: parsed.operators,
        stops: parsed.stops,
        routes: parsed.routes,
        trips: parsed.trips,
    })
}

/// Entities produced by a dialect parser, before provenance is attached.
#[derive(Debug, Default)]
pub struct DialectOutput {
    /// Declared operators.
    pub operators: Vec<transit_equity_schedule_models::Operator>,
    /// Referenced stops.
    pub stops: Vec<transit_equity_schedule_models::DocumentStop>,
    /// Published routes.
    pub routes: Vec<transit_equity_schedule_models::DocumentRoute>,
    /// Published trips.
    pub trips: Vec<transit_equity_schedule_models::Trip>,
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::meta;

    #[test]
    fn hashes_are_stable_hex() {
        let a = content_hash(b"abc");
        assert_eq!(
            a,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(a, content_hash(b"abc"));
    }

    #[test]
    fn rejects_unknown_root() {
        let err = parse_document(meta("x/a.xml"), b"<Timetable/>").unwrap_err();
        assert_eq!(err.document, "x/a.xml");
        assert!(matches!(
            err.kind,
            ParseErrorKind::UnsupportedDialect { ref root } if root == "Timetable"
        ));
    }

    #[test]
    fn rejects_malformed_xml() {
        let err = parse_document(meta("bad.xml"), b"<TransXChange><Operators>").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Xml(_)));
        assert!(err.to_string().starts_with("bad.xml: malformed XML"));
    }

    #[test]
    fn rejects_non_utf8() {
        let err = parse_document(meta("bin.xml"), &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Encoding));
    }
}
