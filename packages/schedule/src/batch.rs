//! Parallel batch parsing with per-document isolation.
//!
//! Each document is read and parsed on tokio's blocking pool, at most
//! [`ParseOptions::workers`] at a time, and each parse is bounded by
//! [`ParseOptions::timeout`]. A failure or timeout on one document is
//! recorded in [`BatchParseResult::failures`] and never affects the others.
//! Results are sorted by document precedence, so completion order does not
//! leak into later stages.

use std::{sync::Arc, time::Duration};

use futures::stream::{self, StreamExt as _};
use serde::Serialize;
use transit_equity_schedule_models::{DocumentMeta, ParsedDocument};

use crate::{
    ParseError, ParseErrorKind, content_hash, discover::DocumentSource, parse_document,
    progress::ProgressCallback,
};

/// Tuning for [`parse_batch`].
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Upper bound on a single document's read + parse time.
    pub timeout: Duration,
    /// Maximum documents parsed concurrently.
    pub workers: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            workers: std::thread::available_parallelism().map_or(4, std::num::NonZero::get),
        }
    }
}

/// A document that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFailure {
    /// Path relative to the schedules root.
    pub path: String,
    /// Ingestion batch.
    pub batch: String,
    /// Rendered [`ParseError`].
    pub error: String,
}

/// Outcome of parsing every discovered document.
#[derive(Debug, Default)]
pub struct BatchParseResult {
    /// Number of documents discovered (parsed + failed).
    pub discovered: usize,
    /// Successfully parsed documents, in precedence order.
    pub documents: Vec<ParsedDocument>,
    /// Failed documents, sorted by path.
    pub failures: Vec<DocumentFailure>,
}

impl BatchParseResult {
    /// Number of documents parsed successfully.
    #[must_use]
    pub fn parsed(&self) -> usize {
        self.documents.len()
    }

    /// Number of documents that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Parses all `sources` concurrently.
///
/// Never fails as a whole: every document ends up either in
/// [`BatchParseResult::documents`] or in [`BatchParseResult::failures`].
///
/// A timed-out parse is abandoned, not interrupted; the blocking thread
/// finishes on its own and its result is discarded.
pub async fn parse_batch(
    sources: Vec<DocumentSource>,
    options: ParseOptions,
    progress: Arc<dyn ProgressCallback>,
) -> BatchParseResult {
    parse_batch_with(sources, options, progress, read_and_parse).await
}

/// Reads and parses one document on the blocking pool.
type DocumentParser = fn(&DocumentSource) -> Result<ParsedDocument, ParseError>;

async fn parse_batch_with(
    sources: Vec<DocumentSource>,
    options: ParseOptions,
    progress: Arc<dyn ProgressCallback>,
    parser: DocumentParser,
) -> BatchParseResult {
    let discovered = sources.len();
    progress.set_total(discovered as u64);
    progress.set_message("Parsing schedule documents".to_string());

    let outcomes: Vec<(DocumentSource, Result<ParsedDocument, ParseError>)> =
        stream::iter(sources.into_iter().map(|source| {
            let progress = progress.clone();
            async move {
                let outcome = parse_one(&source, options.timeout, parser).await;
                progress.inc(1);
                (source, outcome)
            }
        }))
        .buffer_unordered(options.workers.max(1))
        .collect()
        .await;

    let mut result = BatchParseResult {
        discovered,
        ..BatchParseResult::default()
    };
    for (source, outcome) in outcomes {
        match outcome {
            Ok(doc) => result.documents.push(doc),
            Err(e) => {
                log::warn!("Skipping schedule document {e}");
                result.failures.push(DocumentFailure {
                    path: source.relative,
                    batch: source.batch,
                    error: e.to_string(),
                });
            }
        }
    }

    result.documents.sort_by(|a, b| a.meta.precedence().cmp(&b.meta.precedence()));
    result.failures.sort_by(|a, b| a.path.cmp(&b.path));

    progress.finish(format!(
        "Parsed {} of {} schedule documents ({} failed)",
        result.parsed(),
        discovered,
        result.failed()
    ));
    log::info!(
        "Parsed {} of {discovered} schedule documents ({} failed)",
        result.parsed(),
        result.failed()
    );
    result
}

async fn parse_one(
    source: &DocumentSource,
    timeout: Duration,
    parser: DocumentParser,
) -> Result<ParsedDocument, ParseError> {
    let owned = source.clone();
    let task = tokio::task::spawn_blocking(move || parser(&owned));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join)) => Err(ParseError::new(
            source.relative.clone(),
            ParseErrorKind::Task(join.to_string()),
        )),
        Err(_) => Err(ParseError::new(
            source.relative.clone(),
            ParseErrorKind::Timeout {
                seconds: timeout.as_secs(),
            },
        )),
    }
}

/// Reads one document, hashes its bytes, and parses it.
///
/// # Errors
///
/// Returns a [`ParseError`] if the file cannot be read or parsed.
pub fn read_and_parse(source: &DocumentSource) -> Result<ParsedDocument, ParseError> {
    let bytes = std::fs::read(&source.path)
        .map_err(|e| ParseError::new(source.relative.clone(), e.into()))?;
    let meta = DocumentMeta {
        path: source.relative.clone(),
        batch: source.batch.clone(),
        batch_ordinal: source.batch_ordinal,
        file_name: source.file_name.clone(),
        content_hash: content_hash(&bytes),
        size_bytes: bytes.len() as u64,
    };
    parse_document(meta, &bytes)
}
