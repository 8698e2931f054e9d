#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `transit_equity` binary.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so
//! log lines never tear a progress bar, and [`reporters`] builds the two
//! [`ProgressCallback`]s a run needs (stages and schedule documents),
//! either as live bars or as periodic log lines.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use transit_equity_schedule::progress::{LogProgress, ProgressCallback};

pub use indicatif::MultiProgress;

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Which kind of bar a [`TerminalProgress`] draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarKind {
    /// Fixed number of pipeline stages.
    Stages {
        /// Number of stages.
        total: u64,
    },
    /// Schedule documents; the count is only known after discovery.
    Documents,
}

impl BarKind {
    fn running_style(self) -> ProgressStyle {
        let template = match self {
            Self::Stages { .. } => "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            Self::Documents => "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

/// A [`ProgressCallback`] drawn as an `indicatif` bar.
pub struct TerminalProgress {
    bar: ProgressBar,
    kind: BarKind,
}

impl TerminalProgress {
    /// Adds a bar to `multi`.
    ///
    /// Document bars start as a spinner and switch to a bar on the first
    /// [`ProgressCallback::set_total`].
    #[must_use]
    pub fn new(multi: &MultiProgress, kind: BarKind, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = match kind {
            BarKind::Stages { total } => {
                let bar = multi.add(ProgressBar::new(total));
                bar.set_style(kind.running_style());
                bar
            }
            BarKind::Documents => {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(message.to_string());
        Arc::new(Self { bar, kind })
    }
}

impl ProgressCallback for TerminalProgress {
    fn set_total(&self, total: u64) {
        self.bar.disable_steady_tick();
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.kind.running_style());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Stage and document reporters for one run.
#[derive(Clone)]
pub struct Reporters {
    /// Advanced once per pipeline stage.
    pub stages: Arc<dyn ProgressCallback>,
    /// Advanced once per parsed schedule document.
    pub documents: Arc<dyn ProgressCallback>,
}

/// Builds the run's reporters: bars on `multi`, or `log` lines when
/// `bars` is false (CI, cron, redirected output).
#[must_use]
pub fn reporters(multi: &MultiProgress, stage_count: u64, bars: bool) -> Reporters {
    if bars {
        Reporters {
            stages: TerminalProgress::new(
                multi,
                BarKind::Stages { total: stage_count },
                "Pipeline",
            ),
            documents: TerminalProgress::new(multi, BarKind::Documents, "Schedule documents"),
        }
    } else {
        Reporters {
            stages: LogProgress::new("Pipeline stages"),
            documents: LogProgress::new("Schedule documents"),
        }
    }
}

/// Installs the global logger behind `indicatif-log-bridge`.
///
/// `RUST_LOG` wins when set; otherwise [`DEFAULT_LOG_FILTER`] applies so
/// stage summaries are visible by default. Returns the [`MultiProgress`]
/// every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filter)
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Already set (e.g., in tests)
    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn document_bar_switches_to_known_length() {
        let multi = hidden();
        let docs = TerminalProgress::new(&multi, BarKind::Documents, "Schedule documents");
        docs.set_total(10);
        docs.inc(4);
        docs.set_message("Parsing".to_string());
        docs.finish_and_clear();
    }

    #[test]
    fn reporters_without_bars_log_instead() {
        let multi = hidden();
        let reporters = reporters(&multi, 6, false);
        reporters.stages.set_total(6);
        reporters.stages.inc(6);
        reporters.documents.finish("done".to_string());

        let reporters = super::reporters(&multi, 6, true);
        reporters.stages.inc(1);
        reporters.stages.finish("done".to_string());
    }
}
