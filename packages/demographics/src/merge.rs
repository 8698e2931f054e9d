//! Joining loaded sources onto the boundary areas.
//!
//! Each source is validated and matched independently, producing a
//! [`SourceCoverage`]. Values from sources that matched at least one area
//! are then layered by precedence: higher `year` first, then declaration
//! order. A field an area already has is never overwritten; the losing
//! value is recorded as a [`FieldOverride`].

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use transit_equity_geography::CodeFormat;
use transit_equity_geography_models::{Area, AreaCode, CodeVintage};

use crate::{DemographicMergeError, LoadedSource, Translation};

/// The primary success signal of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCoverage {
    /// Areas that received at least one non-null value.
    pub matched: usize,
    /// Areas in the boundary dataset.
    pub total: usize,
    /// `matched / total`; `0.0` when there are no areas.
    pub coverage_ratio: f64,
}

impl MergeCoverage {
    #[allow(clippy::cast_precision_loss)]
    fn new(matched: usize, total: usize) -> Self {
        let coverage_ratio = if total == 0 {
            0.0
        } else {
            matched as f64 / total as f64
        };
        Self {
            matched,
            total,
            coverage_ratio,
        }
    }
}

/// Outcome of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceStatus {
    /// Coverage met the minimum.
    Merged,
    /// Some areas matched, but fewer than the minimum. Values are merged.
    BelowThreshold,
    /// Rows were read but no area received a value.
    NoMatches,
    /// Different vintage and no crosswalk. Nothing merged.
    VintageMismatch,
}

/// Per-source merge result, reported for every configured source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCoverage {
    /// Source id.
    pub source_id: String,
    /// Declared vintage.
    pub vintage: CodeVintage,
    /// Publication year.
    pub year: Option<i32>,
    /// Whether failure is fatal.
    pub required: bool,
    /// Whether codes went through a crosswalk.
    pub crosswalked: bool,
    /// Outcome.
    pub status: SourceStatus,
    /// Areas matched.
    pub coverage: MergeCoverage,
    /// Minimum match rate applied.
    pub min_match_rate: f64,
    /// Rows read.
    pub rows: usize,
    /// Rows whose code is not a boundary area.
    pub unmatched_rows: usize,
    /// Repeated rows for an area that filled no field it lacked. Each field
    /// takes the first non-null value.
    pub duplicate_rows: usize,
    /// Codes not matching the boundary code pattern.
    pub malformed_codes: usize,
    /// Codes the crosswalk maps to several areas.
    pub ambiguous_codes: usize,
    /// Non-numeric cells.
    pub non_numeric_values: usize,
}

impl SourceCoverage {
    /// Whether this source stops the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.required && self.status != SourceStatus::Merged
    }

    /// The error describing a non-merged status.
    #[must_use]
    pub fn error(&self, area_vintage: &CodeVintage) -> Option<DemographicMergeError> {
        match self.status {
            SourceStatus::Merged => None,
            SourceStatus::BelowThreshold => Some(DemographicMergeError::BelowThreshold {
                source_id: self.source_id.clone(),
                matched: self.coverage.matched,
                total: self.coverage.total,
                coverage_ratio: self.coverage.coverage_ratio,
                min_match_rate: self.min_match_rate,
            }),
            SourceStatus::NoMatches => Some(DemographicMergeError::NoMatches {
                source_id: self.source_id.clone(),
                rows: self.rows,
            }),
            SourceStatus::VintageMismatch => Some(DemographicMergeError::VintageMismatch {
                source_id: self.source_id.clone(),
                source_vintage: self.vintage.clone(),
                area_vintage: area_vintage.clone(),
            }),
        }
    }
}

/// A value that lost to a higher-precedence source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverride {
    /// Area.
    pub area_code: AreaCode,
    /// Field.
    pub field: String,
    /// Winning source.
    pub kept_source: String,
    /// Winning value.
    pub kept_value: f64,
    /// Losing source.
    pub overridden_source: String,
    /// Losing value.
    pub overridden_value: f64,
}

/// Merged values for one area.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaDemographics {
    /// Field values.
    pub values: BTreeMap<String, f64>,
    /// Source each value came from.
    pub value_sources: BTreeMap<String, String>,
    /// Sources that supplied at least one value for this area.
    pub sources_matched: usize,
}

impl AreaDemographics {
    /// Looks up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Result of merging every configured source.
#[derive(Debug, Clone, Default)]
pub struct DemographicMerge {
    /// Merged values for areas that received any.
    pub areas: BTreeMap<AreaCode, AreaDemographics>,
    /// One entry per configured source, in declaration order.
    pub sources: Vec<SourceCoverage>,
    /// Lower-precedence values that were not used.
    pub overrides: Vec<FieldOverride>,
    /// Boundary vintage the merge targeted.
    pub area_vintage: Option<CodeVintage>,
}

impl DemographicMerge {
    /// Looks up an area's values.
    #[must_use]
    pub fn area(&self, code: &AreaCode) -> Option<&AreaDemographics> {
        self.areas.get(code)
    }

    /// Share of configured sources that supplied values for `code`.
    /// `None` when no sources are configured.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn confidence(&self, code: &AreaCode) -> Option<f64> {
        if self.sources.is_empty() {
            return None;
        }
        let matched = self.areas.get(code).map_or(0, |a| a.sources_matched);
        Some(matched as f64 / self.sources.len() as f64)
    }

    /// Fails with the first required source that did not merge.
    ///
    /// # Errors
    ///
    /// Returns the [`DemographicMergeError`] describing that source.
    pub fn check(&self) -> Result<(), DemographicMergeError> {
        let vintage = self.area_vintage.clone().unwrap_or_else(|| CodeVintage::new(""));
        match self
            .sources
            .iter()
            .find(|s| s.is_fatal())
            .and_then(|s| s.error(&vintage))
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type Contributions = BTreeMap<AreaCode, Vec<(String, f64)>>;

/// Merges every source onto `areas`.
///
/// Never fails: per-source problems are reported in
/// [`DemographicMerge::sources`]; call [`DemographicMerge::check`] to turn
/// a required source's failure into an error.
#[must_use]
pub fn merge_demographics(
    areas: &[Area],
    format: &CodeFormat,
    sources: &[LoadedSource],
    min_match_rate: f64,
) -> DemographicMerge {
    let area_codes: BTreeSet<&AreaCode> = areas.iter().map(|a| &a.code).collect();

    let mut coverages = Vec::with_capacity(sources.len());
    let mut contributions: Vec<(usize, Contributions)> = Vec::new();
    for (index, source) in sources.iter().enumerate() {
        let (coverage, values) = match_source(source, format, &area_codes, min_match_rate);
        log_coverage(&coverage);
        if matches!(
            coverage.status,
            SourceStatus::Merged | SourceStatus::BelowThreshold
        ) {
            contributions.push((index, values));
        }
        coverages.push(coverage);
    }

    contributions.sort_by_key(|(index, _)| (Reverse(sources[*index].definition.year), *index));

    let mut merged: BTreeMap<AreaCode, AreaDemographics> = BTreeMap::new();
    let mut overrides = Vec::new();
    for (index, values) in contributions {
        let source_id = &sources[index].definition.id;
        for (code, fields) in values {
            let area = merged.entry(code.clone()).or_default();
            area.sources_matched += 1;
            for (field, value) in fields {
                if let Some(&kept_value) = area.values.get(&field) {
                    if (kept_value - value).abs() > f64::EPSILON {
                        overrides.push(FieldOverride {
                            area_code: code.clone(),
                            kept_source: area.value_sources.get(&field).cloned().unwrap_or_default(),
                            field,
                            kept_value,
                            overridden_source: source_id.clone(),
                            overridden_value: value,
                        });
                    }
                    continue;
                }
                area.value_sources.insert(field.clone(), source_id.clone());
                area.values.insert(field, value);
            }
        }
    }
    if !overrides.is_empty() {
        log::info!(
            "{} demographic values superseded by higher-precedence sources",
            overrides.len()
        );
    }

    DemographicMerge {
        areas: merged,
        sources: coverages,
        overrides,
        area_vintage: Some(format.vintage.clone()),
    }
}

fn match_source(
    source: &LoadedSource,
    format: &CodeFormat,
    area_codes: &BTreeSet<&AreaCode>,
    default_min_match_rate: f64,
) -> (SourceCoverage, Contributions) {
    let def = &source.definition;
    let table = &source.table;
    let same_vintage = def.vintage.is_compatible_with(&format.vintage);
    let crosswalk = if same_vintage {
        if source.crosswalk.is_some() {
            log::debug!("Source {}: same vintage, crosswalk ignored", def.id);
        }
        None
    } else {
        source.crosswalk.as_ref()
    };

    let mut coverage = SourceCoverage {
        source_id: def.id.clone(),
        vintage: def.vintage.clone(),
        year: def.year,
        required: def.required,
        crosswalked: crosswalk.is_some(),
        status: SourceStatus::Merged,
        coverage: MergeCoverage::new(0, area_codes.len()),
        min_match_rate: def.min_match_rate.unwrap_or(default_min_match_rate),
        rows: table.stats.rows,
        unmatched_rows: 0,
        duplicate_rows: 0,
        malformed_codes: 0,
        ambiguous_codes: 0,
        non_numeric_values: table.stats.non_numeric_values,
    };
    let mut values = Contributions::new();

    if !same_vintage && crosswalk.is_none() {
        coverage.status = SourceStatus::VintageMismatch;
        return (coverage, values);
    }

    let mut seen: BTreeSet<AreaCode> = BTreeSet::new();
    for record in &table.records {
        let code = match crosswalk.map(|x| x.translate(&record.code)) {
            None => &record.code,
            Some(Translation::Mapped(code)) => code,
            Some(Translation::Ambiguous) => {
                coverage.ambiguous_codes += 1;
                continue;
            }
            Some(Translation::Unmapped) => {
                coverage.unmatched_rows += 1;
                continue;
            }
        };
        if !format.matches(code) {
            coverage.malformed_codes += 1;
        }
        if !area_codes.contains(code) {
            coverage.unmatched_rows += 1;
            continue;
        }
        let repeated = !seen.insert(code.clone());
        let mut filled = 0usize;
        for (field, value) in table.fields.iter().zip(&record.values) {
            let Some(value) = *value else { continue };
            let slot = values.entry(code.clone()).or_default();
            if slot.iter().all(|(f, _)| f != field) {
                slot.push((field.clone(), value));
                filled += 1;
            }
        }
        // A repeated row only counts as a duplicate when it fills nothing new.
        if repeated && filled == 0 {
            coverage.duplicate_rows += 1;
        }
    }

    coverage.coverage = MergeCoverage::new(values.len(), area_codes.len());
    coverage.status = if values.is_empty() {
        SourceStatus::NoMatches
    } else if coverage.coverage.coverage_ratio < coverage.min_match_rate {
        SourceStatus::BelowThreshold
    } else {
        SourceStatus::Merged
    };
    (coverage, values)
}

fn log_coverage(coverage: &SourceCoverage) {
    let summary = format!(
        "Demographic source {}: {} of {} areas matched ({:.1}%), {} rows, {} unmatched",
        coverage.source_id,
        coverage.coverage.matched,
        coverage.coverage.total,
        coverage.coverage.coverage_ratio * 100.0,
        coverage.rows,
        coverage.unmatched_rows
    );
    match (coverage.status, coverage.required) {
        (SourceStatus::Merged, _) => log::info!("{summary}"),
        (status, true) => log::error!("{summary} [{status}]"),
        (status, false) => log::warn!("{summary} [{status}, optional source]"),
    }
    if coverage.malformed_codes > 0 {
        log::warn!(
            "Demographic source {}: {} codes do not match the boundary code pattern",
            coverage.source_id,
            coverage.malformed_codes
        );
    }
}

#[cfg(test)]
mod tests {
    use transit_equity_geography_models::CodeVintage;

    use super::*;
    use crate::{Crosswalk, table::parse_table, test_support::definition};

    fn areas(codes: &[&str]) -> Vec<Area> {
        codes
            .iter()
            .map(|c| Area {
                code: AreaCode::parse(c).unwrap(),
                name: None,
            })
            .collect()
    }

    fn format(pattern: Option<&str>) -> CodeFormat {
        CodeFormat::new(CodeVintage::new("2021"), pattern).unwrap()
    }

    fn source(id: &str, vintage: &str, year: Option<i32>, csv: &str) -> LoadedSource {
        let mut def = definition(id, vintage);
        def.year = year;
        LoadedSource {
            table: parse_table(csv, &def).unwrap(),
            definition: def,
            crosswalk: None,
        }
    }

    fn code(s: &str) -> AreaCode {
        AreaCode::parse(s).unwrap()
    }

    #[test]
    fn coverage_counts_areas_not_rows() {
        let src = source(
            "census",
            "2021",
            None,
            "area_code,population\nE01,100\nE01,200\nE02,\nE99,5\n",
        );
        let merge = merge_demographics(&areas(&["E01", "E02", "E03", "E04"]), &format(None), &[src], 0.2);
        let cov = &merge.sources[0];
        assert_eq!(cov.rows, 4);
        assert_eq!(cov.coverage.matched, 1);
        assert_eq!(cov.coverage.total, 4);
        assert!((cov.coverage.coverage_ratio - 0.25).abs() < 1e-12);
        assert_eq!(cov.duplicate_rows, 1);
        assert_eq!(cov.unmatched_rows, 1);
        assert_eq!(cov.status, SourceStatus::Merged);
        assert_eq!(merge.area(&code("E01")).unwrap().get("population"), Some(100.0));
        assert!(merge.area(&code("E02")).is_none());
        assert!(merge.check().is_ok());
    }

    #[test]
    fn blank_row_does_not_hide_a_later_value() {
        let src = source(
            "census",
            "2021",
            None,
            "area_code,population,car_free_pct\nE01,,\nE01,500,\nE01,600,12.5\nE01,700,13\n",
        );
        let merge = merge_demographics(&areas(&["E01"]), &format(None), &[src], 0.5);
        let cov = &merge.sources[0];
        assert_eq!(cov.status, SourceStatus::Merged);
        assert_eq!(cov.coverage.matched, 1);
        assert_eq!(cov.duplicate_rows, 1);
        let e01 = merge.area(&code("E01")).unwrap();
        assert_eq!(e01.get("population"), Some(500.0));
        assert_eq!(e01.get("car_free_pct"), Some(12.5));
        assert!(merge.check().is_ok());
    }

    #[test]
    fn vintage_mismatch_is_an_error() {
        let src = source("old", "2011", None, "area_code,population\nE01,100\n");
        let merge = merge_demographics(&areas(&["E01"]), &format(None), &[src], 0.5);
        assert_eq!(merge.sources[0].status, SourceStatus::VintageMismatch);
        assert!(merge.areas.is_empty());
        assert!(matches!(
            merge.check().unwrap_err(),
            DemographicMergeError::VintageMismatch { .. }
        ));
    }

    #[test]
    fn zero_overlap_is_an_error_not_a_success() {
        // Declared as the boundary vintage, but the codes are from another scheme.
        let src = source(
            "mislabelled",
            "2021",
            None,
            "area_code,population\nE01000001,100\nE01000002,200\n",
        );
        let merge = merge_demographics(
            &areas(&["E01100001", "E01100002"]),
            &format(Some("E011[0-9]{5}")),
            &[src],
            0.5,
        );
        let cov = &merge.sources[0];
        assert_eq!(cov.status, SourceStatus::NoMatches);
        assert_eq!(cov.rows, 2);
        assert_eq!(cov.malformed_codes, 2);
        assert!(matches!(
            merge.check().unwrap_err(),
            DemographicMergeError::NoMatches { rows: 2, .. }
        ));
    }

    #[test]
    fn below_threshold_still_merges_and_optional_is_not_fatal() {
        let mut src = source("sparse", "2021", None, "area_code,population\nE01,100\n");
        let merge = merge_demographics(&areas(&["E01", "E02", "E03"]), &format(None), &[src.clone()], 0.5);
        assert_eq!(merge.sources[0].status, SourceStatus::BelowThreshold);
        assert!(merge.area(&code("E01")).is_some());
        assert!(matches!(
            merge.check().unwrap_err(),
            DemographicMergeError::BelowThreshold { matched: 1, total: 3, .. }
        ));

        src.definition.required = false;
        let merge = merge_demographics(&areas(&["E01", "E02", "E03"]), &format(None), &[src], 0.5);
        assert!(merge.check().is_ok());
    }

    #[test]
    fn crosswalk_translates_older_vintage() {
        let mut src = source(
            "old",
            "2011",
            None,
            "area_code,population\nA11,10\nS11,20\nZ11,30\n",
        );
        src.crosswalk = Some(Crosswalk::from_pairs([
            (code("A11"), code("A21")),
            (code("S11"), code("S21A")),
            (code("S11"), code("S21B")),
        ]));
        let merge = merge_demographics(&areas(&["A21", "S21A", "S21B"]), &format(None), &[src], 0.1);
        let cov = &merge.sources[0];
        assert!(cov.crosswalked);
        assert_eq!(cov.coverage.matched, 1);
        assert_eq!(cov.ambiguous_codes, 1);
        assert_eq!(cov.unmatched_rows, 1);
        assert_eq!(merge.area(&code("A21")).unwrap().get("population"), Some(10.0));
    }

    #[test]
    fn newer_year_wins_then_declaration_order() {
        let older = source("census_2011", "2021", Some(2011), "area_code,population\nE01,90\nE02,50\n");
        let newer = source("census_2021", "2021", Some(2021), "area_code,population\nE01,100\n");
        let same = source("estimate", "2021", Some(2021), "area_code,population\nE01,110\n");
        let merge = merge_demographics(&areas(&["E01", "E02"]), &format(None), &[older, newer, same], 0.1);

        let e01 = merge.area(&code("E01")).unwrap();
        assert_eq!(e01.get("population"), Some(100.0));
        assert_eq!(e01.value_sources["population"], "census_2021");
        assert_eq!(e01.sources_matched, 3);
        assert_eq!(merge.area(&code("E02")).unwrap().get("population"), Some(50.0));

        let losers: Vec<&str> = merge
            .overrides
            .iter()
            .map(|o| o.overridden_source.as_str())
            .collect();
        assert_eq!(losers, vec!["estimate", "census_2011"]);
    }

    #[test]
    fn confidence_is_share_of_sources() {
        let a = source("a", "2021", None, "area_code,x\nE01,1\nE02,2\n");
        let b = source("b", "2021", None, "area_code,y\nE01,1\n");
        let merge = merge_demographics(&areas(&["E01", "E02", "E03"]), &format(None), &[a, b], 0.0);
        assert_eq!(merge.confidence(&code("E01")), Some(1.0));
        assert_eq!(merge.confidence(&code("E02")), Some(0.5));
        assert_eq!(merge.confidence(&code("E03")), Some(0.0));

        let none = merge_demographics(&areas(&["E01"]), &format(None), &[], 0.5);
        assert_eq!(none.confidence(&code("E01")), None);
        assert!(none.check().is_ok());
    }
}
