//! Area-code crosswalks between geography vintages.
//!
//! A crosswalk is a `from_code,to_code` CSV. A source code that maps to
//! more than one target cannot be attributed to a single area and is
//! treated as ambiguous.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use transit_equity_geography_models::AreaCode;

use crate::{DemographicMergeError, read_file};

/// Result of translating one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation<'a> {
    /// Exactly one target.
    Mapped(&'a AreaCode),
    /// Several targets.
    Ambiguous,
    /// Not in the crosswalk.
    Unmapped,
}

/// A code translation table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crosswalk {
    targets: BTreeMap<AreaCode, BTreeSet<AreaCode>>,
}

impl Crosswalk {
    /// Builds a crosswalk from `(from, to)` pairs. Repeated pairs are
    /// harmless.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (AreaCode, AreaCode)>) -> Self {
        let mut targets: BTreeMap<AreaCode, BTreeSet<AreaCode>> = BTreeMap::new();
        for (from, to) in pairs {
            targets.entry(from).or_default().insert(to);
        }
        Self { targets }
    }

    /// Translates a source code.
    #[must_use]
    pub fn translate(&self, code: &AreaCode) -> Translation<'_> {
        match self.targets.get(code) {
            None => Translation::Unmapped,
            Some(set) if set.len() == 1 => set
                .first()
                .map_or(Translation::Unmapped, Translation::Mapped),
            Some(_) => Translation::Ambiguous,
        }
    }

    /// Number of distinct source codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the crosswalk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Loads a crosswalk file.
///
/// # Errors
///
/// Returns [`DemographicMergeError`] if the file cannot be read or lacks
/// the `from_code`/`to_code` columns.
pub fn load_crosswalk(path: &Path) -> Result<Crosswalk, DemographicMergeError> {
    let text = read_file(path)?;
    let crosswalk = parse_crosswalk(&text, &path.display().to_string())?;
    log::info!(
        "Loaded crosswalk {} ({} source codes)",
        path.display(),
        crosswalk.len()
    );
    Ok(crosswalk)
}

/// Parses crosswalk CSV text. Rows with a blank code are ignored.
///
/// # Errors
///
/// Returns [`DemographicMergeError`] on malformed CSV or missing columns.
pub fn parse_crosswalk(text: &str, name: &str) -> Result<Crosswalk, DemographicMergeError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DemographicMergeError::MissingColumn {
                source_id: name.to_string(),
                column: column.to_string(),
            })
    };
    let (from_index, to_index) = (column("from_code")?, column("to_code")?);

    let mut pairs = Vec::new();
    for row in reader.records() {
        let row = row?;
        let from = row.get(from_index).and_then(AreaCode::parse);
        let to = row.get(to_index).and_then(AreaCode::parse);
        if let (Some(from), Some(to)) = (from, to) {
            pairs.push((from, to));
        }
    }
    Ok(Crosswalk::from_pairs(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> AreaCode {
        AreaCode::parse(s).unwrap()
    }

    #[test]
    fn one_to_one_many_to_one_and_ambiguous() {
        let xwalk = parse_crosswalk(
            "from_code,to_code\nA11,A21\nB11,M21\nC11,M21\nS11,S21a\nS11,S21b\nA11,A21\n,X\n",
            "test",
        )
        .unwrap();
        assert_eq!(xwalk.len(), 4);
        assert_eq!(xwalk.translate(&code("A11")), Translation::Mapped(&code("A21")));
        assert_eq!(xwalk.translate(&code("B11")), Translation::Mapped(&code("M21")));
        assert_eq!(xwalk.translate(&code("C11")), Translation::Mapped(&code("M21")));
        assert_eq!(xwalk.translate(&code("S11")), Translation::Ambiguous);
        assert_eq!(xwalk.translate(&code("Z11")), Translation::Unmapped);
    }

    #[test]
    fn requires_both_columns() {
        let err = parse_crosswalk("from,to\nA,B\n", "xwalk.csv").unwrap_err();
        assert!(matches!(
            err,
            DemographicMergeError::MissingColumn { column, .. } if column == "from_code"
        ));
    }
}
