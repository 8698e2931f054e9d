//! Demographic table loader.
//!
//! A table is a CSV with one area-code column and any number of value
//! columns. Values are parsed as `f64`; blank cells are null, and cells
//! that are not finite numbers are null and counted.

use serde::Serialize;
use transit_equity_geography_models::AreaCode;

use crate::{DemographicMergeError, SourceDefinition, read_file};

/// One table row.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicRecord {
    /// Area code as published by the source.
    pub code: AreaCode,
    /// Values, parallel to [`DemographicTable::fields`].
    pub values: Vec<Option<f64>>,
}

/// Counts from reading one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    /// Data rows read.
    pub rows: usize,
    /// Rows with a blank area code.
    pub missing_code: usize,
    /// Cells that were not numbers.
    pub non_numeric_values: usize,
}

/// A parsed demographic table.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicTable {
    /// Value column names, in selection order.
    pub fields: Vec<String>,
    /// Rows with a usable area code, in file order.
    pub records: Vec<DemographicRecord>,
    /// Load counts.
    pub stats: TableStats,
}

/// Loads the table a source points at.
///
/// # Errors
///
/// Returns [`DemographicMergeError`] if the file cannot be read, is not
/// valid CSV, or lacks a declared column.
pub fn load_table(definition: &SourceDefinition) -> Result<DemographicTable, DemographicMergeError> {
    let text = read_file(&definition.path)?;
    let table = parse_table(&text, definition)?;
    log::info!(
        "Loaded demographic source {} from {}: {} rows, {} fields",
        definition.id,
        definition.path.display(),
        table.stats.rows,
        table.fields.len()
    );
    if table.stats.non_numeric_values > 0 {
        log::warn!(
            "Demographic source {}: {} non-numeric values treated as null",
            definition.id,
            table.stats.non_numeric_values
        );
    }
    Ok(table)
}

/// Parses CSV text using the columns a source declares.
///
/// # Errors
///
/// Returns [`DemographicMergeError::MissingColumn`] when the area-code
/// column or a selected field is absent, or [`DemographicMergeError::Csv`]
/// on malformed CSV.
pub fn parse_table(
    text: &str,
    definition: &SourceDefinition,
) -> Result<DemographicTable, DemographicMergeError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let missing = |column: &str| DemographicMergeError::MissingColumn {
        source_id: definition.id.clone(),
        column: column.to_string(),
    };
    let key_index = headers
        .iter()
        .position(|h| h == definition.area_code_column)
        .ok_or_else(|| missing(&definition.area_code_column))?;

    let columns: Vec<(usize, String)> = if definition.fields.is_empty() {
        headers
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != key_index)
            .map(|(i, h)| (i, h.to_string()))
            .collect()
    } else {
        definition
            .fields
            .iter()
            .map(|field| {
                headers
                    .iter()
                    .position(|h| h == field)
                    .map(|i| (i, field.clone()))
                    .ok_or_else(|| missing(field))
            })
            .collect::<Result<_, _>>()?
    };

    let mut stats = TableStats::default();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        stats.rows += 1;
        let Some(code) = row.get(key_index).and_then(AreaCode::parse) else {
            stats.missing_code += 1;
            continue;
        };
        let values = columns
            .iter()
            .map(|(i, _)| match parse_value(row.get(*i).unwrap_or("")) {
                Ok(value) => value,
                Err(()) => {
                    stats.non_numeric_values += 1;
                    None
                }
            })
            .collect();
        records.push(DemographicRecord { code, values });
    }

    Ok(DemographicTable {
        fields: columns.into_iter().map(|(_, name)| name).collect(),
        records,
        stats,
    })
}

/// Blank → `Ok(None)`; a finite number → `Ok(Some)`; anything else → `Err`.
fn parse_value(cell: &str) -> Result<Option<f64>, ()> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    match cell.replace(',', "").parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(()),
    }
}
