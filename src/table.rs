//! Adapter between an already-parsed table and pipeline rows.
//!
//! The upstream collaborator decodes CSV/spreadsheet bytes; this module only
//! needs column access by name. `option_type` is the one optional column.

use crate::errors::{PipelineError, PipelineResult};
use crate::types::{CellValue, InputRow};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const REQUIRED_COLUMNS: [&str; 5] = ["S", "K", "T", "r", "sigma"];
pub const OPTION_TYPE_COLUMN: &str = "option_type";

/// Row-ordered input table. Rows are indexed by their position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    rows: Vec<InputRow>,
}

impl InputTable {
    /// Build from named columns. All required columns must be present and
    /// every column must have the same length.
    pub fn from_columns(mut columns: HashMap<String, Vec<CellValue>>) -> PipelineResult<Self> {
        check_required(|name| columns.contains_key(name))?;

        let n_rows = columns.get("S").map_or(0, Vec::len);
        if let Some((name, col)) = columns.iter().find(|(_, c)| c.len() != n_rows) {
            return Err(PipelineError::Parse(format!(
                "column {name} has {} rows, expected {n_rows}",
                col.len()
            )));
        }

        let mut take = |name: &str| columns.remove(name).unwrap_or_default().into_iter();
        let (mut s, mut k, mut t, mut r, mut sigma) =
            (take("S"), take("K"), take("T"), take("r"), take("sigma"));
        let mut opt = take(OPTION_TYPE_COLUMN);

        let rows = (0..n_rows)
            .map(|row_index| InputRow {
                row_index,
                spot: s.next().unwrap_or_default(),
                strike: k.next().unwrap_or_default(),
                expiry: t.next().unwrap_or_default(),
                rate: r.next().unwrap_or_default(),
                sigma: sigma.next().unwrap_or_default(),
                option_type: opt.next().and_then(option_type_text),
            })
            .collect();

        Ok(Self { rows })
    }

    /// Build from row objects keyed by column name. The column set is the
    /// union of keys; a required column absent from every record is an error,
    /// while a key missing from an individual record reads as null.
    pub fn from_records(records: Vec<Map<String, Value>>) -> PipelineResult<Self> {
        if !records.is_empty() {
            check_required(|name| records.iter().any(|rec| rec.contains_key(name)))?;
        }

        let rows = records
            .into_iter()
            .enumerate()
            .map(|(row_index, mut rec)| {
                let mut cell = |name: &str| rec.remove(name).map(cell_from_json).unwrap_or_default();
                InputRow {
                    row_index,
                    spot: cell("S"),
                    strike: cell("K"),
                    expiry: cell("T"),
                    rate: cell("r"),
                    sigma: cell("sigma"),
                    option_type: option_type_text(cell(OPTION_TYPE_COLUMN)),
                }
            })
            .collect();

        Ok(Self { rows })
    }

    /// Parse a JSON array of row objects.
    pub fn from_json(text: &str) -> PipelineResult<Self> {
        let records: Vec<Map<String, Value>> = serde_json::from_str(text)?;
        Self::from_records(records)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[InputRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<InputRow> {
        self.rows
    }
}

impl From<Vec<InputRow>> for InputTable {
    fn from(rows: Vec<InputRow>) -> Self {
        Self { rows }
    }
}

fn check_required(has: impl Fn(&str) -> bool) -> PipelineResult<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| !has(name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingColumns(missing))
    }
}

fn cell_from_json(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(b),
        Value::Number(n) => n.as_f64().map_or(CellValue::Null, CellValue::Number),
        Value::String(s) => CellValue::Text(s),
        // Nested structures are not cell values; keep their text so the echo
        // still shows what arrived.
        other => CellValue::Text(other.to_string()),
    }
}

fn option_type_text(cell: CellValue) -> Option<String> {
    match cell {
        CellValue::Null => None,
        CellValue::Text(s) => Some(s),
        CellValue::Bool(b) => Some(b.to_string()),
        CellValue::Number(x) => Some(x.to_string()),
    }
}
