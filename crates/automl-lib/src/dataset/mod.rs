//! In-memory tabular data
//!
//! A [`Dataset`] is column-major: every column carries its name and one
//! [`Cell`] per row. Datasets are built from parsed rows (CSV or JSON) and
//! are never mutated in place; filtering returns a new dataset.

mod source;

pub use source::{CsvDirectorySource, DatasetSource};

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;

/// Tokens treated as a missing value (compared case-insensitively)
const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "null", "nan", "none"];

/// A single value in a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Parse a raw text field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
        {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    /// Convert a JSON value from a prediction request
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Cell::Missing,
            Value::Bool(true) => Cell::Text("True".to_string()),
            Value::Bool(false) => Cell::Text("False".to_string()),
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Cell::Number)
                .unwrap_or(Cell::Missing),
            Value::String(s) => Cell::parse(s),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical string form used as a category key
    ///
    /// Integral numbers render without a fractional part so that `1` and
    /// `1.0` share a key.
    pub fn key(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Cell::Number(v) => format!("{v}"),
            Cell::Text(s) => s.clone(),
        }
    }

    /// Hashable identity used for duplicate detection
    fn fingerprint(&self) -> (u8, u64, &str) {
        match self {
            Cell::Missing => (0, 0, ""),
            Cell::Number(v) => (1, v.to_bits(), ""),
            Cell::Text(s) => (2, 0, s.as_str()),
        }
    }
}

/// Parse a number stored as text, tolerating currency symbols and
/// thousands separators
pub fn parse_numeric_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whether `id` can be used as a single path component
pub(crate) fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// A single record for inference: field name to raw value
pub type Record = BTreeMap<String, Cell>;

/// Build a [`Record`] from a JSON object
pub fn record_from_json(fields: &serde_json::Map<String, serde_json::Value>) -> Record {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), Cell::from_json(value)))
        .collect()
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|c| c.is_missing()).count()
    }

    /// Present numeric values, in row order
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Cell::as_number).collect()
    }
}

/// Column-major table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Build from a header and row-major cells
    ///
    /// Short rows are padded with [`Cell::Missing`]; surplus cells are ignored.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let row_count = rows.len();
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(row_count)))
            .collect();

        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.values.push(cells.next().unwrap_or(Cell::Missing));
            }
        }

        Self {
            columns,
            rows: row_count,
        }
    }

    /// Parse delimited text with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> PipelineResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| PipelineError::Parse {
                reason: e.to_string(),
            })?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| PipelineError::Parse {
                reason: e.to_string(),
            })?;
            rows.push(record.iter().map(Cell::parse).collect());
        }

        Ok(Self::from_rows(headers, rows))
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// New dataset without the named columns
    pub fn drop_columns(&self, names: &[String]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name))
                .cloned()
                .collect(),
            rows: self.rows,
        }
    }

    /// New dataset holding the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Self {
            columns,
            rows: indices.len(),
        }
    }

    /// Row `index` as a record
    pub fn row(&self, index: usize) -> Record {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.values[index].clone()))
            .collect()
    }

    fn row_is_empty(&self, index: usize) -> bool {
        self.columns.iter().all(|c| c.values[index].is_missing())
    }

    /// Indices of rows that repeat an earlier row exactly
    pub fn duplicate_rows(&self) -> Vec<usize> {
        let mut seen = HashSet::with_capacity(self.rows);
        let mut duplicates = Vec::new();
        for i in 0..self.rows {
            let fingerprint: Vec<_> = self
                .columns
                .iter()
                .map(|c| c.values[i].fingerprint())
                .collect();
            if !seen.insert(fingerprint) {
                duplicates.push(i);
            }
        }
        duplicates
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_rows().len()
    }

    /// Remove all-missing rows, then exact duplicates (first occurrence kept)
    ///
    /// Returns the cleaned dataset with the number of empty and duplicate
    /// rows removed.
    pub fn clean(&self) -> (Self, CleaningSummary) {
        let keep: Vec<usize> = (0..self.rows).filter(|&i| !self.row_is_empty(i)).collect();
        let empty_rows_removed = self.rows - keep.len();
        let non_empty = self.select_rows(&keep);

        let duplicates: HashSet<usize> = non_empty.duplicate_rows().into_iter().collect();
        let keep: Vec<usize> = (0..non_empty.rows)
            .filter(|i| !duplicates.contains(i))
            .collect();
        let cleaned = non_empty.select_rows(&keep);

        (
            cleaned,
            CleaningSummary {
                empty_rows_removed,
                duplicate_rows_removed: duplicates.len(),
            },
        )
    }
}

/// Rows removed by [`Dataset::clean`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub empty_rows_removed: usize,
    pub duplicate_rows_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse(" 3.5 "), Cell::Number(3.5));
        assert_eq!(Cell::parse("NA"), Cell::Missing);
        assert_eq!(Cell::parse("nan"), Cell::Missing);
        assert_eq!(Cell::parse(""), Cell::Missing);
        assert_eq!(Cell::parse("Yes"), text("Yes"));
        assert_eq!(Cell::parse("inf"), text("inf"));
    }

    #[test]
    fn test_cell_from_json() {
        assert_eq!(Cell::from_json(&serde_json::json!(null)), Cell::Missing);
        assert_eq!(Cell::from_json(&serde_json::json!(2)), Cell::Number(2.0));
        assert_eq!(Cell::from_json(&serde_json::json!("12.5")), Cell::Number(12.5));
        assert_eq!(Cell::from_json(&serde_json::json!(true)), text("True"));
        assert_eq!(Cell::from_json(&serde_json::json!("Fiber")), text("Fiber"));
    }

    #[test]
    fn test_cell_key_normalises_integers() {
        assert_eq!(Cell::Number(1.0).key(), "1");
        assert_eq!(Cell::Number(1.5).key(), "1.5");
        assert_eq!(text("a").key(), "a");
    }

    #[test]
    fn test_parse_numeric_text() {
        assert_eq!(parse_numeric_text("$1,234.50"), Some(1234.5));
        assert_eq!(parse_numeric_text("  42 "), Some(42.0));
        assert_eq!(parse_numeric_text("abc"), None);
        assert_eq!(parse_numeric_text(" "), None);
    }

    #[test]
    fn test_from_csv_reader() {
        let data = "a,b,c\n1,x,\n2,y,3.5\n4\n";
        let ds = Dataset::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column_names(), vec!["a", "b", "c"]);
        assert_eq!(ds.column("c").unwrap().values[0], Cell::Missing);
        assert_eq!(ds.column("c").unwrap().values[1], Cell::Number(3.5));
        // short row padded
        assert_eq!(ds.column("b").unwrap().values[2], Cell::Missing);
    }

    #[test]
    fn test_clean_removes_empty_then_duplicates() {
        let ds = Dataset::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Cell::Number(1.0), text("x")],
                vec![Cell::Missing, Cell::Missing],
                vec![Cell::Number(1.0), text("x")],
                vec![Cell::Number(2.0), text("x")],
            ],
        );
        assert_eq!(ds.duplicate_count(), 1);

        let (cleaned, summary) = ds.clean();
        assert_eq!(summary.empty_rows_removed, 1);
        assert_eq!(summary.duplicate_rows_removed, 1);
        assert_eq!(cleaned.row_count(), 2);
        assert_eq!(cleaned.column("a").unwrap().numbers(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_select_and_drop() {
        let ds = Dataset::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Cell::Number(1.0), text("x")],
                vec![Cell::Number(2.0), text("y")],
            ],
        );
        let picked = ds.select_rows(&[1]);
        assert_eq!(picked.row(0).get("b"), Some(&text("y")));

        let dropped = ds.drop_columns(&["a".to_string()]);
        assert_eq!(dropped.column_names(), vec!["b"]);
        assert_eq!(dropped.row_count(), 2);
    }
}
