//! The canonical tabular result type.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::ReportError;

/// A single table value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Numeric value, unformatted.
    Number(f64),
    /// Text value.
    Text(String),
    /// No value.
    Missing,
}

impl Cell {
    /// A numeric cell, or [`Cell::Missing`] for `NaN` and infinities.
    #[must_use]
    pub const fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Missing
        }
    }

    /// A numeric cell from an optional value.
    #[must_use]
    pub fn optional(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::number)
    }

    /// A text cell.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The numeric value, if any.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) | Self::Missing => None,
        }
    }

    /// The text value, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) | Self::Missing => None,
        }
    }

    fn to_field(&self) -> String {
        match self {
            Self::Number(v) => v.to_string(),
            Self::Text(s) => s.clone(),
            Self::Missing => String::new(),
        }
    }

    fn from_field(field: &str) -> Self {
        if field.is_empty() {
            Self::Missing
        } else if let Ok(v) = field.parse::<f64>() {
            Self::number(v)
        } else {
            Self::Text(field.to_string())
        }
    }
}

/// One row: column name to value.
pub type Row = BTreeMap<String, Cell>;

/// An ordered sequence of rows with a declared column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// File-safe identifier, e.g. `regression_1990_2000`.
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Column names in display order.
    pub columns: Vec<String>,
    /// Rows in display order.
    pub rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row given as `(column, value)` pairs. Columns not named
    /// are [`Cell::Missing`].
    pub fn push_row<I, K>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (K, Cell)>,
        K: Into<String>,
    {
        let mut row: Row = cells.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for column in &self.columns {
            row.entry(column.clone()).or_insert(Cell::Missing);
        }
        self.rows.push(row);
    }

    /// Values of one column in row order. Empty if the column is unknown.
    #[must_use]
    pub fn column(&self, name: &str) -> Vec<&Cell> {
        self.rows.iter().filter_map(|row| row.get(name)).collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the table as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Csv`] if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(self.columns.iter().map(|c| {
                row.get(c).map(Cell::to_field).unwrap_or_default()
            }))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Reads a table written by [`Table::write_csv`].
    ///
    /// CSV carries no cell types, so they are inferred per field: empty
    /// fields read back as [`Cell::Missing`] and fields that parse as a
    /// number as [`Cell::Number`]. An empty text cell (the blank
    /// significance code) or numeric-looking text (a cohort named `2010`)
    /// therefore does not round-trip. The JSON report keeps exact types.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Csv`] if the input is not valid CSV.
    pub fn read_csv<R: Read>(
        name: impl Into<String>,
        title: impl Into<String>,
        reader: R,
    ) -> Result<Self, ReportError> {
        let mut csv = csv::Reader::from_reader(reader);
        let columns: Vec<String> = csv.headers()?.iter().map(ToString::to_string).collect();

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            let row: Row = columns
                .iter()
                .zip(record.iter())
                .map(|(c, field)| (c.clone(), Cell::from_field(field)))
                .collect();
            rows.push(row);
        }

        Ok(Self {
            name: name.into(),
            title: title.into(),
            columns,
            rows,
        })
    }
}
