#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result assembly.
//!
//! Fit outcomes and comparison results are packaged once into [`Table`]s,
//! which every downstream consumer reads as-is. Values stay unformatted
//! except where a table explicitly rounds for display (comparison means).

mod bundle;
mod table;

pub use bundle::{
    REGRESSION_COLUMNS, ReportBundle, SUMMARY_COLUMNS, comparison_table, model_summary_table,
    regression_table,
};
pub use table::{Cell, Row, Table};

use thiserror::Error;

/// Errors that can occur while writing result tables.
#[derive(Debug, Error)]
pub enum ReportError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
