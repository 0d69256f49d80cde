#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reading input layers and writing enriched records.
//!
//! Layers are `GeoJSON` feature collections. The reference system comes
//! from the file's legacy `crs` member when present, otherwise from the
//! caller's declaration. An optional sales CSV is joined onto the property
//! layer by key.

pub mod export;
pub mod layer;
pub mod sales;

use std::path::PathBuf;

use thiserror::Error;
use transit_housing_geometry_models::ParseCrsError;

/// Errors that can occur while reading or writing layers.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid `GeoJSON`.
    #[error("GeoJSON error in layer '{layer}': {source}")]
    GeoJson {
        /// Layer name.
        layer: String,
        /// Underlying error.
        source: geojson::Error,
    },

    /// The `GeoJSON` document is not a feature collection.
    #[error("Layer '{layer}' is not a FeatureCollection")]
    NotFeatureCollection {
        /// Layer name.
        layer: String,
    },

    /// The layer declares a reference system that is not supported.
    #[error("Layer '{layer}': {source}")]
    Crs {
        /// Layer name.
        layer: String,
        /// Underlying error.
        source: ParseCrsError,
    },

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required column is missing from a table.
    #[error("Column '{column}' not found in {}", path.display())]
    MissingColumn {
        /// Column name.
        column: String,
        /// File searched.
        path: PathBuf,
    },
}
