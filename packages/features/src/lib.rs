#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature engineering for property records.
//!
//! Turns filtered property features into [`PropertyRecord`]s, derives the
//! accessibility and crime-density columns from raw distances and counts,
//! and partitions the records into year-built cohorts.

pub mod builder;
pub mod cohort;
pub mod record;

pub use record::{PropertyRecord, PropertySchema, Variable};

use thiserror::Error;

/// Errors that can occur while deriving features or partitioning cohorts.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A derivation ran before the field it depends on was computed.
    #[error("Record {record} is missing '{field}', which must be computed first")]
    MissingField {
        /// Record id.
        record: usize,
        /// Name of the missing field.
        field: &'static str,
    },

    /// Density radius was zero, negative or not finite.
    #[error("Invalid density radius {radius}")]
    InvalidRadius {
        /// The rejected radius.
        radius: f64,
    },

    /// Cohort ranges are malformed.
    #[error("Invalid cohort definition: {message}")]
    InvalidCohort {
        /// Description of what went wrong.
        message: String,
    },
}
