//! Derived feature columns.
//!
//! Each derivation is a pure function of fields computed earlier:
//!
//! 1. `job_access = 1 / (dist_to_jobs + 1)`
//! 2. `crime_density = count / R²` (a relative proxy; π is deliberately
//!    left out)
//! 3. `log_crime_density = ln(crime_density)`, missing when the density is
//!    not positive
//! 4. `scaled_log_crime_density`, standardized over the whole working set
//!    before any cohort split
//! 5. `scaled_log_crime_density_sq`

use crate::{FeatureError, PropertyRecord};

/// Default buffer radius for the crime density proxy.
pub const DEFAULT_CRIME_DENSITY_RADIUS: f64 = 800.0;

/// Inverse-distance accessibility score in `(0, 1]` for non-negative
/// distances.
#[must_use]
pub fn job_access(dist_to_jobs: f64) -> f64 {
    1.0 / (dist_to_jobs + 1.0)
}

/// Incidents per squared radius unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn crime_density(count: usize, radius: f64) -> f64 {
    count as f64 / (radius * radius)
}

/// Natural log of a density, or `None` when it is not positive.
#[must_use]
pub fn log_density(density: f64) -> Option<f64> {
    (density > 0.0 && density.is_finite()).then(|| density.ln())
}

/// Mean and population standard deviation a column was standardized with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standardization {
    /// Number of non-missing values.
    pub n: usize,
    /// Mean of the non-missing values.
    pub mean: f64,
    /// Population standard deviation of the non-missing values.
    pub std_dev: f64,
}

/// Standardizes the present values to zero mean and unit population
/// variance. Missing values stay missing.
///
/// When no value is present, or the deviation is zero (including a single
/// value), every output is missing and no [`Standardization`] is returned.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn standardize(values: &[Option<f64>]) -> (Vec<Option<f64>>, Option<Standardization>) {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    let n = present.len();
    if n == 0 {
        return (vec![None; values.len()], None);
    }

    let mean = present.iter().sum::<f64>() / n as f64;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();

    if !std_dev.is_finite() || std_dev <= 0.0 {
        return (vec![None; values.len()], None);
    }

    let scaled = values
        .iter()
        .map(|v| v.map(|x| (x - mean) / std_dev))
        .collect();

    (scaled, Some(Standardization { n, mean, std_dev }))
}

/// Runs the derivation steps over a working set of records.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    crime_density_radius: f64,
}

impl FeatureBuilder {
    /// Creates a builder with the given density radius.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::InvalidRadius`] if the radius is not a
    /// positive finite number.
    pub fn new(crime_density_radius: f64) -> Result<Self, FeatureError> {
        if !crime_density_radius.is_finite() || crime_density_radius <= 0.0 {
            return Err(FeatureError::InvalidRadius {
                radius: crime_density_radius,
            });
        }
        Ok(Self {
            crime_density_radius,
        })
    }

    /// The density radius.
    #[must_use]
    pub const fn crime_density_radius(&self) -> f64 {
        self.crime_density_radius
    }

    /// Fills `job_access` through `scaled_log_crime_density_sq` on every
    /// record.
    ///
    /// Standardization spans all of `records`, so call this on the whole
    /// working set before partitioning.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::MissingField`] if a record lacks
    /// `dist_to_jobs` or `crime_count`.
    pub fn build(
        &self,
        records: &mut [PropertyRecord],
    ) -> Result<Option<Standardization>, FeatureError> {
        for record in records.iter_mut() {
            let dist = record.dist_to_jobs.ok_or(FeatureError::MissingField {
                record: record.id,
                field: "dist_to_jobs",
            })?;
            let count = record.crime_count.ok_or(FeatureError::MissingField {
                record: record.id,
                field: "crime_count",
            })?;

            let density = crime_density(count, self.crime_density_radius);
            record.job_access = Some(job_access(dist));
            record.crime_density = Some(density);
            record.log_crime_density = log_density(density);
        }

        let logs: Vec<Option<f64>> = records.iter().map(|r| r.log_crime_density).collect();
        let (scaled, standardization) = standardize(&logs);

        for (record, z) in records.iter_mut().zip(scaled) {
            record.scaled_log_crime_density = z;
            record.scaled_log_crime_density_sq = z.map(|z| z * z);
        }

        let missing = records
            .iter()
            .filter(|r| r.log_crime_density.is_none())
            .count();
        if missing > 0 {
            log::warn!(
                "{missing}/{} records have no crime within {} units; their log density is missing",
                records.len(),
                self.crime_density_radius
            );
        }
        if let Some(s) = &standardization {
            log::info!(
                "Standardized log crime density over {} records (mean {:.4}, sd {:.4})",
                s.n,
                s.mean,
                s.std_dev
            );
        }

        Ok(standardization)
    }
}
