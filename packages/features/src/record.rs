//! The property record and its named numeric variables.
//!
//! A record starts with the raw attributes read from the property layer and
//! gains derived fields in pipeline order: distances, then
//! density/transform columns, then the cohort label.

use geo::Point;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use transit_housing_geometry_models::Feature;
use transit_housing_spatial::representative_point;

/// Property-layer attribute names for the raw fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySchema {
    /// Sale price attribute.
    pub sale_price: String,
    /// Year-built attribute.
    pub year_built: String,
    /// Living area attribute.
    pub living_area: String,
}

impl Default for PropertySchema {
    fn default() -> Self {
        Self {
            sale_price: "SALE_PRICE".to_string(),
            year_built: "YEAR_BUILT".to_string(),
            living_area: "LIVING_AREA".to_string(),
        }
    }
}

/// Numeric columns of a [`PropertyRecord`] that models, tests and tables
/// can refer to by name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Variable {
    /// Recorded sale price.
    SalePrice,
    /// Living area.
    LivingArea,
    /// Construction year.
    YearBuilt,
    /// Minimum-edge distance to the transit network.
    DistToTransit,
    /// Distance to the nearest crime incident.
    DistToCrime,
    /// Distance to the nearest job-proximity cell.
    DistToJobs,
    /// `1 / (dist_to_jobs + 1)`.
    JobAccess,
    /// Incidents within the density radius over the radius squared.
    CrimeDensity,
    /// Natural log of `crime_density`.
    LogCrimeDensity,
    /// `log_crime_density` standardized over the working set.
    ScaledLogCrimeDensity,
    /// Square of `scaled_log_crime_density`.
    ScaledLogCrimeDensitySq,
}

impl Variable {
    /// Every variable, in column order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SalePrice,
            Self::LivingArea,
            Self::YearBuilt,
            Self::DistToTransit,
            Self::DistToCrime,
            Self::DistToJobs,
            Self::JobAccess,
            Self::CrimeDensity,
            Self::LogCrimeDensity,
            Self::ScaledLogCrimeDensity,
            Self::ScaledLogCrimeDensitySq,
        ]
    }
}

/// A single-family property with its raw and derived fields.
///
/// Derived fields stay `None` until their stage has run, and stay `None`
/// afterwards when the value is undefined (for example the log of a zero
/// density). Downstream statistics drop incomplete rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    /// Position in the filtered property layer.
    pub id: usize,
    /// Point that distances are measured from.
    pub location: Point<f64>,
    /// Sale price.
    pub sale_price: Option<f64>,
    /// Living area.
    pub living_area: Option<f64>,
    /// Construction year.
    pub year_built: Option<i32>,
    /// Distance to transit lines.
    pub dist_to_transit: Option<f64>,
    /// Distance to nearest crime incident.
    pub dist_to_crime: Option<f64>,
    /// Distance to nearest job-proximity cell.
    pub dist_to_jobs: Option<f64>,
    /// Crime incidents within the density radius.
    pub crime_count: Option<usize>,
    /// Inverse-distance job accessibility.
    pub job_access: Option<f64>,
    /// Areal crime density proxy.
    pub crime_density: Option<f64>,
    /// `ln(crime_density)`.
    pub log_crime_density: Option<f64>,
    /// Standardized `log_crime_density`.
    pub scaled_log_crime_density: Option<f64>,
    /// Squared `scaled_log_crime_density`.
    pub scaled_log_crime_density_sq: Option<f64>,
    /// Cohort label, if the year falls in a configured range.
    pub cohort: Option<String>,
}

impl Default for PropertyRecord {
    fn default() -> Self {
        Self {
            id: 0,
            location: Point::new(0.0, 0.0),
            sale_price: None,
            living_area: None,
            year_built: None,
            dist_to_transit: None,
            dist_to_crime: None,
            dist_to_jobs: None,
            crime_count: None,
            job_access: None,
            crime_density: None,
            log_crime_density: None,
            scaled_log_crime_density: None,
            scaled_log_crime_density_sq: None,
            cohort: None,
        }
    }
}

impl PropertyRecord {
    /// Builds a record from a property feature using `schema` to find the
    /// raw fields.
    ///
    /// Returns `None` if the feature has no usable location.
    #[must_use]
    pub fn from_feature(id: usize, feature: &Feature, schema: &PropertySchema) -> Option<Self> {
        let location = representative_point(&feature.geometry)?;

        Some(Self {
            id,
            location,
            sale_price: feature.numeric(&schema.sale_price),
            living_area: feature.numeric(&schema.living_area),
            year_built: feature.numeric(&schema.year_built).and_then(to_year),
            ..Self::default()
        })
    }

    /// Reads a variable as a number.
    #[must_use]
    pub fn value(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::SalePrice => self.sale_price,
            Variable::LivingArea => self.living_area,
            Variable::YearBuilt => self.year_built.map(f64::from),
            Variable::DistToTransit => self.dist_to_transit,
            Variable::DistToCrime => self.dist_to_crime,
            Variable::DistToJobs => self.dist_to_jobs,
            Variable::JobAccess => self.job_access,
            Variable::CrimeDensity => self.crime_density,
            Variable::LogCrimeDensity => self.log_crime_density,
            Variable::ScaledLogCrimeDensity => self.scaled_log_crime_density,
            Variable::ScaledLogCrimeDensitySq => self.scaled_log_crime_density_sq,
        }
    }

    /// Reads several variables, or `None` if any is missing.
    #[must_use]
    pub fn values(&self, variables: &[Variable]) -> Option<Vec<f64>> {
        variables.iter().map(|&v| self.value(v)).collect()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_year(value: f64) -> Option<i32> {
    let rounded = value.round();
    ((rounded - value).abs() < 1e-9 && (1.0..=9999.0).contains(&rounded))
        .then_some(rounded as i32)
}
