//! Pipeline configuration.
//!
//! One TOML file describes the input layers, the filters, the cohorts and
//! what to model and compare. Relative layer paths resolve against
//! `data_dir`, which itself defaults to the directory of the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use transit_housing_features::{
    PropertySchema, Variable,
    builder::DEFAULT_CRIME_DENSITY_RADIUS,
    cohort::{CohortRange, validate_ranges},
};
use transit_housing_geometry::filter::AttributeFilter;
use transit_housing_geometry_models::Crs;
use transit_housing_stats::ols::ModelSpec;

use crate::PipelineError;

/// Default radius of the primary transit proximity filter.
pub const DEFAULT_TRANSIT_BUFFER: f64 = 800.0;

/// What to do when a secondary filter removes every feature.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmptyFilterPolicy {
    /// Keep the unfiltered set and log a warning.
    #[default]
    Fallback,
    /// Stop the run.
    Abort,
}

/// Layer a secondary filter applies to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterLayer {
    /// The property layer, after the transit filter.
    Properties,
    /// The job-proximity layer.
    Jobs,
}

/// An input layer file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Path to a `GeoJSON` file.
    pub path: PathBuf,
    /// Reference system to assume when the file declares none.
    #[serde(default)]
    pub crs: Option<Crs>,
}

/// Optional sales table joined onto the properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesConfig {
    /// Path to a CSV file.
    pub path: PathBuf,
    /// Key column in the CSV.
    pub key: String,
    /// Property attribute matched against `key`.
    pub property_key: String,
}

/// All input layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayersConfig {
    /// Single-family property parcels or points.
    pub properties: LayerConfig,
    /// Transit lines. Its reference system is the default canonical one.
    pub transit: LayerConfig,
    /// Crime incident points.
    pub crime: LayerConfig,
    /// Job-proximity cells.
    pub jobs: LayerConfig,
    /// Sales table.
    #[serde(default)]
    pub sales: Option<SalesConfig>,
}

/// A secondary attribute filter on one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryFilter {
    /// Layer to filter.
    pub layer: FilterLayer,
    /// The attribute test.
    #[serde(flatten)]
    pub filter: AttributeFilter,
}

/// Which cohorts and variables to compare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Cohort pairs. Empty means the first and last configured cohort.
    pub pairs: Vec<[String; 2]>,
    /// Variables to compare.
    pub variables: Vec<Variable>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            variables: vec![
                Variable::SalePrice,
                Variable::DistToTransit,
                Variable::CrimeDensity,
                Variable::JobAccess,
            ],
        }
    }
}

const fn default_radius() -> f64 {
    DEFAULT_TRANSIT_BUFFER
}

const fn default_crime_density_radius() -> f64 {
    DEFAULT_CRIME_DENSITY_RADIUS
}

/// Complete configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base directory for relative layer paths.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Input layers.
    pub layers: LayersConfig,
    /// Property attribute names.
    #[serde(default)]
    pub schema: PropertySchema,
    /// Canonical reference system. Defaults to the transit layer's.
    #[serde(default)]
    pub canonical_crs: Option<Crs>,
    /// Radius of the primary transit proximity filter.
    #[serde(default = "default_radius")]
    pub transit_buffer: f64,
    /// Radius of the crime density proxy.
    #[serde(default = "default_crime_density_radius")]
    pub crime_density_radius: f64,
    /// Filters applied after the transit filter.
    #[serde(default)]
    pub secondary_filters: Vec<SecondaryFilter>,
    /// Handling of secondary filters that remove everything.
    #[serde(default)]
    pub empty_filter_policy: EmptyFilterPolicy,
    /// Year-built cohorts, in output order.
    pub cohorts: Vec<CohortRange>,
    /// Regression specification.
    #[serde(default)]
    pub model: ModelSpec,
    /// Cohort comparisons.
    #[serde(default)]
    pub comparison: ComparisonConfig,
}

impl PipelineConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Toml`] for malformed TOML and
    /// [`PipelineError::InvalidConfig`] for semantic problems.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file. A missing or relative `data_dir` is
    /// taken relative to the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, plus the
    /// errors of [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.data_dir = Some(match config.data_dir.take() {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        });

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolves a layer path against `data_dir`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.data_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Cohort pairs to compare: the configured pairs, or the first and last
    /// cohort when none are configured and there are at least two.
    #[must_use]
    pub fn comparison_pairs(&self) -> Vec<[String; 2]> {
        if !self.comparison.pairs.is_empty() {
            return self.comparison.pairs.clone();
        }
        match (self.cohorts.first(), self.cohorts.last()) {
            (Some(first), Some(last)) if self.cohorts.len() > 1 => {
                vec![[first.name.clone(), last.name.clone()]]
            }
            _ => Vec::new(),
        }
    }

    /// Filters configured for `layer`, in order.
    pub fn filters_for(&self, layer: FilterLayer) -> impl Iterator<Item = &AttributeFilter> {
        self.secondary_filters
            .iter()
            .filter(move |f| f.layer == layer)
            .map(|f| &f.filter)
    }

    /// Checks cohorts, radii and comparison pairs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |message: String| Err(PipelineError::InvalidConfig { message });

        if self.cohorts.is_empty() {
            return invalid("at least one cohort is required".to_string());
        }
        validate_ranges(&self.cohorts).map_err(|e| PipelineError::InvalidConfig {
            message: e.to_string(),
        })?;

        for (name, radius) in [
            ("transit_buffer", self.transit_buffer),
            ("crime_density_radius", self.crime_density_radius),
        ] {
            if !radius.is_finite() || radius <= 0.0 {
                return invalid(format!("{name} must be positive, got {radius}"));
            }
        }

        for [a, b] in &self.comparison.pairs {
            for name in [a, b] {
                if !self.cohorts.iter().any(|c| &c.name == name) {
                    return invalid(format!("comparison names unknown cohort '{name}'"));
                }
            }
            if a == b {
                return invalid(format!("cohort '{a}' cannot be compared with itself"));
            }
        }

        if self.model.predictors.contains(&self.model.response) {
            return invalid(format!(
                "response '{}' is also listed as a predictor",
                self.model.response
            ));
        }

        Ok(())
    }
}
