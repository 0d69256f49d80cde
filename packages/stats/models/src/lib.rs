#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types for per-cohort regressions and cohort mean comparisons.
//!
//! These are plain data: the fitting and testing live in
//! `transit_housing_stats`, the tabulation in `transit_housing_report`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Significance threshold used to flag a comparison as significant.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Conventional significance codes for a p-value.
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
pub enum Significance {
    /// `p < 0.001`
    #[strum(serialize = "***")]
    #[serde(rename = "***")]
    VeryHigh,
    /// `p < 0.01`
    #[strum(serialize = "**")]
    #[serde(rename = "**")]
    High,
    /// `p < 0.05`
    #[strum(serialize = "*")]
    #[serde(rename = "*")]
    Moderate,
    /// `p < 0.1`
    #[strum(serialize = ".")]
    #[serde(rename = ".")]
    Weak,
    /// Not significant.
    #[strum(serialize = "")]
    #[serde(rename = "")]
    None,
}

impl Significance {
    /// Classifies a p-value. `NaN` is treated as not significant.
    #[must_use]
    pub fn from_p_value(p: f64) -> Self {
        if p < 0.001 {
            Self::VeryHigh
        } else if p < 0.01 {
            Self::High
        } else if p < 0.05 {
            Self::Moderate
        } else if p < 0.1 {
            Self::Weak
        } else {
            Self::None
        }
    }
}

/// One row of a coefficient table.
///
/// Every number is `NaN` for a term aliased with earlier terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    /// Term name: `(Intercept)`, a predictor, or `year_built[<level>]`.
    pub term: String,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error of the estimate.
    pub std_error: f64,
    /// `estimate / std_error`.
    pub t_value: f64,
    /// Two-sided p-value of the t statistic.
    pub p_value: f64,
}

impl Coefficient {
    /// Significance code for this coefficient.
    #[must_use]
    pub fn significance(&self) -> Significance {
        Significance::from_p_value(self.p_value)
    }
}

/// Whole-model fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    /// Rows used in the fit.
    pub n: usize,
    /// Residual degrees of freedom, `n - rank`.
    pub df_residual: usize,
    /// Model degrees of freedom excluding the intercept, `rank - 1`.
    pub df_model: usize,
    /// `sqrt(RSS / df_residual)`.
    pub residual_std_error: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// R² adjusted for the number of terms.
    pub adj_r_squared: f64,
    /// Overall F statistic, absent when the model has no slope terms.
    pub f_statistic: Option<f64>,
    /// Upper-tail p-value of the F statistic.
    pub f_p_value: Option<f64>,
}

/// A fitted regression for one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    /// Cohort the model was fit on.
    pub cohort: String,
    /// Response variable name.
    pub response: String,
    /// Coefficients, intercept first.
    pub coefficients: Vec<Coefficient>,
    /// Fit statistics.
    pub fit: FitStatistics,
}

impl ModelResult {
    /// Looks up a coefficient by term name.
    #[must_use]
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }
}

/// Outcome of fitting a cohort: a model, or a note explaining why no
/// model could be fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    /// The model was fit.
    Fitted(ModelResult),
    /// Too few complete rows to fit.
    InsufficientData {
        /// Cohort name.
        cohort: String,
        /// Complete rows available.
        rows: usize,
        /// Human-readable reason.
        message: String,
    },
}

impl FitOutcome {
    /// Cohort this outcome belongs to.
    #[must_use]
    pub fn cohort(&self) -> &str {
        match self {
            Self::Fitted(model) => &model.cohort,
            Self::InsufficientData { cohort, .. } => cohort,
        }
    }

    /// The fitted model, if any.
    #[must_use]
    pub const fn model(&self) -> Option<&ModelResult> {
        match self {
            Self::Fitted(model) => Some(model),
            Self::InsufficientData { .. } => None,
        }
    }
}

/// Welch two-sample t-test of one variable between two cohorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Variable compared.
    pub variable: String,
    /// Cohort names, in comparison order.
    pub cohorts: [String; 2],
    /// Sample means, unrounded.
    pub means: [f64; 2],
    /// Sample sizes.
    pub n: [usize; 2],
    /// Welch t statistic, `(mean_a - mean_b) / se`.
    pub t_statistic: f64,
    /// Welch-Satterthwaite degrees of freedom.
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

impl TestResult {
    /// Means rounded to two decimals for display.
    #[must_use]
    pub fn rounded_means(&self) -> [f64; 2] {
        self.means.map(|m| (m * 100.0).round() / 100.0)
    }

    /// Whether the difference is significant at [`SIGNIFICANCE_LEVEL`].
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.p_value < SIGNIFICANCE_LEVEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significance_codes() {
        assert_eq!(Significance::from_p_value(0.0001).to_string(), "***");
        assert_eq!(Significance::from_p_value(0.001).to_string(), "**");
        assert_eq!(Significance::from_p_value(0.049).to_string(), "*");
        assert_eq!(Significance::from_p_value(0.05).to_string(), ".");
        assert_eq!(Significance::from_p_value(0.5).to_string(), "");
        assert_eq!(Significance::from_p_value(f64::NAN), Significance::None);
        assert_eq!("**".parse::<Significance>().unwrap(), Significance::High);
    }

    #[test]
    fn rounds_means_for_display() {
        let result = TestResult {
            variable: "sale_price".to_string(),
            cohorts: ["a".to_string(), "b".to_string()],
            means: [300_000.126, 499_999.994],
            n: [50, 50],
            t_statistic: -10.0,
            df: 97.5,
            p_value: 1e-12,
        };
        assert_eq!(result.rounded_means(), [300_000.13, 499_999.99]);
        assert!(result.is_significant());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = FitOutcome::InsufficientData {
            cohort: "1990_2000".to_string(),
            rows: 4,
            message: "too few rows".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "insufficient_data");
        assert_eq!(json["rows"], 4);
        assert_eq!(outcome.cohort(), "1990_2000");
        assert!(outcome.model().is_none());
    }
}
