#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Statistical analysis of property cohorts.
//!
//! [`ols::fit`] fits an ordinary least-squares model per cohort with an
//! explicit year-built [`factor::Factor`], and [`welch::compare_means`]
//! runs two-sample Welch t-tests between cohorts. Both drop rows that are
//! missing any variable they consume.

pub mod factor;
pub mod ols;
pub mod welch;

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use thiserror::Error;

/// Errors that can occur while fitting models or running tests.
#[derive(Debug, Error)]
pub enum StatsError {
    /// A group had too few complete values for the test.
    #[error("Cohort '{cohort}' has {n} complete values of '{variable}', at least 2 are needed")]
    InsufficientObservations {
        /// Cohort name.
        cohort: String,
        /// Variable tested.
        variable: String,
        /// Complete values found.
        n: usize,
    },

    /// Both groups have zero variance, so the test statistic is undefined.
    #[error("'{variable}' is constant in both cohorts; the t statistic is undefined")]
    ZeroVariance {
        /// Variable tested.
        variable: String,
    },

    /// The normal equations could not be inverted.
    #[error("Design matrix could not be inverted: {message}")]
    Singular {
        /// Description of what went wrong.
        message: String,
    },

    /// A reference distribution could not be constructed.
    #[error("Distribution error: {message}")]
    Distribution {
        /// Description of what went wrong.
        message: String,
    },
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
///
/// `NaN` propagates; an infinite statistic has p-value 0.
///
/// # Errors
///
/// Returns [`StatsError::Distribution`] if `df` is not positive.
pub fn t_two_sided_p_value(t: f64, df: f64) -> Result<f64, StatsError> {
    if t.is_nan() {
        return Ok(f64::NAN);
    }
    if t.is_infinite() {
        return Ok(0.0);
    }
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| StatsError::Distribution {
        message: e.to_string(),
    })?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// Upper-tail p-value of an F statistic.
///
/// # Errors
///
/// Returns [`StatsError::Distribution`] if either degree of freedom is not
/// positive.
pub fn f_upper_p_value(f: f64, df1: f64, df2: f64) -> Result<f64, StatsError> {
    if f.is_nan() {
        return Ok(f64::NAN);
    }
    if f.is_infinite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(df1, df2).map_err(|e| StatsError::Distribution {
        message: e.to_string(),
    })?;
    Ok(dist.sf(f.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_sided_t_matches_reference_values() {
        // qt(0.975, 10) = 2.228139
        let p = t_two_sided_p_value(2.228_139, 10.0).unwrap();
        assert!((p - 0.05).abs() < 1e-5, "p = {p}");
        assert!((t_two_sided_p_value(0.0, 3.0).unwrap() - 1.0).abs() < 1e-12);
        assert!(t_two_sided_p_value(f64::NAN, 3.0).unwrap().is_nan());
        assert!(t_two_sided_p_value(f64::INFINITY, 3.0).unwrap().abs() < f64::EPSILON);
        assert!(t_two_sided_p_value(1.0, 0.0).is_err());
    }

    #[test]
    fn f_upper_tail_matches_reference_value() {
        // qf(0.95, 2, 20) = 3.492828
        let p = f_upper_p_value(3.492_828, 2.0, 20.0).unwrap();
        assert!((p - 0.05).abs() < 1e-5, "p = {p}");
    }
}
