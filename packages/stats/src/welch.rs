//! Welch's unequal-variance two-sample t-test.

use transit_housing_features::{PropertyRecord, Variable, cohort::Cohort};
use transit_housing_stats_models::TestResult;

use crate::{StatsError, t_two_sided_p_value};

/// Test statistic, Welch-Satterthwaite degrees of freedom and two-sided
/// p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Welch {
    /// `(mean_a - mean_b) / sqrt(var_a / n_a + var_b / n_b)`.
    pub t_statistic: f64,
    /// Welch-Satterthwaite degrees of freedom.
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

#[allow(clippy::cast_precision_loss)]
fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

/// Runs the test on two samples.
///
/// # Errors
///
/// Returns [`StatsError::InsufficientObservations`] if a sample has fewer
/// than two values, [`StatsError::ZeroVariance`] if both samples are
/// constant, or [`StatsError::Distribution`] if the degrees of freedom are
/// degenerate.
#[allow(clippy::cast_precision_loss)]
pub fn welch_t_test(variable: &str, a: &[f64], b: &[f64]) -> Result<Welch, StatsError> {
    for (label, sample) in [("a", a), ("b", b)] {
        if sample.len() < 2 {
            return Err(StatsError::InsufficientObservations {
                cohort: label.to_string(),
                variable: variable.to_string(),
                n: sample.len(),
            });
        }
    }

    let (mean_a, var_a) = mean_and_variance(a);
    let (mean_b, var_b) = mean_and_variance(b);
    let se_a = var_a / a.len() as f64;
    let se_b = var_b / b.len() as f64;
    let se2 = se_a + se_b;

    if se2 <= 0.0 || !se2.is_finite() {
        return Err(StatsError::ZeroVariance {
            variable: variable.to_string(),
        });
    }

    let t_statistic = (mean_a - mean_b) / se2.sqrt();
    let df = se2.powi(2)
        / (se_a.powi(2) / (a.len() - 1) as f64 + se_b.powi(2) / (b.len() - 1) as f64);

    Ok(Welch {
        t_statistic,
        df,
        p_value: t_two_sided_p_value(t_statistic, df)?,
    })
}

fn present(records: &[PropertyRecord], variable: Variable) -> Vec<f64> {
    records.iter().filter_map(|r| r.value(variable)).collect()
}

/// Compares the means of `variable` between two cohorts, using only the
/// records where it is present.
///
/// # Errors
///
/// Returns [`StatsError::InsufficientObservations`] if either cohort has
/// fewer than two values, plus the errors of [`welch_t_test`].
#[allow(clippy::cast_precision_loss)]
pub fn compare_means(
    a: &Cohort,
    b: &Cohort,
    variable: Variable,
) -> Result<TestResult, StatsError> {
    let name = variable.to_string();
    let values_a = present(&a.records, variable);
    let values_b = present(&b.records, variable);

    for (cohort, values) in [(a, &values_a), (b, &values_b)] {
        if values.len() < 2 {
            return Err(StatsError::InsufficientObservations {
                cohort: cohort.name().to_string(),
                variable: name.clone(),
                n: values.len(),
            });
        }
    }

    let welch = welch_t_test(&name, &values_a, &values_b)?;
    let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;

    log::debug!(
        "{name}: '{}' vs '{}' t = {:.4}, df = {:.2}, p = {:.4e}",
        a.name(),
        b.name(),
        welch.t_statistic,
        welch.df,
        welch.p_value
    );

    Ok(TestResult {
        variable: name,
        cohorts: [a.name().to_string(), b.name().to_string()],
        means: [mean(&values_a), mean(&values_b)],
        n: [values_a.len(), values_b.len()],
        t_statistic: welch.t_statistic,
        df: welch.df,
        p_value: welch.p_value,
    })
}

#[cfg(test)]
mod tests {
    use transit_housing_features::cohort::{CohortRange, partition};

    use super::*;

    #[test]
    fn matches_reference_welch_values() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let welch = welch_t_test("x", &a, &b).unwrap();
        assert!((welch.t_statistic + 1.897_366_6).abs() < 1e-6, "{welch:?}");
        assert!((welch.df - 5.882_352_9).abs() < 1e-6, "{welch:?}");
        assert!((welch.p_value - 0.107_531).abs() < 1e-4, "{welch:?}");
    }

    #[test]
    fn constant_samples_are_rejected() {
        assert!(matches!(
            welch_t_test("x", &[1.0, 1.0], &[2.0, 2.0]),
            Err(StatsError::ZeroVariance { .. })
        ));
    }

    fn priced(year: i32, prices: impl Iterator<Item = f64>) -> Vec<PropertyRecord> {
        prices
            .map(|price| PropertyRecord {
                year_built: Some(year),
                sale_price: Some(price),
                ..PropertyRecord::default()
            })
            .collect()
    }

    #[test]
    fn separated_cohorts_differ_significantly() {
        // Symmetric offsets keep each sample mean exact.
        let offsets = || (0..50).map(|i| (f64::from(i) - 24.5) * 1_000.0);
        let mut records = priced(1995, offsets().map(|o| 300_000.0 + o));
        records.extend(priced(2015, offsets().map(|o| 500_000.0 + o)));
        records.push(PropertyRecord {
            year_built: Some(1996),
            ..PropertyRecord::default()
        });

        let cohorts = partition(
            &records,
            &[
                CohortRange::new("1990_2000", 1990, 2001),
                CohortRange::new("2010_2024", 2010, 2025),
            ],
        )
        .unwrap();
        let early = cohorts.get("1990_2000").unwrap();
        let late = cohorts.get("2010_2024").unwrap();

        let result = compare_means(early, late, Variable::SalePrice).unwrap();
        assert_eq!(result.n, [50, 50]);
        assert_eq!(result.rounded_means(), [300_000.0, 500_000.0]);
        assert!(result.p_value < 0.001, "p = {}", result.p_value);
        assert!(result.is_significant());
        assert!(result.t_statistic < 0.0);
        assert_eq!(result.cohorts, ["1990_2000".to_string(), "2010_2024".to_string()]);
    }

    #[test]
    fn too_few_values_is_an_error() {
        let records = priced(1995, [1.0].into_iter());
        let ranges = [
            CohortRange::new("a", 1990, 2000),
            CohortRange::new("b", 2000, 2010),
        ];
        let cohorts = partition(&records, &ranges).unwrap();
        let err = compare_means(
            cohorts.get("a").unwrap(),
            cohorts.get("b").unwrap(),
            Variable::SalePrice,
        )
        .unwrap_err();
        assert!(matches!(err, StatsError::InsufficientObservations { n: 1, .. }));
    }
}
