//! Ordinary least squares with an optional categorical control.
//!
//! The model is `response ~ 1 + predictors + dummies(categorical)`. Only
//! rows with every consumed variable present are used. Columns that are a
//! linear combination of earlier columns are aliased: they get no estimate
//! and do not count towards the model rank. Coefficients of the remaining
//! columns come from the normal equations, inverted by QR with an SVD
//! pseudo-inverse fallback.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use transit_housing_features::{PropertyRecord, Variable};
use transit_housing_stats_models::{Coefficient, FitOutcome, FitStatistics, ModelResult};

use crate::{StatsError, f_upper_p_value, factor::Factor, t_two_sided_p_value};

/// Cohorts with this many usable rows or fewer are not fit.
pub const MIN_ROWS: usize = 10;

/// Name of the intercept term.
pub const INTERCEPT: &str = "(Intercept)";

/// A design column whose residual against the earlier columns is smaller
/// than this fraction of its own norm is aliased.
pub const ALIAS_TOLERANCE: f64 = 1e-7;

/// What to regress on what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// Response variable.
    pub response: Variable,
    /// Numeric predictors, in coefficient order.
    pub predictors: Vec<Variable>,
    /// Categorical control, dummy-encoded.
    pub categorical: Option<Variable>,
    /// Reference level of the categorical control. Defaults to the
    /// smallest observed level.
    pub reference_level: Option<i64>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            response: Variable::SalePrice,
            predictors: vec![
                Variable::DistToTransit,
                Variable::LivingArea,
                Variable::JobAccess,
                Variable::ScaledLogCrimeDensity,
                Variable::ScaledLogCrimeDensitySq,
            ],
            categorical: Some(Variable::YearBuilt),
            reference_level: None,
        }
    }
}

struct Rows {
    response: Vec<f64>,
    predictors: Vec<Vec<f64>>,
    levels: Vec<i64>,
}

#[allow(clippy::cast_possible_truncation)]
fn to_level(value: f64) -> Option<i64> {
    let rounded = value.round();
    ((rounded - value).abs() < 1e-9 && rounded.abs() < 1e15).then_some(rounded as i64)
}

fn complete_rows(records: &[PropertyRecord], spec: &ModelSpec) -> Rows {
    let mut rows = Rows {
        response: Vec::with_capacity(records.len()),
        predictors: Vec::with_capacity(records.len()),
        levels: Vec::new(),
    };

    for record in records {
        let Some(y) = record.value(spec.response) else {
            continue;
        };
        let Some(x) = record.values(&spec.predictors) else {
            continue;
        };
        let level = match spec.categorical {
            Some(variable) => match record.value(variable).and_then(to_level) {
                Some(level) => Some(level),
                None => continue,
            },
            None => None,
        };

        rows.response.push(y);
        rows.predictors.push(x);
        rows.levels.extend(level);
    }

    rows
}

/// Indices of the columns of `x` that are not a linear combination of the
/// columns kept before them, in column order.
fn independent_columns(x: &DMatrix<f64>) -> Vec<usize> {
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept = Vec::new();

    for j in 0..x.ncols() {
        let column = x.column(j).into_owned();
        let scale = column.norm();
        let mut residual = column;
        // Re-orthogonalize once; a single Gram-Schmidt pass leaves round-off
        // of the order of the tolerance on nearly aliased columns.
        for _ in 0..2 {
            for q in &basis {
                let projection = q.dot(&residual);
                residual.axpy(-projection, q, 1.0);
            }
        }

        let norm = residual.norm();
        if scale > 0.0 && norm > ALIAS_TOLERANCE * scale {
            basis.push(residual / norm);
            kept.push(j);
        }
    }

    kept
}

fn invert(matrix: DMatrix<f64>) -> Result<DMatrix<f64>, StatsError> {
    let size = matrix.nrows();
    let identity = DMatrix::identity(size, size);

    if let Some(inverse) = matrix.clone().qr().solve(&identity) {
        return Ok(inverse);
    }

    log::warn!("Design matrix is rank deficient; falling back to the pseudo-inverse");
    matrix
        .pseudo_inverse(f64::EPSILON * 100.0)
        .map_err(|e| StatsError::Singular {
            message: e.to_string(),
        })
}

fn insufficient(cohort: &str, rows: usize, message: String) -> FitOutcome {
    log::warn!("Cohort '{cohort}': {message}");
    FitOutcome::InsufficientData {
        cohort: cohort.to_string(),
        rows,
        message,
    }
}

/// Fits `spec` on the complete rows of `records`.
///
/// Returns [`FitOutcome::InsufficientData`] instead of a model when there
/// are [`MIN_ROWS`] or fewer complete rows, or no more rows than terms.
/// Aliased terms are reported with `NaN` estimate, standard error, t value
/// and p-value, and the degrees of freedom follow the rank of the design.
///
/// # Errors
///
/// Returns [`StatsError::Singular`] if the normal equations cannot be
/// inverted even by pseudo-inverse, or [`StatsError::Distribution`] if a
/// reference distribution cannot be built.
#[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
pub fn fit(
    cohort: &str,
    records: &[PropertyRecord],
    spec: &ModelSpec,
) -> Result<FitOutcome, StatsError> {
    let rows = complete_rows(records, spec);
    let n = rows.response.len();

    if n <= MIN_ROWS {
        return Ok(insufficient(
            cohort,
            n,
            format!("Not enough data to fit the model ({n} complete rows, more than {MIN_ROWS} needed)"),
        ));
    }

    let factor = spec.categorical.and_then(|variable| {
        Factor::from_values(variable.to_string(), &rows.levels, spec.reference_level)
    });

    let mut terms = vec![INTERCEPT.to_string()];
    terms.extend(spec.predictors.iter().map(ToString::to_string));
    if let Some(factor) = &factor {
        terms.extend(factor.terms());
    }
    let p = terms.len();

    if n <= p {
        return Ok(insufficient(
            cohort,
            n,
            format!("Not enough data to fit the model ({n} complete rows for {p} terms)"),
        ));
    }

    let mut design = Vec::with_capacity(n * p);
    for (i, x) in rows.predictors.iter().enumerate() {
        design.push(1.0);
        design.extend_from_slice(x);
        if let Some(factor) = &factor {
            design.extend(factor.encode(rows.levels[i]));
        }
    }

    let x = DMatrix::from_row_slice(n, p, &design);
    let y = DVector::from_column_slice(&rows.response);

    let kept = independent_columns(&x);
    let rank = kept.len();
    if rank < p {
        let aliased: Vec<&str> = terms
            .iter()
            .enumerate()
            .filter(|(j, _)| !kept.contains(j))
            .map(|(_, term)| term.as_str())
            .collect();
        log::warn!(
            "Cohort '{cohort}': design has rank {rank} for {p} terms; aliased terms {aliased:?} get no estimate"
        );
    }

    let x = x.select_columns(kept.iter());
    let xt = x.transpose();
    let xtx_inv = invert(&xt * &x)?;
    let beta = &xtx_inv * (&xt * &y);

    let residuals = &y - &x * &beta;
    let rss = residuals.norm_squared();
    let mean = y.mean();
    let tss = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>();

    let df_residual = n - rank;
    let df_model = rank.saturating_sub(1);
    let sigma2 = rss / df_residual as f64;

    let mut coefficients = Vec::with_capacity(p);
    for (j, term) in terms.into_iter().enumerate() {
        let Some(k) = kept.iter().position(|&column| column == j) else {
            coefficients.push(Coefficient {
                term,
                estimate: f64::NAN,
                std_error: f64::NAN,
                t_value: f64::NAN,
                p_value: f64::NAN,
            });
            continue;
        };
        let estimate = beta[k];
        let std_error = (sigma2 * xtx_inv[(k, k)]).max(0.0).sqrt();
        let t_value = estimate / std_error;
        coefficients.push(Coefficient {
            term,
            estimate,
            std_error,
            t_value,
            p_value: t_two_sided_p_value(t_value, df_residual as f64)?,
        });
    }

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_residual as f64;

    let (f_statistic, f_p_value) = if df_model > 0 {
        let f = ((tss - rss) / df_model as f64) / sigma2;
        let p_value = f_upper_p_value(f, df_model as f64, df_residual as f64)?;
        (Some(f), Some(p_value))
    } else {
        (None, None)
    };

    log::info!(
        "Cohort '{cohort}': fit {rank} terms on {n} rows (R² {r_squared:.4}, adj. R² {adj_r_squared:.4})"
    );

    Ok(FitOutcome::Fitted(ModelResult {
        cohort: cohort.to_string(),
        response: spec.response.to_string(),
        coefficients,
        fit: FitStatistics {
            n,
            df_residual,
            df_model,
            residual_std_error: sigma2.sqrt(),
            r_squared,
            adj_r_squared,
            f_statistic,
            f_p_value,
        },
    }))
}
