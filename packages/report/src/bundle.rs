//! Packaging of model fits and cohort comparisons into tables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use transit_housing_stats_models::{FitOutcome, ModelResult, TestResult};

use crate::{Cell, ReportError, Table};

/// Regression table columns.
pub const REGRESSION_COLUMNS: [&str; 6] = [
    "Predictor",
    "Estimate",
    "Std. Error",
    "t value",
    "Pr(>|t|)",
    "Significance",
];

/// Model summary table columns.
pub const SUMMARY_COLUMNS: [&str; 9] = [
    "Cohort",
    "N",
    "Residual SE",
    "DF",
    "R²",
    "Adj. R²",
    "F",
    "F p-value",
    "Note",
];

/// File-safe form of a cohort name. Distinct cohorts must not share one;
/// cohort validation rejects names that would.
fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
const fn count(n: usize) -> Cell {
    Cell::number(n as f64)
}

/// Coefficient table of one fitted model, intercept first.
#[must_use]
pub fn regression_table(model: &ModelResult) -> Table {
    let mut table = Table::new(
        format!("regression_{}", slug(&model.cohort)),
        format!("Regression of {} ({})", model.response, model.cohort),
        &REGRESSION_COLUMNS,
    );

    for c in &model.coefficients {
        table.push_row([
            ("Predictor", Cell::text(&c.term)),
            ("Estimate", Cell::number(c.estimate)),
            ("Std. Error", Cell::number(c.std_error)),
            ("t value", Cell::number(c.t_value)),
            ("Pr(>|t|)", Cell::number(c.p_value)),
            ("Significance", Cell::text(c.significance().to_string())),
        ]);
    }

    table
}

/// One row per cohort with its fit statistics, or a note when the cohort
/// had too little data.
#[must_use]
pub fn model_summary_table(outcomes: &[FitOutcome]) -> Table {
    let mut table = Table::new("model_summary", "Model summary", &SUMMARY_COLUMNS);

    for outcome in outcomes {
        match outcome {
            FitOutcome::Fitted(model) => {
                let fit = &model.fit;
                table.push_row([
                    ("Cohort", Cell::text(&model.cohort)),
                    ("N", count(fit.n)),
                    ("Residual SE", Cell::number(fit.residual_std_error)),
                    ("DF", count(fit.df_residual)),
                    ("R²", Cell::number(fit.r_squared)),
                    ("Adj. R²", Cell::number(fit.adj_r_squared)),
                    ("F", Cell::optional(fit.f_statistic)),
                    ("F p-value", Cell::optional(fit.f_p_value)),
                ]);
            }
            FitOutcome::InsufficientData {
                cohort,
                rows,
                message,
            } => {
                table.push_row([
                    ("Cohort", Cell::text(cohort)),
                    ("N", count(*rows)),
                    ("Note", Cell::text(message)),
                ]);
            }
        }
    }

    table
}

/// Comparison table for one cohort pair: a row per variable with both
/// means (rounded for display) and the p-value.
///
/// Variables without a matching result keep missing means and p-value.
#[must_use]
pub fn comparison_table(
    pair: &[String; 2],
    variables: &[String],
    results: &[TestResult],
) -> Table {
    let [a, b] = pair;
    let mean_a = format!("Mean {a}");
    let mean_b = format!("Mean {b}");
    let mut table = Table::new(
        format!("comparison_{}_vs_{}", slug(a), slug(b)),
        format!("Comparison of {a} and {b}"),
        &["Variable", mean_a.as_str(), mean_b.as_str(), "p-value"],
    );

    for variable in variables {
        let result = results
            .iter()
            .find(|r| &r.variable == variable && &r.cohorts == pair);

        match result {
            Some(result) => {
                let [ma, mb] = result.rounded_means();
                table.push_row([
                    ("Variable".to_string(), Cell::text(variable)),
                    (mean_a.clone(), Cell::number(ma)),
                    (mean_b.clone(), Cell::number(mb)),
                    ("p-value".to_string(), Cell::number(result.p_value)),
                ]);
            }
            None => table.push_row([("Variable".to_string(), Cell::text(variable))]),
        }
    }

    table
}

/// Everything a presentation collaborator needs, assembled once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBundle {
    /// Per-cohort fit outcomes, in cohort order.
    pub models: Vec<FitOutcome>,
    /// Every comparison that produced a result.
    pub comparisons: Vec<TestResult>,
    /// Tables in output order: summary, regressions, comparisons.
    pub tables: Vec<Table>,
}

impl ReportBundle {
    /// Builds every table from fit outcomes and comparison results.
    #[must_use]
    pub fn assemble(
        models: Vec<FitOutcome>,
        pairs: &[[String; 2]],
        variables: &[String],
        comparisons: Vec<TestResult>,
    ) -> Self {
        let mut tables = vec![model_summary_table(&models)];
        tables.extend(models.iter().filter_map(FitOutcome::model).map(regression_table));
        tables.extend(
            pairs
                .iter()
                .map(|pair| comparison_table(pair, variables, &comparisons)),
        );

        Self {
            models,
            comparisons,
            tables,
        }
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Writes each table to `<dir>/<name>.csv`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be written.
    pub fn write_csv(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let path = dir.join(format!("{}.csv", table.name));
            let file = std::fs::File::create(&path)?;
            table.write_csv(std::io::BufWriter::new(file))?;
            log::info!("Wrote {} ({} rows)", path.display(), table.len());
            written.push(path);
        }

        Ok(written)
    }

    /// Writes the whole bundle as pretty JSON.
    ///
    /// Writes to a `.tmp` sibling first and renames it into place.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }
}
