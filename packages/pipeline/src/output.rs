//! Writing a run's results to an output directory.

use std::path::{Path, PathBuf};

use transit_housing_ingest::export::write_records;

use crate::{PipelineError, PipelineOutput};

/// File name of the full JSON report.
pub const REPORT_FILE: &str = "report.json";

/// File name of the enriched records for plotting.
pub const RECORDS_FILE: &str = "records.geojson";

/// Writes every table as CSV, the bundle as JSON and the enriched records
/// as `GeoJSON` under `dir`. Returns the written paths.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn write_outputs(output: &PipelineOutput, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut written = output.report.write_csv(dir)?;

    let report = dir.join(REPORT_FILE);
    output.report.write_json(&report)?;
    written.push(report);

    let records = dir.join(RECORDS_FILE);
    write_records(&records, &output.records, Some(output.crs))?;
    written.push(records);

    log::info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use transit_housing_features::PropertyRecord;
    use transit_housing_geometry_models::Crs;
    use transit_housing_ingest::layer::read_layer;
    use transit_housing_report::ReportBundle;
    use transit_housing_stats_models::FitOutcome;

    use super::*;

    #[test]
    fn writes_tables_report_and_records() {
        let dir = std::env::temp_dir().join(format!("transit_housing_output_{}", std::process::id()));
        let output = PipelineOutput {
            crs: Crs::WebMercator,
            records: vec![PropertyRecord {
                sale_price: Some(1.0),
                cohort: Some("a".to_string()),
                ..PropertyRecord::default()
            }],
            standardization: None,
            report: ReportBundle::assemble(
                vec![FitOutcome::InsufficientData {
                    cohort: "a".to_string(),
                    rows: 1,
                    message: "Not enough data".to_string(),
                }],
                &[],
                &[],
                vec![],
            ),
        };

        let written = write_outputs(&output, &dir).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.join("model_summary.csv").is_file());
        assert!(dir.join(REPORT_FILE).is_file());

        let records = read_layer("records", &dir.join(RECORDS_FILE), None).unwrap();
        assert_eq!(records.crs, Some(Crs::WebMercator));
        assert_eq!(records.len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
