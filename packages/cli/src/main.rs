#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Runs the transit housing analysis from a TOML configuration and writes
//! the result tables, the JSON report and the enriched records.
//!
//! Logging goes through `pretty_env_logger`; `RUST_LOG` overrides the
//! default `info` level.

use std::path::PathBuf;

use clap::Parser;
use transit_housing_pipeline::{
    config::{EmptyFilterPolicy, PipelineConfig},
    output::write_outputs,
};

#[derive(Parser)]
#[command(
    name = "transit_housing_cli",
    about = "Housing price analysis around transit lines"
)]
struct Cli {
    /// Path to the TOML run configuration
    #[arg(long)]
    config: PathBuf,

    /// Directory to write results into
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Override the configured handling of filters that remove everything
    /// (`fallback` or `abort`)
    #[arg(long)]
    empty_filter_policy: Option<EmptyFilterPolicy>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::load(&cli.config)?;
    if let Some(policy) = cli.empty_filter_policy {
        config.empty_filter_policy = policy;
    }

    let output = transit_housing_pipeline::run(&config)?;
    let written = write_outputs(&output, &cli.output)?;

    for outcome in &output.report.models {
        match outcome.model() {
            Some(model) => log::info!(
                "Cohort '{}': n = {}, R² = {:.3}",
                model.cohort,
                model.fit.n,
                model.fit.r_squared
            ),
            None => log::warn!("Cohort '{}': no model fitted", outcome.cohort()),
        }
    }
    log::info!("Done: {} files in {}", written.len(), cli.output.display());

    Ok(())
}
