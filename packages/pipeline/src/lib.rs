#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end transit housing analysis.
//!
//! [`run`] loads the configured layers and hands them to [`analyze`], which
//! executes every stage in order:
//!
//! 1. Pick the canonical reference system and reproject every layer to it
//! 2. Keep properties within the transit buffer (fatal if none remain)
//! 3. Apply secondary attribute filters under the empty-filter policy
//! 4. Measure transit, crime and job distances and crime counts
//! 5. Derive the feature columns over the whole working set
//! 6. Label and partition cohorts
//! 7. Fit one model per cohort and compare cohort means
//! 8. Assemble the result tables

pub mod config;
pub mod output;

use geo::Point;
use thiserror::Error;
use transit_housing_features::{
    FeatureError, PropertyRecord, Variable,
    builder::{FeatureBuilder, Standardization},
    cohort::{self, Cohorts},
};
use transit_housing_geometry::{
    GeometryError,
    filter::{SpatialPredicate, apply_attribute_filters, buffer_and_filter},
    reproject,
};
use transit_housing_geometry_models::{Crs, FeatureSet};
use transit_housing_ingest::{IngestError, layer::read_layer, sales::SalesTable};
use transit_housing_report::{ReportBundle, ReportError};
use transit_housing_spatial::{LineIndex, NearestIndex, SpatialError};
use transit_housing_stats::{StatsError, ols, welch};
use transit_housing_stats_models::{FitOutcome, TestResult};

use crate::config::{EmptyFilterPolicy, FilterLayer, LayerConfig, PipelineConfig};

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration is inconsistent.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The configuration file could not be read.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: std::path::PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// No property lies within the transit buffer.
    #[error("No properties within {radius} units of transit; nothing to analyze")]
    NoPropertiesNearTransit {
        /// Buffer radius used.
        radius: f64,
    },

    /// A secondary filter removed everything under the abort policy.
    #[error("Secondary filter '{filter}' left layer '{layer}' empty")]
    EmptySecondaryFilter {
        /// Filtered layer.
        layer: String,
        /// The filter.
        filter: String,
    },

    /// Layer reading failed.
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Reprojection or filtering failed.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Distance queries failed.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// Feature derivation or cohort partitioning failed.
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// Model fitting failed.
    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    /// Writing results failed.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// The four input layers, as read.
#[derive(Debug, Clone)]
pub struct Layers {
    /// Properties, with sales joined when configured.
    pub properties: FeatureSet,
    /// Transit lines.
    pub transit: FeatureSet,
    /// Crime incidents.
    pub crime: FeatureSet,
    /// Job-proximity cells.
    pub jobs: FeatureSet,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Reference system of every geometry and distance.
    pub crs: Crs,
    /// Enriched records of the working set, cohort-labelled where matched.
    pub records: Vec<PropertyRecord>,
    /// Parameters of the crime density standardization, if it was defined.
    pub standardization: Option<Standardization>,
    /// Result tables.
    pub report: ReportBundle,
}

/// Reads every configured layer and joins the sales table.
///
/// # Errors
///
/// Returns [`PipelineError::Ingest`] if any layer cannot be read.
pub fn load_layers(config: &PipelineConfig) -> Result<Layers, PipelineError> {
    let layers = &config.layers;
    let read = |name: &str, layer: &LayerConfig| {
        read_layer(name, &config.resolve(&layer.path), layer.crs)
    };

    let mut properties = read("properties", &layers.properties)?;
    if let Some(sales) = &layers.sales {
        let table = SalesTable::read(&config.resolve(&sales.path), &sales.key)?;
        properties = table.join(&properties, &sales.property_key);
    }

    Ok(Layers {
        properties,
        transit: read("transit", &layers.transit)?,
        crime: read("crime", &layers.crime)?,
        jobs: read("jobs", &layers.jobs)?,
    })
}

/// Loads the layers and runs the analysis.
///
/// # Errors
///
/// Returns an error if a layer cannot be read or any fatal stage fails.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    let layers = load_layers(config)?;
    analyze(layers, config)
}

/// Runs every analysis stage on already loaded layers.
///
/// # Errors
///
/// * [`PipelineError::Geometry`] if a layer has no reference system.
/// * [`PipelineError::NoPropertiesNearTransit`] if the transit filter
///   leaves nothing.
/// * [`PipelineError::EmptySecondaryFilter`] if a secondary filter leaves
///   nothing under [`EmptyFilterPolicy::Abort`].
/// * [`PipelineError::Spatial`] if the transit, crime or job layer is
///   empty.
pub fn analyze(layers: Layers, config: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    // ── Canonical reference ─────────────────────────────────────────────
    let crs = canonical_crs(&layers.transit, config)?;
    let properties = reproject(&layers.properties, crs)?;
    let transit = reproject(&layers.transit, crs)?;
    let crime = reproject(&layers.crime, crs)?;
    let jobs = reproject(&layers.jobs, crs)?;

    // ── Filters ─────────────────────────────────────────────────────────
    let properties = match buffer_and_filter(
        &properties,
        &transit,
        config.transit_buffer,
        SpatialPredicate::Intersects,
    ) {
        Ok(kept) => kept,
        Err(GeometryError::EmptyResult { .. }) => {
            return Err(PipelineError::NoPropertiesNearTransit {
                radius: config.transit_buffer,
            });
        }
        Err(e) => return Err(e.into()),
    };
    let properties = secondary_filters(properties, FilterLayer::Properties, config)?;
    let jobs = secondary_filters(jobs, FilterLayer::Jobs, config)?;

    // ── Records and distances ───────────────────────────────────────────
    let mut records = build_records(&properties, config);
    measure_distances(&mut records, &properties, &transit, &crime, &jobs, config)?;

    // ── Derived columns ─────────────────────────────────────────────────
    let builder = FeatureBuilder::new(config.crime_density_radius)?;
    let standardization = builder.build(&mut records)?;

    // ── Cohorts ─────────────────────────────────────────────────────────
    cohort::assign(&mut records, &config.cohorts)?;
    let cohorts = cohort::partition(&records, &config.cohorts)?;

    // ── Statistics ──────────────────────────────────────────────────────
    let models = fit_cohorts(&cohorts, config)?;
    let pairs = config.comparison_pairs();
    let comparisons = compare_cohorts(&cohorts, &pairs, &config.comparison.variables);

    let variables: Vec<String> = config
        .comparison
        .variables
        .iter()
        .map(ToString::to_string)
        .collect();
    let report = ReportBundle::assemble(models, &pairs, &variables, comparisons);

    Ok(PipelineOutput {
        crs,
        records,
        standardization,
        report,
    })
}

fn canonical_crs(transit: &FeatureSet, config: &PipelineConfig) -> Result<Crs, PipelineError> {
    let crs = config
        .canonical_crs
        .or(transit.crs)
        .ok_or_else(|| GeometryError::CrsMismatch {
            layer: transit.name.clone(),
            message: "no canonical reference: the transit layer has none and none is configured"
                .to_string(),
        })?;

    if crs.is_geographic() {
        log::warn!(
            "Canonical reference {crs} is geographic; distances and radii are in degrees"
        );
    }
    log::info!("Canonical reference system: {crs}");
    Ok(crs)
}

fn secondary_filters(
    set: FeatureSet,
    layer: FilterLayer,
    config: &PipelineConfig,
) -> Result<FeatureSet, PipelineError> {
    let mut current = set;
    for filter in config.filters_for(layer) {
        match apply_attribute_filters(&current, std::slice::from_ref(filter)) {
            Ok(kept) => current = kept,
            Err(GeometryError::EmptyResult {
                filter: description,
                layer: name,
            }) => match config.empty_filter_policy {
                EmptyFilterPolicy::Fallback => {
                    log::warn!(
                        "Filter '{description}' left layer '{name}' empty; keeping all {} features",
                        current.len()
                    );
                }
                EmptyFilterPolicy::Abort => {
                    return Err(PipelineError::EmptySecondaryFilter {
                        layer: name,
                        filter: description,
                    });
                }
            },
            Err(e) => return Err(e.into()),
        }
    }
    Ok(current)
}

fn build_records(properties: &FeatureSet, config: &PipelineConfig) -> Vec<PropertyRecord> {
    let records: Vec<PropertyRecord> = properties
        .iter()
        .enumerate()
        .filter_map(|(id, feature)| PropertyRecord::from_feature(id, feature, &config.schema))
        .collect();

    let skipped = properties.len() - records.len();
    if skipped > 0 {
        log::warn!("Skipped {skipped} properties without a usable location");
    }
    log::info!("Built {} property records", records.len());
    records
}

fn measure_distances(
    records: &mut [PropertyRecord],
    properties: &FeatureSet,
    transit: &FeatureSet,
    crime: &FeatureSet,
    jobs: &FeatureSet,
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    let transit_index = LineIndex::build(transit)?;
    let crime_index = NearestIndex::build(crime)?;
    let jobs_index = NearestIndex::build(jobs)?;
    transit_index.check_crs(properties.crs)?;
    crime_index.check_crs(properties.crs)?;
    jobs_index.check_crs(properties.crs)?;

    let points: Vec<Point<f64>> = records.iter().map(|r| r.location).collect();
    let to_transit = transit_index.minimum_edge_distances(&points)?;
    let to_crime = crime_index.nearest_feature_distances(&points)?;
    let to_jobs = jobs_index.nearest_feature_distances(&points)?;

    for (i, record) in records.iter_mut().enumerate() {
        record.dist_to_transit = Some(to_transit[i]);
        record.dist_to_crime = Some(to_crime[i].distance);
        record.dist_to_jobs = Some(to_jobs[i].distance);
        record.crime_count =
            Some(crime_index.count_within(record.location, config.crime_density_radius));
    }

    log::info!(
        "Measured distances for {} records against {} transit, {} crime and {} job features",
        records.len(),
        transit.len(),
        crime.len(),
        jobs.len()
    );
    Ok(())
}

fn fit_cohorts(
    cohorts: &Cohorts,
    config: &PipelineConfig,
) -> Result<Vec<FitOutcome>, PipelineError> {
    let mut outcomes = Vec::with_capacity(cohorts.len());
    for cohort in cohorts {
        outcomes.push(ols::fit(cohort.name(), &cohort.records, &config.model)?);
    }
    Ok(outcomes)
}

fn compare_cohorts(
    cohorts: &Cohorts,
    pairs: &[[String; 2]],
    variables: &[Variable],
) -> Vec<TestResult> {
    let mut results = Vec::new();
    for [a, b] in pairs {
        let (Some(a), Some(b)) = (cohorts.get(a), cohorts.get(b)) else {
            continue;
        };
        for &variable in variables {
            match welch::compare_means(a, b, variable) {
                Ok(result) => results.push(result),
                Err(e) => log::warn!(
                    "No comparison of {variable} between '{}' and '{}': {e}",
                    a.name(),
                    b.name()
                ),
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, LineString, point};
    use transit_housing_features::cohort::CohortRange;
    use transit_housing_geometry::filter::{AttributeFilter, FilterOp, FilterValue};
    use transit_housing_geometry_models::{AttributeValue, Feature};
    use transit_housing_report::Cell;

    use super::*;
    use crate::config::{ComparisonConfig, LayersConfig, SecondaryFilter};

    const UTM: Crs = Crs::Utm {
        zone: 18,
        north: true,
    };

    fn layer(path: &str) -> LayerConfig {
        LayerConfig {
            path: path.into(),
            crs: None,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            data_dir: None,
            layers: LayersConfig {
                properties: layer("properties.geojson"),
                transit: layer("transit.geojson"),
                crime: layer("crime.geojson"),
                jobs: layer("jobs.geojson"),
                sales: None,
            },
            schema: transit_housing_features::PropertySchema::default(),
            canonical_crs: None,
            transit_buffer: 800.0,
            crime_density_radius: 800.0,
            secondary_filters: Vec::new(),
            empty_filter_policy: EmptyFilterPolicy::Fallback,
            cohorts: vec![
                CohortRange::new("1990_2000", 1990, 2001),
                CohortRange::new("2010_2024", 2010, 2025),
            ],
            model: ols::ModelSpec::default(),
            comparison: ComparisonConfig::default(),
        }
    }

    /// A transit line along y = 0, properties on both sides, crime points
    /// and job cells scattered near the line, and one far-away property.
    #[allow(clippy::cast_precision_loss)]
    fn layers() -> Layers {
        let transit = FeatureSet::new(
            "transit",
            Some(UTM),
            vec![Feature::new(Geometry::LineString(LineString::from(vec![
                (0.0, 0.0),
                (10_000.0, 0.0),
            ])))],
        );

        let mut properties = Vec::new();
        for i in 0..60 {
            let x = 100.0 + 150.0 * i as f64;
            let y = if i % 2 == 0 { 50.0 + i as f64 } else { -300.0 - i as f64 };
            let year = if i < 30 { 1990 + i % 11 } else { 2010 + i % 15 };
            let area = 1_000.0 + 20.0 * i as f64;
            let noise = 500.0 * ((i * 37) % 11) as f64;
            let shift = if i < 30 { 0.0 } else { 50_000.0 };
            let price = 150.0 * area - 40.0 * y.abs() + noise + shift;
            properties.push(
                Feature::new(Geometry::Point(point!(x: x, y: y)))
                    .with_attribute("SALE_PRICE", AttributeValue::Float(price))
                    .with_attribute("LIVING_AREA", AttributeValue::Float(area))
                    .with_attribute("YEAR_BUILT", AttributeValue::Integer(i64::from(year)))
                    .with_attribute("USE_CODE", AttributeValue::Text("SFR".to_string())),
            );
        }
        properties.push(
            Feature::new(Geometry::Point(point!(x: 5_000.0, y: 50_000.0)))
                .with_attribute("SALE_PRICE", AttributeValue::Float(1.0))
                .with_attribute("YEAR_BUILT", AttributeValue::Integer(1995)),
        );

        let crime = (0..200)
            .map(|i| {
                let x = 50.0 * i as f64;
                let y = 200.0 * ((i * 7) % 5) as f64 - 400.0;
                Feature::new(Geometry::Point(point!(x: x, y: y)))
            })
            .collect();

        let jobs = (0..20)
            .map(|i| {
                let x = 500.0 * i as f64;
                Feature::new(Geometry::Point(point!(x: x, y: 1_000.0)))
                    .with_attribute("JOB_INDEX", AttributeValue::Integer(i * 5))
            })
            .collect();

        Layers {
            properties: FeatureSet::new("properties", Some(UTM), properties),
            transit,
            crime: FeatureSet::new("crime", Some(UTM), crime),
            jobs: FeatureSet::new("jobs", Some(UTM), jobs),
        }
    }

    #[test]
    fn runs_every_stage() {
        let output = analyze(layers(), &config()).unwrap();

        assert_eq!(output.crs, UTM);
        // The far-away property is outside the transit buffer.
        assert_eq!(output.records.len(), 60);
        assert!(output.standardization.is_some());

        for record in &output.records {
            let d = record.dist_to_transit.unwrap();
            assert!((0.0..=800.0).contains(&d), "distance {d}");
            assert!((d - record.location.y().abs()).abs() < 1e-9);
            assert!(record.job_access.unwrap() > 0.0);
        }

        let labelled = output.records.iter().filter(|r| r.cohort.is_some()).count();
        assert_eq!(labelled, 60);

        let summary = output.report.table("model_summary").unwrap();
        assert_eq!(summary.len(), 2);
        assert!(output.report.table("regression_1990_2000").is_some());
        assert!(output.report.table("regression_2010_2024").is_some());

        let comparison = output
            .report
            .table("comparison_1990_2000_vs_2010_2024")
            .unwrap();
        let variables: Vec<&str> = comparison
            .column("Variable")
            .into_iter()
            .filter_map(Cell::as_str)
            .collect();
        assert_eq!(
            variables,
            vec!["sale_price", "dist_to_transit", "crime_density", "job_access"]
        );
    }

    #[test]
    fn empty_transit_buffer_is_fatal() {
        let config = PipelineConfig {
            transit_buffer: 1.0,
            ..config()
        };
        assert!(matches!(
            analyze(layers(), &config),
            Err(PipelineError::NoPropertiesNearTransit { .. })
        ));
    }

    fn impossible_filter() -> SecondaryFilter {
        SecondaryFilter {
            layer: FilterLayer::Properties,
            filter: AttributeFilter {
                attribute: "USE_CODE".to_string(),
                op: FilterOp::Eq,
                value: FilterValue::Text("CONDO".to_string()),
            },
        }
    }

    #[test]
    fn empty_secondary_filter_falls_back() {
        let config = PipelineConfig {
            secondary_filters: vec![impossible_filter()],
            ..config()
        };
        let output = analyze(layers(), &config).unwrap();
        assert_eq!(output.records.len(), 60);
    }

    #[test]
    fn empty_secondary_filter_can_abort() {
        let config = PipelineConfig {
            secondary_filters: vec![impossible_filter()],
            empty_filter_policy: EmptyFilterPolicy::Abort,
            ..config()
        };
        assert!(matches!(
            analyze(layers(), &config),
            Err(PipelineError::EmptySecondaryFilter { .. })
        ));
    }

    #[test]
    fn job_filter_narrows_reference_cells() {
        let config = PipelineConfig {
            secondary_filters: vec![SecondaryFilter {
                layer: FilterLayer::Jobs,
                filter: AttributeFilter {
                    attribute: "JOB_INDEX".to_string(),
                    op: FilterOp::Ge,
                    value: FilterValue::Number(50.0),
                },
            }],
            ..config()
        };
        let output = analyze(layers(), &config).unwrap();
        // Remaining job cells start at x = 5000.
        let first = &output.records[0];
        assert!(first.dist_to_jobs.unwrap() > 4_000.0);
    }

    #[test]
    fn missing_reference_system_is_fatal() {
        let mut layers = layers();
        layers.crime.crs = None;
        assert!(matches!(
            analyze(layers, &config()),
            Err(PipelineError::Geometry(GeometryError::CrsMismatch { .. }))
        ));
    }

    #[test]
    fn empty_crime_layer_is_fatal() {
        let mut layers = layers();
        layers.crime.features.clear();
        assert!(matches!(
            analyze(layers, &config()),
            Err(PipelineError::Spatial(SpatialError::EmptyReferenceSet { .. }))
        ));
    }
}
