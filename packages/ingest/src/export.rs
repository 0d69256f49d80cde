//! Export of enriched property records for plotting.

use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use transit_housing_features::{PropertyRecord, Variable};
use transit_housing_geometry_models::Crs;

use crate::IngestError;

/// Numeric columns written for every record.
pub const EXPORTED_VARIABLES: [Variable; 7] = [
    Variable::SalePrice,
    Variable::LivingArea,
    Variable::YearBuilt,
    Variable::DistToTransit,
    Variable::CrimeDensity,
    Variable::JobAccess,
    Variable::ScaledLogCrimeDensity,
];

fn number(value: Option<f64>) -> JsonValue {
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(JsonValue::Null, JsonValue::Number)
}

/// Builds a feature collection of point features, one per record, with
/// the exported variables, `id` and `cohort` as properties.
#[must_use]
pub fn records_to_geojson(records: &[PropertyRecord], crs: Option<Crs>) -> FeatureCollection {
    let features = records
        .iter()
        .map(|record| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(record.id));
            for variable in EXPORTED_VARIABLES {
                properties.insert(variable.to_string(), number(record.value(variable)));
            }
            properties.insert(
                "cohort".to_string(),
                record
                    .cohort
                    .as_ref()
                    .map_or(JsonValue::Null, |c| JsonValue::String(c.clone())),
            );

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&record.location))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = crs.map(|crs| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({ "type": "name", "properties": { "name": crs.to_string() } }),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Writes records as a `GeoJSON` feature collection.
///
/// Writes to a `.tmp` sibling first and renames it into place.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_records(
    path: &Path,
    records: &[PropertyRecord],
    crs: Option<Crs>,
) -> Result<(), IngestError> {
    let io_error = |source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let collection = records_to_geojson(records, crs);
    let tmp = path.with_extension("geojson.tmp");
    std::fs::write(&tmp, serde_json::to_string(&collection)?).map_err(io_error)?;
    std::fs::rename(&tmp, path).map_err(io_error)?;

    log::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::point;

    use super::*;
    use crate::layer::parse_layer;

    fn record() -> PropertyRecord {
        PropertyRecord {
            id: 3,
            location: point!(x: 583_000.0, y: 4_507_000.0),
            sale_price: Some(425_000.0),
            year_built: Some(1995),
            dist_to_transit: Some(120.5),
            crime_density: Some(0.0),
            job_access: Some(0.25),
            cohort: Some("1990_2000".to_string()),
            ..PropertyRecord::default()
        }
    }

    #[test]
    fn exports_plotting_fields() {
        let collection = records_to_geojson(&[record()], None);
        assert_eq!(collection.features.len(), 1);

        let properties = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["sale_price"], 425_000.0);
        assert_eq!(properties["dist_to_transit"], 120.5);
        assert_eq!(properties["crime_density"], 0.0);
        assert_eq!(properties["job_access"], 0.25);
        assert_eq!(properties["cohort"], "1990_2000");
        assert!(properties["living_area"].is_null());
        assert!(collection.foreign_members.is_none());
    }

    #[test]
    fn export_reads_back_as_a_layer() {
        let crs = Crs::Utm {
            zone: 18,
            north: true,
        };
        let text = serde_json::to_string(&records_to_geojson(&[record()], Some(crs))).unwrap();
        let set = parse_layer("records", &text, None).unwrap();

        assert_eq!(set.crs, Some(crs));
        assert_eq!(set.len(), 1);
        assert_eq!(set.features[0].numeric("year_built"), Some(1995.0));
        assert_eq!(set.features[0].numeric("id"), Some(3.0));
    }
}
