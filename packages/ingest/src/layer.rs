//! `GeoJSON` layer reader.

use std::collections::BTreeMap;
use std::path::Path;

use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use transit_housing_geometry_models::{AttributeValue, Crs, Feature, FeatureSet};

use crate::IngestError;

/// Reads a `GeoJSON` feature collection from `path` as a named layer.
///
/// `declared` is the reference system to assume when the file carries no
/// `crs` member.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a `GeoJSON` feature
/// collection, or names an unsupported reference system.
pub fn read_layer(
    name: &str,
    path: &Path,
    declared: Option<Crs>,
) -> Result<FeatureSet, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let set = parse_layer(name, &text, declared)?;
    log::info!(
        "Loaded layer '{name}' from {} ({} features, {})",
        path.display(),
        set.len(),
        set.crs.map_or_else(|| "no CRS".to_string(), |crs| crs.to_string())
    );
    Ok(set)
}

/// Parses `GeoJSON` text as a named layer. See [`read_layer`].
///
/// Features without a geometry are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the text is not a `GeoJSON` feature collection or
/// names an unsupported reference system.
pub fn parse_layer(
    name: &str,
    text: &str,
    declared: Option<Crs>,
) -> Result<FeatureSet, IngestError> {
    let geojson: GeoJson = text.parse().map_err(|source| IngestError::GeoJson {
        layer: name.to_string(),
        source,
    })?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(IngestError::NotFeatureCollection {
            layer: name.to_string(),
        });
    };

    let crs = match embedded_crs(&collection) {
        Some(identifier) => {
            let crs: Crs = identifier.parse().map_err(|source| IngestError::Crs {
                layer: name.to_string(),
                source,
            })?;
            if let Some(declared) = declared
                && declared != crs
            {
                log::warn!(
                    "Layer '{name}' declares {declared} in config but {crs} in the file; using {crs}"
                );
            }
            Some(crs)
        }
        None => declared,
    };

    let total = collection.features.len();
    let mut features = Vec::with_capacity(total);
    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry =
            geo::Geometry::<f64>::try_from(geometry).map_err(|source| IngestError::GeoJson {
                layer: name.to_string(),
                source,
            })?;

        features.push(Feature {
            geometry,
            attributes: feature
                .properties
                .map(attributes_from_properties)
                .unwrap_or_default(),
        });
    }

    let skipped = total - features.len();
    if skipped > 0 {
        log::warn!("Layer '{name}': skipped {skipped}/{total} features without geometry");
    }

    Ok(FeatureSet::new(name, crs, features))
}

/// The `crs.properties.name` foreign member of a collection, if present.
fn embedded_crs(collection: &FeatureCollection) -> Option<&str> {
    collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
}

fn attributes_from_properties(properties: JsonObject) -> BTreeMap<String, AttributeValue> {
    properties
        .into_iter()
        .map(|(key, value)| (key, attribute_from_json(value)))
        .collect()
}

fn attribute_from_json(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(b),
        JsonValue::Number(n) => n.as_i64().map_or_else(
            || n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
            AttributeValue::Integer,
        ),
        JsonValue::String(s) => AttributeValue::Text(s),
        other @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
            AttributeValue::Text(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, point};

    use super::*;

    const LAYER: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32618" } },
        "features": [
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [583000.5, 4507000.25] },
                "properties": { "SALE_PRICE": 425000, "LIVING_AREA": 1850.5, "USE": "SFR", "VACANT": false, "NOTE": null }
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": { "SALE_PRICE": 1 }
            }
        ]
    }"#;

    #[test]
    fn reads_embedded_crs_and_attributes() {
        let set = parse_layer("properties", LAYER, Some(Crs::Wgs84)).unwrap();
        assert_eq!(set.name, "properties");
        assert_eq!(set.crs, Some(Crs::Utm { zone: 18, north: true }));
        assert_eq!(set.len(), 1);

        let feature = &set.features[0];
        assert_eq!(
            feature.geometry,
            Geometry::Point(point!(x: 583_000.5, y: 4_507_000.25))
        );
        assert_eq!(
            feature.attribute("SALE_PRICE"),
            Some(&AttributeValue::Integer(425_000))
        );
        assert_eq!(feature.numeric("LIVING_AREA"), Some(1850.5));
        assert_eq!(
            feature.attribute("USE"),
            Some(&AttributeValue::Text("SFR".to_string()))
        );
        assert_eq!(feature.attribute("VACANT"), Some(&AttributeValue::Bool(false)));
        assert_eq!(feature.attribute("NOTE"), Some(&AttributeValue::Null));
    }

    #[test]
    fn falls_back_to_declared_crs() {
        let text = r#"{ "type": "FeatureCollection", "features": [] }"#;
        let set = parse_layer("transit", text, Some(Crs::WebMercator)).unwrap();
        assert_eq!(set.crs, Some(Crs::WebMercator));
        assert!(set.is_empty());

        let set = parse_layer("transit", text, None).unwrap();
        assert_eq!(set.crs, None);
    }

    #[test]
    fn rejects_non_collections_and_unknown_crs() {
        let point = r#"{ "type": "Point", "coordinates": [1.0, 2.0] }"#;
        assert!(matches!(
            parse_layer("crime", point, None),
            Err(IngestError::NotFeatureCollection { .. })
        ));

        let unknown = r#"{
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "EPSG:2263" } },
            "features": []
        }"#;
        assert!(matches!(
            parse_layer("crime", unknown, None),
            Err(IngestError::Crs { .. })
        ));

        assert!(matches!(
            parse_layer("crime", "not json", None),
            Err(IngestError::GeoJson { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_layer("jobs", Path::new("/nonexistent/jobs.geojson"), None).unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
