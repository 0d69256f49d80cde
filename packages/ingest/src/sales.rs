//! Sales table join.
//!
//! The sales CSV holds one row per sale keyed by a parcel identifier. Its
//! columns are merged onto the matching property features, overriding
//! attributes of the same name. Unmatched properties are kept as-is and
//! later drop out of any statistic that needs the sale fields.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use transit_housing_geometry_models::{AttributeValue, FeatureSet};

use crate::IngestError;

/// Sales rows indexed by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesTable {
    rows: HashMap<String, BTreeMap<String, AttributeValue>>,
}

impl SalesTable {
    /// Reads a sales CSV keyed by the `key` column.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid CSV, or
    /// lacks the key column.
    pub fn read(path: &Path, key: &str) -> Result<Self, IngestError> {
        let file = std::fs::File::open(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(file, key, path)?;
        log::info!("Loaded {} sales from {}", table.len(), path.display());
        Ok(table)
    }

    /// Reads sales CSV text from any reader. See [`SalesTable::read`].
    ///
    /// When a key repeats, the first row wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid CSV or lacks the key
    /// column.
    pub fn from_reader<R: Read>(reader: R, key: &str) -> Result<Self, IngestError> {
        Self::parse(reader, key, Path::new("<reader>"))
    }

    fn parse<R: Read>(reader: R, key: &str, path: &Path) -> Result<Self, IngestError> {
        let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_owned()).collect();
        let key_index =
            headers
                .iter()
                .position(|h| h == key)
                .ok_or_else(|| IngestError::MissingColumn {
                    column: key.to_string(),
                    path: path.to_path_buf(),
                })?;

        let mut rows = HashMap::new();
        let mut duplicates = 0usize;
        for record in csv.records() {
            let record = record?;
            let Some(id) = record.get(key_index).map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };

            if rows.contains_key(id) {
                duplicates += 1;
                continue;
            }

            let values = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_index)
                .map(|(i, h)| {
                    (
                        h.clone(),
                        AttributeValue::from_text(record.get(i).unwrap_or("")),
                    )
                })
                .collect();
            rows.insert(id.to_string(), values);
        }

        if duplicates > 0 {
            log::warn!("{duplicates} repeated sale keys ignored; the first sale is kept");
        }

        Ok(Self { rows })
    }

    /// Number of keyed sales.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no sales.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sale attributes for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BTreeMap<String, AttributeValue>> {
        self.rows.get(key)
    }

    /// Merges sale attributes onto the properties whose `property_key`
    /// attribute matches a sale key.
    #[must_use]
    pub fn join(&self, properties: &FeatureSet, property_key: &str) -> FeatureSet {
        let mut matched = 0usize;
        let features = properties
            .iter()
            .map(|feature| {
                let mut feature = feature.clone();
                let sale = feature
                    .attribute(property_key)
                    .and_then(AttributeValue::as_text)
                    .and_then(|key| self.rows.get(key.trim()));
                if let Some(sale) = sale {
                    matched += 1;
                    feature
                        .attributes
                        .extend(sale.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                feature
            })
            .collect();

        log::info!(
            "Joined sales onto {matched}/{} properties by '{property_key}'",
            properties.len()
        );
        properties.with_features(features)
    }
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, point};
    use transit_housing_geometry_models::{Crs, Feature};

    use super::*;

    const SALES: &str = "\
PARCEL,SALE_PRICE,SALE_DATE
A-1,425000,2021-04-02
B-2,NA,2020-01-15
A-1,1,2019-01-01
";

    fn parcel(id: &str) -> Feature {
        Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)))
            .with_attribute("PARCEL_ID", AttributeValue::Text(id.to_string()))
            .with_attribute("SALE_PRICE", AttributeValue::Integer(7))
    }

    #[test]
    fn first_sale_per_key_wins() {
        let table = SalesTable::from_reader(SALES.as_bytes(), "PARCEL").unwrap();
        assert_eq!(table.len(), 2);
        let a = table.get("A-1").unwrap();
        assert_eq!(a["SALE_PRICE"], AttributeValue::Integer(425_000));
        assert!(!a.contains_key("PARCEL"));
        assert_eq!(table.get("B-2").unwrap()["SALE_PRICE"], AttributeValue::Null);
    }

    #[test]
    fn joins_matching_properties_only() {
        let table = SalesTable::from_reader(SALES.as_bytes(), "PARCEL").unwrap();
        let properties = FeatureSet::new(
            "properties",
            Some(Crs::WebMercator),
            vec![parcel("A-1"), parcel("Z-9")],
        );

        let joined = table.join(&properties, "PARCEL_ID");
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.crs, Some(Crs::WebMercator));
        assert_eq!(joined.features[0].numeric("SALE_PRICE"), Some(425_000.0));
        assert_eq!(
            joined.features[0].attribute("SALE_DATE"),
            Some(&AttributeValue::Text("2021-04-02".to_string()))
        );
        assert_eq!(joined.features[1].numeric("SALE_PRICE"), Some(7.0));
        assert_eq!(joined.features[1].attribute("SALE_DATE"), None);
    }

    #[test]
    fn missing_key_column_is_reported() {
        let err = SalesTable::from_reader(SALES.as_bytes(), "APN").unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn { column, .. } if column == "APN"));
    }
}
