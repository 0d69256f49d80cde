#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry store types.
//!
//! A [`FeatureSet`] is an ordered collection of [`Feature`]s that share one
//! coordinate reference. Property parcels, transit lines, crime incidents and
//! job-proximity cells are all feature sets, differentiated only by their
//! attribute schema.

use std::collections::BTreeMap;
use std::str::FromStr;

use geo::Geometry;
use serde::{Deserialize, Serialize};

/// A coordinate reference system supported by the projection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// WGS84 geographic longitude/latitude in degrees (EPSG:4326).
    Wgs84,
    /// Spherical Web Mercator in metres (EPSG:3857).
    WebMercator,
    /// Universal Transverse Mercator on WGS84 in metres
    /// (EPSG:326xx north, EPSG:327xx south).
    Utm {
        /// UTM zone, 1-60.
        zone: u8,
        /// Whether this is the northern-hemisphere variant.
        north: bool,
    },
}

impl Crs {
    /// Creates a reference system from an EPSG code.
    ///
    /// # Errors
    ///
    /// Returns [`ParseCrsError`] if the code is not one of the supported
    /// systems.
    pub fn from_epsg(code: u32) -> Result<Self, ParseCrsError> {
        match code {
            4326 => Ok(Self::Wgs84),
            3857 | 900_913 => Ok(Self::WebMercator),
            32601..=32660 => Ok(Self::Utm {
                zone: u8::try_from(code - 32600).map_err(|_| ParseCrsError::new(code))?,
                north: true,
            }),
            32701..=32760 => Ok(Self::Utm {
                zone: u8::try_from(code - 32700).map_err(|_| ParseCrsError::new(code))?,
                north: false,
            }),
            _ => Err(ParseCrsError::new(code)),
        }
    }

    /// Returns the EPSG code of this reference system.
    #[must_use]
    pub fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
            Self::Utm { zone, north: true } => 32600 + u32::from(zone),
            Self::Utm { zone, north: false } => 32700 + u32::from(zone),
        }
    }

    /// Whether coordinates are angular (degrees) rather than linear.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = ParseCrsError;

    /// Accepts `EPSG:xxxx`, OGC URNs (`urn:ogc:def:crs:EPSG::xxxx`), the
    /// `CRS84` alias used by `GeoJSON`, or a bare numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if trimmed.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84")
            || trimmed.eq_ignore_ascii_case("CRS84")
        {
            return Ok(Self::Wgs84);
        }

        let code = trimmed
            .rsplit(':')
            .next()
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| ParseCrsError::unparsable(trimmed))?;

        Self::from_epsg(code)
    }
}

impl TryFrom<String> for Crs {
    type Error = ParseCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

/// Error returned when a reference system identifier is unknown or
/// unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCrsError {
    /// The identifier that could not be resolved.
    pub identifier: String,
}

impl ParseCrsError {
    fn new(code: u32) -> Self {
        Self {
            identifier: format!("EPSG:{code}"),
        }
    }

    fn unparsable(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
        }
    }
}

impl std::fmt::Display for ParseCrsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported coordinate reference system '{}': expected EPSG:4326, EPSG:3857 or a UTM zone",
            self.identifier
        )
    }
}

impl std::error::Error for ParseCrsError {}

/// A single attribute value attached to a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Explicit null / absent value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integral number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free text or category label.
    Text(String),
}

impl AttributeValue {
    /// Interprets a raw text cell (CSV, shapefile DBF) as the narrowest
    /// matching value.
    #[must_use]
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NA") {
            return Self::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(trimmed.to_string())
    }

    /// Returns the value as a finite number, parsing numeric text.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Null | Self::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Returns the value rendered as text, for categorical comparisons.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }

    /// Whether this is [`AttributeValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A geometry plus its attribute mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature geometry in the owning set's reference system.
    pub geometry: Geometry<f64>,
    /// Attribute name -> value.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    /// Creates a feature with no attributes.
    #[must_use]
    pub const fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Looks up a numeric attribute by name. Missing, null and
    /// non-numeric values all yield `None`.
    #[must_use]
    pub fn numeric(&self, key: &str) -> Option<f64> {
        self.attribute(key).and_then(AttributeValue::as_f64)
    }
}

/// An ordered collection of features sharing one coordinate reference.
///
/// `crs` is `None` when the source layer carried no reference metadata;
/// such a set must be given one before it can be reprojected.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// Layer name used in log lines and error messages.
    pub name: String,
    /// Shared reference system of every feature in the set.
    pub crs: Option<Crs>,
    /// The features, in source order.
    pub features: Vec<Feature>,
}

impl FeatureSet {
    /// Creates a feature set.
    #[must_use]
    pub fn new(name: impl Into<String>, crs: Option<Crs>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the set has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterates the features in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Returns a new set with the same name and reference but different
    /// features.
    #[must_use]
    pub fn with_features(&self, features: Vec<Feature>) -> Self {
        Self {
            name: self.name.clone(),
            crs: self.crs,
            features,
        }
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}
