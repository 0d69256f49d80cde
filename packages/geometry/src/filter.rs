//! Buffer and attribute filters.
//!
//! [`buffer_and_filter`] keeps the features of one layer that intersect (or
//! avoid) the radius buffer of another. A target intersects the union of the
//! reference buffers exactly when its distance to the nearest reference
//! geometry is at most the radius, so the buffer polygons are never
//! materialized: candidates come from an R-tree of radius-expanded envelopes
//! and are confirmed with an exact distance check.
//!
//! [`AttributeFilter`] is the secondary, schema-driven filter (use codes,
//! index thresholds) applied after the spatial one.

use geo::{BoundingRect, Geometry};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use transit_housing_geometry_models::{AttributeValue, Feature, FeatureSet};

use crate::{GeometryError, ensure_same_crs, geometry_distance};

/// Which side of the buffer to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SpatialPredicate {
    /// Keep features that intersect the buffer union.
    #[default]
    Intersects,
    /// Keep features that lie entirely outside the buffer union.
    Disjoint,
}

/// A reference geometry's envelope grown by the buffer radius.
struct BufferEntry {
    feature: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for BufferEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Keeps the features of `target` whose geometry satisfies `predicate`
/// against the `radius` buffer union of `reference`. Features with an
/// empty geometry have no location and are dropped under either predicate.
///
/// # Errors
///
/// * [`GeometryError::CrsMismatch`] if the layers do not share a reference.
/// * [`GeometryError::InvalidRadius`] for a negative or non-finite radius.
/// * [`GeometryError::EmptyResult`] if no feature survives. Callers decide
///   whether that is fatal.
pub fn buffer_and_filter(
    target: &FeatureSet,
    reference: &FeatureSet,
    radius: f64,
    predicate: SpatialPredicate,
) -> Result<FeatureSet, GeometryError> {
    ensure_same_crs(reference, target)?;

    if !radius.is_finite() || radius < 0.0 {
        return Err(GeometryError::InvalidRadius { radius });
    }

    let entries = reference
        .iter()
        .enumerate()
        .filter_map(|(feature, f)| {
            envelope_of(&f.geometry).map(|env| BufferEntry {
                feature,
                envelope: expand(&env, radius),
            })
        })
        .collect();
    let tree = RTree::bulk_load(entries);

    let kept: Vec<Feature> = target
        .iter()
        .filter(|feature| {
            let Some(query) = envelope_of(&feature.geometry) else {
                return false;
            };
            let hit = within_buffer(&tree, reference, &feature.geometry, &query, radius);
            match predicate {
                SpatialPredicate::Intersects => hit,
                SpatialPredicate::Disjoint => !hit,
            }
        })
        .cloned()
        .collect();

    log::info!(
        "Buffer filter ({predicate}, r={radius}) on '{}' against '{}': kept {}/{}",
        target.name,
        reference.name,
        kept.len(),
        target.len()
    );

    if kept.is_empty() {
        return Err(GeometryError::EmptyResult {
            filter: format!("{predicate} {radius} buffer of '{}'", reference.name),
            layer: target.name.clone(),
        });
    }

    Ok(target.with_features(kept))
}

fn within_buffer(
    tree: &RTree<BufferEntry>,
    reference: &FeatureSet,
    geometry: &Geometry<f64>,
    query: &AABB<[f64; 2]>,
    radius: f64,
) -> bool {
    tree.locate_in_envelope_intersecting(query).any(|entry| {
        geometry_distance(geometry, &reference.features[entry.feature].geometry) <= radius
    })
}

/// Computes the bounding envelope of a geometry, or `None` when empty.
#[must_use]
pub fn envelope_of(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

fn expand(env: &AABB<[f64; 2]>, radius: f64) -> AABB<[f64; 2]> {
    let lower = env.lower();
    let upper = env.upper();
    AABB::from_corners(
        [lower[0] - radius, lower[1] - radius],
        [upper[0] + radius, upper[1] + radius],
    )
}

/// Comparison operator of an [`AttributeFilter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterOp {
    /// Equal (numeric when both sides are numeric, text otherwise).
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Text value is one of a list.
    In,
}

/// Right-hand side of an [`AttributeFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Numeric literal.
    Number(f64),
    /// Text literal.
    Text(String),
    /// List of text literals, for [`FilterOp::In`].
    List(Vec<String>),
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// A secondary filter on one attribute, e.g. `use_code eq "SFR"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    /// Attribute name to test.
    pub attribute: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value to compare against.
    pub value: FilterValue,
}

impl std::fmt::Display for AttributeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.op, self.value)
    }
}

impl AttributeFilter {
    /// Whether a feature passes this filter. Features lacking the
    /// attribute never pass.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        let Some(actual) = feature.attribute(&self.attribute) else {
            return false;
        };
        if actual.is_null() {
            return false;
        }

        match (&self.value, self.op) {
            (FilterValue::List(items), FilterOp::In) => actual
                .as_text()
                .is_some_and(|text| items.iter().any(|item| *item == text)),
            (FilterValue::List(_), _) | (_, FilterOp::In) => false,
            (FilterValue::Number(expected), op) => actual
                .as_f64()
                .is_some_and(|value| compare_numbers(value, *expected, op)),
            (FilterValue::Text(expected), op) => compare_text(actual, expected, op),
        }
    }
}

fn compare_numbers(value: f64, expected: f64, op: FilterOp) -> bool {
    match op {
        FilterOp::Eq => (value - expected).abs() < f64::EPSILON,
        FilterOp::Ne => (value - expected).abs() >= f64::EPSILON,
        FilterOp::Gt => value > expected,
        FilterOp::Ge => value >= expected,
        FilterOp::Lt => value < expected,
        FilterOp::Le => value <= expected,
        FilterOp::In => false,
    }
}

fn compare_text(actual: &AttributeValue, expected: &str, op: FilterOp) -> bool {
    // Numeric text on both sides compares numerically.
    if let (Some(value), Ok(expected)) = (actual.as_f64(), expected.trim().parse::<f64>()) {
        return compare_numbers(value, expected, op);
    }
    let Some(text) = actual.as_text() else {
        return false;
    };
    match op {
        FilterOp::Eq => text == expected,
        FilterOp::Ne => text != expected,
        FilterOp::Gt => text.as_str() > expected,
        FilterOp::Ge => text.as_str() >= expected,
        FilterOp::Lt => text.as_str() < expected,
        FilterOp::Le => text.as_str() <= expected,
        FilterOp::In => false,
    }
}

/// Keeps the features of `set` that pass every filter.
///
/// # Errors
///
/// Returns [`GeometryError::EmptyResult`] if no feature passes.
pub fn apply_attribute_filters(
    set: &FeatureSet,
    filters: &[AttributeFilter],
) -> Result<FeatureSet, GeometryError> {
    if filters.is_empty() {
        return Ok(set.clone());
    }

    let kept: Vec<Feature> = set
        .iter()
        .filter(|feature| filters.iter().all(|filter| filter.matches(feature)))
        .cloned()
        .collect();

    let description = filters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" and ");

    log::info!(
        "Attribute filter '{description}' on '{}': kept {}/{}",
        set.name,
        kept.len(),
        set.len()
    );

    if kept.is_empty() {
        return Err(GeometryError::EmptyResult {
            filter: description,
            layer: set.name.clone(),
        });
    }

    Ok(set.with_features(kept))
}

#[cfg(test)]
mod tests {
    use geo::{LineString, MultiPoint, point};
    use transit_housing_geometry_models::Crs;

    use super::*;

    const UTM: Crs = Crs::Utm {
        zone: 18,
        north: true,
    };

    fn transit() -> FeatureSet {
        let line = LineString::from(vec![(0.0, 0.0), (1_000.0, 0.0)]);
        FeatureSet::new(
            "transit",
            Some(UTM),
            vec![Feature::new(Geometry::LineString(line))],
        )
    }

    fn parcels() -> FeatureSet {
        let features = [(500.0, 100.0), (500.0, 799.0), (500.0, 801.0), (1_500.0, 0.0)]
            .iter()
            .map(|&(x, y)| Feature::new(Geometry::Point(point!(x: x, y: y))))
            .collect();
        FeatureSet::new("properties", Some(UTM), features)
    }

    #[test]
    fn keeps_features_inside_buffer() {
        let kept =
            buffer_and_filter(&parcels(), &transit(), 800.0, SpatialPredicate::Intersects)
                .unwrap();
        // (500, 100), (500, 799) and (1500, 0) at exactly 500 from the end.
        assert_eq!(kept.len(), 3);
        assert_eq!(kept.crs, Some(UTM));
    }

    #[test]
    fn disjoint_keeps_complement() {
        let kept =
            buffer_and_filter(&parcels(), &transit(), 800.0, SpatialPredicate::Disjoint).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(
            kept.features[0].geometry,
            Geometry::Point(point!(x: 500.0, y: 801.0))
        );
    }

    #[test]
    fn empty_geometries_are_dropped_under_both_predicates() {
        let mut target = parcels();
        target
            .features
            .push(Feature::new(Geometry::MultiPoint(MultiPoint::new(vec![]))));

        for (predicate, expected) in [
            (SpatialPredicate::Intersects, 3),
            (SpatialPredicate::Disjoint, 1),
        ] {
            let kept = buffer_and_filter(&target, &transit(), 800.0, predicate).unwrap();
            assert_eq!(kept.len(), expected, "{predicate}");
            assert!(kept.iter().all(|f| envelope_of(&f.geometry).is_some()));
        }
    }

    #[test]
    fn empty_result_is_reported() {
        let err = buffer_and_filter(&parcels(), &transit(), 10.0, SpatialPredicate::Intersects)
            .unwrap_err();
        assert!(matches!(err, GeometryError::EmptyResult { .. }));
    }

    #[test]
    fn rejects_mixed_references() {
        let mut other = parcels();
        other.crs = Some(Crs::WebMercator);
        let err = buffer_and_filter(&other, &transit(), 800.0, SpatialPredicate::Intersects)
            .unwrap_err();
        assert!(matches!(err, GeometryError::CrsMismatch { .. }));
    }

    #[test]
    fn rejects_negative_radius() {
        let err = buffer_and_filter(&parcels(), &transit(), -1.0, SpatialPredicate::Intersects)
            .unwrap_err();
        assert!(matches!(err, GeometryError::InvalidRadius { .. }));
    }

    fn coded(code: &str, index: f64) -> Feature {
        Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)))
            .with_attribute("use_code", AttributeValue::Text(code.to_string()))
            .with_attribute("jobs_index", AttributeValue::Float(index))
    }

    #[test]
    fn attribute_filters_combine() {
        let set = FeatureSet::new(
            "properties",
            Some(UTM),
            vec![coded("SFR", 90.0), coded("SFR", 40.0), coded("CONDO", 95.0)],
        );
        let filters = vec![
            AttributeFilter {
                attribute: "use_code".to_string(),
                op: FilterOp::Eq,
                value: FilterValue::Text("SFR".to_string()),
            },
            AttributeFilter {
                attribute: "jobs_index".to_string(),
                op: FilterOp::Ge,
                value: FilterValue::Number(80.0),
            },
        ];
        let kept = apply_attribute_filters(&set, &filters).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn in_filter_matches_listed_codes() {
        let filter = AttributeFilter {
            attribute: "use_code".to_string(),
            op: FilterOp::In,
            value: FilterValue::List(vec!["SFR".to_string(), "R1".to_string()]),
        };
        assert!(filter.matches(&coded("R1", 0.0)));
        assert!(!filter.matches(&coded("CONDO", 0.0)));
        assert!(!filter.matches(&Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)))));
    }

    #[test]
    fn empty_attribute_result_is_reported() {
        let set = FeatureSet::new("properties", Some(UTM), vec![coded("CONDO", 1.0)]);
        let filters = vec![AttributeFilter {
            attribute: "use_code".to_string(),
            op: FilterOp::Eq,
            value: FilterValue::Text("SFR".to_string()),
        }];
        assert!(matches!(
            apply_attribute_filters(&set, &filters),
            Err(GeometryError::EmptyResult { .. })
        ));
    }
}
