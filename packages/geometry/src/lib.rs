#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reprojection and filtering over [`FeatureSet`]s.
//!
//! All layers are reprojected to one canonical reference system before any
//! distance or intersection work. Cross-set operations refuse to run on sets
//! whose references differ.

pub mod filter;
pub mod projection;

use geo::{Distance, Euclidean, Geometry, MapCoords};
use thiserror::Error;
use transit_housing_geometry_models::{Crs, FeatureSet, ParseCrsError};

/// Errors that can occur during geometry operations.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A layer has no reference system, or two layers disagree.
    #[error("Reference system mismatch on layer '{layer}': {message}")]
    CrsMismatch {
        /// Layer that failed the check.
        layer: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Reference system identifier is not supported.
    #[error(transparent)]
    UnsupportedCrs(#[from] ParseCrsError),

    /// A filter removed every element of its input.
    #[error("Filter '{filter}' left no features in layer '{layer}'")]
    EmptyResult {
        /// Human-readable description of the filter.
        filter: String,
        /// Layer that was filtered.
        layer: String,
    },

    /// Buffer radius was negative or not finite.
    #[error("Invalid buffer radius {radius}")]
    InvalidRadius {
        /// The rejected radius.
        radius: f64,
    },
}

/// Transforms every geometry of `set` into `target`.
///
/// # Errors
///
/// Returns [`GeometryError::CrsMismatch`] if `set` has no source reference.
pub fn reproject(set: &FeatureSet, target: Crs) -> Result<FeatureSet, GeometryError> {
    let Some(source) = set.crs else {
        return Err(GeometryError::CrsMismatch {
            layer: set.name.clone(),
            message: format!("source reference is undefined, cannot reproject to {target}"),
        });
    };

    if source == target {
        return Ok(set.clone());
    }

    log::debug!(
        "Reprojecting {} features of '{}' from {source} to {target}",
        set.len(),
        set.name
    );

    let features = set
        .iter()
        .map(|feature| {
            let mut feature = feature.clone();
            feature.geometry = feature
                .geometry
                .map_coords(|c| projection::transform_coord(source, target, c));
            feature
        })
        .collect();

    Ok(FeatureSet::new(set.name.clone(), Some(target), features))
}

/// Returns the shared reference of two sets.
///
/// # Errors
///
/// Returns [`GeometryError::CrsMismatch`] if either set is unreferenced or
/// the references differ.
pub fn ensure_same_crs(a: &FeatureSet, b: &FeatureSet) -> Result<Crs, GeometryError> {
    match (a.crs, b.crs) {
        (Some(x), Some(y)) if x == y => Ok(x),
        (Some(x), Some(y)) => Err(GeometryError::CrsMismatch {
            layer: b.name.clone(),
            message: format!("expected {x} (from '{}'), found {y}", a.name),
        }),
        (None, _) => Err(GeometryError::CrsMismatch {
            layer: a.name.clone(),
            message: "reference is undefined".to_string(),
        }),
        (_, None) => Err(GeometryError::CrsMismatch {
            layer: b.name.clone(),
            message: "reference is undefined".to_string(),
        }),
    }
}

/// Planar distance between two geometries; zero when they intersect.
#[must_use]
pub fn geometry_distance(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    Euclidean.distance(a, b)
}

#[cfg(test)]
mod tests {
    use geo::{Point, point};
    use transit_housing_geometry_models::{AttributeValue, Feature};

    use super::*;

    const UTM_18N: Crs = Crs::Utm {
        zone: 18,
        north: true,
    };

    fn sample_set() -> FeatureSet {
        let features = [(-74.01, 40.70), (-73.95, 40.75), (-74.10, 40.62)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                Feature::new(Geometry::Point(point!(x: x, y: y)))
                    .with_attribute("id", AttributeValue::Integer(i64::try_from(i).unwrap()))
            })
            .collect();
        FeatureSet::new("sample", Some(Crs::Wgs84), features)
    }

    fn points(set: &FeatureSet) -> Vec<Point<f64>> {
        set.iter()
            .map(|f| match f.geometry {
                Geometry::Point(p) => p,
                _ => panic!("expected point geometry"),
            })
            .collect()
    }

    #[test]
    fn reprojection_composes() {
        let a = sample_set();
        let via_b = reproject(&reproject(&a, Crs::WebMercator).unwrap(), UTM_18N).unwrap();
        let direct = reproject(&a, UTM_18N).unwrap();

        for (p, q) in points(&via_b).iter().zip(points(&direct)) {
            assert!((p.x() - q.x()).abs() < 1e-3, "x differs: {p:?} vs {q:?}");
            assert!((p.y() - q.y()).abs() < 1e-3, "y differs: {p:?} vs {q:?}");
        }
        assert_eq!(via_b.crs, Some(UTM_18N));
    }

    #[test]
    fn reprojection_preserves_attributes_and_order() {
        let a = sample_set();
        let projected = reproject(&a, UTM_18N).unwrap();
        assert_eq!(projected.len(), a.len());
        for (i, f) in projected.iter().enumerate() {
            assert_eq!(
                f.attribute("id"),
                Some(&AttributeValue::Integer(i64::try_from(i).unwrap()))
            );
        }
    }

    #[test]
    fn reprojecting_unreferenced_set_fails() {
        let mut a = sample_set();
        a.crs = None;
        let err = reproject(&a, UTM_18N).unwrap_err();
        assert!(matches!(err, GeometryError::CrsMismatch { .. }));
    }

    #[test]
    fn detects_mismatched_sets() {
        let a = sample_set();
        let b = reproject(&a, UTM_18N).unwrap();
        assert!(ensure_same_crs(&a, &b).is_err());
        assert_eq!(ensure_same_crs(&b, &b).unwrap(), UTM_18N);
    }
}
