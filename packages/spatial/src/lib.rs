#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial indexes for distance queries.
//!
//! Builds R-tree indexes over reference layers once and answers three kinds
//! of per-point query against them:
//!
//! * [`LineIndex`]: minimum-edge distance to the closest point on any line
//!   of a linear layer (transit lines).
//! * [`NearestIndex`]: distance to the single nearest feature of a point or
//!   polygon layer (crime incidents, job-proximity cells), plus the count of
//!   features within a radius.
//!
//! Indexes are read-only after construction and can be shared across
//! threads.

use geo::{Centroid, Coord, Distance, Euclidean, Geometry, Line, Point};
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use thiserror::Error;
use transit_housing_geometry::{GeometryError, filter::envelope_of, geometry_distance};
use transit_housing_geometry_models::{Crs, FeatureSet};

/// Errors that can occur while building or querying spatial indexes.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A distance query was requested against a layer with no geometry.
    #[error("Reference layer '{layer}' is empty; distance queries against it are meaningless")]
    EmptyReferenceSet {
        /// Name of the empty layer.
        layer: String,
    },

    /// Query points and index use different reference systems.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Result of a nearest-feature query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    /// Index of the nearest feature in the reference layer.
    pub index: usize,
    /// Distance to that feature in the reference system's linear unit.
    pub distance: f64,
}

/// One straight segment of a reference line.
struct SegmentEntry {
    line: Line<f64>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.line.start.x, self.line.start.y],
            [self.line.end.x, self.line.end.y],
        )
    }
}

impl PointDistance for SegmentEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = Euclidean.distance(&Point::new(point[0], point[1]), &self.line);
        d * d
    }
}

/// R-tree of line segments for minimum-edge distance queries.
pub struct LineIndex {
    layer: String,
    crs: Option<Crs>,
    segments: RTree<SegmentEntry>,
}

impl LineIndex {
    /// Decomposes every geometry of `set` into segments and indexes them.
    ///
    /// Polygons contribute their ring edges and points contribute
    /// zero-length segments, so any layer can serve as a line layer.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyReferenceSet`] if `set` yields no
    /// segments.
    pub fn build(set: &FeatureSet) -> Result<Self, SpatialError> {
        let mut lines = Vec::new();
        for feature in set {
            collect_segments(&feature.geometry, &mut lines);
        }

        if lines.is_empty() {
            return Err(SpatialError::EmptyReferenceSet {
                layer: set.name.clone(),
            });
        }

        log::info!(
            "Indexed {} segments from {} features of '{}'",
            lines.len(),
            set.len(),
            set.name
        );

        Ok(Self {
            layer: set.name.clone(),
            crs: set.crs,
            segments: RTree::bulk_load(
                lines
                    .into_iter()
                    .map(|line| SegmentEntry { line })
                    .collect(),
            ),
        })
    }

    /// Reference system of the indexed layer.
    #[must_use]
    pub const fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// Verifies that query points in `crs` can be measured against this
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Geometry`] on a reference mismatch.
    pub fn check_crs(&self, crs: Option<Crs>) -> Result<(), SpatialError> {
        check_crs(&self.layer, self.crs, crs)
    }

    /// Distance from `point` to the closest point on any indexed line.
    ///
    /// `None` only if the index is empty, which [`Self::build`] prevents.
    #[must_use]
    pub fn minimum_edge_distance(&self, point: Point<f64>) -> Option<f64> {
        let query = [point.x(), point.y()];
        self.segments
            .nearest_neighbor(&query)
            .map(|entry| entry.distance_2(&query).sqrt())
    }

    /// [`Self::minimum_edge_distance`] for every point, in order.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyReferenceSet`] if the index has no
    /// segments.
    pub fn minimum_edge_distances(
        &self,
        points: &[Point<f64>],
    ) -> Result<Vec<f64>, SpatialError> {
        points
            .iter()
            .map(|&p| {
                self.minimum_edge_distance(p)
                    .ok_or_else(|| SpatialError::EmptyReferenceSet {
                        layer: self.layer.clone(),
                    })
            })
            .collect()
    }
}

fn collect_segments(geometry: &Geometry<f64>, out: &mut Vec<Line<f64>>) {
    match geometry {
        Geometry::Point(p) => out.push(Line::new(p.0, p.0)),
        Geometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| Line::new(p.0, p.0))),
        Geometry::Line(l) => out.push(*l),
        Geometry::LineString(ls) => out.extend(ls.lines()),
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                out.extend(ls.lines());
            }
        }
        Geometry::Polygon(poly) => {
            out.extend(poly.exterior().lines());
            for ring in poly.interiors() {
                out.extend(ring.lines());
            }
        }
        Geometry::MultiPolygon(mp) => {
            for poly in mp {
                collect_segments(&Geometry::Polygon(poly.clone()), out);
            }
        }
        Geometry::Rect(rect) => collect_segments(&Geometry::Polygon(rect.to_polygon()), out),
        Geometry::Triangle(tri) => collect_segments(&Geometry::Polygon(tri.to_polygon()), out),
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_segments(g, out);
            }
        }
    }
}

/// A whole reference feature stored in the R-tree with its position in the
/// source layer.
struct FeatureEntry {
    index: usize,
    geometry: Geometry<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for FeatureEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = match &self.geometry {
            Geometry::Point(p) => Euclidean.distance(Point::new(point[0], point[1]), *p),
            other => geometry_distance(&Geometry::Point(Point::new(point[0], point[1])), other),
        };
        d * d
    }
}

/// R-tree of whole features for nearest-feature and radius-count queries.
pub struct NearestIndex {
    layer: String,
    crs: Option<Crs>,
    features: RTree<FeatureEntry>,
}

impl NearestIndex {
    /// Indexes every non-empty geometry of `set`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyReferenceSet`] if `set` has no
    /// indexable geometry.
    pub fn build(set: &FeatureSet) -> Result<Self, SpatialError> {
        let entries: Vec<FeatureEntry> = set
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                envelope_of(&feature.geometry).map(|envelope| FeatureEntry {
                    index,
                    geometry: feature.geometry.clone(),
                    envelope,
                })
            })
            .collect();

        if entries.is_empty() {
            return Err(SpatialError::EmptyReferenceSet {
                layer: set.name.clone(),
            });
        }

        log::info!("Indexed {} features of '{}'", entries.len(), set.name);

        Ok(Self {
            layer: set.name.clone(),
            crs: set.crs,
            features: RTree::bulk_load(entries),
        })
    }

    /// Reference system of the indexed layer.
    #[must_use]
    pub const fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// Verifies that query points in `crs` can be measured against this
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Geometry`] on a reference mismatch.
    pub fn check_crs(&self, crs: Option<Crs>) -> Result<(), SpatialError> {
        check_crs(&self.layer, self.crs, crs)
    }

    /// Finds the single nearest feature to `point`.
    ///
    /// Exact ties resolve in the R-tree's traversal order, which is not
    /// specified.
    #[must_use]
    pub fn nearest(&self, point: Point<f64>) -> Option<Nearest> {
        let query = [point.x(), point.y()];
        self.features.nearest_neighbor(&query).map(|entry| Nearest {
            index: entry.index,
            distance: entry.distance_2(&query).sqrt(),
        })
    }

    /// [`Self::nearest`] for every point, in order. Returns exactly one
    /// result per input point.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyReferenceSet`] if the index has no
    /// features.
    pub fn nearest_feature_distances(
        &self,
        points: &[Point<f64>],
    ) -> Result<Vec<Nearest>, SpatialError> {
        points
            .iter()
            .map(|&p| {
                self.nearest(p).ok_or_else(|| SpatialError::EmptyReferenceSet {
                    layer: self.layer.clone(),
                })
            })
            .collect()
    }

    /// Number of features whose geometry lies within `radius` of `point`
    /// (boundary inclusive).
    #[must_use]
    pub fn count_within(&self, point: Point<f64>, radius: f64) -> usize {
        self.features
            .locate_within_distance([point.x(), point.y()], radius * radius)
            .count()
    }
}

fn check_crs(layer: &str, expected: Option<Crs>, found: Option<Crs>) -> Result<(), SpatialError> {
    match (expected, found) {
        (Some(a), Some(b)) if a == b => Ok(()),
        (expected, found) => Err(GeometryError::CrsMismatch {
            layer: layer.to_string(),
            message: format!(
                "index is in {}, query points are in {}",
                describe(expected),
                describe(found)
            ),
        }
        .into()),
    }
}

fn describe(crs: Option<Crs>) -> String {
    crs.map_or_else(|| "an undefined reference".to_string(), |c| c.to_string())
}

/// Point used to measure distances from a feature: the point itself, or
/// the centroid of a line or polygon.
#[must_use]
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(p) => Some(*p),
        other => other.centroid(),
    }
}

/// Convenience for building points from raw coordinates.
#[must_use]
pub fn point(x: f64, y: f64) -> Point<f64> {
    Point(Coord { x, y })
}
