#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Storage-layer spatial predicates and an in-memory index that evaluates
//! them.
//!
//! Geometry-bearing record sets are filtered with one of two predicates:
//! "column intersects geometry" for line and polygon sources, and "column is
//! within geometry" for point sources. [`SpatialPredicate`] captures that
//! choice; any store can translate it into its own query language.
//! [`FeatureIndex`] is the in-memory store: features are bulk-loaded into an
//! R-tree keyed by envelope, and each query only runs the exact predicate
//! on candidates whose envelopes overlap the query envelope.

use geo::{BoundingRect, Geometry, Intersects, Relate};
use mapscope_geometry::GeometryFamily;
use mapscope_geometry::feature::{Feature, FeatureCollection};
use rstar::{AABB, RTree, RTreeObject};

/// A spatial filter over a geometry column.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialPredicate {
    /// Column geometry shares at least one point with the given geometry.
    Intersects(Geometry<f64>),
    /// Column geometry lies inside the given geometry.
    Within(Geometry<f64>),
}

impl SpatialPredicate {
    /// Picks the predicate for a source whose column holds `source_family`
    /// geometries: `Within` for point sources, `Intersects` otherwise.
    #[must_use]
    pub const fn for_source(source_family: GeometryFamily, geometry: Geometry<f64>) -> Self {
        match source_family {
            GeometryFamily::Point => Self::Within(geometry),
            GeometryFamily::Line | GeometryFamily::Polygon | GeometryFamily::Unclassified => {
                Self::Intersects(geometry)
            }
        }
    }

    /// The query geometry.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry<f64> {
        match self {
            Self::Intersects(geometry) | Self::Within(geometry) => geometry,
        }
    }

    /// Evaluates the predicate against one column value.
    #[must_use]
    pub fn evaluate(&self, candidate: &Geometry<f64>) -> bool {
        match self {
            Self::Intersects(geometry) => candidate.intersects(geometry),
            Self::Within(geometry) => candidate.relate(geometry).is_within(),
        }
    }
}

/// A feature stored in the R-tree with its precomputed envelope.
struct IndexedFeature {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// In-memory feature store answering [`SpatialPredicate`] queries.
pub struct FeatureIndex {
    tree: RTree<IndexedFeature>,
    features: Vec<Feature>,
}

impl FeatureIndex {
    /// Bulk-loads `features` into an R-tree.
    ///
    /// Features with empty geometries are kept but never match.
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        let entries: Vec<IndexedFeature> = features
            .iter()
            .enumerate()
            .filter_map(|(position, feature)| {
                compute_envelope(&feature.geometry)
                    .map(|envelope| IndexedFeature { position, envelope })
            })
            .collect();

        let skipped = features.len() - entries.len();
        if skipped > 0 {
            log::debug!("{skipped} features without an envelope left out of the index");
        }

        Self {
            tree: RTree::bulk_load(entries),
            features,
        }
    }

    /// Indexes every member of `collection`.
    #[must_use]
    pub fn from_collection(collection: FeatureCollection) -> Self {
        Self::new(collection.into_features())
    }

    /// Returns the features satisfying `predicate`, in insertion order.
    #[must_use]
    pub fn query(&self, predicate: &SpatialPredicate) -> Vec<&Feature> {
        let Some(query_env) = compute_envelope(predicate.geometry()) else {
            return Vec::new();
        };

        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .map(|entry| entry.position)
            .filter(|&position| predicate.evaluate(&self.features[position].geometry))
            .collect();
        positions.sort_unstable();

        positions
            .into_iter()
            .map(|position| &self.features[position])
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Compute the bounding box envelope of a geometry.
fn compute_envelope(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
