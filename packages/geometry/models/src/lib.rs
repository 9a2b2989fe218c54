#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry type taxonomy and spatial reference types.
//!
//! Defines the closed set of geometry type names the toolkit understands,
//! the three comparison families they collapse into, and the
//! [`SpatialContext`] (SRID + precision model) that is threaded into every
//! geometry-producing call instead of living in shared global state.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Every geometry type name the toolkit recognizes.
///
/// Names parse case-insensitively (`"multipolygon"`, `"MultiPolygon"`).
/// The `Z` variants carry an elevation ordinate and classify exactly like
/// their planar counterparts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum GeometryKind {
    Point,
    PointZ,
    MultiPoint,
    MultiPointZ,
    LineString,
    LineStringZ,
    MultiLineString,
    MultiLineStringZ,
    Curve,
    CurveZ,
    MultiCurve,
    MultiCurveZ,
    Polygon,
    PolygonZ,
    MultiPolygon,
    MultiPolygonZ,
    Surface,
    SurfaceZ,
    MultiSurface,
    MultiSurfaceZ,
    GeometryCollection,
    GeometryCollectionZ,
}

impl GeometryKind {
    /// Parses a geometry type name, returning `None` for anything outside
    /// the recognized set.
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        name.trim().parse().ok()
    }

    /// The comparison family this kind belongs to.
    ///
    /// Geometry collections have no single family and report
    /// [`GeometryFamily::Unclassified`].
    #[must_use]
    pub const fn family(self) -> GeometryFamily {
        match self {
            Self::Point | Self::PointZ | Self::MultiPoint | Self::MultiPointZ => {
                GeometryFamily::Point
            }
            Self::LineString
            | Self::LineStringZ
            | Self::MultiLineString
            | Self::MultiLineStringZ
            | Self::Curve
            | Self::CurveZ
            | Self::MultiCurve
            | Self::MultiCurveZ => GeometryFamily::Line,
            Self::Polygon
            | Self::PolygonZ
            | Self::MultiPolygon
            | Self::MultiPolygonZ
            | Self::Surface
            | Self::SurfaceZ
            | Self::MultiSurface
            | Self::MultiSurfaceZ => GeometryFamily::Polygon,
            Self::GeometryCollection | Self::GeometryCollectionZ => GeometryFamily::Unclassified,
        }
    }

    /// Whether this kind is compound: a multi-part type, a collection, or
    /// one of the generic `Curve`/`Surface` types.
    ///
    /// Compound geometries are replaced by their boundary when normalized.
    #[must_use]
    pub const fn is_multi_part(self) -> bool {
        matches!(
            self,
            Self::MultiLineString
                | Self::MultiLineStringZ
                | Self::MultiCurve
                | Self::MultiCurveZ
                | Self::MultiPoint
                | Self::MultiPointZ
                | Self::MultiPolygon
                | Self::MultiPolygonZ
                | Self::GeometryCollection
                | Self::GeometryCollectionZ
                | Self::MultiSurface
                | Self::MultiSurfaceZ
                | Self::Surface
                | Self::SurfaceZ
                | Self::Curve
                | Self::CurveZ
        )
    }

    /// Whether this kind carries an elevation ordinate.
    #[must_use]
    pub const fn has_elevation(self) -> bool {
        matches!(
            self,
            Self::PointZ
                | Self::MultiPointZ
                | Self::LineStringZ
                | Self::MultiLineStringZ
                | Self::CurveZ
                | Self::MultiCurveZ
                | Self::PolygonZ
                | Self::MultiPolygonZ
                | Self::SurfaceZ
                | Self::MultiSurfaceZ
                | Self::GeometryCollectionZ
        )
    }
}

/// The three comparison families, plus a catch-all for anything that does
/// not fit one of them.
///
/// `Unclassified` never short-circuits a relationship check; callers fall
/// through to "no match".
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeometryFamily {
    Point,
    Line,
    Polygon,
    Unclassified,
}

impl GeometryFamily {
    /// Classifies a raw type name. Unknown names are `Unclassified`.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        GeometryKind::from_type_name(name).map_or(Self::Unclassified, GeometryKind::family)
    }
}

/// Returns `true` if `name` is a recognized geometry type name.
#[must_use]
pub fn is_valid_geometry_type_name(name: &str) -> bool {
    GeometryKind::from_type_name(name).is_some()
}

/// Degrees of longitude per meter along the equator.
pub const DEGREES_PER_METER: f64 = 1.0 / 111_320.0;

/// Spatial reference identifier (EPSG code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Srid(pub u32);

impl Srid {
    /// WGS 84 geographic coordinates (longitude/latitude degrees).
    pub const WGS84: Self = Self(4326);
    /// NAD83 geographic coordinates.
    pub const NAD83: Self = Self(4269);
    /// Spherical Web Mercator (meters).
    pub const WEB_MERCATOR: Self = Self(3857);

    /// Returns the numeric EPSG code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }

    /// Coordinate units per meter.
    ///
    /// Web Mercator coordinates are meters. Every other reference is treated
    /// as geographic, where a meter is [`DEGREES_PER_METER`] at the equator.
    #[must_use]
    pub const fn units_per_meter(self) -> f64 {
        match self {
            Self::WEB_MERCATOR => 1.0,
            _ => DEGREES_PER_METER,
        }
    }
}

impl Default for Srid {
    fn default() -> Self {
        Self::WGS84
    }
}

impl std::fmt::Display for Srid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Coordinate grid applied before overlay operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrecisionModel {
    /// Full double precision; reduction is a no-op.
    Floating,
    /// Snap every ordinate to the nearest single-precision float.
    FloatingSingle,
    /// Snap every ordinate to a grid of `1 / scale`.
    Fixed {
        /// Grid cells per coordinate unit.
        scale: f64,
    },
}

impl Default for PrecisionModel {
    fn default() -> Self {
        Self::FloatingSingle
    }
}

/// The SRID and precision every geometry built for one request shares.
///
/// Passed by value into constructors instead of being read from a
/// process-wide factory, so concurrent requests in different SRIDs never
/// observe each other's settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialContext {
    /// Spatial reference of every geometry built with this context.
    pub srid: Srid,
    /// Grid used by precision reduction.
    pub precision: PrecisionModel,
}

impl SpatialContext {
    /// Creates a context for `srid` with the default single-precision grid.
    #[must_use]
    pub fn new(srid: Srid) -> Self {
        Self {
            srid,
            precision: PrecisionModel::default(),
        }
    }

    /// Returns a copy of this context using `precision`.
    #[must_use]
    pub const fn with_precision(mut self, precision: PrecisionModel) -> Self {
        self.precision = precision;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator as _;

    #[test]
    fn parses_type_names_case_insensitively() {
        assert_eq!(
            GeometryKind::from_type_name("multipolygon"),
            Some(GeometryKind::MultiPolygon)
        );
        assert_eq!(
            GeometryKind::from_type_name(" LineStringZ "),
            Some(GeometryKind::LineStringZ)
        );
        assert_eq!(GeometryKind::from_type_name("Triangle"), None);
    }

    #[test]
    fn elevation_variants_share_family() {
        assert_eq!(GeometryKind::PointZ.family(), GeometryFamily::Point);
        assert_eq!(GeometryKind::MultiCurveZ.family(), GeometryFamily::Line);
        assert_eq!(GeometryKind::SurfaceZ.family(), GeometryFamily::Polygon);
        assert!(GeometryKind::PolygonZ.has_elevation());
        assert!(!GeometryKind::Polygon.has_elevation());
    }

    #[test]
    fn unknown_names_are_unclassified() {
        assert_eq!(
            GeometryFamily::from_type_name("CircularString"),
            GeometryFamily::Unclassified
        );
        assert_eq!(
            GeometryFamily::from_type_name("GeometryCollection"),
            GeometryFamily::Unclassified
        );
        assert!(!is_valid_geometry_type_name("CircularString"));
        assert!(is_valid_geometry_type_name("GeometryCollection"));
    }

    #[test]
    fn multi_part_set_matches_compound_kinds() {
        let compound: Vec<GeometryKind> = GeometryKind::iter()
            .filter(|k| k.is_multi_part())
            .collect();

        for kind in [
            GeometryKind::Point,
            GeometryKind::LineString,
            GeometryKind::Polygon,
            GeometryKind::PointZ,
            GeometryKind::LineStringZ,
            GeometryKind::PolygonZ,
        ] {
            assert!(!compound.contains(&kind), "{kind} should be simple");
        }
        assert_eq!(compound.len(), GeometryKind::iter().count() - 6);
    }

    #[test]
    fn context_defaults_to_single_precision() {
        let ctx = SpatialContext::new(Srid::WEB_MERCATOR);
        assert_eq!(ctx.srid.code(), 3857);
        assert_eq!(ctx.precision, PrecisionModel::FloatingSingle);
        assert_eq!(ctx.srid.to_string(), "EPSG:3857");
    }

    #[test]
    fn unit_scale_follows_reference() {
        assert!((Srid::WEB_MERCATOR.units_per_meter() - 1.0).abs() < f64::EPSILON);
        assert!((Srid::WGS84.units_per_meter() - DEGREES_PER_METER).abs() < f64::EPSILON);
        assert!((Srid::NAD83.units_per_meter() - DEGREES_PER_METER).abs() < f64::EPSILON);
    }
}
