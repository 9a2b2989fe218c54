//! Geometry family classification and boundary normalization.

use std::collections::BTreeMap;

use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, Point};
use mapscope_geometry_models::{GeometryFamily, GeometryKind};

/// Returns the [`GeometryKind`] of a concrete geometry value.
///
/// `Line` reports as a line string; `Rect` and `Triangle` report as
/// polygons.
#[must_use]
pub const fn kind_of(geometry: &Geometry<f64>) -> GeometryKind {
    match geometry {
        Geometry::Point(_) => GeometryKind::Point,
        Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
        Geometry::Line(_) | Geometry::LineString(_) => GeometryKind::LineString,
        Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => GeometryKind::Polygon,
        Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        Geometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
    }
}

/// Returns the comparison family of a geometry.
#[must_use]
pub const fn family(geometry: &Geometry<f64>) -> GeometryFamily {
    kind_of(geometry).family()
}

/// Whether a geometry is compound and should be compared by its boundary.
#[must_use]
pub const fn is_multi_part(geometry: &Geometry<f64>) -> bool {
    kind_of(geometry).is_multi_part()
}

/// Substitutes the boundary of compound geometries; simple geometries are
/// returned unchanged.
#[must_use]
pub fn normalize(geometry: &Geometry<f64>) -> Geometry<f64> {
    if is_multi_part(geometry) {
        boundary(geometry)
    } else {
        geometry.clone()
    }
}

/// Computes the topological boundary of a geometry.
///
/// Polygons yield their rings, lines yield the endpoints that occur an odd
/// number of times (the mod-2 rule), and points have an empty boundary.
#[must_use]
pub fn boundary(geometry: &Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => {
            Geometry::GeometryCollection(GeometryCollection(Vec::new()))
        }
        Geometry::Line(line) => Geometry::MultiPoint(MultiPoint::new(vec![
            line.start_point(),
            line.end_point(),
        ])),
        Geometry::LineString(ls) => {
            Geometry::MultiPoint(line_endpoints(std::slice::from_ref(ls)))
        }
        Geometry::MultiLineString(mls) => Geometry::MultiPoint(line_endpoints(&mls.0)),
        Geometry::Polygon(polygon) => rings_to_lines(
            std::iter::once(polygon.exterior()).chain(polygon.interiors()),
        ),
        Geometry::Rect(rect) => rings_to_lines(std::iter::once(rect.to_polygon().exterior())),
        Geometry::Triangle(triangle) => {
            rings_to_lines(std::iter::once(triangle.to_polygon().exterior()))
        }
        Geometry::MultiPolygon(mp) => Geometry::MultiLineString(MultiLineString::new(
            mp.iter()
                .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                .cloned()
                .collect(),
        )),
        Geometry::GeometryCollection(gc) => {
            Geometry::GeometryCollection(GeometryCollection(gc.iter().map(boundary).collect()))
        }
    }
}

fn rings_to_lines<'a>(rings: impl Iterator<Item = &'a LineString<f64>>) -> Geometry<f64> {
    let mut rings: Vec<LineString<f64>> = rings.cloned().collect();
    if rings.len() == 1 {
        Geometry::LineString(rings.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString::new(rings))
    }
}

fn line_endpoints(lines: &[LineString<f64>]) -> MultiPoint<f64> {
    let mut counts: BTreeMap<(u64, u64), (Coord<f64>, usize)> = BTreeMap::new();
    let mut order = Vec::new();

    for ls in lines.iter().filter(|ls| !ls.is_closed()) {
        let (Some(first), Some(last)) = (ls.0.first(), ls.0.last()) else {
            continue;
        };
        for coord in [*first, *last] {
            let key = (coord.x.to_bits(), coord.y.to_bits());
            let entry = counts.entry(key).or_insert_with(|| {
                order.push(key);
                (coord, 0)
            });
            entry.1 += 1;
        }
    }

    MultiPoint::new(
        order
            .into_iter()
            .filter_map(|key| counts.get(&key))
            .filter(|(_, count)| count % 2 == 1)
            .map(|(coord, _)| Point::from(*coord))
            .collect(),
    )
}
