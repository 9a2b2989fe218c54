//! Turns raw Overpass elements into geometries.
//!
//! Nodes become points. Ways become polygons when their coordinate ring is
//! closed and lines otherwise. Relations contribute one geometry per member
//! that carries coordinates. Elements with no usable coordinates fall back
//! to their `center` if Overpass sent one, and are dropped otherwise.

use std::collections::BTreeMap;

use geo::{Coord, Geometry, LineString, Point, Polygon};
use mapscope_geometry::Srid;
use mapscope_geometry::projection::project;
use mapscope_osm_models::{ElementType, LatLon, RawElement};

/// A raw element reduced to one geometry in the caller's SRID.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedElement {
    pub osm_type: ElementType,
    pub osm_id: i64,
    pub geometry: Geometry<f64>,
    pub tags: BTreeMap<String, String>,
}

const fn coord(position: LatLon) -> Coord<f64> {
    Coord {
        x: position.lon,
        y: position.lat,
    }
}

fn point_at(lat: Option<f64>, lon: Option<f64>) -> Option<Geometry<f64>> {
    Some(Point::new(lon?, lat?).into())
}

/// Shapes a coordinate sequence: closed rings of at least four positions
/// are polygons, two or more positions a line, a single position a point.
fn shape(positions: &[LatLon]) -> Option<Geometry<f64>> {
    let coords: Vec<Coord<f64>> = positions.iter().copied().map(coord).collect();
    let closed = coords.len() >= 4 && coords.first() == coords.last();
    match coords.len() {
        0 => None,
        1 => Some(Point::from(coords[0]).into()),
        _ if closed => Some(Polygon::new(LineString::new(coords), vec![]).into()),
        _ => Some(LineString::new(coords).into()),
    }
}

/// Geometries of `element` in WGS84 longitude/latitude.
#[must_use]
pub fn element_geometries(element: &RawElement) -> Vec<Geometry<f64>> {
    let own: Vec<Geometry<f64>> = match element.element_type {
        ElementType::Node => point_at(element.lat, element.lon).into_iter().collect(),
        ElementType::Way => shape(&element.geometry).into_iter().collect(),
        ElementType::Relation => element
            .members
            .iter()
            .filter_map(|member| {
                shape(&member.geometry).or_else(|| point_at(member.lat, member.lon))
            })
            .collect(),
    };

    if own.is_empty() {
        element
            .center
            .map(|center| Point::from(coord(center)).into())
            .into_iter()
            .collect()
    } else {
        own
    }
}

/// Classifies `element` and projects its geometries into `srid`.
///
/// Untagged nodes are dropped: they are the way vertices the recursive
/// `out skel` step returns, and every way already carries its geometry.
/// Geometries that cannot be projected are dropped with a warning.
#[must_use]
pub fn classify(element: &RawElement, srid: Srid) -> Vec<ClassifiedElement> {
    if element.element_type == ElementType::Node && element.tags.is_empty() {
        return Vec::new();
    }

    let geometries = element_geometries(element);
    if geometries.is_empty() {
        log::debug!(
            "Dropping {} {} without coordinates",
            element.element_type,
            element.id
        );
    }

    geometries
        .into_iter()
        .filter_map(|geometry| match project(&geometry, Srid::WGS84, srid) {
            Ok(projected) => Some(ClassifiedElement {
                osm_type: element.element_type,
                osm_id: element.id,
                geometry: projected,
                tags: element.tags.clone(),
            }),
            Err(e) => {
                log::warn!(
                    "Dropping {} {}: {e}",
                    element.element_type,
                    element.id
                );
                None
            }
        })
        .collect()
}
