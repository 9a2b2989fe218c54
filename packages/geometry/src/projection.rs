//! Coordinate transformation between the supported spatial references.
//!
//! Only a handful of SRIDs are needed: the geographic systems external
//! sources deliver (WGS84, NAD83) and Web Mercator, the usual working
//! projection for regions. Anything else is rejected up front.

use geo::{Coord, Geometry, MapCoords};
use mapscope_geometry_models::Srid;
use proj4rs::{proj::Proj, transform::transform};

use crate::GeometryError;

fn proj_definition(srid: Srid) -> Result<&'static str, GeometryError> {
    match srid.code() {
        4326 => Ok("+proj=longlat +datum=WGS84 +no_defs +type=crs"),
        4269 => Ok("+proj=longlat +datum=NAD83 +no_defs +type=crs"),
        3857 => Ok(
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs",
        ),
        _ => Err(GeometryError::UnsupportedSrid(srid)),
    }
}

fn build_proj(srid: Srid) -> Result<Proj, GeometryError> {
    let definition = proj_definition(srid)?;
    Proj::from_proj_string(definition).map_err(|e| GeometryError::Projection {
        message: format!("failed to build projection for {srid}: {e}"),
    })
}

/// Returns `true` if [`project`] can handle `srid`.
#[must_use]
pub fn is_supported(srid: Srid) -> bool {
    proj_definition(srid).is_ok()
}

/// Transforms `geometry` from `from` to `to`.
///
/// Geographic coordinates are longitude/latitude degrees.
///
/// # Errors
///
/// Returns [`GeometryError::UnsupportedSrid`] if either SRID has no known
/// definition, or [`GeometryError::Projection`] if a coordinate cannot be
/// transformed.
pub fn project(
    geometry: &Geometry<f64>,
    from: Srid,
    to: Srid,
) -> Result<Geometry<f64>, GeometryError> {
    if from == to {
        return Ok(geometry.clone());
    }

    let source = build_proj(from)?;
    let target = build_proj(to)?;
    let source_latlong = source.is_latlong();
    let target_latlong = target.is_latlong();

    geometry.try_map_coords(|coord: Coord<f64>| {
        let mut point = if source_latlong {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&source, &target, &mut point).map_err(|e| GeometryError::Projection {
            message: format!("({}, {}) from {from} to {to}: {e}", coord.x, coord.y),
        })?;

        Ok(if target_latlong {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn same_srid_is_identity() {
        let p: Geometry<f64> = point!(x: 12.5, y: -3.25).into();
        assert_eq!(project(&p, Srid::WGS84, Srid::WGS84).unwrap(), p);
    }

    #[test]
    fn projects_to_web_mercator_and_back() {
        let p: Geometry<f64> = point!(x: 10.0, y: 45.0).into();
        let Geometry::Point(merc) = project(&p, Srid::WGS84, Srid::WEB_MERCATOR).unwrap() else {
            panic!("expected point");
        };
        // 10 degrees of longitude on the Web Mercator sphere.
        assert!((merc.x() - 1_113_194.908).abs() < 1.0);
        assert!(merc.y() > 5_000_000.0);

        let Geometry::Point(back) =
            project(&merc.into(), Srid::WEB_MERCATOR, Srid::WGS84).unwrap()
        else {
            panic!("expected point");
        };
        assert!((back.x() - 10.0).abs() < 1e-9);
        assert!((back.y() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_unknown_srid() {
        let p: Geometry<f64> = point!(x: 0.0, y: 0.0).into();
        assert!(!is_supported(Srid(27700)));
        assert!(matches!(
            project(&p, Srid(27700), Srid::WGS84),
            Err(GeometryError::UnsupportedSrid(Srid(27700)))
        ));
    }
}
