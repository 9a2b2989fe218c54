//! Asymmetric spatial relationship evaluation.
//!
//! `A` is always the reference (search) geometry and `B` the candidate. The
//! family of `A` selects the branch, and only then does the family of `B`
//! matter, so `matches(a, b)` and `matches(b, a)` answer different
//! questions:
//!
//! | A       | B       | relation                          |
//! |---------|---------|-----------------------------------|
//! | Point   | Point   | distance(A, B) <= A's tolerance   |
//! | Point   | Line    | B touches A                       |
//! | Point   | Polygon | B within A, or B touches A        |
//! | Line    | Point   | B touches A                       |
//! | Line    | Line    | B touches A                       |
//! | Line    | Polygon | B crosses A                       |
//! | Polygon | Point   | B within A, or B touches A        |
//! | Polygon | Line    | B crosses A                       |
//! | Polygon | Polygon | B intersects A                    |
//!
//! Every other pairing, including anything unclassified, is no match.
//!
//! The branch is chosen on the geometries as given. Compound operands
//! (multi-part types and collections) are then replaced by their boundary
//! before the predicate runs, see [`normalize`].

use geo::{Distance, Euclidean, Geometry, Intersects, Relate};
use mapscope_geometry_models::{GeometryFamily, SpatialContext, Srid};

use crate::GeometryError;
use crate::classify::{family, normalize};
use crate::overlay::{Overlay, guarded};

/// A geometry prepared for comparison.
///
/// Carries the SRID explicitly, plus an optional distance tolerance that
/// only point-to-point comparisons use.
#[derive(Debug, Clone, PartialEq)]
pub struct GisGeometry {
    geometry: Option<Geometry<f64>>,
    tolerance: Option<f64>,
    srid: Srid,
}

impl GisGeometry {
    /// Wraps `geometry` in the SRID of `context`.
    #[must_use]
    pub const fn new(context: &SpatialContext, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            geometry,
            tolerance: None,
            srid: context.srid,
        }
    }

    /// Sets the point-to-point distance tolerance, in coordinate units.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// The wrapped geometry, if any.
    #[must_use]
    pub const fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }

    /// Consumes the wrapper, returning the geometry.
    #[must_use]
    pub fn into_geometry(self) -> Option<Geometry<f64>> {
        self.geometry
    }

    #[must_use]
    pub const fn tolerance(&self) -> Option<f64> {
        self.tolerance
    }

    #[must_use]
    pub const fn srid(&self) -> Srid {
        self.srid
    }

    /// Family of the wrapped geometry; `None` when there is no geometry.
    #[must_use]
    pub fn family(&self) -> Option<GeometryFamily> {
        self.geometry.as_ref().map(family)
    }
}

/// The predicate a (reference, candidate) family pair is judged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    WithinTolerance,
    Touches,
    WithinOrTouches,
    Crosses,
    Intersects,
}

/// Whether the predicate's match yields the intersection rather than the
/// candidate itself.
const fn yields_intersection(reference: GeometryFamily, candidate: GeometryFamily) -> bool {
    matches!(
        (reference, candidate),
        (GeometryFamily::Line | GeometryFamily::Polygon, GeometryFamily::Polygon)
    )
}

const fn relation_for(reference: GeometryFamily, candidate: GeometryFamily) -> Option<Relation> {
    use GeometryFamily::{Line, Point, Polygon};

    match (reference, candidate) {
        (Point, Point) => Some(Relation::WithinTolerance),
        (Point | Line, Line) | (Line, Point) => Some(Relation::Touches),
        (Point, Polygon) | (Polygon, Point) => Some(Relation::WithinOrTouches),
        (Line, Polygon) | (Polygon, Line) => Some(Relation::Crosses),
        (Polygon, Polygon) => Some(Relation::Intersects),
        _ => None,
    }
}

fn holds(
    relation: Relation,
    reference: &Geometry<f64>,
    candidate: &Geometry<f64>,
    tolerance: Option<f64>,
) -> Result<bool, GeometryError> {
    let (reference, candidate) = (&normalize(reference), &normalize(candidate));
    let outcome = match relation {
        Relation::WithinTolerance => {
            let tolerance = tolerance.ok_or(GeometryError::MissingTolerance)?;
            guarded("distance", || Euclidean.distance(reference, candidate))
                .map(|d| d <= tolerance)
        }
        Relation::Touches => guarded("relate", || candidate.relate(reference).is_touches()),
        Relation::WithinOrTouches => guarded("relate", || {
            let matrix = candidate.relate(reference);
            matrix.is_within() || matrix.is_touches()
        }),
        Relation::Crosses => guarded("relate", || candidate.relate(reference).is_crosses()),
        Relation::Intersects => guarded("intersects", || candidate.intersects(reference)),
    };

    Ok(outcome.unwrap_or_else(|e| {
        log::warn!("Relationship check degraded to no match: {e}");
        false
    }))
}

fn ensure_same_srid(a: &GisGeometry, b: &GisGeometry) -> Result<(), GeometryError> {
    if a.srid == b.srid {
        Ok(())
    } else {
        Err(GeometryError::SridMismatch {
            left: a.srid,
            right: b.srid,
        })
    }
}

/// Decides whether candidate `b` relates to reference `a`.
///
/// A missing geometry on either side is never a match.
///
/// # Errors
///
/// Returns [`GeometryError::MissingTolerance`] for a point-to-point
/// comparison when `a` has no tolerance, and
/// [`GeometryError::SridMismatch`] when the operands are in different
/// spatial references.
pub fn matches(a: &GisGeometry, b: &GisGeometry) -> Result<bool, GeometryError> {
    let (Some(reference), Some(candidate)) = (&a.geometry, &b.geometry) else {
        return Ok(false);
    };
    ensure_same_srid(a, b)?;

    let Some(relation) = relation_for(family(reference), family(candidate)) else {
        return Ok(false);
    };
    holds(relation, reference, candidate, a.tolerance)
}

/// Returns what candidate `b` contributes to reference `a`.
///
/// Point and line matches yield `b` unchanged. Line-vs-polygon and
/// polygon-vs-polygon matches yield the polygonal intersection of the two.
/// Returns `Ok(None)` when there is no match or the intersection is empty.
///
/// # Errors
///
/// Same conditions as [`matches`], plus [`GeometryError::SridMismatch`]
/// when `overlay` was built for a different SRID.
pub fn overlap(
    overlay: &Overlay,
    a: &GisGeometry,
    b: &GisGeometry,
) -> Result<Option<GisGeometry>, GeometryError> {
    let (Some(reference), Some(candidate)) = (&a.geometry, &b.geometry) else {
        return Ok(None);
    };
    ensure_same_srid(a, b)?;
    if overlay.context().srid != a.srid {
        return Err(GeometryError::SridMismatch {
            left: a.srid,
            right: overlay.context().srid,
        });
    }

    let (reference_family, candidate_family) = (family(reference), family(candidate));
    let Some(relation) = relation_for(reference_family, candidate_family) else {
        return Ok(None);
    };
    if !holds(relation, reference, candidate, a.tolerance)? {
        return Ok(None);
    }

    if yields_intersection(reference_family, candidate_family) {
        let context = overlay.context();
        Ok(overlay
            .intersection(reference, candidate, None)
            .map(|shared| GisGeometry::new(&context, Some(shared))))
    } else {
        Ok(Some(b.clone()))
    }
}
