//! Numerically robust buffering, intersection and difference.
//!
//! The overlay engine can abort on nearly-degenerate topology, so every
//! call into it goes through [`guarded`] and every public helper degrades
//! instead of failing: precision reduction falls back to the original
//! geometry, intersection and difference fall back to `None`. The `try_*`
//! methods expose the underlying [`OverlayError`] for callers that want to
//! decide for themselves.
//!
//! Distances passed in by callers are in meters and are converted to
//! coordinate units with [`Srid::units_per_meter`] of the context's SRID.
//! [`to_native_distance`], [`area_in_units`] and [`length_in_units`] are the
//! only places that factor is applied.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use geo::{
    Area, BooleanOps, BoundingRect, Buffer, Coord, CoordsIter, Geometry, Intersects, LineString,
    MapCoords, MultiLineString, MultiPoint, MultiPolygon, Polygon,
};
use mapscope_geometry_models::{GeometryFamily, PrecisionModel, SpatialContext, Srid};

use crate::OverlayError;
use crate::classify::{family, kind_of};

/// Decimal places kept by [`area_in_units`] and [`length_in_units`].
pub const MEASURE_DECIMALS: i32 = 2;

/// Upper bound on buffer/envelope rounds in [`Overlay::coerce_to_polygon`].
///
/// Two rounds always suffice: the envelope of any non-empty geometry is a
/// polygon. The extra rounds only absorb engine quirks.
const MAX_COERCE_ATTEMPTS: usize = 4;

/// Converts a distance in meters into coordinate units of `srid`.
#[must_use]
pub const fn to_native_distance(distance_units: f64, srid: Srid) -> f64 {
    distance_units * srid.units_per_meter()
}

/// Area of a geometry in square meters, rounded to [`MEASURE_DECIMALS`].
#[must_use]
pub fn area_in_units(geometry: &Geometry<f64>, srid: Srid) -> f64 {
    let scale = srid.units_per_meter();
    round_measure(geometry.unsigned_area() / (scale * scale))
}

/// Length of the linear parts of a geometry in meters, rounded to
/// [`MEASURE_DECIMALS`]. Polygons contribute their ring lengths.
#[must_use]
pub fn length_in_units(geometry: &Geometry<f64>, srid: Srid) -> f64 {
    round_measure(native_length(geometry) / srid.units_per_meter())
}

fn native_length(geometry: &Geometry<f64>) -> f64 {
    fn ring_length(ls: &geo::LineString<f64>) -> f64 {
        ls.lines().map(|line| line.dx().hypot(line.dy())).sum()
    }

    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => 0.0,
        Geometry::Line(line) => line.dx().hypot(line.dy()),
        Geometry::LineString(ls) => ring_length(ls),
        Geometry::MultiLineString(mls) => mls.iter().map(ring_length).sum(),
        Geometry::Polygon(p) => std::iter::once(p.exterior())
            .chain(p.interiors())
            .map(ring_length)
            .sum(),
        Geometry::MultiPolygon(mp) => mp
            .iter()
            .map(|p| native_length(&Geometry::Polygon(p.clone())))
            .sum(),
        Geometry::Rect(rect) => ring_length(rect.to_polygon().exterior()),
        Geometry::Triangle(triangle) => ring_length(triangle.to_polygon().exterior()),
        Geometry::GeometryCollection(gc) => gc.iter().map(native_length).sum(),
    }
}

fn round_measure(value: f64) -> f64 {
    let factor = 10_f64.powi(MEASURE_DECIMALS);
    (value * factor).round() / factor
}

/// Runs an overlay-engine call, turning an engine abort into an
/// [`OverlayError::Engine`].
///
/// # Errors
///
/// Returns [`OverlayError::Engine`] if `op` panics.
pub fn guarded<T>(operation: &'static str, op: impl FnOnce() -> T) -> Result<T, OverlayError> {
    catch_unwind(AssertUnwindSafe(op)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown engine failure".to_string());
        OverlayError::Engine { operation, message }
    })
}

/// Returns the polygonal content of a geometry, or `None` if it has none.
///
/// Collections contribute their polygonal members; points and lines cover
/// no area.
#[must_use]
pub fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons: Vec<Polygon<f64>> = match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(rect) => vec![rect.to_polygon()],
        Geometry::Triangle(triangle) => vec![triangle.to_polygon()],
        Geometry::GeometryCollection(gc) => gc
            .iter()
            .filter_map(as_multi_polygon)
            .flat_map(|mp| mp.0)
            .collect(),
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_) => return None,
    };

    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

/// Collapses single-member wrappers so a result that is "really" a polygon
/// is reported as one.
#[must_use]
pub fn simplify_polygonal(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => Geometry::Polygon(mp.0.remove(0)),
        Geometry::Rect(rect) => Geometry::Polygon(rect.to_polygon()),
        Geometry::Triangle(triangle) => Geometry::Polygon(triangle.to_polygon()),
        Geometry::GeometryCollection(mut gc) if gc.0.len() == 1 => {
            simplify_polygonal(gc.0.remove(0))
        }
        other => other,
    }
}

fn is_polygonal(geometry: &Geometry<f64>) -> bool {
    matches!(
        geometry,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_)
    )
}

const fn has_no_area(geometry: &Geometry<f64>) -> bool {
    matches!(family(geometry), GeometryFamily::Point | GeometryFamily::Line)
}

fn as_multi_point(geometry: &Geometry<f64>) -> Option<MultiPoint<f64>> {
    match geometry {
        Geometry::Point(p) => Some(MultiPoint::new(vec![*p])),
        Geometry::MultiPoint(mp) => Some(mp.clone()),
        _ => None,
    }
}

fn as_multi_line_string(geometry: &Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geometry {
        Geometry::Line(line) => Some(MultiLineString::new(vec![LineString::from(*line)])),
        Geometry::LineString(ls) => Some(MultiLineString::new(vec![ls.clone()])),
        Geometry::MultiLineString(mls) => Some(mls.clone()),
        _ => None,
    }
}

fn drop_slivers(mut mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.0.retain(|p| p.unsigned_area() > 0.0);
    mp
}

/// Counters for the expensive overlay steps, used to verify short-circuits.
#[derive(Debug, Default)]
pub struct OverlayStats {
    reductions: AtomicU64,
    coercions: AtomicU64,
}

impl OverlayStats {
    /// Number of precision reductions attempted.
    #[must_use]
    pub fn reductions(&self) -> u64 {
        self.reductions.load(Ordering::Relaxed)
    }

    /// Number of polygon coercions attempted.
    #[must_use]
    pub fn coercions(&self) -> u64 {
        self.coercions.load(Ordering::Relaxed)
    }
}

/// Overlay operations bound to one [`SpatialContext`].
///
/// Cheap to construct; build one per request and share it by reference
/// (or `Arc`) across the workers of that request.
#[derive(Debug, Default)]
pub struct Overlay {
    context: SpatialContext,
    stats: OverlayStats,
}

impl Overlay {
    /// Creates an overlay helper for `context`.
    #[must_use]
    pub fn new(context: SpatialContext) -> Self {
        Self {
            context,
            stats: OverlayStats::default(),
        }
    }

    /// The context this helper was built with.
    #[must_use]
    pub const fn context(&self) -> SpatialContext {
        self.context
    }

    /// Call counters for this helper.
    #[must_use]
    pub const fn stats(&self) -> &OverlayStats {
        &self.stats
    }

    /// Buffers `geometry` by `distance_units` (meters) with round caps.
    ///
    /// A distance of zero or less returns the input unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the input has non-finite coordinates or
    /// the engine aborts.
    pub fn try_buffer(
        &self,
        geometry: &Geometry<f64>,
        distance_units: f64,
    ) -> Result<Geometry<f64>, OverlayError> {
        if distance_units <= 0.0 || distance_units.is_nan() {
            return Ok(geometry.clone());
        }
        ensure_finite(geometry, "buffer")?;

        let distance = to_native_distance(distance_units, self.context.srid);
        let buffered = guarded("buffer", || geometry.buffer(distance))?;
        Ok(simplify_polygonal(Geometry::MultiPolygon(buffered)))
    }

    /// Like [`Self::try_buffer`], returning the input unchanged when the
    /// buffer cannot be computed.
    #[must_use]
    pub fn buffer(&self, geometry: &Geometry<f64>, distance_units: f64) -> Geometry<f64> {
        self.try_buffer(geometry, distance_units)
            .unwrap_or_else(|e| {
                log::warn!("Buffer failed, using unbuffered geometry: {e}");
                geometry.clone()
            })
    }

    /// Forces a geometry into a single polygon.
    ///
    /// Buffers the working geometry, collapses single-member results, and
    /// returns it if it is a polygon. Otherwise the working geometry becomes
    /// the result's envelope and the loop repeats. Returns `None` only for
    /// empty input.
    #[must_use]
    pub fn coerce_to_polygon(
        &self,
        geometry: &Geometry<f64>,
        buffer_units: f64,
    ) -> Option<Polygon<f64>> {
        self.stats.coercions.fetch_add(1, Ordering::Relaxed);

        let mut working = geometry.clone();
        for attempt in 0..MAX_COERCE_ATTEMPTS {
            let shaped = simplify_polygonal(self.buffer(&working, buffer_units));
            let envelope = match shaped {
                Geometry::Polygon(polygon) => return Some(polygon),
                other => other.bounding_rect(),
            };

            let Some(envelope) = envelope else {
                log::debug!("Cannot coerce empty {} to a polygon", kind_of(geometry));
                return None;
            };
            log::trace!(
                "Coercion round {attempt}: falling back to envelope of {}",
                kind_of(&working)
            );
            working = Geometry::Polygon(envelope.to_polygon());
        }

        log::warn!(
            "Gave up coercing {} to a polygon after {MAX_COERCE_ATTEMPTS} rounds",
            kind_of(geometry)
        );
        None
    }

    /// Snaps every coordinate to the context's precision grid.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::NonFinite`] if a coordinate is (or becomes)
    /// non-finite, and [`OverlayError::InvalidPrecision`] for a fixed grid
    /// with a non-positive scale.
    pub fn try_reduce_precision(
        &self,
        geometry: &Geometry<f64>,
    ) -> Result<Geometry<f64>, OverlayError> {
        self.stats.reductions.fetch_add(1, Ordering::Relaxed);

        let snap: Box<dyn Fn(f64) -> f64> = match self.context.precision {
            PrecisionModel::Floating => Box::new(|v| v),
            #[allow(clippy::cast_possible_truncation)]
            PrecisionModel::FloatingSingle => Box::new(|v| f64::from(v as f32)),
            PrecisionModel::Fixed { scale } => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(OverlayError::InvalidPrecision {
                        message: format!("fixed grid scale must be positive, got {scale}"),
                    });
                }
                Box::new(move |v| (v * scale).round() / scale)
            }
        };

        geometry.try_map_coords(|coord: Coord<f64>| {
            let snapped = Coord {
                x: snap(coord.x),
                y: snap(coord.y),
            };
            if snapped.x.is_finite() && snapped.y.is_finite() {
                Ok(snapped)
            } else {
                Err(OverlayError::NonFinite {
                    operation: "precision reduction",
                })
            }
        })
    }

    /// Like [`Self::try_reduce_precision`], returning the original geometry
    /// when reduction fails.
    #[must_use]
    pub fn reduce_precision(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        self.try_reduce_precision(geometry).unwrap_or_else(|e| {
            log::warn!("Precision reduction failed, using unreduced geometry: {e}");
            geometry.clone()
        })
    }

    /// Reduces precision and, for non-polygonal input, coerces to a polygon.
    fn prepare_polygonal(
        &self,
        geometry: &Geometry<f64>,
        buffer_units: f64,
    ) -> Result<MultiPolygon<f64>, OverlayError> {
        let reduced = self.reduce_precision(geometry);
        if is_polygonal(&reduced) {
            return as_multi_polygon(&reduced).ok_or(OverlayError::Coercion {
                kind: kind_of(geometry),
            });
        }

        self.coerce_to_polygon(&reduced, buffer_units)
            .map(|p| MultiPolygon::new(vec![p]))
            .ok_or(OverlayError::Coercion {
                kind: kind_of(geometry),
            })
    }

    /// Polygonal intersection of two geometries.
    ///
    /// Returns `Ok(None)` without touching either input when they do not
    /// intersect. Non-polygonal inputs are coerced to polygons using
    /// `buffer_units` (default 0), except that with no buffer a point or line
    /// meeting a polygon is clipped as-is and keeps its family.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if an input cannot be coerced or the engine
    /// aborts.
    pub fn try_intersection(
        &self,
        a: &Geometry<f64>,
        b: &Geometry<f64>,
        buffer_units: Option<f64>,
    ) -> Result<Option<Geometry<f64>>, OverlayError> {
        ensure_finite(a, "intersection")?;
        ensure_finite(b, "intersection")?;
        if !guarded("intersects", || a.intersects(b))? {
            return Ok(None);
        }

        let buffer_units = buffer_units.unwrap_or(0.0);
        if buffer_units <= 0.0 {
            if has_no_area(a) && is_polygonal(b) {
                return self.try_clip(a, b);
            }
            if has_no_area(b) && is_polygonal(a) {
                return self.try_clip(b, a);
            }
        }

        let left = self.prepare_polygonal(a, buffer_units)?;
        let right = self.prepare_polygonal(b, buffer_units)?;

        let result = drop_slivers(guarded("intersection", || left.intersection(&right))?);
        if result.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(simplify_polygonal(Geometry::MultiPolygon(result))))
    }

    /// The parts of a point or line `subject` that lie inside the polygonal
    /// `area`, boundary included. The subject keeps its own family.
    fn try_clip(
        &self,
        subject: &Geometry<f64>,
        area: &Geometry<f64>,
    ) -> Result<Option<Geometry<f64>>, OverlayError> {
        let subject = self.reduce_precision(subject);
        let area = as_multi_polygon(&self.reduce_precision(area)).ok_or(OverlayError::Coercion {
            kind: kind_of(area),
        })?;

        if let Some(points) = as_multi_point(&subject) {
            let mut inside: Vec<_> = points
                .into_iter()
                .filter(|p| area.intersects(p))
                .collect();
            return Ok(match inside.len() {
                0 => None,
                1 => Some(Geometry::Point(inside.remove(0))),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(inside))),
            });
        }

        let Some(lines) = as_multi_line_string(&subject) else {
            return Ok(None);
        };
        let mut clipped = guarded("clip", || area.clip(&lines, false))?;
        clipped.0.retain(|ls| ls.0.len() >= 2);
        Ok(match clipped.0.len() {
            0 => None,
            1 => Some(Geometry::LineString(clipped.0.remove(0))),
            _ => Some(Geometry::MultiLineString(clipped)),
        })
    }

    /// Like [`Self::try_intersection`], logging failures and returning
    /// `None`.
    #[must_use]
    pub fn intersection(
        &self,
        a: &Geometry<f64>,
        b: &Geometry<f64>,
        buffer_units: Option<f64>,
    ) -> Option<Geometry<f64>> {
        self.try_intersection(a, b, buffer_units)
            .unwrap_or_else(|e| {
                log::warn!("Intersection skipped: {e}");
                None
            })
    }

    /// The part of `region` not covered by any of `features`.
    ///
    /// The region is reduced once up front; each feature is reduced before
    /// its subtraction. Features that do not intersect the running remainder,
    /// or that cover no area, are skipped. The final remainder is clipped
    /// against the original region so it never extends past it. Returns
    /// `Ok(None)` when nothing remains.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the region or a feature has non-finite
    /// coordinates, or the engine aborts on any subtraction.
    pub fn try_difference<'a>(
        &self,
        features: impl IntoIterator<Item = &'a Geometry<f64>>,
        region: &Geometry<f64>,
    ) -> Result<Option<Geometry<f64>>, OverlayError> {
        ensure_finite(region, "difference")?;
        let Some(region_polygons) = as_multi_polygon(region) else {
            log::debug!("Region {} covers no area; no remainder", kind_of(region));
            return Ok(None);
        };
        let Some(mut remainder) = as_multi_polygon(&self.reduce_precision(region)) else {
            return Ok(None);
        };

        for feature in features {
            ensure_finite(feature, "difference")?;
            let reduced = self.reduce_precision(feature);
            let Some(cover) = as_multi_polygon(&reduced) else {
                continue;
            };
            if !guarded("intersects", || cover.intersects(&remainder))? {
                continue;
            }

            remainder = drop_slivers(guarded("difference", || remainder.difference(&cover))?);
            if remainder.0.is_empty() {
                return Ok(None);
            }
        }

        let clipped = drop_slivers(guarded("intersection", || {
            remainder.intersection(&region_polygons)
        })?);
        if clipped.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(simplify_polygonal(Geometry::MultiPolygon(clipped))))
    }

    /// Like [`Self::try_difference`], logging failures and returning `None`.
    #[must_use]
    pub fn difference<'a>(
        &self,
        features: impl IntoIterator<Item = &'a Geometry<f64>>,
        region: &Geometry<f64>,
    ) -> Option<Geometry<f64>> {
        self.try_difference(features, region).unwrap_or_else(|e| {
            log::warn!("Remainder not computable: {e}");
            None
        })
    }
}

fn ensure_finite(geometry: &Geometry<f64>, operation: &'static str) -> Result<(), OverlayError> {
    if geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
    {
        Ok(())
    } else {
        Err(OverlayError::NonFinite { operation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord, line_string, point, polygon};
    use mapscope_geometry_models::DEGREES_PER_METER;

    fn overlay() -> Overlay {
        Overlay::new(SpatialContext::new(Srid::WEB_MERCATOR))
    }

    fn square(min: f64, max: f64) -> Geometry<f64> {
        Rect::new(coord! { x: min, y: min }, coord! { x: max, y: max })
            .to_polygon()
            .into()
    }

    #[test]
    fn zero_buffer_is_identity_for_every_family() {
        let overlay = overlay();
        let inputs: Vec<Geometry<f64>> = vec![
            point!(x: 1.5, y: 2.5).into(),
            line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 1.0)].into(),
            square(0.0, 10.0),
        ];
        for input in inputs {
            assert_eq!(overlay.buffer(&input, 0.0), input);
            assert_eq!(overlay.buffer(&input, -4.0), input);
        }
    }

    #[test]
    fn positive_buffer_produces_polygon() {
        let overlay = overlay();
        let buffered = overlay.buffer(&point!(x: 0.0, y: 0.0).into(), 1.0);
        let Geometry::Polygon(polygon) = buffered else {
            panic!("expected polygon, got {buffered:?}");
        };
        // Unit circle.
        assert!((polygon.unsigned_area() - std::f64::consts::PI).abs() < 0.1);
    }

    #[test]
    fn coerces_line_via_buffer() {
        let overlay = overlay();
        let line: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)].into();
        let polygon = overlay.coerce_to_polygon(&line, 1.0).unwrap();
        assert!(polygon.unsigned_area() > 20.0);
    }

    #[test]
    fn coerces_disjoint_parts_to_envelope() {
        let overlay = overlay();
        let parts = geo::MultiPolygon::new(vec![
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon(),
            Rect::new(coord! { x: 5.0, y: 5.0 }, coord! { x: 6.0, y: 6.0 }).to_polygon(),
        ]);
        let polygon = overlay.coerce_to_polygon(&parts.into(), 0.0).unwrap();
        assert!((polygon.unsigned_area() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_cannot_be_coerced() {
        let overlay = overlay();
        let empty: Geometry<f64> = LineString::<f64>::new(vec![]).into();
        assert!(overlay.coerce_to_polygon(&empty, 0.0).is_none());
    }

    #[test]
    fn reduction_snaps_to_single_precision() {
        let overlay = overlay();
        let reduced = overlay.reduce_precision(&point!(x: 0.1, y: 1.0).into());
        let Geometry::Point(p) = reduced else {
            panic!("expected point");
        };
        assert!((p.x() - f64::from(0.1_f32)).abs() < f64::EPSILON);
        assert!((p.y() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reduction_failure_returns_original() {
        let overlay = overlay();
        let wild: Geometry<f64> = point!(x: f64::MAX, y: 0.0).into();
        assert!(overlay.try_reduce_precision(&wild).is_err());
        assert_eq!(overlay.reduce_precision(&wild), wild);
    }

    #[test]
    fn fixed_grid_rounds_to_scale() {
        let overlay = Overlay::new(
            SpatialContext::new(Srid::WEB_MERCATOR)
                .with_precision(PrecisionModel::Fixed { scale: 10.0 }),
        );
        let Geometry::Point(p) = overlay.reduce_precision(&point!(x: 1.234, y: 5.678).into())
        else {
            panic!("expected point");
        };
        assert!((p.x() - 1.2).abs() < 1e-12);
        assert!((p.y() - 5.7).abs() < 1e-12);
    }

    #[test]
    fn disjoint_intersection_short_circuits() {
        let overlay = overlay();
        let result = overlay.intersection(&square(0.0, 1.0), &square(5.0, 6.0), Some(3.0));
        assert!(result.is_none());
        assert_eq!(overlay.stats().reductions(), 0);
        assert_eq!(overlay.stats().coercions(), 0);
    }

    #[test]
    fn intersects_overlapping_squares() {
        let overlay = overlay();
        let result = overlay
            .intersection(&square(0.0, 2.0), &square(1.0, 3.0), None)
            .unwrap();
        assert!(matches!(result, Geometry::Polygon(_)));
        assert!((result.unsigned_area() - 1.0).abs() < 1e-6);
        assert_eq!(overlay.stats().reductions(), 2);
        assert_eq!(overlay.stats().coercions(), 0);
    }

    #[test]
    fn intersection_coerces_lines() {
        let overlay = overlay();
        let line: Geometry<f64> = line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)].into();
        let result = overlay
            .intersection(&line, &square(0.0, 10.0), Some(1.0))
            .unwrap();
        // Clipped corridor 10 long, 2 wide.
        assert!((result.unsigned_area() - 20.0).abs() < 0.5);
        assert_eq!(overlay.stats().coercions(), 1);
    }

    #[test]
    fn difference_stays_inside_region() {
        let overlay = overlay();
        let region = square(0.0, 10.0);
        let features = [square(-5.0, 5.0), square(8.0, 20.0)];
        let remainder = overlay.difference(features.iter(), &region).unwrap();

        let outside = as_multi_polygon(&remainder)
            .unwrap()
            .difference(&as_multi_polygon(&region).unwrap());
        assert!(outside.unsigned_area() < 1e-9);
        assert!((remainder.unsigned_area() - (100.0 - 25.0 - 4.0)).abs() < 1e-6);
    }

    #[test]
    fn difference_exhausted_by_full_cover() {
        let overlay = overlay();
        let region = square(0.0, 10.0);
        let features = [square(-1.0, 11.0)];
        assert!(overlay.difference(features.iter(), &region).is_none());
    }

    #[test]
    fn difference_ignores_non_areal_features() {
        let overlay = overlay();
        let region = square(0.0, 10.0);
        let features: [Geometry<f64>; 2] = [
            line_string![(x: 0.0, y: 5.0), (x: 10.0, y: 5.0)].into(),
            point!(x: 5.0, y: 5.0).into(),
        ];
        let remainder = overlay.difference(features.iter(), &region).unwrap();
        assert!((remainder.unsigned_area() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn measures_are_metric_in_web_mercator() {
        let region = square(0.0, 100.0);
        assert!((area_in_units(&region, Srid::WEB_MERCATOR) - 10_000.0).abs() < 0.01);
        assert!((length_in_units(&region, Srid::WEB_MERCATOR) - 400.0).abs() < 0.01);
    }

    #[test]
    fn measures_convert_degrees_in_geographic_srids() {
        let side = 100.0 * Srid::WGS84.units_per_meter();
        let region = square(0.0, side);
        assert!((area_in_units(&region, Srid::WGS84) - 10_000.0).abs() < 0.01);
        assert!((length_in_units(&region, Srid::NAD83) - 400.0).abs() < 0.01);
        let line: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: side, y: 0.0)].into();
        assert!((length_in_units(&line, Srid::WGS84) - 100.0).abs() < 0.01);
    }

    #[test]
    fn five_meter_road_buffer_in_web_mercator() {
        let overlay = overlay();
        let road: Geometry<f64> = line_string![(x: -100.0, y: 500.0), (x: 1100.0, y: 500.0)].into();
        let corridor = overlay
            .intersection(&road, &square(0.0, 1000.0), Some(5.0))
            .unwrap();
        // 1 km long, 10 m wide.
        assert!((area_in_units(&corridor, Srid::WEB_MERCATOR) - 10_000.0).abs() < 1.0);
    }

    #[test]
    fn buffer_scales_to_degrees_in_geographic_srids() {
        let overlay = Overlay::new(SpatialContext::new(Srid::WGS84));
        let buffered = overlay.buffer(&point!(x: 0.0, y: 0.0).into(), 10.0);
        let radius = 10.0 * DEGREES_PER_METER;
        let expected = std::f64::consts::PI * radius * radius;
        assert!((buffered.unsigned_area() - expected).abs() / expected < 0.05);
    }

    #[test]
    fn unbuffered_line_is_clipped_not_coerced() {
        let overlay = overlay();
        let line: Geometry<f64> = line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)].into();
        let clipped = overlay
            .intersection(&line, &square(0.0, 10.0), None)
            .unwrap();
        let Geometry::LineString(ls) = &clipped else {
            panic!("expected line, got {clipped:?}");
        };
        assert!((length_in_units(&clipped, Srid::WEB_MERCATOR) - 10.0).abs() < 1e-6);
        assert!(ls.coords().all(|c| (0.0..=10.0).contains(&c.x)));
        assert_eq!(overlay.stats().coercions(), 0);

        // Operand order does not matter.
        let reversed = overlay
            .intersection(&square(0.0, 10.0), &line, Some(0.0))
            .unwrap();
        assert!(matches!(reversed, Geometry::LineString(_)));
    }

    #[test]
    fn unbuffered_line_leaving_and_reentering_splits() {
        let overlay = overlay();
        let region: Geometry<f64> = geo::MultiPolygon::new(vec![
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 4.0, y: 4.0 }).to_polygon(),
            Rect::new(coord! { x: 6.0, y: 0.0 }, coord! { x: 10.0, y: 4.0 }).to_polygon(),
        ])
        .into();
        let line: Geometry<f64> = line_string![(x: -1.0, y: 2.0), (x: 11.0, y: 2.0)].into();
        let clipped = overlay.intersection(&line, &region, None).unwrap();
        let Geometry::MultiLineString(parts) = &clipped else {
            panic!("expected two parts, got {clipped:?}");
        };
        assert_eq!(parts.0.len(), 2);
        assert!((length_in_units(&clipped, Srid::WEB_MERCATOR) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn unbuffered_points_are_filtered_by_the_area() {
        let overlay = overlay();
        let points: Geometry<f64> = MultiPoint::new(vec![
            point!(x: 5.0, y: 5.0),
            point!(x: 10.0, y: 3.0),
            point!(x: 20.0, y: 20.0),
        ])
        .into();
        let kept = overlay
            .intersection(&points, &square(0.0, 10.0), None)
            .unwrap();
        let Geometry::MultiPoint(kept) = kept else {
            panic!("expected points, got {kept:?}");
        };
        assert_eq!(kept.0, vec![point!(x: 5.0, y: 5.0), point!(x: 10.0, y: 3.0)]);
    }

    #[test]
    fn difference_with_non_finite_region_degrades_to_none() {
        let overlay = overlay();
        let region: Geometry<f64> = geo::polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 0.0)
        ]
        .into();
        let features = [square(2.0, 4.0)];
        assert!(matches!(
            overlay.try_difference(features.iter(), &region),
            Err(OverlayError::NonFinite { .. })
        ));
        assert!(overlay.difference(features.iter(), &region).is_none());
    }

    #[test]
    fn difference_with_non_finite_feature_degrades_to_none() {
        let overlay = overlay();
        let features = [
            square(2.0, 4.0),
            geo::polygon![
                (x: 5.0, y: 5.0),
                (x: f64::INFINITY, y: 5.0),
                (x: 6.0, y: 6.0),
                (x: 5.0, y: 5.0)
            ]
            .into(),
        ];
        assert!(overlay.difference(features.iter(), &square(0.0, 10.0)).is_none());
    }

    #[test]
    fn guarded_reports_engine_panics() {
        let err = guarded("test", || -> u32 { panic!("boom") }).unwrap_err();
        assert_eq!(
            err,
            OverlayError::Engine {
                operation: "test",
                message: "boom".to_string(),
            }
        );
    }
}
