#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry classification, robust overlay, and relationship evaluation.
//!
//! The building blocks every spatial comparison in mapscope goes through:
//!
//! - [`classify`] maps a geometry onto its [`GeometryFamily`] and decides
//!   whether it is compound, and computes the boundary a compound geometry
//!   normalizes to.
//! - [`overlay`] wraps buffering, precision reduction, intersection and
//!   difference so that a single degenerate geometry degrades to a smaller
//!   result instead of aborting a batch.
//! - [`relate`] is the asymmetric "does A relate to B, and what overlaps"
//!   operator used when two geometries of unknown type meet.
//! - [`feature`] holds the `Feature`/`FeatureCollection` types and their
//!   `GeoJSON` encoding.
//! - [`projection`] moves geometries between the supported SRIDs.
//!
//! No function here reads shared mutable state: the SRID and precision model
//! always arrive through a [`SpatialContext`].

pub mod classify;
pub mod feature;
pub mod overlay;
pub mod projection;
pub mod relate;

pub use mapscope_geometry_models::{
    DEGREES_PER_METER, GeometryFamily, GeometryKind, PrecisionModel, SpatialContext, Srid,
    is_valid_geometry_type_name,
};

use thiserror::Error;

/// Errors surfaced to callers: validation and conversion failures.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A point-to-point comparison was requested without a tolerance.
    #[error("Point-to-point comparison requires a distance tolerance")]
    MissingTolerance,

    /// Two geometries in different spatial references were compared.
    #[error("SRID mismatch: {left} vs {right}")]
    SridMismatch {
        /// SRID of the left operand.
        left: Srid,
        /// SRID of the right operand.
        right: Srid,
    },

    /// No projection definition exists for this SRID.
    #[error("Unsupported SRID: {0}")]
    UnsupportedSrid(Srid),

    /// Coordinate transformation failed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The `GeoJSON` document did not have the expected shape.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Failures of the overlay engine.
///
/// These never reach end users: every public overlay helper logs them and
/// falls back to a best-effort value. The `try_*` variants return them so
/// call sites can choose to degrade explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    /// An input contained a NaN or infinite ordinate.
    #[error("Non-finite coordinate in {operation} input")]
    NonFinite {
        /// The operation that rejected the input.
        operation: &'static str,
    },

    /// The context's precision model cannot be applied.
    #[error("Invalid precision model: {message}")]
    InvalidPrecision {
        /// Description of what went wrong.
        message: String,
    },

    /// The underlying overlay engine aborted.
    #[error("Overlay engine failed during {operation}: {message}")]
    Engine {
        /// The operation that failed.
        operation: &'static str,
        /// Message recovered from the engine.
        message: String,
    },

    /// A geometry could not be turned into a polygon.
    #[error("Could not coerce {kind} geometry to a polygon")]
    Coercion {
        /// Kind of the geometry that failed coercion.
        kind: GeometryKind,
    },
}
