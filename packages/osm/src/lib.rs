#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `OpenStreetMap` feature reconciliation.
//!
//! Queries the Overpass API for the tags a caller selected inside a
//! region, turns the returned elements into features clipped to that
//! region, and reports the part of the region no feature covers. The tag
//! catalogue and the Overpass endpoint are TOML files embedded at compile
//! time, following the same registry pattern used for other sources.

pub mod classify;
pub mod client;
pub mod query;
pub mod reconcile;
pub mod registry;

pub use client::{ElementSource, OverpassClient};
pub use reconcile::{FeatureHook, FeatureReconciler, ReconcileRequest, SelectionResolver};

use thiserror::Error;

/// Errors that can occur while reconciling features.
#[derive(Debug, Error)]
pub enum OsmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The Overpass API answered with a non-success status.
    #[error("Overpass request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The request was rejected before any network call.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what went wrong.
        message: String,
    },

    /// The caller cancelled the request while it was fetching.
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// Projection or other geometry failure.
    #[error("Geometry error: {0}")]
    Geometry(#[from] mapscope_geometry::GeometryError),

    /// A worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
