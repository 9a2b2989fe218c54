#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for mapscope.
//!
//! Reconciles `OpenStreetMap` features against a region read from a
//! `GeoJSON` file, lists the tag catalogue, and evaluates the relationship
//! between two geometries.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use geo::Geometry;
use mapscope_geometry::classify::kind_of;
use mapscope_geometry::feature::geometry_from_geojson_str;
use mapscope_geometry::overlay::{Overlay, area_in_units};
use mapscope_geometry::relate::{GisGeometry, matches, overlap};
use mapscope_geometry::{SpatialContext, Srid};
use mapscope_osm::registry::all_aspects;
use mapscope_osm::{FeatureReconciler, ReconcileRequest};
use mapscope_osm_models::TagSelection;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mapscope", about = "OpenStreetMap feature reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch selected features inside a region and report the uncovered
    /// remainder
    Reconcile {
        /// `GeoJSON` file holding the region geometry
        region: PathBuf,
        /// EPSG code of the region's coordinates
        #[arg(long, default_value = "4326")]
        srid: u32,
        /// Tag selection as `key=value[,value...]` (repeatable; `*` selects
        /// every value)
        #[arg(long = "select", value_parser = TagSelection::parse_entry)]
        selections: Vec<(String, Vec<String>)>,
        /// Buffer applied to points and lines before clipping, in meters
        #[arg(long, default_value = "5")]
        buffer: f64,
        /// Write the resulting `GeoJSON` here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the aspect tag catalogue
    Aspects,
    /// Evaluate whether candidate B relates to reference A
    Relate {
        /// `GeoJSON` file holding the reference geometry
        reference: PathBuf,
        /// `GeoJSON` file holding the candidate geometry
        candidate: PathBuf,
        /// EPSG code shared by both geometries
        #[arg(long, default_value = "4326")]
        srid: u32,
        /// Distance tolerance for point-to-point comparisons, in coordinate
        /// units
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

fn read_geometry(path: &Path) -> Result<Geometry<f64>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Ok(geometry_from_geojson_str(&text)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile {
            region,
            srid,
            selections,
            buffer,
            output,
        } => {
            let context = SpatialContext::new(Srid(srid));
            let region = read_geometry(&region)?;
            let selection: TagSelection = selections.into_iter().collect();

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Failed to listen for Ctrl-C: {e}");
                    return;
                }
                log::warn!("Ctrl-C received, cancelling");
                on_signal.cancel();
            });

            let reconciler = FeatureReconciler::overpass()?;
            let request = ReconcileRequest::new(context, Some(region))
                .with_selection(selection)
                .with_buffer(buffer);
            let collection = reconciler.reconcile(request, &cancel).await?;

            log::info!(
                "{} features, {} square meters total",
                collection.len(),
                collection.total_area()
            );

            let json = collection.to_geojson_string();
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    log::info!("Wrote {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Aspects => {
            for definition in all_aspects() {
                let values: Vec<&str> = definition.tags.iter().map(|t| t.value.as_str()).collect();
                println!(
                    "{:<10} {:<22} {}",
                    definition.aspect,
                    definition.name,
                    values.join(", ")
                );
            }
        }
        Commands::Relate {
            reference,
            candidate,
            srid,
            tolerance,
        } => {
            let context = SpatialContext::new(Srid(srid));
            let mut a = GisGeometry::new(&context, Some(read_geometry(&reference)?));
            if let Some(tolerance) = tolerance {
                a = a.with_tolerance(tolerance);
            }
            let b = GisGeometry::new(&context, Some(read_geometry(&candidate)?));

            println!("matches: {}", matches(&a, &b)?);
            let overlay = Overlay::new(context);
            match overlap(&overlay, &a, &b)?.and_then(GisGeometry::into_geometry) {
                Some(shared) => println!(
                    "overlap: {} ({} square meters)",
                    kind_of(&shared),
                    area_in_units(&shared, context.srid)
                ),
                None => println!("overlap: none"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_selections() {
        let cli = Cli::try_parse_from([
            "mapscope",
            "reconcile",
            "region.geojson",
            "--srid",
            "3857",
            "--select",
            "highway=primary,secondary",
            "--select",
            "building=*",
        ])
        .unwrap();

        let Commands::Reconcile {
            srid, selections, ..
        } = cli.command
        else {
            panic!("expected reconcile");
        };
        assert_eq!(srid, 3857);
        let selection: TagSelection = selections.into_iter().collect();
        assert!(selection.contains("highway", "secondary"));
        assert!(selection.contains("building", "yes"));
    }

    #[test]
    fn rejects_malformed_selection() {
        assert!(
            Cli::try_parse_from(["mapscope", "reconcile", "r.geojson", "--select", "highway"])
                .is_err()
        );
    }
}
