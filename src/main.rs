use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use point_gridder::{process_file, Aggregation, GridResampler, InputFormat, ResampleOptions};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let matches = Command::new("Point Gridder")
        .version("1.0")
        .author("Jesper Fjellin")
        .about("Resamples scattered lat/lon point samples onto a regular UTM grid")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .num_args(1)
                .required(true)
                .help("GeoJSON FeatureCollection of point samples"),
        )
        .arg(
            Arg::new("value-property")
                .long("value-property")
                .num_args(1)
                .default_value("value")
                .help("Feature property holding the sample value"),
        )
        .arg(
            Arg::new("resolution")
                .short('r')
                .long("resolution")
                .num_args(1)
                .value_parser(clap::value_parser!(f64))
                .help("Cell size in meters (optional, estimated from point density if not provided)"),
        )
        .arg(
            Arg::new("method")
                .short('m')
                .long("method")
                .num_args(1)
                .value_parser(["mean", "nearest", "idw"])
                .default_value("mean")
                .help("How cell values are derived from the samples"),
        )
        .arg(
            Arg::new("power")
                .long("power")
                .num_args(1)
                .value_parser(clap::value_parser!(f64))
                .default_value("2")
                .help("Inverse distance power (idw only)"),
        )
        .arg(
            Arg::new("neighbours")
                .long("neighbours")
                .num_args(1)
                .value_parser(clap::value_parser!(usize))
                .default_value("8")
                .help("Number of nearest samples weighted per cell (idw only)"),
        )
        .arg(
            Arg::new("max-distance")
                .long("max-distance")
                .num_args(1)
                .value_parser(clap::value_parser!(f64))
                .help("Ignore samples farther than this many meters (nearest and idw)"),
        )
        .arg(
            Arg::new("nodata")
                .long("nodata")
                .num_args(1)
                .value_parser(clap::value_parser!(f64))
                .allow_negative_numbers(true)
                .default_value("-9999")
                .help("Value written to cells without data"),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .action(ArgAction::SetTrue)
                .help("Bin on a single thread"),
        )
        .arg(
            Arg::new("cells")
                .long("cells")
                .action(ArgAction::SetTrue)
                .help("Include cell values and counts (north-up rows) in the output"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Log filter, overrides RUST_LOG (e.g. debug, point_gridder=trace)"),
        )
        .get_matches();

    let filter = match matches.get_one::<String>("log-level") {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let input = PathBuf::from(
        matches
            .get_one::<String>("input")
            .context("missing --input")?,
    );
    if !input.exists() {
        bail!("File not found: {}", input.display());
    }
    let value_property = matches
        .get_one::<String>("value-property")
        .map(String::as_str)
        .unwrap_or("value");

    let max_distance = matches.get_one::<f64>("max-distance").copied();
    let aggregation = match matches.get_one::<String>("method").map(String::as_str) {
        Some("nearest") => Aggregation::Nearest { max_distance },
        Some("idw") => Aggregation::InverseDistance {
            power: matches.get_one::<f64>("power").copied().unwrap_or(2.0),
            neighbours: matches.get_one::<usize>("neighbours").copied().unwrap_or(8),
            max_distance,
        },
        _ => Aggregation::Mean,
    };
    let options = ResampleOptions {
        aggregation,
        nodata: matches.get_one::<f64>("nodata").copied().unwrap_or(-9999.0),
        parallel: !matches.get_flag("sequential"),
        ..Default::default()
    };

    let points = process_file(&input, InputFormat::GeoJSON, value_property)
        .with_context(|| format!("reading points from {}", input.display()))?;
    let resolution = matches
        .get_one::<f64>("resolution")
        .copied()
        .unwrap_or_else(|| points.estimated_resolution());

    let grid = GridResampler::new(&points, options)
        .with_progress(|binned, total| {
            debug!("Progress: {:.1}%", binned as f64 / total as f64 * 100.0);
        })
        .resample(resolution)
        .context("resampling points")?;
    info!(
        "Built {}x{} grid in zone {} at {:.2} m, {} cells occupied",
        grid.rows(),
        grid.cols(),
        grid.zone(),
        grid.resolution(),
        grid.occupied_cells()
    );

    let mut summary = json!({
        "samples": points.len(),
        "zone": grid.zone(),
        "epsg": grid.zone().epsg(),
        "estimated_resolution": points.estimated_resolution(),
        "resolution": grid.resolution(),
        "rows": grid.rows(),
        "cols": grid.cols(),
        "origin": [grid.origin().x, grid.origin().y],
        "geo_transform": grid.geo_transform(),
        "nodata": grid.nodata(),
        "occupied_cells": grid.occupied_cells(),
    });
    if matches.get_flag("cells") {
        let counts: Vec<&[u32]> = grid.counts().chunks(grid.cols()).rev().collect();
        summary["values"] = json!(grid.north_up_rows().collect::<Vec<_>>());
        summary["counts"] = json!(counts);
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
