//! # spacelidar-gedi
//!
//! Converts a GEDI L2B (`GEDI02_B`) granule to a GeoPackage of shots.
//!
//! ```bash
//! # Quality-filtered shot points
//! spacelidar-gedi -i GEDI02_B_2021.h5 -o shots.gpkg
//!
//! # 25 m footprint polygons, one layer per beam
//! spacelidar-gedi -i GEDI02_B_2021.h5 -o footprints.gpkg --polys --layer_per_beam
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use spacelidar::{ExtractionConfig, GeometryMode, LayerLayout};

/// Extract GEDI02_B shots to a GeoPackage
#[derive(Parser)]
#[command(name = "spacelidar-gedi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input GEDI02_B HDF5 granule
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,

    /// Output GeoPackage (replaced if it exists)
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Write 25 m footprint polygons instead of points
    #[arg(long)]
    polys: bool,

    /// Keep every shot with valid coordinates (skip the quality filter)
    #[arg(long)]
    all: bool,

    /// Write one layer per beam
    #[arg(long = "layer_per_beam")]
    layer_per_beam: bool,

    /// TOML file with extraction settings (flags take precedence)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("SPACELIDAR_LOG", log_level)).init();

    let mut config = match &cli.config {
        Some(path) => ExtractionConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ExtractionConfig::default(),
    };
    if cli.polys {
        config.geometry_mode = GeometryMode::Polygon;
    }
    if cli.all {
        config.apply_quality_filter = false;
    }
    if cli.layer_per_beam {
        config.layer_layout = LayerLayout::PerBeam;
    }

    let report = spacelidar::run(&cli.input, &cli.output, "GEDI02_B", &config)
        .with_context(|| format!("Failed to extract {}", cli.input.display()))?;

    println!(
        "Wrote {} shots from {} beams to {}",
        report.features_written,
        report.beams.len(),
        cli.output.display()
    );
    Ok(())
}
