//! # spacelidar-icesat2
//!
//! Converts an ICESat-2 `ATL08` granule to a GeoPackage of land segments.
//!
//! ```bash
//! # Strong-beam segment points
//! spacelidar-icesat2 -i ATL08_20200101.h5 -o segments.gpkg --strong_only
//!
//! # 100 m x 13 m segment polygons
//! spacelidar-icesat2 -i ATL08_20200101.h5 -o segments.gpkg --polys
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use spacelidar::{BeamSelection, ExtractionConfig, GeometryMode, LayerLayout};

/// Extract ATL08 land segments to a GeoPackage
#[derive(Parser)]
#[command(name = "spacelidar-icesat2")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input ATL08 HDF5 granule
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,

    /// Output GeoPackage (replaced if it exists)
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Write along-track segment polygons instead of points
    #[arg(long)]
    polys: bool,

    /// Only extract strong beams
    #[arg(long = "strong_only", conflicts_with = "weak_only")]
    strong_only: bool,

    /// Only extract weak beams
    #[arg(long = "weak_only")]
    weak_only: bool,

    /// Keep every segment with valid coordinates (skip the quality filter)
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
    if cli.strong_only {
        config.beam_selection = BeamSelection::StrongOnly;
    } else if cli.weak_only {
        config.beam_selection = BeamSelection::WeakOnly;
    }
    if cli.all {
        config.apply_quality_filter = false;
    }
    if cli.layer_per_beam {
        config.layer_layout = LayerLayout::PerBeam;
    }

    let report = spacelidar::run(&cli.input, &cli.output, "ATL08", &config)
        .with_context(|| format!("Failed to extract {}", cli.input.display()))?;

    println!(
        "Wrote {} segments from {} beams to {}",
        report.features_written,
        report.beams.len(),
        cli.output.display()
    );
    Ok(())
}
