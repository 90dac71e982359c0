//! spacelidar: beam-aware extraction of spaceborne lidar granules to GeoPackage
//!
//! Reads GEDI L2B (`GEDI02_B`) and ICESat-2 land/vegetation (`ATL08`) HDF5
//! granules beam by beam, aligns the per-shot datasets, drops fill values
//! and low-quality rows, and writes points or footprint polygons with their
//! attributes to a GeoPackage in geographic WGS84.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Beam, BeamSelection, BeamStrength, GeometryMode, OrbitOrientation,
    AttributeValue, LidarError, LidarResult,
};

pub use io::{HierarchicalSource, MemorySource, Hdf5Source, GpkgSink, LayerLayout};
pub use crate::core::{ExtractionConfig, ExtractionReport, Extractor, FeatureCollection};
pub use crate::core::pipeline::run;
pub use crate::core::schema::{resolve, supported_products};
