//! I/O modules for reading lidar granules and writing GeoPackage output

pub mod source;
pub mod hdf5_reader;
pub mod metadata;
pub mod gpkg_writer;

pub use source::{HierarchicalSource, MemorySource};
pub use hdf5_reader::Hdf5Source;
pub use metadata::GranuleMetadata;
pub use gpkg_writer::{FeatureSink, GpkgSink, LayerLayout};
