//! Core extraction stages

pub mod schema;
pub mod beams;
pub mod aligned;
pub mod quality;
pub mod geometry;
pub mod assemble;
pub mod pipeline;

// Re-export main types
pub use schema::{ProductId, ProductSchema, FieldSpec};
pub use aligned::AlignedRowSet;
pub use quality::{QualityConfig, QualityFilter, RowVerdict};
pub use geometry::{Geometry, GeometryBuilder};
pub use assemble::{Feature, FeatureCollection, RecordAssembler};
pub use pipeline::{ExtractionConfig, ExtractionOutcome, ExtractionReport, Extractor, BeamTally, SkippedBeam};
