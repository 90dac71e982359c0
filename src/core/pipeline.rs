//! Granule extraction: beams → aligned rows → filter → geometry → features.
//!
//! Beam datasets are read one beam at a time from the open granule. Filtering,
//! geometry and assembly of each beam's rows are independent of every other
//! beam and run on the rayon pool when the `parallel` feature is enabled.
//! Completed batches are appended in beam order, so parallel and sequential
//! runs produce identical collections.

use crate::core::aligned::{self, AlignedRowSet};
use crate::core::assemble::{Feature, FeatureCollection, RecordAssembler};
use crate::core::beams;
use crate::core::geometry::GeometryBuilder;
use crate::core::quality::{QualityConfig, QualityFilter, RowVerdict};
use crate::core::schema::{self, ProductSchema};
use crate::io::gpkg_writer::{self, LayerLayout};
use crate::io::hdf5_reader::Hdf5Source;
use crate::io::metadata::GranuleMetadata;
use crate::io::source::HierarchicalSource;
use crate::types::{Beam, BeamSelection, GeometryMode, LidarError, LidarResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Extraction settings shared by both command-line tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Point or footprint polygon output
    pub geometry_mode: GeometryMode,
    /// ICESat-2 strong/weak beam restriction
    pub beam_selection: BeamSelection,
    /// Apply the product quality predicate (fill exclusion always applies)
    pub apply_quality_filter: bool,
    /// Quality thresholds
    pub quality: QualityConfig,
    /// GeoPackage layer layout
    pub layer_layout: LayerLayout,
    /// Process beams on the rayon pool (needs the `parallel` feature)
    pub parallel: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            geometry_mode: GeometryMode::Point,
            beam_selection: BeamSelection::All,
            apply_quality_filter: true,
            quality: QualityConfig::default(),
            layer_layout: LayerLayout::Single,
            parallel: true,
        }
    }
}

impl ExtractionConfig {
    /// Parse a TOML document; keys it omits keep their defaults
    pub fn from_toml_str(text: &str) -> LidarResult<Self> {
        toml::from_str(text).map_err(|e| LidarError::Config(format!("Invalid configuration: {}", e)))
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> LidarResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Reject settings the product cannot honour, before any I/O
    pub fn validate(&self, schema: &ProductSchema) -> LidarResult<()> {
        if self.beam_selection != BeamSelection::All && !schema.classifies_beams {
            return Err(LidarError::Config(format!(
                "{} beams have no strong/weak classification; {:?} selection is not available",
                schema.id, self.beam_selection
            )));
        }
        if self.geometry_mode == GeometryMode::Polygon && !schema.supports_polygons() {
            return Err(LidarError::Config(format!(
                "{} does not support polygon output",
                schema.id
            )));
        }
        if !self.quality.min_sensitivity.is_finite() {
            return Err(LidarError::Config("min_sensitivity must be finite".to_string()));
        }
        Ok(())
    }
}

/// Row accounting for one beam (or a whole run)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeamTally {
    pub beam: String,
    pub rows_read: usize,
    pub dropped_fill: usize,
    pub dropped_quality: usize,
    pub dropped_geometry: usize,
    pub kept: usize,
}

impl BeamTally {
    fn new(beam: &str) -> Self {
        Self {
            beam: beam.to_string(),
            ..Default::default()
        }
    }

    fn add(&mut self, other: &BeamTally) {
        self.rows_read += other.rows_read;
        self.dropped_fill += other.dropped_fill;
        self.dropped_quality += other.dropped_quality;
        self.dropped_geometry += other.dropped_geometry;
        self.kept += other.kept;
    }
}

/// A beam that was present but could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBeam {
    pub beam: String,
    pub reason: String,
}

/// Summary of one granule's extraction
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub product: String,
    /// Beams whose rows went through the filter, in beam order
    pub beams: Vec<BeamTally>,
    /// Beams dropped by a recoverable error
    pub skipped: Vec<SkippedBeam>,
    /// Beams left out by the strong/weak selection
    pub excluded: Vec<String>,
    /// Features handed to the sink (zero until flushed)
    pub features_written: usize,
}

impl ExtractionReport {
    pub fn totals(&self) -> BeamTally {
        let mut total = BeamTally::new("total");
        for tally in &self.beams {
            total.add(tally);
        }
        total
    }

    pub fn log_summary(&self) {
        let total = self.totals();
        log::info!(
            "{}: {} beams processed, {} skipped, {} excluded by selection",
            self.product,
            self.beams.len(),
            self.skipped.len(),
            self.excluded.len()
        );
        log::info!(
            "Rows read {}, kept {}, dropped: {} fill, {} quality, {} geometry",
            total.rows_read,
            total.kept,
            total.dropped_fill,
            total.dropped_quality,
            total.dropped_geometry
        );
        for skipped in &self.skipped {
            log::warn!("Skipped beam {}: {}", skipped.beam, skipped.reason);
        }
    }
}

/// Result of extracting one granule
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub collection: FeatureCollection,
    pub report: ExtractionReport,
    pub metadata: GranuleMetadata,
}

/// Drives the extraction stages for one product
pub struct Extractor<'a> {
    schema: &'a ProductSchema,
    config: &'a ExtractionConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(schema: &'a ProductSchema, config: &'a ExtractionConfig) -> LidarResult<Self> {
        config.validate(schema)?;
        Ok(Self { schema, config })
    }

    pub fn schema(&self) -> &ProductSchema {
        self.schema
    }

    /// Extract every selected beam of `source` into one feature collection.
    ///
    /// Beam-level failures are logged and recorded in the report; only
    /// granule-level failures (wrong product, unreadable metadata) are errors.
    pub fn extract(&self, source: &dyn HierarchicalSource) -> LidarResult<ExtractionOutcome> {
        log::info!("Extracting {} from {}", self.schema.id, source.describe());

        let metadata = GranuleMetadata::read(source, self.schema)?;
        let mut report = ExtractionReport {
            product: self.schema.id.to_string(),
            ..Default::default()
        };

        let mut row_sets = Vec::new();
        for mut beam in beams::enumerate(source, self.schema) {
            if let Some(orientation) = metadata.orientation {
                beam.strength = beams::classify(&beam.name, orientation);
            }
            if !beams::is_selected(&beam, self.config.beam_selection) {
                match beam.strength {
                    Some(strength) => log::debug!("Excluding {} beam {}", strength, beam.name),
                    None => log::warn!(
                        "Excluding beam {}: strength unknown (orientation {})",
                        beam.name,
                        metadata
                            .orientation
                            .map_or_else(|| "unavailable".to_string(), |o| o.to_string())
                    ),
                }
                report.excluded.push(beam.name);
                continue;
            }

            match self.read_beam(source, &beam) {
                Ok(rows) => row_sets.push(rows),
                Err(e) if e.is_beam_recoverable() => {
                    log::warn!("Skipping beam {}: {}", beam.name, e);
                    report.skipped.push(SkippedBeam {
                        beam: beam.name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let batches = self.process_row_sets(&row_sets, &metadata.scalars)?;

        let mut collection = FeatureCollection::new(self.schema);
        for (features, tally) in batches {
            log::info!(
                "Beam {}: kept {} of {} rows ({} fill, {} quality, {} geometry)",
                tally.beam,
                tally.kept,
                tally.rows_read,
                tally.dropped_fill,
                tally.dropped_quality,
                tally.dropped_geometry
            );
            collection.extend(features);
            report.beams.push(tally);
        }

        Ok(ExtractionOutcome {
            collection,
            report,
            metadata,
        })
    }

    fn read_beam(&self, source: &dyn HierarchicalSource, beam: &Beam) -> LidarResult<AlignedRowSet> {
        aligned::read(source, beam, self.schema)
    }

    #[cfg(feature = "parallel")]
    fn process_row_sets(
        &self,
        row_sets: &[AlignedRowSet],
        granule_values: &HashMap<String, f64>,
    ) -> LidarResult<Vec<(Vec<Feature>, BeamTally)>> {
        use rayon::prelude::*;

        if !self.config.parallel {
            return row_sets
                .iter()
                .map(|rows| self.process_beam(rows, granule_values))
                .collect();
        }

        log::debug!("Processing {} beams in parallel", row_sets.len());
        row_sets
            .par_iter()
            .map(|rows| self.process_beam(rows, granule_values))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn process_row_sets(
        &self,
        row_sets: &[AlignedRowSet],
        granule_values: &HashMap<String, f64>,
    ) -> LidarResult<Vec<(Vec<Feature>, BeamTally)>> {
        row_sets
            .iter()
            .map(|rows| self.process_beam(rows, granule_values))
            .collect()
    }

    /// Filter, geometrize and assemble the rows of one beam
    fn process_beam(
        &self,
        rows: &AlignedRowSet,
        granule_values: &HashMap<String, f64>,
    ) -> LidarResult<(Vec<Feature>, BeamTally)> {
        let beam_name = rows.beam().name.as_str();
        let filter = QualityFilter::new(self.schema, &self.config.quality, self.config.apply_quality_filter);
        let geometry = GeometryBuilder::new(self.schema, self.config.geometry_mode, rows)?;
        let assembler = RecordAssembler::new(self.schema, granule_values);

        let mut tally = BeamTally::new(beam_name);
        tally.rows_read = rows.row_count();
        let mut features = Vec::new();

        for row in 0..rows.row_count() {
            match filter.evaluate(row, rows) {
                RowVerdict::Fill(_) => tally.dropped_fill += 1,
                RowVerdict::Quality => tally.dropped_quality += 1,
                RowVerdict::Keep => match geometry.build(row, rows) {
                    Ok(shape) => {
                        features.push(assembler.assemble(beam_name, rows, row, shape));
                        tally.kept += 1;
                    }
                    Err(LidarError::FillValueRow { .. }) => tally.dropped_geometry += 1,
                    Err(e) => return Err(e),
                },
            }
        }

        Ok((features, tally))
    }
}

/// Extract `input` as `product` and write the features to a GeoPackage at `output`
pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    product: &str,
    config: &ExtractionConfig,
) -> LidarResult<ExtractionReport> {
    let schema = schema::resolve(product)?;
    let extractor = Extractor::new(schema, config)?;

    let source = Hdf5Source::open(input)?;
    let outcome = extractor.extract(&source)?;
    // Release the granule before writing
    drop(source);

    let ExtractionOutcome {
        collection,
        mut report,
        metadata,
    } = outcome;

    report.features_written = gpkg_writer::flush(
        &collection,
        output,
        config.layer_layout,
        config.geometry_mode,
        &metadata.metadata_items(schema),
    )?;
    report.log_summary();

    Ok(report)
}
