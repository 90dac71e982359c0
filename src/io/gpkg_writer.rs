use crate::core::assemble::{Feature, FeatureCollection, BEAM_NAME_FIELD};
use crate::types::{AttributeKind, AttributeValue, GeometryMode, LidarError, LidarResult, OUTPUT_EPSG};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, Geometry as OgrGeometry, LayerAccess, OGRFieldType, OGRwkbGeometryType};
use gdal::{Dataset, DriverManager, LayerOptions, Metadata};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How features are split into GeoPackage layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerLayout {
    /// One layer named after the product, beams told apart by `beam_name`
    Single,
    /// One layer per beam
    PerBeam,
}

impl Default for LayerLayout {
    fn default() -> Self {
        LayerLayout::Single
    }
}

/// Destination for a granule's features
pub trait FeatureSink {
    /// Persist all features in one write phase; returns the number written
    fn write(&mut self, collection: &FeatureCollection, metadata: &[(String, String)]) -> LidarResult<usize>;
}

/// GeoPackage output through the GDAL `GPKG` driver
pub struct GpkgSink {
    path: PathBuf,
    layout: LayerLayout,
    mode: GeometryMode,
}

impl GpkgSink {
    pub fn new<P: AsRef<Path>>(path: P, layout: LayerLayout, mode: GeometryMode) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            layout,
            mode,
        }
    }

    fn sink_error(&self, reason: impl std::fmt::Display) -> LidarError {
        LidarError::SinkWrite {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn create_dataset(&self) -> LidarResult<Dataset> {
        if self.path.exists() {
            log::warn!("Replacing existing output {}", self.path.display());
            std::fs::remove_file(&self.path).map_err(|e| self.sink_error(e))?;
        }
        let driver = DriverManager::get_driver_by_name("GPKG").map_err(|e| self.sink_error(e))?;
        driver
            .create_vector_only(&self.path)
            .map_err(|e| self.sink_error(e))
    }

    fn write_layers(
        &self,
        dataset: &mut Dataset,
        collection: &FeatureCollection,
        metadata: &[(String, String)],
    ) -> LidarResult<usize> {
        for (key, value) in metadata {
            dataset.set_metadata_item(key, value, "")?;
        }

        let mut srs = SpatialRef::from_epsg(OUTPUT_EPSG)?;
        srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

        let geometry_type = match self.mode {
            GeometryMode::Point => OGRwkbGeometryType::wkbPoint,
            GeometryMode::Polygon => OGRwkbGeometryType::wkbPolygon,
        };

        let mut field_defs: Vec<(&str, OGRFieldType::Type)> = vec![(BEAM_NAME_FIELD, OGRFieldType::OFTString)];
        field_defs.extend(collection.layout().iter().map(|field| {
            let ty = match field.kind {
                AttributeKind::Real => OGRFieldType::OFTReal,
                AttributeKind::Integer => OGRFieldType::OFTInteger64,
                AttributeKind::Text => OGRFieldType::OFTString,
            };
            (field.name.as_str(), ty)
        }));

        let groups = self.layer_groups(collection);
        let mut written = 0;

        let mut txn = dataset.start_transaction()?;
        for (layer_name, features) in groups {
            log::debug!("Writing {} features to layer {}", features.len(), layer_name);
            let mut layer = txn.create_layer(LayerOptions {
                name: &layer_name,
                srs: Some(&srs),
                ty: geometry_type,
                options: None,
            })?;
            layer.create_defn_fields(&field_defs)?;

            for feature in features {
                let geometry = OgrGeometry::from_wkt(&feature.geometry.to_wkt())?;
                let (names, values) = feature_fields(&field_defs, feature);
                layer.create_feature_fields(geometry, &names, &values)?;
                written += 1;
            }
        }
        txn.commit()?;

        Ok(written)
    }

    fn layer_groups<'c>(&self, collection: &'c FeatureCollection) -> Vec<(String, Vec<&'c Feature>)> {
        let layer_name = collection.product().to_string();
        match self.layout {
            LayerLayout::PerBeam if !collection.is_empty() => collection
                .beam_names()
                .into_iter()
                .map(|beam| {
                    let features = collection
                        .features()
                        .iter()
                        .filter(|f| f.beam_name == beam)
                        .collect();
                    (beam, features)
                })
                .collect(),
            _ => vec![(layer_name, collection.features().iter().collect())],
        }
    }
}

/// Field names and values of one feature; `Null` attributes are left unset
fn feature_fields<'d>(
    field_defs: &[(&'d str, OGRFieldType::Type)],
    feature: &Feature,
) -> (Vec<&'d str>, Vec<FieldValue>) {
    let mut names = vec![field_defs[0].0];
    let mut values = vec![FieldValue::StringValue(feature.beam_name.clone())];

    for ((name, _), attribute) in field_defs[1..].iter().zip(&feature.attributes) {
        let value = match attribute {
            AttributeValue::Real(v) => FieldValue::RealValue(*v),
            AttributeValue::Integer(v) => FieldValue::Integer64Value(*v),
            AttributeValue::Text(v) => FieldValue::StringValue(v.clone()),
            AttributeValue::Null => continue,
        };
        names.push(*name);
        values.push(value);
    }
    (names, values)
}

impl FeatureSink for GpkgSink {
    fn write(&mut self, collection: &FeatureCollection, metadata: &[(String, String)]) -> LidarResult<usize> {
        log::info!(
            "Writing {} features to {} ({:?} layout)",
            collection.len(),
            self.path.display(),
            self.layout
        );

        let mut dataset = self.create_dataset()?;
        let result = self.write_layers(&mut dataset, collection, metadata);
        // Close before any cleanup so GDAL releases the file
        drop(dataset);

        match result {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&self.path) {
                    log::warn!("Could not remove partial output {}: {}", self.path.display(), remove_err);
                }
                Err(match e {
                    LidarError::SinkWrite { .. } => e,
                    other => self.sink_error(other),
                })
            }
        }
    }
}

/// Write `collection` to a GeoPackage at `output_path`
pub fn flush<P: AsRef<Path>>(
    collection: &FeatureCollection,
    output_path: P,
    layout: LayerLayout,
    mode: GeometryMode,
    metadata: &[(String, String)],
) -> LidarResult<usize> {
    GpkgSink::new(output_path, layout, mode).write(collection, metadata)
}
