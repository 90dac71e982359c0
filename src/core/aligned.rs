use crate::core::schema::{FieldSource, FieldSpec, ProductSchema};
use crate::io::source::HierarchicalSource;
use crate::types::{Beam, Column, LidarError, LidarResult, ValueType};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Per-dataset fill sentinel attribute
pub const FILL_VALUE_ATTR: &str = "_FillValue";

/// Column-oriented table of one beam: every column has `row_count` entries
#[derive(Debug, Clone)]
pub struct AlignedRowSet {
    beam: Beam,
    names: Vec<&'static str>,
    columns: Vec<Column>,
    index: HashMap<&'static str, usize>,
    /// `_FillValue` declared by the dataset behind each column
    fill_values: HashMap<&'static str, f64>,
}

impl AlignedRowSet {
    /// Build a row set, rejecting it unless every column has the row count
    /// of `reference` (the column that defines the beam's rows).
    pub fn from_columns(
        beam: &Beam,
        reference: &str,
        named_columns: Vec<(&'static str, Column)>,
    ) -> LidarResult<Self> {
        let row_count = named_columns
            .iter()
            .find(|(name, _)| *name == reference)
            .map(|(_, column)| column.len())
            .ok_or_else(|| LidarError::DatasetMissing {
                beam: beam.name.clone(),
                path: reference.to_string(),
            })?;

        for (name, column) in &named_columns {
            if column.len() != row_count {
                return Err(LidarError::LengthMismatch {
                    beam: beam.name.clone(),
                    field: name.to_string(),
                    expected: row_count,
                    found: column.len(),
                });
            }
        }

        let mut beam = beam.clone();
        beam.row_count = Some(row_count);

        let index = named_columns
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (*name, i))
            .collect();
        let (names, columns) = named_columns.into_iter().unzip();

        Ok(Self {
            beam,
            names,
            columns,
            index,
            fill_values: HashMap::new(),
        })
    }

    /// Attach the fill values the source datasets declare
    pub fn with_fill_values(mut self, fill_values: HashMap<&'static str, f64>) -> Self {
        self.fill_values = fill_values;
        self
    }

    pub fn beam(&self) -> &Beam {
        &self.beam
    }

    pub fn row_count(&self) -> usize {
        self.beam.row_count.unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Columns in schema order
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &Column)> + '_ {
        self.names.iter().copied().zip(self.columns.iter())
    }

    pub fn f64_at(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name)?.get_f64(row)
    }

    pub fn i64_at(&self, name: &str, row: usize) -> Option<i64> {
        self.column(name)?.get_i64(row)
    }

    /// Whether `value` of column `name` is a fill: the product sentinel, NaN,
    /// or the `_FillValue` of the column's dataset
    pub fn is_fill(&self, schema: &ProductSchema, name: &str, value: f64) -> bool {
        schema.is_fill(value) || self.fill_values.get(name).map_or(false, |fill| *fill == value)
    }
}

/// Read every schema dataset of `beam` into an aligned row set.
///
/// Fails with `DatasetMissing` when a dataset is absent and with
/// `LengthMismatch` when the per-shot arrays disagree in length.
pub fn read(
    source: &dyn HierarchicalSource,
    beam: &Beam,
    schema: &ProductSchema,
) -> LidarResult<AlignedRowSet> {
    log::debug!("Reading {} datasets for beam {}", schema.fields.len(), beam.name);

    // 2-D datasets feed several columns; read each only once
    let mut matrices: HashMap<String, Array2<f64>> = HashMap::new();
    let mut named_columns = Vec::with_capacity(schema.fields.len());
    let mut fill_values = HashMap::new();

    for field in schema.fields {
        let path = field.resolve_path(&beam.name);
        if !source.contains(&path) {
            return Err(LidarError::DatasetMissing {
                beam: beam.name.clone(),
                path,
            });
        }

        let column = match field.source {
            FieldSource::Dataset => read_vector(source, &beam.name, field, &path)?,
            FieldSource::DatasetColumn(index) => {
                if !matrices.contains_key(&path) {
                    let matrix = read_matrix(source, &beam.name, &path)?;
                    matrices.insert(path.clone(), matrix);
                }
                let matrix = &matrices[&path];
                if index >= matrix.ncols() {
                    return Err(LidarError::InvalidFormat(format!(
                        "Beam {}: {} has {} columns, field {} needs column {}",
                        beam.name,
                        path,
                        matrix.ncols(),
                        field.name,
                        index
                    )));
                }
                let values = matrix.column(index).to_owned();
                match field.value_type {
                    ValueType::Float => Column::Float(values),
                    ValueType::Int => Column::Int(values.mapv(|v| v as i64)),
                }
            }
        };
        named_columns.push((field.name, column));

        match source.read_numeric_attr(&path, FILL_VALUE_ATTR) {
            Ok(Some(fill)) => {
                fill_values.insert(field.name, fill);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Beam {}: ignoring unreadable {} of {}: {}", beam.name, FILL_VALUE_ATTR, path, e),
        }
    }

    let row_set =
        AlignedRowSet::from_columns(beam, schema.latitude, named_columns)?.with_fill_values(fill_values);
    log::debug!("Beam {}: {} aligned rows", beam.name, row_set.row_count());
    Ok(row_set)
}

fn read_vector(
    source: &dyn HierarchicalSource,
    beam: &str,
    field: &FieldSpec,
    path: &str,
) -> LidarResult<Column> {
    let shape = source.shape(path)?;
    if shape.len() != 1 {
        return Err(LidarError::InvalidFormat(format!(
            "Beam {}: {} has shape {:?}, expected one value per shot",
            beam, path, shape
        )));
    }

    let column = match field.value_type {
        ValueType::Float => Column::Float(Array1::from(source.read_f64(path)?)),
        ValueType::Int => Column::Int(Array1::from(source.read_i64(path)?)),
    };
    Ok(column)
}

fn read_matrix(source: &dyn HierarchicalSource, beam: &str, path: &str) -> LidarResult<Array2<f64>> {
    let shape = source.shape(path)?;
    let (rows, cols) = match shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        _ => {
            return Err(LidarError::InvalidFormat(format!(
                "Beam {}: {} has shape {:?}, expected rows x metrics",
                beam, path, shape
            )))
        }
    };

    Array2::from_shape_vec((rows, cols), source.read_f64(path)?).map_err(|e| {
        LidarError::InvalidFormat(format!("Beam {}: failed to reshape {}: {}", beam, path, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::resolve;
    use crate::io::source::MemorySource;
    use ndarray::array;

    fn populate_atl08_beam(source: &mut MemorySource, beam: &str, rows: usize) {
        let schema = resolve("ATL08").unwrap();
        for field in schema.fields {
            let path = field.resolve_path(beam);
            match field.source {
                FieldSource::Dataset => match field.value_type {
                    ValueType::Float => {
                        source.insert_f64(&path, (0..rows).map(|i| i as f64).collect());
                    }
                    ValueType::Int => {
                        source.insert_i64(&path, vec![0; rows]);
                    }
                },
                FieldSource::DatasetColumn(_) => {
                    let values = (0..rows * 18).map(|i| i as f64).collect();
                    source.insert_f64_2d(&path, rows, 18, values).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_read_aligns_all_fields() {
        let schema = resolve("ATL08").unwrap();
        let mut source = MemorySource::new("atl08");
        populate_atl08_beam(&mut source, "gt1l", 4);

        let rows = read(&source, &Beam::new("gt1l"), schema).unwrap();
        assert_eq!(rows.row_count(), 4);
        assert_eq!(rows.beam().row_count, Some(4));
        assert_eq!(rows.columns().count(), schema.fields.len());
        for (_, column) in rows.columns() {
            assert_eq!(column.len(), 4);
        }

        // Row 2, metric column 1 of an 18-wide matrix
        assert_eq!(rows.f64_at("canopy_h_metrics_rh50", 2), Some(37.0));
        assert_eq!(rows.f64_at("canopy_h_metrics_rh25", 0), Some(0.0));
    }

    #[test]
    fn test_missing_dataset_fails_beam() {
        let schema = resolve("ATL08").unwrap();
        let mut source = MemorySource::new("atl08");
        source.add_group("gt2r");

        let err = read(&source, &Beam::new("gt2r"), schema).unwrap_err();
        match err {
            LidarError::DatasetMissing { beam, path } => {
                assert_eq!(beam, "gt2r");
                assert!(path.starts_with("gt2r/land_segments/"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_length_mismatch_fails_beam() {
        let schema = resolve("ATL08").unwrap();
        let mut source = MemorySource::new("atl08");
        populate_atl08_beam(&mut source, "gt3l", 5);
        source.insert_f64("gt3l/land_segments/terrain/h_te_std", vec![1.0, 2.0]);

        let err = read(&source, &Beam::new("gt3l"), schema).unwrap_err();
        assert!(matches!(
            err,
            LidarError::LengthMismatch { ref field, expected: 5, found: 2, .. } if field == "h_te_std"
        ));
    }

    #[test]
    fn test_declared_fill_values_are_carried() {
        let schema = resolve("ATL08").unwrap();
        let mut source = MemorySource::new("atl08");
        populate_atl08_beam(&mut source, "gt1r", 3);
        let flag_path = schema.field("layer_flag").unwrap().resolve_path("gt1r");
        source.insert_i64(&flag_path, vec![0, 127, 1]);
        source.set_attr(&flag_path, FILL_VALUE_ATTR, "127");

        let rows = read(&source, &Beam::new("gt1r"), schema).unwrap();
        assert!(rows.is_fill(schema, "layer_flag", 127.0));
        assert!(!rows.is_fill(schema, "layer_flag", 1.0));
        // The sentinel of one dataset does not leak into other columns
        assert!(!rows.is_fill(schema, "msw_flag", 127.0));
        assert!(rows.is_fill(schema, "msw_flag", f32::MAX as f64));
    }

    #[test]
    fn test_from_columns_requires_reference() {
        let beam = Beam::new("BEAM0000");
        let columns = vec![("a", Column::Float(array![1.0])), ("b", Column::Int(array![1, 2]))];

        assert!(matches!(
            AlignedRowSet::from_columns(&beam, "latitude", columns.clone()),
            Err(LidarError::DatasetMissing { .. })
        ));
        assert!(matches!(
            AlignedRowSet::from_columns(&beam, "a", columns),
            Err(LidarError::LengthMismatch { expected: 1, found: 2, .. })
        ));
    }
}
