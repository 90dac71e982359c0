use crate::core::aligned::AlignedRowSet;
use crate::core::geometry::Geometry;
use crate::core::schema::{DerivedField, ProductId, ProductSchema};
use crate::types::{AttributeKind, AttributeValue, Column};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

/// Name of the attribute identifying the source beam of a feature
pub const BEAM_NAME_FIELD: &str = "beam_name";

/// Leap seconds between GPS time and UTC since 2017-01-01
pub const GPS_UTC_LEAP_SECONDS: f64 = 18.0;

/// Output timestamp format for derived UTC attributes
pub const UTC_TIME_FORMAT: &str = "%Y.%m.%d_%H.%M.%S";

/// One output attribute column
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: AttributeKind,
}

/// One output record: geometry plus the attributes of its source row
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub beam_name: String,
    pub geometry: Geometry,
    /// Values in the owning collection's layout order
    pub attributes: Vec<AttributeValue>,
}

/// Features of one granule, in beam then row order
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    product: ProductId,
    layout: Vec<FieldDef>,
    features: Vec<Feature>,
}

impl FeatureCollection {
    /// Empty collection with the attribute layout of `schema`
    pub fn new(schema: &ProductSchema) -> Self {
        let layout = schema
            .fields
            .iter()
            .map(|field| FieldDef {
                name: field.name.to_string(),
                kind: field.value_type.into(),
            })
            .chain(schema.derived.iter().map(|derived| FieldDef {
                name: derived.name().to_string(),
                kind: AttributeKind::Text,
            }))
            .collect();

        Self {
            product: schema.id,
            layout,
            features: Vec::new(),
        }
    }

    pub fn product(&self) -> ProductId {
        self.product
    }

    /// Attribute columns, excluding the leading `beam_name`
    pub fn layout(&self) -> &[FieldDef] {
        &self.layout
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Append one beam's batch
    pub fn extend(&mut self, batch: Vec<Feature>) {
        self.features.extend(batch);
    }

    /// Attribute `name` of `feature`; `beam_name` is served as text
    pub fn attribute(&self, feature: &Feature, name: &str) -> Option<AttributeValue> {
        if name == BEAM_NAME_FIELD {
            return Some(AttributeValue::Text(feature.beam_name.clone()));
        }
        let index = self.layout.iter().position(|f| f.name == name)?;
        feature.attributes.get(index).cloned()
    }

    /// Distinct beam names, in first-seen order
    pub fn beam_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for feature in &self.features {
            if !names.contains(&feature.beam_name) {
                names.push(feature.beam_name.clone());
            }
        }
        names
    }
}

/// Render GPS seconds (since 1980-01-06T00:00:00) as UTC text
pub fn gps_seconds_to_utc(gps_seconds: f64) -> Option<String> {
    if !gps_seconds.is_finite() {
        return None;
    }
    let gps_epoch = NaiveDate::from_ymd_opt(1980, 1, 6)?.and_hms_opt(0, 0, 0)?;
    let millis = ((gps_seconds - GPS_UTC_LEAP_SECONDS) * 1000.0).round();
    let offset = Duration::milliseconds(num_traits::cast::<f64, i64>(millis)?);
    let utc = gps_epoch.checked_add_signed(offset)?;
    Some(utc.format(UTC_TIME_FORMAT).to_string())
}

/// Builds features from retained rows
pub struct RecordAssembler<'a> {
    schema: &'a ProductSchema,
    /// Granule-level scalars keyed by dataset path (e.g. GPS epoch offsets)
    granule_values: &'a HashMap<String, f64>,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(schema: &'a ProductSchema, granule_values: &'a HashMap<String, f64>) -> Self {
        Self {
            schema,
            granule_values,
        }
    }

    /// Feature for `row`, carrying every schema field plus derived attributes.
    /// Fields holding a fill value, integer or float, become `Null`.
    pub fn assemble(&self, beam_name: &str, rows: &AlignedRowSet, row: usize, geometry: Geometry) -> Feature {
        let mut attributes = Vec::with_capacity(self.schema.fields.len() + self.schema.derived.len());

        for field in self.schema.fields {
            let value = match rows.column(field.name) {
                Some(Column::Float(values)) => match values.get(row) {
                    Some(&v) if !rows.is_fill(self.schema, field.name, v) => AttributeValue::Real(v),
                    _ => AttributeValue::Null,
                },
                Some(Column::Int(values)) => match values.get(row) {
                    Some(&v) if !rows.is_fill(self.schema, field.name, v as f64) => AttributeValue::Integer(v),
                    _ => AttributeValue::Null,
                },
                None => AttributeValue::Null,
            };
            attributes.push(value);
        }

        for derived in self.schema.derived {
            attributes.push(self.derive(derived, rows, row));
        }

        Feature {
            beam_name: beam_name.to_string(),
            geometry,
            attributes,
        }
    }

    fn derive(&self, derived: &DerivedField, rows: &AlignedRowSet, row: usize) -> AttributeValue {
        match derived {
            DerivedField::GpsTimeUtc {
                delta_time,
                epoch_path,
                ..
            } => {
                let epoch = self.granule_values.get(*epoch_path);
                let delta = rows
                    .f64_at(delta_time, row)
                    .filter(|v| !rows.is_fill(self.schema, delta_time, *v));
                match (epoch, delta) {
                    (Some(epoch), Some(delta)) => gps_seconds_to_utc(epoch + delta)
                        .map_or(AttributeValue::Null, AttributeValue::Text),
                    _ => AttributeValue::Null,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{resolve, ATL08_FILL_VALUE};
    use crate::types::Beam;
    use ndarray::Array1;

    #[test]
    fn test_gps_time_conversion() {
        // 18 leap seconds after the epoch is exactly the epoch in UTC
        assert_eq!(gps_seconds_to_utc(18.0).unwrap(), "1980.01.06_00.00.00");
        // ATLAS SDP epoch (2018-01-01) plus one day
        assert_eq!(
            gps_seconds_to_utc(1_198_800_018.0 + 86_400.0).unwrap(),
            "2018.01.02_00.00.00"
        );
        assert!(gps_seconds_to_utc(f64::NAN).is_none());
    }

    #[test]
    fn test_layout_follows_schema() {
        let schema = resolve("ATL08").unwrap();
        let collection = FeatureCollection::new(schema);
        assert_eq!(collection.layout().len(), schema.fields.len() + 1);
        assert_eq!(collection.layout()[0].name, "asr");
        let last = collection.layout().last().unwrap();
        assert_eq!(last.name, "segment_time_utc");
        assert_eq!(last.kind, AttributeKind::Text);
    }

    #[test]
    fn test_assemble_nulls_fill_and_derives_time() {
        let schema = resolve("ATL08").unwrap();
        let columns = vec![
            ("latitude", Column::Float(Array1::from(vec![10.0, 11.0]))),
            ("longitude", Column::Float(Array1::from(vec![20.0, 21.0]))),
            ("h_canopy", Column::Float(Array1::from(vec![ATL08_FILL_VALUE, 14.5]))),
            ("layer_flag", Column::Int(Array1::from(vec![0, 0]))),
            ("delta_time", Column::Float(Array1::from(vec![86_400.0, ATL08_FILL_VALUE]))),
        ];
        let rows = AlignedRowSet::from_columns(&Beam::new("gt1l"), "latitude", columns).unwrap();
        let mut granule = HashMap::new();
        granule.insert("ancillary_data/atlas_sdp_gps_epoch".to_string(), 1_198_800_018.0);

        let assembler = RecordAssembler::new(schema, &granule);
        let mut collection = FeatureCollection::new(schema);
        let features = (0..2)
            .map(|row| {
                let geometry = Geometry::Point {
                    lon: 20.0 + row as f64,
                    lat: 10.0 + row as f64,
                };
                assembler.assemble("gt1l", &rows, row, geometry)
            })
            .collect();
        collection.extend(features);

        let first = &collection.features()[0];
        let second = &collection.features()[1];
        assert_eq!(collection.attribute(first, "h_canopy"), Some(AttributeValue::Null));
        assert_eq!(collection.attribute(second, "h_canopy"), Some(AttributeValue::Real(14.5)));
        assert_eq!(collection.attribute(first, "layer_flag"), Some(AttributeValue::Integer(0)));
        assert_eq!(
            collection.attribute(first, "segment_time_utc"),
            Some(AttributeValue::Text("2018.01.02_00.00.00".to_string()))
        );
        assert_eq!(collection.attribute(second, "segment_time_utc"), Some(AttributeValue::Null));
        assert_eq!(
            collection.attribute(first, BEAM_NAME_FIELD),
            Some(AttributeValue::Text("gt1l".to_string()))
        );
        // Fields absent from the row set are carried as Null
        assert_eq!(collection.attribute(first, "snr"), Some(AttributeValue::Null));
        assert_eq!(collection.beam_names(), vec!["gt1l"]);
    }

    #[test]
    fn test_integer_fill_values_become_null() {
        let gedi = resolve("GEDI02_B").unwrap();
        let columns = vec![
            ("latitude_lastbin", Column::Float(Array1::from(vec![1.0, 2.0]))),
            ("longitude_lastbin", Column::Float(Array1::from(vec![3.0, 4.0]))),
            ("rh100", Column::Int(Array1::from(vec![-9999, 2150]))),
        ];
        let rows = AlignedRowSet::from_columns(&Beam::new("BEAM0000"), "latitude_lastbin", columns).unwrap();
        let granule = HashMap::new();
        let assembler = RecordAssembler::new(gedi, &granule);
        let mut collection = FeatureCollection::new(gedi);
        let features = (0..2)
            .map(|row| assembler.assemble("BEAM0000", &rows, row, Geometry::Point { lon: 3.0, lat: 1.0 }))
            .collect();
        collection.extend(features);
        assert_eq!(collection.attribute(&collection.features()[0], "rh100"), Some(AttributeValue::Null));
        assert_eq!(
            collection.attribute(&collection.features()[1], "rh100"),
            Some(AttributeValue::Integer(2150))
        );

        // Per-dataset sentinels of ATL08 integer flags
        let atl08 = resolve("ATL08").unwrap();
        let columns = vec![
            ("latitude", Column::Float(Array1::from(vec![10.0, 11.0]))),
            ("longitude", Column::Float(Array1::from(vec![20.0, 21.0]))),
            ("segment_snowcover", Column::Int(Array1::from(vec![127, 1]))),
            ("n_te_photons", Column::Int(Array1::from(vec![40, i32::MAX as i64]))),
        ];
        let mut fills = HashMap::new();
        fills.insert("segment_snowcover", 127.0);
        fills.insert("n_te_photons", i32::MAX as f64);
        let rows = AlignedRowSet::from_columns(&Beam::new("gt2l"), "latitude", columns)
            .unwrap()
            .with_fill_values(fills);
        let assembler = RecordAssembler::new(atl08, &granule);
        let first = assembler.assemble("gt2l", &rows, 0, Geometry::Point { lon: 20.0, lat: 10.0 });
        let second = assembler.assemble("gt2l", &rows, 1, Geometry::Point { lon: 21.0, lat: 11.0 });
        let mut collection = FeatureCollection::new(atl08);
        collection.extend(vec![first, second]);
        let features = collection.features();
        assert_eq!(collection.attribute(&features[0], "segment_snowcover"), Some(AttributeValue::Null));
        assert_eq!(collection.attribute(&features[1], "segment_snowcover"), Some(AttributeValue::Integer(1)));
        assert_eq!(collection.attribute(&features[0], "n_te_photons"), Some(AttributeValue::Integer(40)));
        assert_eq!(collection.attribute(&features[1], "n_te_photons"), Some(AttributeValue::Null));
    }
}
