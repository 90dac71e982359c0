use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Fixed output coordinate reference system (geographic WGS84)
pub const OUTPUT_EPSG: u32 = 4326;

/// Storage type of a dataset once read into memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Floating point measurement (read as f64)
    Float,
    /// Integer flag or counter (read as i64)
    Int,
}

/// One column of an aligned row set
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Array1<f64>),
    Int(Array1<i64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(values) => values.len(),
            Column::Int(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Column::Float(_) => ValueType::Float,
            Column::Int(_) => ValueType::Int,
        }
    }

    /// Value at `row` widened to f64
    pub fn get_f64(&self, row: usize) -> Option<f64> {
        match self {
            Column::Float(values) => values.get(row).copied(),
            Column::Int(values) => values.get(row).and_then(|v| num_traits::cast(*v)),
        }
    }

    /// Value at `row` as an integer; floats are truncated toward zero
    pub fn get_i64(&self, row: usize) -> Option<i64> {
        match self {
            Column::Float(values) => values.get(row).and_then(|v| num_traits::cast(*v)),
            Column::Int(values) => values.get(row).copied(),
        }
    }
}

/// ICESat-2 laser energy classification of a ground track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeamStrength {
    Strong,
    Weak,
}

impl std::fmt::Display for BeamStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeamStrength::Strong => write!(f, "strong"),
            BeamStrength::Weak => write!(f, "weak"),
        }
    }
}

/// Spacecraft orientation for one ICESat-2 granule (`/orbit_info/sc_orient`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitOrientation {
    /// sc_orient = 0, left beams are strong
    Backward,
    /// sc_orient = 1, right beams are strong
    Forward,
    /// sc_orient = 2, yaw flip in progress
    Transition,
}

impl OrbitOrientation {
    pub fn from_sc_orient(value: i64) -> LidarResult<Self> {
        match value {
            0 => Ok(OrbitOrientation::Backward),
            1 => Ok(OrbitOrientation::Forward),
            2 => Ok(OrbitOrientation::Transition),
            other => Err(LidarError::Metadata(format!(
                "Unknown spacecraft orientation value: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OrbitOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitOrientation::Backward => write!(f, "backward"),
            OrbitOrientation::Forward => write!(f, "forward"),
            OrbitOrientation::Transition => write!(f, "transition"),
        }
    }
}

/// A named beam group of one input granule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beam {
    pub name: String,
    /// ICESat-2 only; `None` until classified
    pub strength: Option<BeamStrength>,
    /// Populated once the beam's datasets have been read
    pub row_count: Option<usize>,
}

impl Beam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strength: None,
            row_count: None,
        }
    }
}

/// Output geometry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryMode {
    Point,
    Polygon,
}

impl Default for GeometryMode {
    fn default() -> Self {
        GeometryMode::Point
    }
}

/// Which beams of a granule to process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamSelection {
    All,
    StrongOnly,
    WeakOnly,
}

impl Default for BeamSelection {
    fn default() -> Self {
        BeamSelection::All
    }
}

/// Attribute value carried by an output feature
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Real(f64),
    Integer(i64),
    Text(String),
    /// Field held a fill sentinel for this row
    Null,
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Real(v) => Some(*v),
            AttributeValue::Integer(v) => num_traits::cast(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Attribute type of an output field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Real,
    Integer,
    Text,
}

impl From<ValueType> for AttributeKind {
    fn from(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Float => AttributeKind::Real,
            ValueType::Int => AttributeKind::Integer,
        }
    }
}

/// Error types for lidar extraction
#[derive(Debug, thiserror::Error)]
pub enum LidarError {
    #[error("Unsupported product: {0} (supported: GEDI02_B, ATL08)")]
    UnsupportedProduct(String),

    #[error("Beam {beam}: required dataset '{path}' is missing")]
    DatasetMissing { beam: String, path: String },

    #[error("Beam {beam}: dataset '{field}' has {found} rows, expected {expected}")]
    LengthMismatch {
        beam: String,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("Beam {beam}: row {row} holds a fill value in '{field}'")]
    FillValueRow {
        beam: String,
        row: usize,
        field: String,
    },

    #[error("Cannot write output {path}: {reason}")]
    SinkWrite { path: String, reason: String },

    #[error("Input is a {found} granule, expected {expected}")]
    ProductMismatch { expected: String, found: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5_metno::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LidarError {
    /// Errors that skip the current beam rather than failing the run
    pub fn is_beam_recoverable(&self) -> bool {
        matches!(
            self,
            LidarError::DatasetMissing { .. }
                | LidarError::LengthMismatch { .. }
                | LidarError::FillValueRow { .. }
                | LidarError::InvalidFormat(_)
                | LidarError::Hdf5(_)
        )
    }
}

/// Result type for lidar operations
pub type LidarResult<T> = Result<T, LidarError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_column_widening() {
        let ints = Column::Int(array![1, -2, 3]);
        assert_eq!(ints.len(), 3);
        assert_eq!(ints.get_f64(1), Some(-2.0));
        assert_eq!(ints.get_i64(5), None);

        let floats = Column::Float(array![0.5, 2.75]);
        assert_eq!(floats.get_i64(1), Some(2));
        assert_eq!(floats.value_type(), ValueType::Float);
    }

    #[test]
    fn test_orientation_decoding() {
        assert_eq!(OrbitOrientation::from_sc_orient(0).unwrap(), OrbitOrientation::Backward);
        assert_eq!(OrbitOrientation::from_sc_orient(1).unwrap(), OrbitOrientation::Forward);
        assert_eq!(OrbitOrientation::from_sc_orient(2).unwrap(), OrbitOrientation::Transition);
        assert!(OrbitOrientation::from_sc_orient(21).is_err());
    }

    #[test]
    fn test_recoverable_errors() {
        let missing = LidarError::DatasetMissing {
            beam: "gt1l".to_string(),
            path: "gt1l/land_segments/latitude".to_string(),
        };
        assert!(missing.is_beam_recoverable());
        assert!(!LidarError::UnsupportedProduct("ATL03".to_string()).is_beam_recoverable());
        let sink = LidarError::SinkWrite {
            path: "out.gpkg".to_string(),
            reason: "read-only".to_string(),
        };
        assert!(!sink.is_beam_recoverable());

        let mismatch = LidarError::LengthMismatch {
            beam: "BEAM0101".to_string(),
            field: "sensitivity".to_string(),
            expected: 100,
            found: 99,
        };
        assert!(mismatch.is_beam_recoverable());
        let fill = LidarError::FillValueRow {
            beam: "BEAM0101".to_string(),
            row: 3,
            field: "latitude_lastbin".to_string(),
        };
        assert!(fill.is_beam_recoverable());
        assert!(LidarError::InvalidFormat("rh has shape [5]".to_string()).is_beam_recoverable());
        assert!(LidarError::Hdf5(hdf5_metno::Error::from("truncated dataset")).is_beam_recoverable());

        let mismatch = LidarError::ProductMismatch {
            expected: "GEDI_L2B".to_string(),
            found: "ATL08".to_string(),
        };
        assert!(!mismatch.is_beam_recoverable());
        assert!(!LidarError::Config("bad selection".to_string()).is_beam_recoverable());
    }
}
