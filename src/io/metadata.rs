use crate::core::schema::{DerivedField, ProductSchema};
use crate::io::source::HierarchicalSource;
use crate::types::{LidarError, LidarResult, OrbitOrientation};
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Location of the ICESat-2 spacecraft orientation flag
pub const SC_ORIENT_PATH: &str = "orbit_info/sc_orient";

/// Location of GEDI dataset identification attributes
pub const GEDI_IDENTIFICATION_PATH: &str = "METADATA/DatasetIdentification";

/// GEDI `DatasetIdentification` attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetIdentification {
    pub version_id: Option<String>,
    pub pge_version: Option<String>,
    pub creation_date: Option<NaiveDateTime>,
    pub uuid: Option<String>,
}

/// Granule-level information gathered before any beam is read
#[derive(Debug, Clone, Default)]
pub struct GranuleMetadata {
    pub source: String,
    pub short_name: Option<String>,
    pub orientation: Option<OrbitOrientation>,
    pub identification: Option<DatasetIdentification>,
    /// Scalars needed by derived attributes, keyed by dataset path
    pub scalars: HashMap<String, f64>,
}

impl GranuleMetadata {
    /// Gather everything `schema` needs from the granule.
    ///
    /// A wrong product short name is fatal; absent optional metadata only
    /// produces warnings.
    pub fn read(source: &dyn HierarchicalSource, schema: &ProductSchema) -> LidarResult<Self> {
        let short_name = check_product_identity(source, schema)?;

        let orientation = if schema.classifies_beams {
            match read_orbit_orientation(source) {
                Ok(orientation) => {
                    log::info!("Spacecraft orientation: {}", orientation);
                    Some(orientation)
                }
                Err(e) => {
                    log::warn!("Beam strength unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let identification = if source.contains(GEDI_IDENTIFICATION_PATH) {
            Some(read_dataset_identification(source)?)
        } else {
            None
        };

        let mut scalars = HashMap::new();
        for derived in schema.derived {
            let DerivedField::GpsTimeUtc { epoch_path, .. } = derived;
            match read_first_f64(source, epoch_path) {
                Ok(value) => {
                    scalars.insert(epoch_path.to_string(), value);
                }
                Err(e) => log::warn!("{} will be empty: {}", derived.name(), e),
            }
        }

        Ok(Self {
            source: source.describe(),
            short_name,
            orientation,
            identification,
            scalars,
        })
    }

    /// Provenance entries written into the output dataset metadata
    pub fn metadata_items(&self, schema: &ProductSchema) -> Vec<(String, String)> {
        let mut items = vec![
            ("SPACELIDAR_PRODUCT".to_string(), schema.id.to_string()),
            ("SPACELIDAR_SOURCE".to_string(), self.source.clone()),
        ];
        if let Some(orientation) = self.orientation {
            items.push(("SPACELIDAR_SC_ORIENT".to_string(), orientation.to_string()));
        }
        if let Some(id) = &self.identification {
            let entries = [
                ("VersionID", id.version_id.clone()),
                ("PGEVersion", id.pge_version.clone()),
                ("creationDate", id.creation_date.map(|d| d.to_string())),
                ("uuid", id.uuid.clone()),
            ];
            for (key, value) in entries {
                if let Some(value) = value {
                    items.push((key.to_string(), value));
                }
            }
        }
        items
    }
}

/// Compare the root `short_name` attribute with the schema's product
pub fn check_product_identity(
    source: &dyn HierarchicalSource,
    schema: &ProductSchema,
) -> LidarResult<Option<String>> {
    match source.read_string_attr("/", "short_name")? {
        Some(found) if found.trim() == schema.short_name => Ok(Some(found)),
        Some(found) => Err(LidarError::ProductMismatch {
            expected: schema.short_name.to_string(),
            found,
        }),
        None => {
            log::warn!(
                "{} has no short_name attribute; assuming {}",
                source.describe(),
                schema.short_name
            );
            Ok(None)
        }
    }
}

/// Spacecraft orientation from `/orbit_info/sc_orient`
pub fn read_orbit_orientation(source: &dyn HierarchicalSource) -> LidarResult<OrbitOrientation> {
    if !source.contains(SC_ORIENT_PATH) {
        return Err(LidarError::Metadata(format!("{} is missing", SC_ORIENT_PATH)));
    }
    let values = source.read_i64(SC_ORIENT_PATH)?;
    let first = values
        .first()
        .copied()
        .ok_or_else(|| LidarError::Metadata(format!("{} is empty", SC_ORIENT_PATH)))?;
    OrbitOrientation::from_sc_orient(first)
}

/// First element of a granule-level dataset
pub fn read_first_f64(source: &dyn HierarchicalSource, path: &str) -> LidarResult<f64> {
    if !source.contains(path) {
        return Err(LidarError::Metadata(format!("{} is missing", path)));
    }
    source
        .read_f64(path)?
        .first()
        .copied()
        .ok_or_else(|| LidarError::Metadata(format!("{} is empty", path)))
}

/// GEDI `METADATA/DatasetIdentification` attributes
pub fn read_dataset_identification(
    source: &dyn HierarchicalSource,
) -> LidarResult<DatasetIdentification> {
    let attr = |name: &str| source.read_string_attr(GEDI_IDENTIFICATION_PATH, name);

    let creation_date = match attr("creationDate")? {
        Some(text) => match NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.fZ") {
            Ok(date) => Some(date),
            Err(e) => {
                log::warn!("Could not parse creationDate '{}': {}", text, e);
                None
            }
        },
        None => None,
    };

    Ok(DatasetIdentification {
        version_id: attr("VersionID")?,
        pge_version: attr("PGEVersion")?,
        creation_date,
        uuid: attr("uuid")?,
    })
}
