//! Product schema table.
//!
//! Each supported product is one static [`ProductSchema`] value; adding a
//! product means adding a table entry, nothing else branches on product id.

use crate::types::{LidarError, LidarResult, ValueType};

/// Placeholder substituted with the beam group name in dataset paths
pub const BEAM_PLACEHOLDER: &str = "{beam}";

/// ATL08 float fill value (largest finite f32)
pub const ATL08_FILL_VALUE: f64 = f32::MAX as f64;

/// GEDI L2B float fill value
pub const GEDI_FILL_VALUE: f64 = -9999.0;

/// Supported lidar products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductId {
    Gedi02B,
    Atl08,
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductId::Gedi02B => write!(f, "GEDI02_B"),
            ProductId::Atl08 => write!(f, "ATL08"),
        }
    }
}

/// How a field is pulled out of its dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Whole 1-D dataset
    Dataset,
    /// One column of a 2-D (rows x metrics) dataset
    DatasetColumn(usize),
}

/// One (dataset path template, semantic name, value type) entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub path: &'static str,
    pub value_type: ValueType,
    pub source: FieldSource,
    /// Fill in this field drops the whole row
    pub required: bool,
}

impl FieldSpec {
    const fn float(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            value_type: ValueType::Float,
            source: FieldSource::Dataset,
            required: false,
        }
    }

    const fn int(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            value_type: ValueType::Int,
            source: FieldSource::Dataset,
            required: false,
        }
    }

    const fn column(name: &'static str, path: &'static str, index: usize) -> Self {
        Self {
            name,
            path,
            value_type: ValueType::Float,
            source: FieldSource::DatasetColumn(index),
            required: false,
        }
    }

    const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    /// Dataset path for a concrete beam
    pub fn resolve_path(&self, beam: &str) -> String {
        self.path.replace(BEAM_PLACEHOLDER, beam)
    }
}

/// Product-specific keep/drop predicate over named fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityRule {
    /// All `quality_flags` == 1, `degrade_flag` == 0, `sensitivity` above threshold
    Gedi {
        quality_flags: &'static [&'static str],
        degrade_flag: &'static str,
        sensitivity: &'static str,
    },
    /// `layer_flag` == 0, `msw_flag` within limits, `surface_height` not fill
    Atl08 {
        layer_flag: &'static str,
        msw_flag: &'static str,
        surface_height: &'static str,
    },
}

/// Shape of the footprint polygon in polygon mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Footprint {
    /// Regular polygon approximating a circular laser footprint
    Circle { diameter_m: f64, vertices: usize },
    /// Rectangle along the local ground-track bearing
    TrackSegment { along_m: f64, across_m: f64 },
}

/// Attribute computed from a read field plus granule-level metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DerivedField {
    /// GPS seconds since `epoch_path` offset, rendered as UTC text
    GpsTimeUtc {
        name: &'static str,
        delta_time: &'static str,
        epoch_path: &'static str,
    },
}

impl DerivedField {
    pub fn name(&self) -> &'static str {
        match self {
            DerivedField::GpsTimeUtc { name, .. } => name,
        }
    }
}

/// Immutable description of one supported product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSchema {
    pub id: ProductId,
    /// Alternative identifiers accepted by [`resolve`]
    pub aliases: &'static [&'static str],
    /// Expected root `short_name` attribute
    pub short_name: &'static str,
    /// Beam group names, in enumeration order
    pub beam_names: &'static [&'static str],
    /// Beams carry a strong/weak classification (ICESat-2)
    pub classifies_beams: bool,
    pub fields: &'static [FieldSpec],
    pub derived: &'static [DerivedField],
    pub latitude: &'static str,
    pub longitude: &'static str,
    pub fill_value: f64,
    pub quality: QualityRule,
    /// Footprint polygons can be built; points are always available
    pub polygon_output: bool,
    pub footprint: Footprint,
}

impl ProductSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// NaN and the product sentinel both mean "no measurement"
    pub fn is_fill(&self, value: f64) -> bool {
        value.is_nan() || value == self.fill_value
    }

    pub fn supports_polygons(&self) -> bool {
        self.polygon_output
    }
}

const GEDI_BEAMS: &[&str] = &[
    "BEAM0000", "BEAM0001", "BEAM0010", "BEAM0011", "BEAM0101", "BEAM0110", "BEAM1000",
    "BEAM1011",
];

const ICESAT2_BEAMS: &[&str] = &["gt1l", "gt1r", "gt2l", "gt2r", "gt3l", "gt3r"];

const GEDI02_B_FIELDS: &[FieldSpec] = &[
    // Geolocation
    FieldSpec::float("elevation_bin0", "{beam}/geolocation/elevation_bin0"),
    FieldSpec::float("elevation_lastbin", "{beam}/geolocation/elevation_lastbin"),
    FieldSpec::float("height_bin0", "{beam}/geolocation/height_bin0"),
    FieldSpec::float("height_lastbin", "{beam}/geolocation/height_lastbin"),
    FieldSpec::int("shot_number", "{beam}/geolocation/shot_number"),
    FieldSpec::float("solar_azimuth", "{beam}/geolocation/solar_azimuth"),
    FieldSpec::float("solar_elevation", "{beam}/geolocation/solar_elevation"),
    FieldSpec::float("latitude_bin0", "{beam}/geolocation/latitude_bin0"),
    FieldSpec::float("latitude_lastbin", "{beam}/geolocation/latitude_lastbin").required(),
    FieldSpec::float("longitude_bin0", "{beam}/geolocation/longitude_bin0"),
    FieldSpec::float("longitude_lastbin", "{beam}/geolocation/longitude_lastbin").required(),
    FieldSpec::int("degrade_flag", "{beam}/geolocation/degrade_flag"),
    FieldSpec::float("digital_elevation_model", "{beam}/geolocation/digital_elevation_model"),
    // Land cover
    FieldSpec::float("landsat_treecover", "{beam}/land_cover_data/landsat_treecover"),
    FieldSpec::float("modis_nonvegetated", "{beam}/land_cover_data/modis_nonvegetated"),
    FieldSpec::float("modis_nonvegetated_sd", "{beam}/land_cover_data/modis_nonvegetated_sd"),
    FieldSpec::float("modis_treecover", "{beam}/land_cover_data/modis_treecover"),
    FieldSpec::float("modis_treecover_sd", "{beam}/land_cover_data/modis_treecover_sd"),
    // Canopy structure
    FieldSpec::int("beam", "{beam}/beam"),
    FieldSpec::float("cover", "{beam}/cover"),
    FieldSpec::float("master_frac", "{beam}/master_frac"),
    FieldSpec::int("master_int", "{beam}/master_int"),
    FieldSpec::int("num_detectedmodes", "{beam}/num_detectedmodes"),
    FieldSpec::float("omega", "{beam}/omega"),
    FieldSpec::float("pai", "{beam}/pai"),
    FieldSpec::float("pgap_theta", "{beam}/pgap_theta"),
    FieldSpec::float("pgap_theta_error", "{beam}/pgap_theta_error"),
    FieldSpec::float("rg", "{beam}/rg"),
    FieldSpec::int("rh100", "{beam}/rh100"),
    FieldSpec::float("rhog", "{beam}/rhog"),
    FieldSpec::float("rhog_error", "{beam}/rhog_error"),
    FieldSpec::float("rhov", "{beam}/rhov"),
    FieldSpec::float("rhov_error", "{beam}/rhov_error"),
    FieldSpec::float("rossg", "{beam}/rossg"),
    FieldSpec::float("rv", "{beam}/rv"),
    FieldSpec::float("sensitivity", "{beam}/sensitivity"),
    FieldSpec::int("stale_return_flag", "{beam}/stale_return_flag"),
    FieldSpec::int("surface_flag", "{beam}/surface_flag"),
    FieldSpec::int("l2a_quality_flag", "{beam}/l2a_quality_flag"),
    FieldSpec::int("l2b_quality_flag", "{beam}/l2b_quality_flag"),
];

const ATL08_FIELDS: &[FieldSpec] = &[
    // Land segments
    FieldSpec::float("asr", "{beam}/land_segments/asr"),
    FieldSpec::float("atlas_pa", "{beam}/land_segments/atlas_pa"),
    FieldSpec::float("beam_azimuth", "{beam}/land_segments/beam_azimuth"),
    FieldSpec::float("beam_coelev", "{beam}/land_segments/beam_coelev"),
    FieldSpec::int("brightness_flag", "{beam}/land_segments/brightness_flag"),
    FieldSpec::float("delta_time", "{beam}/land_segments/delta_time"),
    FieldSpec::float("delta_time_beg", "{beam}/land_segments/delta_time_beg"),
    FieldSpec::float("delta_time_end", "{beam}/land_segments/delta_time_end"),
    FieldSpec::int("dem_flag", "{beam}/land_segments/dem_flag"),
    FieldSpec::float("dem_h", "{beam}/land_segments/dem_h"),
    FieldSpec::int("dem_removal_flag", "{beam}/land_segments/dem_removal_flag"),
    FieldSpec::float("h_dif_ref", "{beam}/land_segments/h_dif_ref"),
    FieldSpec::int("last_seg_extend", "{beam}/land_segments/last_seg_extend"),
    FieldSpec::float("latitude", "{beam}/land_segments/latitude").required(),
    FieldSpec::float("longitude", "{beam}/land_segments/longitude").required(),
    FieldSpec::int("layer_flag", "{beam}/land_segments/layer_flag"),
    FieldSpec::int("msw_flag", "{beam}/land_segments/msw_flag"),
    FieldSpec::int("night_flag", "{beam}/land_segments/night_flag"),
    FieldSpec::int("n_seg_ph", "{beam}/land_segments/n_seg_ph"),
    FieldSpec::int("ph_ndx_beg", "{beam}/land_segments/ph_ndx_beg"),
    FieldSpec::int("ph_removal_flag", "{beam}/land_segments/ph_removal_flag"),
    FieldSpec::int("psf_flag", "{beam}/land_segments/psf_flag"),
    FieldSpec::int("rgt", "{beam}/land_segments/rgt"),
    FieldSpec::int("segment_id_beg", "{beam}/land_segments/segment_id_beg"),
    FieldSpec::int("segment_id_end", "{beam}/land_segments/segment_id_end"),
    FieldSpec::int("segment_landcover", "{beam}/land_segments/segment_landcover"),
    FieldSpec::int("segment_snowcover", "{beam}/land_segments/segment_snowcover"),
    FieldSpec::int("segment_watermask", "{beam}/land_segments/segment_watermask"),
    FieldSpec::float("sigma_across", "{beam}/land_segments/sigma_across"),
    FieldSpec::float("sigma_along", "{beam}/land_segments/sigma_along"),
    FieldSpec::float("sigma_atlas_land", "{beam}/land_segments/sigma_atlas_land"),
    FieldSpec::float("sigma_h", "{beam}/land_segments/sigma_h"),
    FieldSpec::float("sigma_topo", "{beam}/land_segments/sigma_topo"),
    FieldSpec::float("snr", "{beam}/land_segments/snr"),
    FieldSpec::float("solar_azimuth", "{beam}/land_segments/solar_azimuth"),
    FieldSpec::float("solar_elevation", "{beam}/land_segments/solar_elevation"),
    FieldSpec::int("terrain_flg", "{beam}/land_segments/terrain_flg"),
    FieldSpec::int("urban_flag", "{beam}/land_segments/urban_flag"),
    // Canopy
    FieldSpec::int("segment_cover", "{beam}/land_segments/canopy/segment_cover"),
    FieldSpec::float("canopy_openness", "{beam}/land_segments/canopy/canopy_openness"),
    FieldSpec::int("canopy_rh_conf", "{beam}/land_segments/canopy/canopy_rh_conf"),
    FieldSpec::float("centroid_height", "{beam}/land_segments/canopy/centroid_height"),
    FieldSpec::float("h_canopy", "{beam}/land_segments/canopy/h_canopy"),
    FieldSpec::float("h_canopy_abs", "{beam}/land_segments/canopy/h_canopy_abs"),
    FieldSpec::float("h_canopy_quad", "{beam}/land_segments/canopy/h_canopy_quad"),
    FieldSpec::float("h_canopy_uncertainty", "{beam}/land_segments/canopy/h_canopy_uncertainty"),
    FieldSpec::float("h_dif_canopy", "{beam}/land_segments/canopy/h_dif_canopy"),
    FieldSpec::float("h_max_canopy", "{beam}/land_segments/canopy/h_max_canopy"),
    FieldSpec::float("h_max_canopy_abs", "{beam}/land_segments/canopy/h_max_canopy_abs"),
    FieldSpec::float("h_mean_canopy", "{beam}/land_segments/canopy/h_mean_canopy"),
    FieldSpec::float("h_mean_canopy_abs", "{beam}/land_segments/canopy/h_mean_canopy_abs"),
    FieldSpec::float("h_median_canopy", "{beam}/land_segments/canopy/h_median_canopy"),
    FieldSpec::float("h_median_canopy_abs", "{beam}/land_segments/canopy/h_median_canopy_abs"),
    FieldSpec::float("h_min_canopy", "{beam}/land_segments/canopy/h_min_canopy"),
    FieldSpec::float("h_min_canopy_abs", "{beam}/land_segments/canopy/h_min_canopy_abs"),
    FieldSpec::int("n_ca_photons", "{beam}/land_segments/canopy/n_ca_photons"),
    FieldSpec::int("n_toc_photons", "{beam}/land_segments/canopy/n_toc_photons"),
    FieldSpec::float("toc_roughness", "{beam}/land_segments/canopy/toc_roughness"),
    FieldSpec::column("canopy_h_metrics_rh25", "{beam}/land_segments/canopy/canopy_h_metrics", 0),
    FieldSpec::column("canopy_h_metrics_rh50", "{beam}/land_segments/canopy/canopy_h_metrics", 1),
    FieldSpec::column("canopy_h_metrics_rh60", "{beam}/land_segments/canopy/canopy_h_metrics", 2),
    FieldSpec::column("canopy_h_metrics_rh70", "{beam}/land_segments/canopy/canopy_h_metrics", 3),
    FieldSpec::column("canopy_h_metrics_rh75", "{beam}/land_segments/canopy/canopy_h_metrics", 4),
    FieldSpec::column("canopy_h_metrics_rh80", "{beam}/land_segments/canopy/canopy_h_metrics", 5),
    FieldSpec::column("canopy_h_metrics_rh85", "{beam}/land_segments/canopy/canopy_h_metrics", 6),
    FieldSpec::column("canopy_h_metrics_rh90", "{beam}/land_segments/canopy/canopy_h_metrics", 7),
    FieldSpec::column("canopy_h_metrics_rh95", "{beam}/land_segments/canopy/canopy_h_metrics", 8),
    FieldSpec::column("canopy_h_metrics_abs_rh25", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 0),
    FieldSpec::column("canopy_h_metrics_abs_rh50", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 1),
    FieldSpec::column("canopy_h_metrics_abs_rh60", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 2),
    FieldSpec::column("canopy_h_metrics_abs_rh70", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 3),
    FieldSpec::column("canopy_h_metrics_abs_rh75", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 4),
    FieldSpec::column("canopy_h_metrics_abs_rh80", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 5),
    FieldSpec::column("canopy_h_metrics_abs_rh85", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 6),
    FieldSpec::column("canopy_h_metrics_abs_rh90", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 7),
    FieldSpec::column("canopy_h_metrics_abs_rh95", "{beam}/land_segments/canopy/canopy_h_metrics_abs", 8),
    // Terrain
    FieldSpec::float("h_te_best_fit", "{beam}/land_segments/terrain/h_te_best_fit"),
    FieldSpec::float("h_te_interp", "{beam}/land_segments/terrain/h_te_interp"),
    FieldSpec::float("h_te_max", "{beam}/land_segments/terrain/h_te_max"),
    FieldSpec::float("h_te_mean", "{beam}/land_segments/terrain/h_te_mean"),
    FieldSpec::float("h_te_median", "{beam}/land_segments/terrain/h_te_median"),
    FieldSpec::float("h_te_min", "{beam}/land_segments/terrain/h_te_min"),
    FieldSpec::float("h_te_mode", "{beam}/land_segments/terrain/h_te_mode"),
    FieldSpec::float("h_te_skew", "{beam}/land_segments/terrain/h_te_skew"),
    FieldSpec::float("h_te_std", "{beam}/land_segments/terrain/h_te_std"),
    FieldSpec::float("h_te_uncertainty", "{beam}/land_segments/terrain/h_te_uncertainty"),
    FieldSpec::int("n_te_photons", "{beam}/land_segments/terrain/n_te_photons"),
    FieldSpec::float("terrain_slope", "{beam}/land_segments/terrain/terrain_slope"),
];

static GEDI02_B: ProductSchema = ProductSchema {
    id: ProductId::Gedi02B,
    aliases: &["GEDI02_B", "GEDI_L2B"],
    short_name: "GEDI_L2B",
    beam_names: GEDI_BEAMS,
    classifies_beams: false,
    fields: GEDI02_B_FIELDS,
    derived: &[],
    latitude: "latitude_lastbin",
    longitude: "longitude_lastbin",
    fill_value: GEDI_FILL_VALUE,
    quality: QualityRule::Gedi {
        quality_flags: &["l2a_quality_flag", "l2b_quality_flag"],
        degrade_flag: "degrade_flag",
        sensitivity: "sensitivity",
    },
    polygon_output: true,
    footprint: Footprint::Circle {
        diameter_m: 25.0,
        vertices: 32,
    },
};

static ATL08: ProductSchema = ProductSchema {
    id: ProductId::Atl08,
    aliases: &["ATL08"],
    short_name: "ATL08",
    beam_names: ICESAT2_BEAMS,
    classifies_beams: true,
    fields: ATL08_FIELDS,
    derived: &[DerivedField::GpsTimeUtc {
        name: "segment_time_utc",
        delta_time: "delta_time",
        epoch_path: "ancillary_data/atlas_sdp_gps_epoch",
    }],
    latitude: "latitude",
    longitude: "longitude",
    fill_value: ATL08_FILL_VALUE,
    quality: QualityRule::Atl08 {
        layer_flag: "layer_flag",
        msw_flag: "msw_flag",
        surface_height: "h_te_best_fit",
    },
    polygon_output: true,
    footprint: Footprint::TrackSegment {
        along_m: 100.0,
        across_m: 13.0,
    },
};

static SCHEMAS: [&ProductSchema; 2] = [&GEDI02_B, &ATL08];

/// Look up the schema for a product identifier (case-insensitive)
pub fn resolve(product_id: &str) -> LidarResult<&'static ProductSchema> {
    let wanted = product_id.trim();
    SCHEMAS
        .iter()
        .copied()
        .find(|schema| schema.aliases.iter().any(|a| a.eq_ignore_ascii_case(wanted)))
        .ok_or_else(|| LidarError::UnsupportedProduct(product_id.to_string()))
}

/// All supported product schemas
pub fn supported_products() -> impl Iterator<Item = &'static ProductSchema> {
    SCHEMAS.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(resolve("GEDI02_b").unwrap().id, ProductId::Gedi02B);
        assert_eq!(resolve("gedi_l2b").unwrap().id, ProductId::Gedi02B);
        assert_eq!(resolve(" atl08 ").unwrap().id, ProductId::Atl08);
    }

    #[test]
    fn test_unsupported_product() {
        let err = resolve("ATL03").unwrap_err();
        assert!(matches!(err, LidarError::UnsupportedProduct(ref p) if p == "ATL03"));
    }

    #[test]
    fn test_schemas_are_internally_consistent() {
        for schema in supported_products() {
            let names: HashSet<_> = schema.fields.iter().map(|f| f.name).collect();
            assert_eq!(names.len(), schema.fields.len(), "duplicate field in {}", schema.id);

            assert!(schema.field(schema.latitude).unwrap().required);
            assert!(schema.field(schema.longitude).unwrap().required);

            let quality_fields: Vec<&str> = match schema.quality {
                QualityRule::Gedi {
                    quality_flags,
                    degrade_flag,
                    sensitivity,
                } => quality_flags
                    .iter()
                    .copied()
                    .chain([degrade_flag, sensitivity])
                    .collect(),
                QualityRule::Atl08 {
                    layer_flag,
                    msw_flag,
                    surface_height,
                } => vec![layer_flag, msw_flag, surface_height],
            };
            for name in quality_fields {
                assert!(names.contains(name), "{} lacks quality field {}", schema.id, name);
            }
            for field in schema.fields {
                assert!(field.path.starts_with(BEAM_PLACEHOLDER));
            }
        }
    }

    #[test]
    fn test_path_substitution() {
        let schema = resolve("ATL08").unwrap();
        let field = schema.field("h_te_best_fit").unwrap();
        assert_eq!(
            field.resolve_path("gt2r"),
            "gt2r/land_segments/terrain/h_te_best_fit"
        );
    }

    #[test]
    fn test_fill_detection() {
        let atl08 = resolve("ATL08").unwrap();
        assert!(atl08.is_fill(3.4028235e38_f32 as f64));
        assert!(atl08.is_fill(f64::NAN));
        assert!(!atl08.is_fill(12.5));

        let gedi = resolve("GEDI02_B").unwrap();
        assert!(gedi.is_fill(-9999.0));
        assert!(!gedi.is_fill(0.0));
    }
}
