//! Per-row keep/drop decisions.
//!
//! Fill-value exclusion and the product quality predicate are separate
//! checks: a row with a fill coordinate is reported as missing data, never
//! as a quality failure, and vice versa.

use crate::core::aligned::AlignedRowSet;
use crate::core::schema::{ProductSchema, QualityRule};
use serde::{Deserialize, Serialize};

/// Quality filter thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// GEDI: shots must have sensitivity strictly above this value
    pub min_sensitivity: f64,
    /// ATL08: highest accepted multiple-scattering warning flag
    pub max_msw_flag: i64,
    /// ATL08: accepted cloud/blowing-snow layer flag
    pub layer_flag: i64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_sensitivity: 0.9,
            max_msw_flag: 0,
            layer_flag: 0,
        }
    }
}

/// Outcome of filtering one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowVerdict {
    Keep,
    /// A required field holds a fill value
    Fill(&'static str),
    /// The product quality predicate rejected the row
    Quality,
}

/// First required field of `row` holding a fill value, if any
pub fn fill_field(row: usize, rows: &AlignedRowSet, schema: &ProductSchema) -> Option<&'static str> {
    schema
        .fields
        .iter()
        .filter(|field| field.required)
        .find(|field| {
            rows.f64_at(field.name, row)
                .map_or(true, |v| rows.is_fill(schema, field.name, v))
        })
        .map(|field| field.name)
}

/// Product quality predicate for `row`
pub fn passes_quality(
    row: usize,
    rows: &AlignedRowSet,
    schema: &ProductSchema,
    config: &QualityConfig,
) -> bool {
    match schema.quality {
        QualityRule::Gedi {
            quality_flags,
            degrade_flag,
            sensitivity,
        } => {
            let flags_ok = quality_flags
                .iter()
                .all(|flag| rows.i64_at(flag, row) == Some(1));
            let not_degraded = rows.i64_at(degrade_flag, row) == Some(0);
            let sensitive = rows
                .f64_at(sensitivity, row)
                .map_or(false, |v| !rows.is_fill(schema, sensitivity, v) && v > config.min_sensitivity);
            flags_ok && not_degraded && sensitive
        }
        QualityRule::Atl08 {
            layer_flag,
            msw_flag,
            surface_height,
        } => {
            let clear = rows.i64_at(layer_flag, row) == Some(config.layer_flag);
            let no_scattering = rows
                .i64_at(msw_flag, row)
                .map_or(false, |v| (0..=config.max_msw_flag).contains(&v));
            let has_surface = rows
                .f64_at(surface_height, row)
                .map_or(false, |v| !rows.is_fill(schema, surface_height, v));
            clear && no_scattering && has_surface
        }
    }
}

/// Combined fill + quality decision
pub fn keep(row: usize, rows: &AlignedRowSet, schema: &ProductSchema, config: &QualityConfig) -> bool {
    fill_field(row, rows, schema).is_none() && passes_quality(row, rows, schema, config)
}

/// Row filter bound to one product and configuration
pub struct QualityFilter<'a> {
    schema: &'a ProductSchema,
    config: &'a QualityConfig,
    apply_quality: bool,
}

impl<'a> QualityFilter<'a> {
    pub fn new(schema: &'a ProductSchema, config: &'a QualityConfig, apply_quality: bool) -> Self {
        Self {
            schema,
            config,
            apply_quality,
        }
    }

    /// Fill exclusion always applies; the quality predicate only when enabled
    pub fn evaluate(&self, row: usize, rows: &AlignedRowSet) -> RowVerdict {
        if let Some(field) = fill_field(row, rows, self.schema) {
            return RowVerdict::Fill(field);
        }
        if self.apply_quality && !passes_quality(row, rows, self.schema, self.config) {
            return RowVerdict::Quality;
        }
        RowVerdict::Keep
    }
}
