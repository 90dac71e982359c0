//! Point and footprint geometry for retained rows.
//!
//! Footprints are laid out in a local east/north metric frame around the
//! shot or segment centre and converted back to degrees with the WGS84
//! arc-length series. This is a planar approximation, adequate for
//! footprints of tens of metres; output stays in geographic coordinates.

use crate::core::aligned::AlignedRowSet;
use crate::core::schema::{Footprint, ProductSchema};
use crate::types::{GeometryMode, LidarError, LidarResult};
use std::f64::consts::TAU;

/// Local bearings further than this from the neighbourhood bearing are
/// replaced by it (radians)
pub const BEARING_TOLERANCE_RAD: f64 = 0.1;

/// Valid segments on either side used for the neighbourhood bearing
pub const BEARING_WINDOW: usize = 5;

/// Output geometry in geographic (lon, lat) coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point { lon: f64, lat: f64 },
    /// Closed exterior ring, first vertex repeated last
    Polygon { ring: Vec<(f64, f64)> },
}

impl Geometry {
    pub fn to_wkt(&self) -> String {
        match self {
            Geometry::Point { lon, lat } => format!("POINT ({} {})", lon, lat),
            Geometry::Polygon { ring } => {
                let coords: Vec<String> = ring.iter().map(|(x, y)| format!("{} {}", x, y)).collect();
                format!("POLYGON (({}))", coords.join(", "))
            }
        }
    }

    pub fn is_polygon(&self) -> bool {
        matches!(self, Geometry::Polygon { .. })
    }
}

/// Metres per degree of latitude and longitude at `lat_deg`
pub fn metres_per_degree(lat_deg: f64) -> (f64, f64) {
    let phi = lat_deg.to_radians();
    let per_lat = 111_132.92 - 559.82 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos()
        - 0.0023 * (6.0 * phi).cos();
    let per_lon = 111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos() + 0.118 * (5.0 * phi).cos();
    // Longitude degrees collapse at the poles
    (per_lat, per_lon.max(1.0))
}

/// Longitude folded into [-180, 180)
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Shift (lon, lat) by metric east/north offsets
fn offset(lon: f64, lat: f64, east_m: f64, north_m: f64) -> (f64, f64) {
    let (per_lat, per_lon) = metres_per_degree(lat);
    (wrap_longitude(lon + east_m / per_lon), lat + north_m / per_lat)
}

/// Regular polygon approximating a circle of `diameter_m`
pub fn circle_ring(lon: f64, lat: f64, diameter_m: f64, vertices: usize) -> Vec<(f64, f64)> {
    let radius = diameter_m / 2.0;
    let vertices = vertices.max(3);
    let mut ring: Vec<(f64, f64)> = (0..vertices)
        .map(|k| {
            let theta = TAU * k as f64 / vertices as f64;
            offset(lon, lat, radius * theta.sin(), radius * theta.cos())
        })
        .collect();
    ring.push(ring[0]);
    ring
}

/// Rectangle `along_m` x `across_m` centred on (lon, lat), long axis on `bearing`
pub fn segment_ring(lon: f64, lat: f64, bearing: f64, along_m: f64, across_m: f64) -> Vec<(f64, f64)> {
    let (sin_b, cos_b) = bearing.sin_cos();
    // Unit vectors (east, north) along and across track
    let along = (sin_b * along_m / 2.0, cos_b * along_m / 2.0);
    let across = (cos_b * across_m / 2.0, -sin_b * across_m / 2.0);

    let corners = [
        (along.0 - across.0, along.1 - across.1),
        (along.0 + across.0, along.1 + across.1),
        (-along.0 + across.0, -along.1 + across.1),
        (-along.0 - across.0, -along.1 - across.1),
    ];
    let mut ring: Vec<(f64, f64)> = corners
        .iter()
        .map(|(east, north)| offset(lon, lat, *east, *north))
        .collect();
    ring.push(ring[0]);
    ring
}

/// Azimuth from `from` to `to` (lon, lat), radians clockwise from north.
/// `None` when the points coincide.
pub fn bearing(from: (f64, f64), to: (f64, f64)) -> Option<f64> {
    let (per_lat, per_lon) = metres_per_degree((from.1 + to.1) / 2.0);
    // Shortest way round, so tracks crossing the antimeridian keep their heading
    let east = wrap_longitude(to.0 - from.0) * per_lon;
    let north = (to.1 - from.1) * per_lat;
    if east.abs() < 1e-9 && north.abs() < 1e-9 {
        return None;
    }
    Some(east.atan2(north).rem_euclid(TAU))
}

fn angular_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

/// Ground-track bearing of every row; `None` for rows without valid coordinates.
///
/// Interior segments use the bearing between their valid neighbours, the
/// first and last segment take the nearest interior segment's bearing.
/// Bearings deviating from the surrounding track by more than
/// [`BEARING_TOLERANCE_RAD`] are replaced by the surrounding track bearing.
pub fn track_bearings(coords: &[Option<(f64, f64)>]) -> Vec<Option<f64>> {
    let valid: Vec<usize> = (0..coords.len()).filter(|&i| coords[i].is_some()).collect();
    let mut bearings = vec![None; coords.len()];
    let at = |k: usize| coords[valid[k]].unwrap_or_default();

    match valid.len() {
        0 => return bearings,
        1 => {
            bearings[valid[0]] = Some(0.0);
            return bearings;
        }
        _ => {}
    }

    let last = valid.len() - 1;
    let local = |k: usize| -> Option<f64> {
        if last == 1 {
            return bearing(at(0), at(1));
        }
        // End segments lack a neighbour: borrow from the nearest interior one
        let k = k.clamp(1, last - 1);
        bearing(at(k - 1), at(k + 1))
    };
    let neighbourhood = |k: usize| -> Option<f64> {
        let lo = k.saturating_sub(BEARING_WINDOW);
        let hi = (k + BEARING_WINDOW).min(last);
        bearing(at(lo), at(hi))
    };

    for k in 0..=last {
        let reference = neighbourhood(k);
        let chosen = match (local(k), reference) {
            (Some(b), Some(r)) if angular_difference(b, r) > BEARING_TOLERANCE_RAD => r,
            (Some(b), _) => b,
            (None, Some(r)) => r,
            (None, None) => 0.0,
        };
        bearings[valid[k]] = Some(chosen);
    }
    bearings
}

/// Converts retained rows of one beam into geometries
pub struct GeometryBuilder<'a> {
    schema: &'a ProductSchema,
    mode: GeometryMode,
    bearings: Vec<Option<f64>>,
}

impl<'a> GeometryBuilder<'a> {
    /// Prepare a builder for one beam's rows (track bearings are computed
    /// here for along-track footprints)
    pub fn new(schema: &'a ProductSchema, mode: GeometryMode, rows: &AlignedRowSet) -> LidarResult<Self> {
        if mode == GeometryMode::Polygon && !schema.supports_polygons() {
            return Err(LidarError::Config(format!(
                "{} does not support polygon output",
                schema.id
            )));
        }

        let bearings = match (mode, schema.footprint) {
            (GeometryMode::Polygon, Footprint::TrackSegment { .. }) => {
                let coords: Vec<Option<(f64, f64)>> = (0..rows.row_count())
                    .map(|row| Self::coordinates(schema, row, rows))
                    .collect();
                track_bearings(&coords)
            }
            _ => Vec::new(),
        };

        Ok(Self {
            schema,
            mode,
            bearings,
        })
    }

    fn coordinates(schema: &ProductSchema, row: usize, rows: &AlignedRowSet) -> Option<(f64, f64)> {
        let lon = rows.f64_at(schema.longitude, row)?;
        let lat = rows.f64_at(schema.latitude, row)?;
        if rows.is_fill(schema, schema.longitude, lon)
            || rows.is_fill(schema, schema.latitude, lat)
            || lat.abs() > 90.0
            || lon.abs() > 180.0
        {
            return None;
        }
        Some((lon, lat))
    }

    /// Geometry for `row`; rows without usable coordinates fail with `FillValueRow`
    pub fn build(&self, row: usize, rows: &AlignedRowSet) -> LidarResult<Geometry> {
        let (lon, lat) = Self::coordinates(self.schema, row, rows).ok_or_else(|| {
            LidarError::FillValueRow {
                beam: rows.beam().name.clone(),
                row,
                field: format!("{}/{}", self.schema.longitude, self.schema.latitude),
            }
        })?;

        if self.mode == GeometryMode::Point {
            return Ok(Geometry::Point { lon, lat });
        }

        let ring = match self.schema.footprint {
            Footprint::Circle {
                diameter_m,
                vertices,
            } => circle_ring(lon, lat, diameter_m, vertices),
            Footprint::TrackSegment { along_m, across_m } => {
                let bearing = self.bearings.get(row).copied().flatten().unwrap_or(0.0);
                segment_ring(lon, lat, bearing, along_m, across_m)
            }
        };
        Ok(Geometry::Polygon { ring })
    }
}

/// Approximate ground distance in metres between two (lon, lat) points
pub fn local_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (per_lat, per_lon) = metres_per_degree((a.1 + b.1) / 2.0);
    (wrap_longitude(b.0 - a.0) * per_lon).hypot((b.1 - a.1) * per_lat)
}
