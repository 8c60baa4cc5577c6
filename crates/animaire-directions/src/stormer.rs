//! Centred-dipole direction resolver based on Størmer theory.
//!
//! The cutoff rigidity of a particle arriving at geomagnetic latitude λm
//! with zenith angle ε and azimuth ξ (clockwise from magnetic north) is
//!
//! ```text
//! Rc = 59.6 cos⁴λm / (1 + √(1 − sin ε · sin ξ · cos³λm))²   [GV]
//! ```
//!
//! which gives 14.9 cos⁴λm GV for vertical incidence and higher cutoffs
//! from the east than from the west. The asymptotic direction is taken as
//! the straight-line arrival direction, i.e. the sky direction the particle
//! comes from, without bending in the field.
//!
//! The dipole is static: the Kp index and the timestamp of a request do not
//! change the result.

use chrono::NaiveDateTime;

use animaire_core::engine::{CollaboratorError, DirectionResolver, ResolveRequest};
use animaire_core::types::{GeoPoint, RawDirectionRow, RawDirectionTable, ZenithAzimuth};

use crate::error::DirectionError;

/// Størmer constant for a centred dipole at one Earth radius (GV).
pub const STORMER_CONSTANT_GV: f64 = 59.6;

/// Geomagnetic north pole of the default dipole (degrees).
pub const DEFAULT_POLE: GeoPoint = GeoPoint {
    latitude: 80.65,
    longitude: 287.32,
};

const POLE_LATITUDE_OPTION: &str = "pole_latitude";
const POLE_LONGITUDE_OPTION: &str = "pole_longitude";

/// Resolver using a tilted, centred dipole.
#[derive(Debug, Clone)]
pub struct StormerResolver {
    pole: GeoPoint,
    default_angles: Vec<ZenithAzimuth>,
}

impl Default for StormerResolver {
    fn default() -> Self {
        Self {
            pole: DEFAULT_POLE,
            default_angles: vec![ZenithAzimuth::VERTICAL],
        }
    }
}

impl StormerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different geomagnetic north pole.
    pub fn with_pole(mut self, pole: GeoPoint) -> Self {
        self.pole = pole;
        self
    }

    /// Angles traced when a request names none.
    pub fn with_default_angles(mut self, angles: Vec<ZenithAzimuth>) -> Self {
        self.default_angles = angles;
        self
    }

    pub fn pole(&self) -> GeoPoint {
        self.pole
    }

    /// Geomagnetic latitude of `location` (degrees).
    pub fn geomagnetic_latitude(&self, location: &GeoPoint) -> f64 {
        geomagnetic_latitude(&self.pole, location)
    }

    /// Størmer cutoff rigidity at `location` for one arrival direction (GV).
    pub fn cutoff_rigidity(&self, location: &GeoPoint, angle: &ZenithAzimuth) -> f64 {
        cutoff_rigidity(&self.pole, location, angle)
    }

    fn trace(&self, pole: &GeoPoint, location: &GeoPoint, angle: &ZenithAzimuth) -> RawDirectionRow {
        let asymptotic = arrival_direction(location, angle);
        RawDirectionRow {
            latitude: location.latitude,
            longitude: location.longitude,
            zenith_deg: angle.zenith_deg,
            azimuth_deg: angle.azimuth_deg,
            asymptotic_latitude: asymptotic.latitude,
            asymptotic_longitude: asymptotic.longitude,
            cutoff_rigidity_gv: cutoff_rigidity(pole, location, angle),
        }
    }

    fn pole_for(&self, request: &ResolveRequest<'_>) -> Result<GeoPoint, DirectionError> {
        let mut pole = self.pole;
        for (key, value) in request.extra {
            let target = match key.as_str() {
                POLE_LATITUDE_OPTION => &mut pole.latitude,
                POLE_LONGITUDE_OPTION => &mut pole.longitude,
                other => {
                    log::warn!("Størmer resolver ignores option '{}'", other);
                    continue;
                }
            };
            *target = value.trim().parse().map_err(|_| DirectionError::InvalidOption {
                key: key.clone(),
                message: format!("'{}' is not a number", value),
            })?;
        }
        pole.validate().map_err(|e| DirectionError::InvalidOption {
            key: POLE_LATITUDE_OPTION.into(),
            message: e.detail(),
        })?;
        Ok(pole)
    }

    /// Trace every grid point for every angle, point-major.
    pub fn resolve_points(
        &self,
        points: &[GeoPoint],
        angles: &[ZenithAzimuth],
        pole: &GeoPoint,
    ) -> RawDirectionTable {
        let rows = points
            .iter()
            .flat_map(|p| angles.iter().map(move |a| self.trace(pole, p, a)))
            .collect();
        RawDirectionTable { rows }
    }
}

impl DirectionResolver for StormerResolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RawDirectionTable, CollaboratorError> {
        let pole = self.pole_for(request)?;
        let angles = request.angles.unwrap_or(self.default_angles.as_slice());
        log::debug!(
            "Størmer dipole (pole {:.2}N {:.2}E) for {} points x {} angles; Kp {} and {} do not alter the field",
            pole.latitude,
            pole.longitude,
            request.grid.len(),
            angles.len(),
            request.kp.value(),
            fmt_time(&request.date_and_time)
        );
        Ok(self.resolve_points(request.grid.points(), angles, &pole))
    }

    fn name(&self) -> &str {
        "Størmer dipole"
    }
}

fn fmt_time(t: &NaiveDateTime) -> String {
    t.format(animaire_core::types::DATETIME_FORMAT).to_string()
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Local (east, north, up) unit vectors at `location`.
fn local_frame(location: &GeoPoint) -> ([f64; 3], [f64; 3], [f64; 3]) {
    let lat = location.latitude.to_radians();
    let lon = location.longitude.to_radians();
    let east = [-lon.sin(), lon.cos(), 0.0];
    let north = [-lat.sin() * lon.cos(), -lat.sin() * lon.sin(), lat.cos()];
    (east, north, location.unit_vector())
}

fn geomagnetic_latitude(pole: &GeoPoint, location: &GeoPoint) -> f64 {
    dot(pole.unit_vector(), location.unit_vector())
        .clamp(-1.0, 1.0)
        .asin()
        .to_degrees()
}

/// Azimuth of magnetic north at `location`, clockwise from geographic north
/// (degrees). Zero where the direction is undefined.
fn magnetic_north_azimuth(pole: &GeoPoint, location: &GeoPoint) -> f64 {
    let (east, north, _) = local_frame(location);
    let m = pole.unit_vector();
    let (e, n) = (dot(m, east), dot(m, north));
    if e.abs() < 1e-12 && n.abs() < 1e-12 {
        0.0
    } else {
        e.atan2(n).to_degrees()
    }
}

fn cutoff_rigidity(pole: &GeoPoint, location: &GeoPoint, angle: &ZenithAzimuth) -> f64 {
    let lambda = geomagnetic_latitude(pole, location).to_radians();
    let xi = (angle.azimuth_deg - magnetic_north_azimuth(pole, location)).to_radians();
    let eps = angle.zenith_deg.to_radians();
    let cos_l = lambda.cos();
    let root = (1.0 - eps.sin() * xi.sin() * cos_l.powi(3)).max(0.0).sqrt();
    STORMER_CONSTANT_GV * cos_l.powi(4) / (1.0 + root).powi(2)
}

/// The sky direction a particle arriving at `location` along `angle` comes
/// from, as a geographic direction.
fn arrival_direction(location: &GeoPoint, angle: &ZenithAzimuth) -> GeoPoint {
    let (east, north, up) = local_frame(location);
    let z = angle.zenith_deg.to_radians();
    let a = angle.azimuth_deg.to_radians();
    let (se, sn, su) = (z.sin() * a.sin(), z.sin() * a.cos(), z.cos());
    GeoPoint::from_vector([
        se * east[0] + sn * north[0] + su * up[0],
        se * east[1] + sn * north[1] + su * up[1],
        se * east[2] + sn * north[2] + su * up[2],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use animaire_core::types::{KpIndex, SampleGrid, DEFAULT_ZENITH_AZIMUTHS};
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeMap;

    fn equatorial_dipole() -> StormerResolver {
        StormerResolver::new().with_pole(GeoPoint::new(90.0, 0.0))
    }

    #[test]
    fn test_vertical_cutoff_on_the_magnetic_equator() {
        let r = equatorial_dipole();
        let rc = r.cutoff_rigidity(&GeoPoint::new(0.0, 30.0), &ZenithAzimuth::VERTICAL);
        assert_abs_diff_eq!(rc, 14.9, epsilon = 1e-9);
    }

    #[test]
    fn test_cutoff_falls_towards_the_poles() {
        let r = StormerResolver::new();
        let v = ZenithAzimuth::VERTICAL;
        let low = r.cutoff_rigidity(&GeoPoint::new(0.0, 100.0), &v);
        let mid = r.cutoff_rigidity(&GeoPoint::new(50.0, 10.0), &v);
        let polar = r.cutoff_rigidity(&DEFAULT_POLE, &v);
        assert!(low > mid && mid > polar, "{} {} {}", low, mid, polar);
        assert_abs_diff_eq!(polar, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_east_west_asymmetry() {
        let r = equatorial_dipole();
        let p = GeoPoint::new(0.0, 0.0);
        let east = r.cutoff_rigidity(&p, &ZenithAzimuth::new(60.0, 90.0));
        let west = r.cutoff_rigidity(&p, &ZenithAzimuth::new(60.0, 270.0));
        assert!(east > west, "east {} should exceed west {}", east, west);
    }

    #[test]
    fn test_vertical_arrival_points_straight_up() {
        let p = GeoPoint::new(40.0, 20.0);
        let d = arrival_direction(&p, &ZenithAzimuth::VERTICAL);
        assert_abs_diff_eq!(d.latitude, 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(d.longitude, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inclined_arrival_tilts_towards_azimuth() {
        let p = GeoPoint::new(0.0, 0.0);
        let north = arrival_direction(&p, &ZenithAzimuth::new(30.0, 0.0));
        assert_abs_diff_eq!(north.latitude, 30.0, epsilon = 1e-9);
        let east = arrival_direction(&p, &ZenithAzimuth::new(30.0, 90.0));
        assert_abs_diff_eq!(east.longitude, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_resolve_is_point_major_and_uses_request_angles() {
        let grid = SampleGrid::from_pairs(&[(10.0, 0.0), (20.0, 5.0)]).unwrap();
        let extra = BTreeMap::new();
        let request = ResolveRequest {
            grid: &grid,
            kp: KpIndex::new(2).unwrap(),
            date_and_time: chrono::NaiveDate::from_ymd_opt(2005, 1, 20)
                .unwrap()
                .and_hms_opt(6, 49, 0)
                .unwrap(),
            cache_enabled: false,
            angles: Some(&DEFAULT_ZENITH_AZIMUTHS),
            extra: &extra,
        };
        let table = StormerResolver::new().resolve(&request).unwrap();
        assert_eq!(table.rows.len(), 18);
        assert_eq!(table.rows[0].latitude, 10.0);
        assert_eq!(table.rows[8].latitude, 10.0);
        assert_eq!(table.rows[9].latitude, 20.0);
        assert_eq!(table.rows[4].azimuth_deg, 270.0);

        let defaults = ResolveRequest {
            angles: None,
            ..request
        };
        assert_eq!(StormerResolver::new().resolve(&defaults).unwrap().rows.len(), 2);
    }

    #[test]
    fn test_pole_override_options() {
        let grid = SampleGrid::from_pairs(&[(0.0, 30.0)]).unwrap();
        let mut extra = BTreeMap::new();
        extra.insert("pole_latitude".to_string(), "90".to_string());
        extra.insert("pole_longitude".to_string(), "0".to_string());
        let request = ResolveRequest {
            grid: &grid,
            kp: KpIndex::new(0).unwrap(),
            date_and_time: NaiveDateTime::default(),
            cache_enabled: false,
            angles: None,
            extra: &extra,
        };
        let table = StormerResolver::new().resolve(&request).unwrap();
        assert_abs_diff_eq!(table.rows[0].cutoff_rigidity_gv, 14.9, epsilon = 1e-9);

        let mut bad = extra.clone();
        bad.insert("pole_latitude".to_string(), "north".to_string());
        let request = ResolveRequest {
            extra: &bad,
            ..request
        };
        assert!(StormerResolver::new().resolve(&request).is_err());
    }
}
