//! Resolver backed by a pre-computed table of asymptotic directions.
//!
//! The table is a comma-separated file with a header line:
//! ```text
//! latitude,longitude,zenith,azimuth,asymptotic_latitude,asymptotic_longitude,cutoff_rigidity_gv
//! 45.0,10.0,0.0,0.0,52.1,61.3,4.2
//! ...
//! ```
//!
//! Lines starting with `#` and blank lines are ignored. Typical sources are
//! offline particle-tracing runs exported for a fixed set of grid points.

use std::path::Path;

use animaire_core::engine::{CollaboratorError, DirectionResolver, ResolveRequest};
use animaire_core::types::{GeoPoint, RawDirectionRow, RawDirectionTable, ZenithAzimuth};

use crate::error::DirectionError;

const HEADER: [&str; 7] = [
    "latitude",
    "longitude",
    "zenith",
    "azimuth",
    "asymptotic_latitude",
    "asymptotic_longitude",
    "cutoff_rigidity_gv",
];

/// Matching tolerance for coordinates and angles (degrees).
pub const DEFAULT_TOLERANCE_DEG: f64 = 1e-6;

/// Looks directions up in a fixed table instead of tracing them.
#[derive(Debug, Clone)]
pub struct TabulatedResolver {
    rows: Vec<RawDirectionRow>,
    tolerance: f64,
}

impl TabulatedResolver {
    pub fn from_rows(rows: Vec<RawDirectionRow>) -> Self {
        Self {
            rows,
            tolerance: DEFAULT_TOLERANCE_DEG,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    /// Parse a table from CSV text.
    pub fn from_csv_str(content: &str) -> Result<Self, DirectionError> {
        let mut rows = Vec::new();
        let mut header_seen = false;

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();

            if !header_seen {
                if parts != HEADER {
                    return Err(DirectionError::Format {
                        line: line_no,
                        message: format!("Expected header '{}', got '{}'", HEADER.join(","), line),
                    });
                }
                header_seen = true;
                continue;
            }

            if parts.len() != HEADER.len() {
                return Err(DirectionError::Format {
                    line: line_no,
                    message: format!("Expected {} fields, got {}", HEADER.len(), parts.len()),
                });
            }
            let mut values = [0.0; 7];
            for (i, (slot, text)) in values.iter_mut().zip(&parts).enumerate() {
                *slot = text.parse().map_err(|_| DirectionError::Format {
                    line: line_no,
                    message: format!("Invalid {}: {}", HEADER[i], text),
                })?;
            }
            let location = GeoPoint::new(values[0], values[1]);
            location.validate().map_err(|e| DirectionError::Format {
                line: line_no,
                message: e.detail(),
            })?;

            rows.push(RawDirectionRow {
                latitude: values[0],
                longitude: values[1],
                zenith_deg: values[2],
                azimuth_deg: values[3],
                asymptotic_latitude: values[4],
                asymptotic_longitude: values[5],
                cutoff_rigidity_gv: values[6],
            });
        }

        if !header_seen {
            return Err(DirectionError::Format {
                line: 1,
                message: "Direction table is empty".into(),
            });
        }
        log::debug!("Loaded {} tabulated directions", rows.len());
        Ok(Self::from_rows(rows))
    }

    pub fn from_path(path: &Path) -> Result<Self, DirectionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(&content)
    }

    pub fn rows(&self) -> &[RawDirectionRow] {
        &self.rows
    }

    fn lookup(&self, location: &GeoPoint, angle: &ZenithAzimuth) -> Option<RawDirectionRow> {
        let tol = self.tolerance;
        self.rows
            .iter()
            .find(|r| {
                (r.latitude - location.latitude).abs() <= tol
                    && angle_diff(r.longitude, location.longitude) <= tol
                    && (r.zenith_deg - angle.zenith_deg).abs() <= tol
                    && angle_diff(r.azimuth_deg, angle.azimuth_deg) <= tol
            })
            .map(|r| RawDirectionRow {
                latitude: location.latitude,
                longitude: location.longitude,
                ..*r
            })
    }
}

/// Absolute difference of two angles modulo 360°.
fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

impl DirectionResolver for TabulatedResolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RawDirectionTable, CollaboratorError> {
        let vertical = [ZenithAzimuth::VERTICAL];
        let angles = request.angles.unwrap_or(&vertical);
        if !request.extra.is_empty() {
            log::warn!(
                "Tabulated resolver ignores options: {}",
                request.extra.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        let mut rows = Vec::with_capacity(request.grid.len() * angles.len());
        for point in request.grid.points() {
            for angle in angles {
                let row = self.lookup(point, angle).ok_or(DirectionError::MissingRow {
                    latitude: point.latitude,
                    longitude: point.longitude,
                    zenith_deg: angle.zenith_deg,
                    azimuth_deg: angle.azimuth_deg,
                })?;
                rows.push(row);
            }
        }
        Ok(RawDirectionTable { rows })
    }

    fn name(&self) -> &str {
        "tabulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animaire_core::types::{KpIndex, SampleGrid};
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;
    use std::io::Write;

    const TABLE: &str = "\
# exported directions
latitude,longitude,zenith,azimuth,asymptotic_latitude,asymptotic_longitude,cutoff_rigidity_gv
45.0,-10.0,0.0,0.0,50.0,60.0,4.5
45.0,-10.0,16.0,90.0,48.0,75.0,5.1

60.0,20.0,0.0,0.0,70.0,80.0,1.2
";

    fn request<'a>(
        grid: &'a SampleGrid,
        angles: Option<&'a [ZenithAzimuth]>,
        extra: &'a BTreeMap<String, String>,
    ) -> ResolveRequest<'a> {
        ResolveRequest {
            grid,
            kp: KpIndex::new(3).unwrap(),
            date_and_time: NaiveDateTime::default(),
            cache_enabled: true,
            angles,
            extra,
        }
    }

    #[test]
    fn test_parse_table() {
        let r = TabulatedResolver::from_csv_str(TABLE).unwrap();
        assert_eq!(r.rows().len(), 3);
        assert_eq!(r.rows()[1].azimuth_deg, 90.0);
        assert_eq!(r.rows()[2].cutoff_rigidity_gv, 1.2);
    }

    #[test]
    fn test_parse_errors_report_line_numbers() {
        let bad_header = "lat,lon\n1,2\n";
        match TabulatedResolver::from_csv_str(bad_header) {
            Err(DirectionError::Format { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected format error, got {:?}", other),
        }
        let bad_value = format!("{}\n1,2,3,4,5,6,x\n", HEADER.join(","));
        match TabulatedResolver::from_csv_str(&bad_value) {
            Err(DirectionError::Format { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("cutoff_rigidity_gv"));
            }
            other => panic!("expected format error, got {:?}", other),
        }
        assert!(TabulatedResolver::from_csv_str("# only a comment\n").is_err());
    }

    #[test]
    fn test_lookup_matches_longitude_modulo_360() {
        let r = TabulatedResolver::from_csv_str(TABLE).unwrap();
        let grid = SampleGrid::from_pairs(&[(45.0, 350.0), (60.0, 20.0)]).unwrap();
        let extra = BTreeMap::new();
        let table = r.resolve(&request(&grid, None, &extra)).unwrap();
        assert_eq!(table.rows.len(), 2);
        // Grid coordinates are echoed back as requested.
        assert_eq!(table.rows[0].longitude, 350.0);
        assert_eq!(table.rows[0].asymptotic_latitude, 50.0);
        assert_eq!(table.rows[1].cutoff_rigidity_gv, 1.2);
    }

    #[test]
    fn test_missing_row_is_an_error() {
        let r = TabulatedResolver::from_csv_str(TABLE).unwrap();
        let grid = SampleGrid::from_pairs(&[(60.0, 20.0)]).unwrap();
        let angles = [ZenithAzimuth::new(16.0, 90.0)];
        let extra = BTreeMap::new();
        let err = r.resolve(&request(&grid, Some(&angles), &extra)).unwrap_err();
        assert!(err.to_string().contains("No tabulated direction"));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let r = TabulatedResolver::from_path(file.path()).unwrap();
        assert_eq!(r.rows().len(), 3);
        assert!(matches!(
            TabulatedResolver::from_path(Path::new("/nonexistent/directions.csv")),
            Err(DirectionError::Io(_))
        ));
    }
}
