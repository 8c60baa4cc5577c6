//! Pitch-angle annotation of resolved directions.

use chrono::NaiveDateTime;

use animaire_core::engine::{CollaboratorError, DirectionTableBuilder};
use animaire_core::types::{
    AsymptoticDirectionRow, AsymptoticDirectionTable, GeoPoint, RawDirectionTable,
};

/// Annotates every raw row with the angle between its asymptotic direction
/// and the reference direction of the pitch-angle distribution.
///
/// Row count and order are preserved. The builder is stateless, so
/// `cache_enabled` has no effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PitchAngleTableBuilder;

impl PitchAngleTableBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl DirectionTableBuilder for PitchAngleTableBuilder {
    fn build(
        &self,
        raw: &RawDirectionTable,
        reference: GeoPoint,
        date_and_time: NaiveDateTime,
        _cache_enabled: bool,
    ) -> Result<AsymptoticDirectionTable, CollaboratorError> {
        reference.validate()?;
        let rows = raw
            .rows
            .iter()
            .map(|r| AsymptoticDirectionRow {
                raw: *r,
                pitch_angle_deg: r.asymptotic_direction().angular_separation_deg(&reference),
            })
            .collect();
        Ok(AsymptoticDirectionTable {
            reference,
            date_and_time,
            rows,
        })
    }
}
