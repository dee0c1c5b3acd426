//! Translation of raw process data into the canonical record.
//!
//! Grid power sign convention: negative values mean the inverter exports to the grid
//! (production), positive values mean the house imports from the grid (consumption).

use std::collections::HashSet;

use chrono::{DateTime, Local};
use serde_derive::{Deserialize, Serialize};

use crate::canonical_record::{CanonicalKey, CanonicalRecord, Telemetry};
use crate::device_client::RawPoint;
use crate::field_catalog;

/// What to publish as `energy_today` when the device reported no daily yield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyTodayFallback {
    /// keep the default of 0
    #[default]
    None,
    /// reuse the lifetime yield
    Total,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ValueMapper {
    energy_today_fallback: EnergyTodayFallback,
}

impl ValueMapper {
    pub fn new(energy_today_fallback: EnergyTodayFallback) -> Self {
        Self {
            energy_today_fallback,
        }
    }

    /// Maps a batch of points. Total and deterministic: unknown points and points without a
    /// value are skipped, and for repeated keys the last point wins.
    pub fn map(&self, points: &[RawPoint], captured_at: DateTime<Local>) -> CanonicalRecord {
        let mut telemetry = Telemetry::default();
        let mut reported = HashSet::new();

        for point in points {
            let Some(raw) = point.value else {
                continue;
            };
            if let Some(mapping) = field_catalog::lookup(&point.module_id, &point.identifier) {
                mapping.key.assign(&mut telemetry, mapping.convert(raw));
                reported.insert(mapping.key);
            }
        }

        if self.energy_today_fallback == EnergyTodayFallback::Total
            && !reported.contains(&CanonicalKey::EnergyToday)
        {
            telemetry.energy_today = telemetry.energy_total;
        }

        derive_flags(&mut telemetry);
        CanonicalRecord::new(captured_at, telemetry)
    }
}

fn derive_flags(telemetry: &mut Telemetry) {
    telemetry.is_producing = telemetry.grid_power < 0.0;
    telemetry.is_consuming = telemetry.grid_power > 0.0;
    telemetry.status = if telemetry.is_producing || telemetry.power > 0.0 {
        1
    } else {
        0
    };
}
