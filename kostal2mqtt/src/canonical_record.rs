use chrono::{DateTime, Local};
use serde_derive::{Deserialize, Serialize};

/// Every field the bridge publishes. The serialized name of each variant is the key used in
/// JSON records and in MQTT topic tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalKey {
    Power,
    AcPower,
    DcPower,
    GridPower,
    HomeConsumption,
    HomeOwn,
    BatteryPower,
    EnergyToday,
    EnergyTotal,
    Temperature,
    VoltageAc,
    Frequency,
    VoltageDc1,
    CurrentDc1,
    PowerDc1,
    VoltageDc2,
    CurrentDc2,
    PowerDc2,
    Co2SavingToday,
    AutarkyToday,
    OwnConsumptionRate,
    InverterState,
}

impl CanonicalKey {
    pub const ALL: [CanonicalKey; 22] = [
        CanonicalKey::Power,
        CanonicalKey::AcPower,
        CanonicalKey::DcPower,
        CanonicalKey::GridPower,
        CanonicalKey::HomeConsumption,
        CanonicalKey::HomeOwn,
        CanonicalKey::BatteryPower,
        CanonicalKey::EnergyToday,
        CanonicalKey::EnergyTotal,
        CanonicalKey::Temperature,
        CanonicalKey::VoltageAc,
        CanonicalKey::Frequency,
        CanonicalKey::VoltageDc1,
        CanonicalKey::CurrentDc1,
        CanonicalKey::PowerDc1,
        CanonicalKey::VoltageDc2,
        CanonicalKey::CurrentDc2,
        CanonicalKey::PowerDc2,
        CanonicalKey::Co2SavingToday,
        CanonicalKey::AutarkyToday,
        CanonicalKey::OwnConsumptionRate,
        CanonicalKey::InverterState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalKey::Power => "power",
            CanonicalKey::AcPower => "ac_power",
            CanonicalKey::DcPower => "dc_power",
            CanonicalKey::GridPower => "grid_power",
            CanonicalKey::HomeConsumption => "home_consumption",
            CanonicalKey::HomeOwn => "home_own",
            CanonicalKey::BatteryPower => "battery_power",
            CanonicalKey::EnergyToday => "energy_today",
            CanonicalKey::EnergyTotal => "energy_total",
            CanonicalKey::Temperature => "temperature",
            CanonicalKey::VoltageAc => "voltage_ac",
            CanonicalKey::Frequency => "frequency",
            CanonicalKey::VoltageDc1 => "voltage_dc1",
            CanonicalKey::CurrentDc1 => "current_dc1",
            CanonicalKey::PowerDc1 => "power_dc1",
            CanonicalKey::VoltageDc2 => "voltage_dc2",
            CanonicalKey::CurrentDc2 => "current_dc2",
            CanonicalKey::PowerDc2 => "power_dc2",
            CanonicalKey::Co2SavingToday => "co2_saving_today",
            CanonicalKey::AutarkyToday => "autarky_today",
            CanonicalKey::OwnConsumptionRate => "own_consumption_rate",
            CanonicalKey::InverterState => "inverter_state",
        }
    }

    /// Writes an already converted value into the matching telemetry field.
    pub fn assign(&self, telemetry: &mut Telemetry, value: f64) {
        let slot = match self {
            CanonicalKey::Power => &mut telemetry.power,
            CanonicalKey::AcPower => &mut telemetry.ac_power,
            CanonicalKey::DcPower => &mut telemetry.dc_power,
            CanonicalKey::GridPower => &mut telemetry.grid_power,
            CanonicalKey::HomeConsumption => &mut telemetry.home_consumption,
            CanonicalKey::HomeOwn => &mut telemetry.home_own,
            CanonicalKey::BatteryPower => &mut telemetry.battery_power,
            CanonicalKey::EnergyToday => &mut telemetry.energy_today,
            CanonicalKey::EnergyTotal => &mut telemetry.energy_total,
            CanonicalKey::Temperature => &mut telemetry.temperature,
            CanonicalKey::VoltageAc => &mut telemetry.voltage_ac,
            CanonicalKey::Frequency => &mut telemetry.frequency,
            CanonicalKey::VoltageDc1 => &mut telemetry.voltage_dc1,
            CanonicalKey::CurrentDc1 => &mut telemetry.current_dc1,
            CanonicalKey::PowerDc1 => &mut telemetry.power_dc1,
            CanonicalKey::VoltageDc2 => &mut telemetry.voltage_dc2,
            CanonicalKey::CurrentDc2 => &mut telemetry.current_dc2,
            CanonicalKey::PowerDc2 => &mut telemetry.power_dc2,
            CanonicalKey::Co2SavingToday => &mut telemetry.co2_saving_today,
            CanonicalKey::AutarkyToday => &mut telemetry.autarky_today,
            CanonicalKey::OwnConsumptionRate => &mut telemetry.own_consumption_rate,
            CanonicalKey::InverterState => {
                telemetry.inverter_state = value as i64;
                return;
            }
        };
        *slot = value;
    }
}

/// Normalized inverter telemetry. Every field defaults to zero/false so that a missing process
/// data point degrades to a default instead of an error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub power: f64,
    pub ac_power: f64,
    pub dc_power: f64,
    /// Negative while exporting to the grid, positive while importing.
    pub grid_power: f64,
    pub home_consumption: f64,
    pub home_own: f64,
    pub battery_power: f64,
    /// kWh
    pub energy_today: f64,
    /// kWh
    pub energy_total: f64,
    pub temperature: f64,
    pub voltage_ac: f64,
    pub frequency: f64,
    pub voltage_dc1: f64,
    pub current_dc1: f64,
    pub power_dc1: f64,
    pub voltage_dc2: f64,
    pub current_dc2: f64,
    pub power_dc2: f64,
    /// kg
    pub co2_saving_today: f64,
    /// %
    pub autarky_today: f64,
    /// %
    pub own_consumption_rate: f64,
    pub is_producing: bool,
    pub is_consuming: bool,
    /// 1 while producing, 0 otherwise
    pub status: i64,
    /// raw vendor operating state, see `Inverter:State`
    pub inverter_state: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleFailure {
    pub error: String,
    pub error_detail: String,
}

/// The record published once per poll cycle. It carries either mapped telemetry or, when the
/// cycle failed, default telemetry plus `error`/`error_detail`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub telemetry: Telemetry,
    #[serde(flatten)]
    failure: Option<CycleFailure>,
}

impl CanonicalRecord {
    pub fn new(timestamp: DateTime<Local>, telemetry: Telemetry) -> Self {
        Self {
            timestamp,
            telemetry,
            failure: None,
        }
    }

    pub fn failed(
        timestamp: DateTime<Local>,
        error: impl Into<String>,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            telemetry: Telemetry::default(),
            failure: Some(CycleFailure {
                error: error.into(),
                error_detail: error_detail.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&CycleFailure> {
        self.failure.as_ref()
    }

    /// The record as a flat JSON object, the shape shared by every publisher.
    pub fn to_json(&self) -> serde_json::Value {
        // a struct of plain fields always serializes
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_are_unique() {
        let mut names: Vec<_> = CanonicalKey::ALL.iter().map(|key| key.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CanonicalKey::ALL.len());
    }

    #[test]
    fn every_key_is_a_serialized_field() {
        let json = CanonicalRecord::new(Local::now(), Telemetry::default()).to_json();
        for key in CanonicalKey::ALL {
            assert!(json.get(key.name()).is_some(), "{} missing", key.name());
        }
    }

    #[test]
    fn failed_record_carries_error_fields_and_defaults() {
        let record = CanonicalRecord::failed(Local::now(), "authentication failed", "bad password");
        let json = record.to_json();
        assert_eq!(json["error"], "authentication failed");
        assert_eq!(json["error_detail"], "bad password");
        assert_eq!(json["power"], 0.0);
        assert!(!record.is_success());
        assert_eq!(record.telemetry, Telemetry::default());
    }

    #[test]
    fn successful_record_has_no_error_fields() {
        let json = CanonicalRecord::new(Local::now(), Telemetry::default()).to_json();
        assert!(json.get("error").is_none());
        assert!(json.get("error_detail").is_none());
    }
}
