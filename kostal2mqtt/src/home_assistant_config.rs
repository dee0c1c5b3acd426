use serde_derive::Serialize;

use crate::canonical_record::CanonicalKey;

/// `DeviceConfig` is used to define the configuration for a Home Assistant device
/// in the MQTT discovery protocol and is used to group entities together.
#[derive(Serialize, Clone)]
pub struct DeviceConfig {
    name: String,
    model: String,
    identifiers: Vec<String>,
    manufacturer: String,
    sw_version: String, // version of the bridge, not of the inverter firmware
}

impl DeviceConfig {
    pub fn new(name: String, model: String, identifiers: Vec<String>) -> Self {
        Self {
            name,
            model,
            identifiers,
            manufacturer: "KOSTAL".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `SensorConfig` is the discovery payload of a single entity.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/docs/mqtt/discovery/
#[derive(Serialize)]
pub struct SensorConfig {
    unique_id: String,
    name: String,
    state_topic: String,
    value_template: String,
    device: DeviceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_on: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_off: Option<&'static str>,
    #[serde(skip)]
    component: &'static str,
    #[serde(skip)]
    field: &'static str,
}

impl SensorConfig {
    fn new_sensor(
        state_topic: &str,
        device_config: &DeviceConfig,
        field: &'static str,
        name: &str,
    ) -> Self {
        SensorConfig {
            unique_id: format!("{}_{}", device_config.identifiers[0], field),
            name: name.to_string(),
            state_topic: state_topic.to_string(),
            value_template: format!("{{{{ value_json.{field} }}}}"),
            device: device_config.clone(),
            unit_of_measurement: None,
            device_class: None,
            state_class: None,
            payload_on: None,
            payload_off: None,
            component: "sensor",
            field,
        }
    }

    fn measurement(mut self, device_class: Option<&'static str>, unit: &'static str) -> Self {
        self.device_class = device_class;
        self.unit_of_measurement = Some(unit);
        self.state_class = Some("measurement");
        self
    }

    /// Sensor entity for one telemetry field.
    pub fn for_key(state_topic: &str, device_config: &DeviceConfig, key: CanonicalKey) -> Self {
        let sensor = Self::new_sensor(state_topic, device_config, key.name(), label(key));
        match key {
            CanonicalKey::Power
            | CanonicalKey::AcPower
            | CanonicalKey::DcPower
            | CanonicalKey::GridPower
            | CanonicalKey::HomeConsumption
            | CanonicalKey::HomeOwn
            | CanonicalKey::BatteryPower
            | CanonicalKey::PowerDc1
            | CanonicalKey::PowerDc2 => sensor.measurement(Some("power"), "W"),
            CanonicalKey::EnergyToday | CanonicalKey::EnergyTotal => {
                let mut sensor = sensor.measurement(Some("energy"), "kWh");
                sensor.state_class = Some("total_increasing");
                sensor
            }
            CanonicalKey::Temperature => sensor.measurement(Some("temperature"), "°C"),
            CanonicalKey::VoltageAc | CanonicalKey::VoltageDc1 | CanonicalKey::VoltageDc2 => {
                sensor.measurement(Some("voltage"), "V")
            }
            CanonicalKey::CurrentDc1 | CanonicalKey::CurrentDc2 => {
                sensor.measurement(Some("current"), "A")
            }
            CanonicalKey::Frequency => sensor.measurement(Some("frequency"), "Hz"),
            CanonicalKey::Co2SavingToday => sensor.measurement(Some("weight"), "kg"),
            CanonicalKey::AutarkyToday | CanonicalKey::OwnConsumptionRate => {
                sensor.measurement(None, "%")
            }
            CanonicalKey::InverterState => sensor,
        }
    }

    pub fn status(state_topic: &str, device_config: &DeviceConfig) -> Self {
        Self::new_sensor(state_topic, device_config, "status", "Status")
    }

    /// `binary_sensor` entity for a boolean record field.
    pub fn flag(
        state_topic: &str,
        device_config: &DeviceConfig,
        field: &'static str,
        name: &str,
    ) -> Self {
        let mut sensor = Self::new_sensor(state_topic, device_config, field, name);
        sensor.component = "binary_sensor";
        sensor.device_class = Some("power");
        sensor.value_template = format!("{{{{ 'ON' if value_json.{field} else 'OFF' }}}}");
        sensor.payload_on = Some("ON");
        sensor.payload_off = Some("OFF");
        sensor
    }

    /// Discovery topic below `prefix`, e.g. `homeassistant/sensor/<node>/power/config`.
    pub fn config_topic(&self, prefix: &str, node_id: &str) -> String {
        format!("{prefix}/{}/{node_id}/{}/config", self.component, self.field)
    }
}

fn label(key: CanonicalKey) -> &'static str {
    match key {
        CanonicalKey::Power => "Power",
        CanonicalKey::AcPower => "AC Power",
        CanonicalKey::DcPower => "DC Power",
        CanonicalKey::GridPower => "Grid Power",
        CanonicalKey::HomeConsumption => "Home Consumption",
        CanonicalKey::HomeOwn => "Home Own Consumption",
        CanonicalKey::BatteryPower => "Battery Power",
        CanonicalKey::EnergyToday => "Yield Today",
        CanonicalKey::EnergyTotal => "Yield Total",
        CanonicalKey::Temperature => "Temperature",
        CanonicalKey::VoltageAc => "Grid Voltage",
        CanonicalKey::Frequency => "Grid Frequency",
        CanonicalKey::VoltageDc1 => "DC 1 Voltage",
        CanonicalKey::CurrentDc1 => "DC 1 Current",
        CanonicalKey::PowerDc1 => "DC 1 Power",
        CanonicalKey::VoltageDc2 => "DC 2 Voltage",
        CanonicalKey::CurrentDc2 => "DC 2 Current",
        CanonicalKey::PowerDc2 => "DC 2 Power",
        CanonicalKey::Co2SavingToday => "CO2 Saving Today",
        CanonicalKey::AutarkyToday => "Autarky Today",
        CanonicalKey::OwnConsumptionRate => "Own Consumption Rate",
        CanonicalKey::InverterState => "Inverter State",
    }
}
