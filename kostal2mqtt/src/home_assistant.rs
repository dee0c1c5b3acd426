use crate::canonical_record::{CanonicalKey, CanonicalRecord};
use crate::home_assistant_config::{DeviceConfig, SensorConfig};
use crate::metric_collector::MetricCollector;
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{MqttWrapper, QoS};

use log::{debug, error, warn};

const DISCOVERY_PREFIX: &str = "homeassistant";
const DEFAULT_NODE_ID: &str = "kostal_inverter";

/// Publishes the record as one JSON state message plus the MQTT discovery configs that let
/// Home Assistant create an entity per field.
pub struct HomeAssistant<MQTT: MqttWrapper> {
    client: MQTT,
    node_id: String,
    sensor_configs: Vec<SensorConfig>,
    // broker session in which every config went out
    announced_epoch: Option<u64>,
}

impl<MQTT: MqttWrapper> HomeAssistant<MQTT> {
    pub fn new(config: &MqttConfig) -> Self {
        let client = MQTT::new(config, "-ha");
        let node_id = config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_NODE_ID.to_string())
            .replace(|c: char| !c.is_ascii_alphanumeric() && c != '_', "_");
        let sensor_configs = create_sensor_configs(&node_id, &state_topic(&node_id));
        Self {
            client,
            node_id,
            sensor_configs,
            announced_epoch: None,
        }
    }

    pub fn state_topic(&self) -> String {
        state_topic(&self.node_id)
    }

    fn publish_json(&mut self, topic: &str, payload: &serde_json::Value) -> bool {
        debug!("Publishing to {topic} with payload {payload}");

        match self
            .client
            .publish(topic, QoS::AtMostOnce, true, payload.to_string())
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to publish message: {e:?}");
                false
            }
        }
    }

    /// Returns whether every config was handed to the client.
    fn publish_configs(&mut self) -> bool {
        // configs let home assistant know what sensors are available and where to find them
        let configs: Vec<(String, serde_json::Value)> = self
            .sensor_configs
            .iter()
            .filter_map(|sensor| {
                let topic = sensor.config_topic(DISCOVERY_PREFIX, &self.node_id);
                serde_json::to_value(sensor).ok().map(|payload| (topic, payload))
            })
            .collect();
        let mut complete = true;
        for (topic, payload) in configs {
            complete &= self.publish_json(&topic, &payload);
        }
        complete
    }
}

impl<MQTT: MqttWrapper> MetricCollector for HomeAssistant<MQTT> {
    fn publish(&mut self, record: &CanonicalRecord) {
        if !self.client.is_connected() {
            warn!("mqtt broker not connected, skipping this update");
            return;
        }
        // a new broker session may have lost the retained configs
        let epoch = self.client.connection_epoch();
        if self.announced_epoch != Some(epoch) {
            if self.publish_configs() {
                self.announced_epoch = Some(epoch);
            } else {
                warn!("discovery configs incomplete, announcing again next update");
            }
        }
        let state_topic = self.state_topic();
        self.publish_json(&state_topic, &record.to_json());
    }
}

fn state_topic(node_id: &str) -> String {
    format!("kostal/{node_id}/state")
}

fn create_sensor_configs(node_id: &str, state_topic: &str) -> Vec<SensorConfig> {
    let device_config = DeviceConfig::new(
        format!("KOSTAL Inverter {node_id}"),
        "Plenticore".to_string(),
        Vec::from([format!("kostal_{node_id}")]),
    );

    let mut sensors: Vec<SensorConfig> = CanonicalKey::ALL
        .iter()
        .map(|key| SensorConfig::for_key(state_topic, &device_config, *key))
        .collect();
    sensors.extend([
        SensorConfig::status(state_topic, &device_config),
        SensorConfig::flag(state_topic, &device_config, "is_producing", "Producing"),
        SensorConfig::flag(state_topic, &device_config, "is_consuming", "Consuming"),
    ]);
    sensors
}
