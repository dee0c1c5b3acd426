use std::collections::BTreeMap;

use crate::{
    canonical_record::{CanonicalKey, CanonicalRecord},
    metric_collector::MetricCollector,
    mqtt_config::MqttConfig,
    mqtt_wrapper::{MqttWrapper, QoS},
};

use log::{debug, warn};
use serde_json::Value;

pub const DEFAULT_TOPIC_PREFIX: &str = "kostal/inverter";

const DERIVED_FIELDS: [&str; 4] = ["timestamp", "is_producing", "is_consuming", "status"];
const ERROR_FIELDS: [&str; 2] = ["error", "error_detail"];

/// Publishes every record field to its own topic, e.g. `kostal/inverter/power`.
pub struct SimpleMqtt<MQTT: MqttWrapper> {
    client: MQTT,
    topics: BTreeMap<String, String>,
}

impl<MQTT: MqttWrapper> SimpleMqtt<MQTT> {
    pub fn new(config: &MqttConfig) -> Self {
        let client = MQTT::new(config, "-sm");
        Self {
            client,
            topics: topic_table(config),
        }
    }
}

/// The configured field -> topic table, or one topic per record field below the prefix.
pub fn topic_table(config: &MqttConfig) -> BTreeMap<String, String> {
    if let Some(topics) = &config.topics {
        return topics.clone();
    }
    let prefix = config
        .topic_prefix
        .as_deref()
        .unwrap_or(DEFAULT_TOPIC_PREFIX)
        .trim_end_matches('/');
    CanonicalKey::ALL
        .iter()
        .map(|key| key.name())
        .chain(DERIVED_FIELDS)
        .chain(ERROR_FIELDS)
        .map(|field| (field.to_string(), format!("{prefix}/{field}")))
        .collect()
}

impl<MQTT: MqttWrapper> MetricCollector for SimpleMqtt<MQTT> {
    fn publish(&mut self, record: &CanonicalRecord) {
        if !self.client.is_connected() {
            warn!("mqtt broker not connected, skipping this update");
            return;
        }

        let json = record.to_json();
        let Some(fields) = json.as_object() else {
            return;
        };

        for (field, topic) in &self.topics {
            let Some(value) = fields.get(field) else {
                continue;
            };
            let payload = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            // error fields only describe the current cycle, never retain them
            let retain = !ERROR_FIELDS.contains(&field.as_str());
            debug!("{topic} = {payload}");
            if let Err(e) = self
                .client
                .publish(topic.as_str(), QoS::AtMostOnce, retain, payload)
            {
                warn!("mqtt error: {e:?}")
            }
        }
    }
}
