use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub tls: Option<bool>,
    /// prefix for the default per-field topics, `kostal/inverter` if unset
    pub topic_prefix: Option<String>,
    /// explicit record field -> topic table, replaces the default topics
    pub topics: Option<BTreeMap<String, String>>,
}

impl MqttConfig {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
    }
}
