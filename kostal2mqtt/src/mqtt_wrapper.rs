use crate::mqtt_config::MqttConfig;

#[derive(Clone, Copy, Debug)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

pub trait MqttWrapper: Send {
    // Decouples the publishers from a concrete MQTT client. The binary wraps
    // its client in a newtype implementing this trait, the tests record the
    // published messages instead.

    fn publish<S, V>(&mut self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;

    /// Whether the broker connection is currently up. Publishers skip a cycle while it is
    /// down instead of queueing messages.
    fn is_connected(&self) -> bool {
        true
    }

    /// Counts the broker sessions established so far. Retained announcements are sent again
    /// whenever it changes.
    fn connection_epoch(&self) -> u64 {
        0
    }

    fn new(config: &MqttConfig, suffix: &str) -> Self;
}
