use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kostal2mqtt::{
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self},
};
use log::{debug, info, warn};
use rumqttc::{
    tokio_rustls::{self, rustls::ClientConfig},
    AsyncClient, Event, MqttOptions, Packet, Transport,
};

const DEFAULT_CLIENT_ID: &str = "kostal-mqtt-publisher";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct RumqttcWrapper {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn tls_transport() -> Transport {
    // Use rustls-native-certs to load root certificates from the operating system.
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("could not load platform certificate: {e}");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("skipping platform certificate: {e}");
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Transport::tls_with_config(client_config.into())
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn publish<S, V>(
        &mut self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        // never waits: a full request queue is reported as an error
        Ok(self
            .client
            .try_publish(topic, match_qos(qos), retain, payload)?)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn connection_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    fn new(config: &MqttConfig, suffix: &str) -> Self {
        let use_tls = config.tls.is_some_and(|tls| tls);

        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let mut mqttoptions = MqttOptions::new(
            client_id + suffix,
            &config.host,
            config.port.unwrap_or_else(|| {
                if use_tls {
                    return 8883;
                }
                1883
            }),
        );
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if use_tls {
            mqttoptions.set_transport(tls_transport());
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, None) => None,
            (None, Some(_)) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 512);
        let connected = Arc::new(AtomicBool::new(false));
        let link = connected.clone();
        let epoch = Arc::new(AtomicU64::new(0));
        let sessions = epoch.clone();
        let host = config.host.clone();

        // the event loop has to be polled for anything to be sent; polling again after an
        // error reconnects
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        sessions.fetch_add(1, Ordering::Relaxed);
                        if !link.swap(true, Ordering::Relaxed) {
                            info!("connected to mqtt broker {host}");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if link.swap(false, Ordering::Relaxed) {
                            warn!("connection to mqtt broker {host} lost: {e}");
                        } else {
                            debug!("mqtt broker {host} unavailable: {e}");
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            epoch,
        }
    }
}
