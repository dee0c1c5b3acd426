use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result};
use kostal2mqtt::device_client::{AuthScheme, Credentials};
use kostal2mqtt::mqtt_config::MqttConfig;
use kostal2mqtt::poll_cycle::{PollSettings, DEFAULT_CALL_TIMEOUT, DEFAULT_UPDATE_INTERVAL};
use kostal2mqtt::simple_mqtt;
use kostal2mqtt::value_mapper::EnergyTodayFallback;
use log::{info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::cli::SetupArgs;

pub const CONFIG_FILE: &str = "config.toml";
const DEFAULT_USERNAME: &str = "pvserver";
const MIN_UPDATE_INTERVAL_MS: u64 = 1_000;
/// platform names of the KOSTAL entries in a Homebridge config.json
const HOST_PLATFORMS: [&str; 2] = ["KostalInverter", "KostalEnergyGenerator"];

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub inverter_host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth: Option<AuthScheme>,
    /// milliseconds between two polls
    pub update_interval: Option<u64>,
    /// milliseconds per device request
    pub request_timeout: Option<u64>,
    pub energy_today_fallback: Option<EnergyTodayFallback>,
    /// print every record as a JSON line, on unless disabled
    pub stdout: Option<bool>,
    pub home_assistant: Option<MqttConfig>,
    pub simple_mqtt: Option<MqttConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct HostConfig {
    #[serde(default)]
    platforms: Vec<HostPlatform>,
}

#[derive(Debug, Default, Deserialize)]
struct HostPlatform {
    #[serde(default)]
    platform: String,
    kostal: Option<HostInverter>,
    mqtt: Option<HostMqtt>,
}

#[derive(Debug, Default, Deserialize)]
struct HostInverter {
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostMqtt {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    topics: Option<BTreeMap<String, String>>,
}

/// `config.toml` in the working directory, otherwise next to the executable.
pub fn locate(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let in_cwd = PathBuf::from(CONFIG_FILE);
    if in_cwd.exists() {
        return in_cwd;
    }
    match env::current_exe() {
        Ok(mut path) => {
            path.pop();
            path.push(CONFIG_FILE);
            if path.exists() {
                path
            } else {
                in_cwd
            }
        }
        Err(_) => in_cwd,
    }
}

/// `~/.homebridge/config.json`, if there is one.
pub fn default_host_config() -> Option<PathBuf> {
    let path = PathBuf::from(env::var_os("HOME")?)
        .join(".homebridge")
        .join("config.json");
    path.exists().then_some(path)
}

/// Host config topic names that differ from the record field names.
fn record_field(host_topic_key: &str) -> &str {
    match host_topic_key {
        "energy" => "energy_today",
        "voltage" => "voltage_ac",
        other => other,
    }
}

impl Config {
    pub fn is_valid(&self) -> bool {
        !self.inverter_host.trim().is_empty()
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            info!("{} does not exist, starting from defaults", path.display());
            return Ok(Config::default());
        }
        info!("loading configuration from {}", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("{} unparsable", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("config not serializable")?;
        fs::write(path, contents).with_context(|| format!("Could not write {}", path.display()))
    }

    /// Overrides inverter and MQTT parameters from the first KOSTAL platform entry of a
    /// Homebridge config.json. Returns whether such an entry was found.
    pub fn apply_host_config(&mut self, path: &Path) -> Result<bool> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let host: HostConfig = serde_json::from_str(&contents)
            .with_context(|| format!("{} unparsable", path.display()))?;
        let Some(platform) = host
            .platforms
            .into_iter()
            .find(|entry| HOST_PLATFORMS.contains(&entry.platform.as_str()))
        else {
            return Ok(false);
        };

        if let Some(inverter) = platform.kostal {
            if let Some(host) = inverter.host.filter(|host| !host.is_empty()) {
                self.inverter_host = host;
            }
            if inverter.username.is_some() {
                self.username = inverter.username;
            }
            if inverter.password.is_some() {
                self.password = inverter.password;
            }
        }

        if let Some(mqtt) = platform.mqtt.filter(|mqtt| mqtt.host.is_some()) {
            let target = self.simple_mqtt.get_or_insert_with(MqttConfig::default);
            if let Some(host) = mqtt.host {
                target.host = host;
            }
            target.port = mqtt.port.or(target.port);
            target.username = mqtt.username.or(target.username.take());
            target.password = mqtt.password.or(target.password.take());
            target.client_id = mqtt.client_id.or(target.client_id.take());
            if let Some(topics) = mqtt.topics {
                // the platform subscribes to these topics, the remaining fields keep theirs
                let mut table = simple_mqtt::topic_table(&MqttConfig {
                    topics: None,
                    ..target.clone()
                });
                table.extend(
                    topics
                        .into_iter()
                        .map(|(key, topic)| (record_field(&key).to_string(), topic)),
                );
                target.topics = Some(table);
            }
        }
        Ok(true)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    /// Environment overrides. MQTT values apply to every configured MQTT output, or create a
    /// per-field output when there is none.
    pub fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        // $INVERTER_HOST
        if let Some(inverter_host) = var("INVERTER_HOST") {
            self.inverter_host = inverter_host;
        }
        // $INVERTER_USERNAME, $INVERTER_PASSWORD (optional)
        if let Some(username) = var("INVERTER_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = var("INVERTER_PASSWORD") {
            self.password = Some(password);
        }

        let host = var("MQTT_BROKER_HOST");
        let username = var("MQTT_USERNAME");
        let password = var("MQTT_PASSWORD");
        let port = var("MQTT_PORT").map(|port| match port.parse() {
            Ok(port) => port,
            Err(_) => {
                warn!("MQTT_PORT {port} is not a port number, using 1883");
                1883
            }
        });
        if host.is_none() && username.is_none() && password.is_none() && port.is_none() {
            return;
        }

        if self.simple_mqtt.is_none() && self.home_assistant.is_none() {
            self.simple_mqtt = Some(MqttConfig::default());
        }
        for mqtt in [&mut self.simple_mqtt, &mut self.home_assistant]
            .into_iter()
            .flatten()
        {
            if let Some(host) = &host {
                mqtt.host = host.clone();
            }
            if username.is_some() {
                mqtt.username = username.clone();
            }
            if password.is_some() {
                mqtt.password = password.clone();
            }
            if port.is_some() {
                mqtt.port = port;
            }
        }
    }

    pub fn apply_setup(&mut self, setup: &SetupArgs) {
        self.inverter_host = setup.host.clone();
        if setup.username.is_some() {
            self.username = setup.username.clone();
        }
        if setup.password.is_some() {
            self.password = setup.password.clone();
        }
        if let Some(auth) = setup.auth {
            self.auth = Some(auth.into());
        }
        if setup.update_interval.is_some() {
            self.update_interval = setup.update_interval;
        }
        if let Some(fallback) = setup.energy_today_fallback {
            self.energy_today_fallback = Some(fallback.into());
        }
        if let Some(mqtt_host) = &setup.mqtt_host {
            let mqtt = MqttConfig {
                host: mqtt_host.clone(),
                port: setup.mqtt_port,
                username: setup.mqtt_username.clone(),
                password: setup.mqtt_password.clone(),
                ..self.simple_mqtt.clone().unwrap_or_default()
            };
            if setup.home_assistant {
                self.home_assistant = Some(MqttConfig {
                    topics: None,
                    topic_prefix: None,
                    ..mqtt.clone()
                });
            }
            self.simple_mqtt = Some(mqtt);
        }
    }

    pub fn update_interval(&self) -> Duration {
        match self.update_interval {
            Some(value) if value >= MIN_UPDATE_INTERVAL_MS => {
                info!(
                    "using non-default update interval of {:.2}s",
                    value as f64 / 1000.
                );
                Duration::from_millis(value)
            }
            Some(value) => {
                warn!(
                    "update interval of {value}ms is below {MIN_UPDATE_INTERVAL_MS}ms, using default of {:.2}s",
                    DEFAULT_UPDATE_INTERVAL.as_secs_f64()
                );
                DEFAULT_UPDATE_INTERVAL
            }
            None => {
                info!(
                    "using default update interval of {:.2}s",
                    DEFAULT_UPDATE_INTERVAL.as_secs_f64()
                );
                DEFAULT_UPDATE_INTERVAL
            }
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        let credentials = Credentials {
            username: self
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: self.password.clone().unwrap_or_default(),
            scheme: self.auth.unwrap_or_default(),
        };
        let mut settings = PollSettings::new(self.inverter_host.trim(), credentials);
        settings.update_interval = self.update_interval();
        settings.call_timeout = self
            .request_timeout
            .filter(|timeout| *timeout > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);
        settings.energy_today_fallback = self.energy_today_fallback.unwrap_or_default();
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn parse(contents: &str) -> Config {
        toml::from_str(contents).unwrap()
    }

    #[test]
    fn minimal_file() {
        let config = parse(r#"inverter_host = "192.168.1.20""#);
        assert!(config.is_valid());
        let settings = config.poll_settings();
        assert_eq!(settings.host, "192.168.1.20");
        assert_eq!(settings.credentials.username, "pvserver");
        assert_eq!(settings.credentials.scheme, AuthScheme::Anonymous);
        assert_eq!(settings.update_interval, DEFAULT_UPDATE_INTERVAL);
        assert_eq!(settings.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(settings.energy_today_fallback, EnergyTodayFallback::None);
    }

    #[test]
    fn full_file() {
        let config = parse(
            r#"
            inverter_host = "inverter.local"
            username = "user"
            password = "secret"
            auth = "basic"
            update_interval = 10000
            request_timeout = 2000
            energy_today_fallback = "total"
            stdout = false

            [simple_mqtt]
            host = "broker"
            port = 1884

            [simple_mqtt.topics]
            power = "solar/power"
            "#,
        );
        let settings = config.poll_settings();
        assert_eq!(settings.credentials.scheme, AuthScheme::Basic);
        assert_eq!(settings.credentials.password, "secret");
        assert_eq!(settings.update_interval, Duration::from_secs(10));
        assert_eq!(settings.call_timeout, Duration::from_secs(2));
        assert_eq!(settings.energy_today_fallback, EnergyTodayFallback::Total);
        assert_eq!(config.stdout, Some(false));
        let mqtt = config.simple_mqtt.unwrap();
        assert_eq!(mqtt.port, Some(1884));
        assert_eq!(mqtt.topics.unwrap()["power"], "solar/power");
    }

    #[test]
    fn too_short_interval_uses_default() {
        let config = parse("inverter_host = \"x\"\nupdate_interval = 10");
        assert_eq!(config.update_interval(), DEFAULT_UPDATE_INTERVAL);
    }

    #[test]
    fn missing_host_is_invalid() {
        assert!(!parse("").is_valid());
        assert!(!parse(r#"inverter_host = "  ""#).is_valid());
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("INVERTER_HOST", "10.0.0.5"),
            ("MQTT_BROKER_HOST", "broker"),
            ("MQTT_PORT", "not-a-port"),
        ]
        .into_iter()
        .collect();
        let mut config = parse(r#"inverter_host = "192.168.1.20""#);
        config.apply_env_from(|key| vars.get(key).map(|value| value.to_string()));

        assert_eq!(config.inverter_host, "10.0.0.5");
        let mqtt = config.simple_mqtt.unwrap();
        assert_eq!(mqtt.host, "broker");
        assert_eq!(mqtt.port, Some(1883));
        assert!(config.home_assistant.is_none());
    }

    #[test]
    fn environment_without_mqtt_keeps_outputs() {
        let mut config = parse(r#"inverter_host = "192.168.1.20""#);
        config.apply_env_from(|_| None);
        assert!(config.simple_mqtt.is_none());
        assert_eq!(config.inverter_host, "192.168.1.20");
    }

    #[test]
    fn host_config_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "bridge": {{ "name": "Homebridge" }},
                "platforms": [
                    {{ "platform": "Other", "kostal": {{ "host": "wrong" }} }},
                    {{
                        "platform": "KostalInverter",
                        "kostal": {{ "host": "192.168.178.71", "password": "pw" }},
                        "mqtt": {{
                            "host": "localhost",
                            "clientId": "homebridge-kostal",
                            "topics": {{ "energy": "pv/energy", "power": "pv/power" }}
                        }}
                    }}
                ]
            }}"#
        )
        .unwrap();

        let mut config = parse(r#"inverter_host = "192.168.1.20""#);
        assert!(config.apply_host_config(file.path()).unwrap());
        assert_eq!(config.inverter_host, "192.168.178.71");
        assert_eq!(config.password.as_deref(), Some("pw"));

        let mqtt = config.simple_mqtt.unwrap();
        assert_eq!(mqtt.host, "localhost");
        assert_eq!(mqtt.client_id.as_deref(), Some("homebridge-kostal"));
        let topics = mqtt.topics.unwrap();
        assert_eq!(topics["energy_today"], "pv/energy");
        assert_eq!(topics["power"], "pv/power");
        assert_eq!(topics["power_dc1"], "kostal/inverter/power_dc1");
    }

    #[test]
    fn host_config_without_platform_changes_nothing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "platforms": [ {{ "platform": "Other" }} ] }}"#).unwrap();

        let mut config = parse(r#"inverter_host = "192.168.1.20""#);
        assert!(!config.apply_host_config(file.path()).unwrap());
        assert_eq!(config.inverter_host, "192.168.1.20");
    }

    #[test]
    fn setup_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = Config::from_file(&path).unwrap();
        config.apply_setup(&SetupArgs {
            host: "192.168.1.20".to_string(),
            username: None,
            password: Some("secret".to_string()),
            auth: Some(crate::cli::AuthArg::Basic),
            update_interval: Some(15_000),
            energy_today_fallback: None,
            mqtt_host: Some("broker".to_string()),
            mqtt_port: Some(1884),
            mqtt_username: None,
            mqtt_password: None,
            home_assistant: true,
        });
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.inverter_host, "192.168.1.20");
        assert_eq!(loaded.password.as_deref(), Some("secret"));
        assert_eq!(loaded.auth, Some(AuthScheme::Basic));
        assert_eq!(loaded.update_interval, Some(15_000));
        assert_eq!(loaded.simple_mqtt.unwrap().port, Some(1884));
        assert_eq!(loaded.home_assistant.unwrap().host, "broker");
    }
}
