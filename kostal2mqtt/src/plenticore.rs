//! HTTP client for the local `/api/v1` interface of KOSTAL Plenticore inverters.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

use crate::device_client::{
    AuthScheme, Credentials, DeviceClient, DeviceError, DeviceInfo, ProcessDataBatch, RawPoint,
    Session,
};
use crate::field_catalog::ModuleRequests;

const SETTING_SERIAL: &str = "Properties:SerialNo";
const SETTING_PRODUCT_1: &str = "Branding:ProductName1";
const SETTING_PRODUCT_2: &str = "Branding:ProductName2";
const SETTING_VERSION: &str = "Properties:VersionMC";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VersionInfo {
    api_version: String,
    hostname: String,
    name: String,
    sw_version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthMe {
    authenticated: bool,
    locked: bool,
}

#[derive(Debug, Deserialize)]
struct ModuleProcessData {
    moduleid: String,
    #[serde(default)]
    processdata: Vec<ProcessDataValue>,
}

#[derive(Debug, Deserialize)]
struct ProcessDataValue {
    id: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ModuleSettings {
    #[serde(default)]
    settings: Vec<SettingValue>,
}

#[derive(Debug, Deserialize)]
struct SettingValue {
    id: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct PlenticoreClient {
    http: reqwest::Client,
}

impl PlenticoreClient {
    /// Every request, including connection setup, is bounded by `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self { http })
    }

    fn get(&self, session: &Session, path: &str) -> RequestBuilder {
        authorize(
            self.http.get(format!("{}/{path}", session.base_url())),
            session,
        )
    }

    async fn fetch_module(
        &self,
        session: &Session,
        module: &str,
        ids: &[String],
    ) -> Result<Vec<RawPoint>, DeviceError> {
        let response = self
            .get(session, &format!("processdata/{module}/{}", ids.join(",")))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return parse_process_data(response).await;
        }
        if is_session_rejection(status) || status.is_server_error() {
            return Err(read_failure(response).await);
        }

        // older firmware rejects the whole request when it does not know one of the ids;
        // read the complete module and keep what was asked for
        debug!("{module} rejected the id list ({status}), reading the complete module");
        let response = self
            .get(session, &format!("processdata/{module}"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            // only an unknown module is absent, anything else is a device failure
            return Err(match read_failure(response).await {
                DeviceError::Transport(reason) if status.is_client_error() => {
                    DeviceError::PartialFetch {
                        module: module.to_string(),
                        reason,
                    }
                }
                other => other,
            });
        }
        let points = parse_process_data(response).await?;
        Ok(points
            .into_iter()
            .filter(|point| ids.iter().any(|id| id.eq_ignore_ascii_case(&point.identifier)))
            .collect())
    }

    async fn read_settings(
        &self,
        session: &Session,
        module: &str,
        ids: &[&str],
    ) -> Result<Vec<SettingValue>, DeviceError> {
        let response = self
            .get(session, &format!("settings/{module}/{}", ids.join(",")))
            .send()
            .await?;
        let modules: Vec<ModuleSettings> = read_json(response).await?;
        Ok(modules
            .into_iter()
            .flat_map(|module| module.settings)
            .collect())
    }
}

#[async_trait]
impl DeviceClient for PlenticoreClient {
    async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Session, DeviceError> {
        let base_url = api_base_url(host);
        let response = self.http.get(format!("{base_url}/info/version")).send().await?;
        let version: VersionInfo = read_json(response).await?;
        debug!(
            "connected to {} ({}), api {}",
            version.hostname, version.name, version.api_version
        );

        let session = match credentials.scheme {
            AuthScheme::Anonymous => Session::new(base_url, None),
            AuthScheme::Basic => Session::new(base_url, Some(credentials.clone())),
        };

        let response = self.get(&session, "auth/me").send().await?;
        let me: AuthMe = read_json(response).await?;
        if me.locked {
            return Err(DeviceError::Lockout(format!(
                "user {} is locked by the inverter",
                credentials.username
            )));
        }
        if session.credentials().is_some() && !me.authenticated {
            return Err(DeviceError::Auth(format!(
                "user {} was not accepted",
                credentials.username
            )));
        }
        Ok(session)
    }

    async fn fetch_points(
        &self,
        session: &Session,
        requests: &ModuleRequests,
    ) -> Result<ProcessDataBatch, DeviceError> {
        let mut batch = ProcessDataBatch::default();
        let mut unreadable: Option<DeviceError> = None;

        for (module, ids) in requests {
            match self.fetch_module(session, module, ids).await {
                Ok(points) => {
                    debug!("{module}: {} points", points.len());
                    batch.points.extend(points);
                }
                Err(failure @ DeviceError::PartialFetch { .. }) => {
                    warn!("process data unavailable: {failure}");
                    batch.failures.push(failure);
                }
                Err(e) => {
                    warn!("process data of {module} unavailable: {e}");
                    batch.failures.push(DeviceError::PartialFetch {
                        module: module.clone(),
                        reason: e.to_string(),
                    });
                    unreadable.get_or_insert(e);
                }
            }
        }

        // a batch stands once at least one module delivered points; otherwise the cause of the
        // first device-level failure is reported, falling back to the first missing module
        if batch.points.is_empty() && !batch.failures.is_empty() {
            return Err(unreadable.unwrap_or_else(|| batch.failures.swap_remove(0)));
        }
        Ok(batch)
    }

    async fn device_info(&self, session: &Session) -> Result<DeviceInfo, DeviceError> {
        let response = self.get(session, "info/version").send().await?;
        let version: VersionInfo = read_json(response).await?;

        let mut info = DeviceInfo {
            model: version.name.clone(),
            version: version.sw_version.clone(),
            api_version: version.api_version,
            hostname: version.hostname,
            ..DeviceInfo::default()
        };

        let ids = [
            SETTING_SERIAL,
            SETTING_PRODUCT_1,
            SETTING_PRODUCT_2,
            SETTING_VERSION,
        ];
        let settings = match self.read_settings(session, "devices:local", &ids).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("device settings unavailable, identity is incomplete: {e}");
                Vec::new()
            }
        };

        let setting = |id: &str| {
            settings
                .iter()
                .find(|setting| setting.id.eq_ignore_ascii_case(id))
                .map(|setting| value_to_string(&setting.value))
                .filter(|value| !value.is_empty())
        };
        if let Some(serial) = setting(SETTING_SERIAL) {
            info.serial_number = serial;
        }
        let product = [setting(SETTING_PRODUCT_1), setting(SETTING_PRODUCT_2)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !product.is_empty() {
            info.model = product;
        }
        if let Some(version) = setting(SETTING_VERSION) {
            info.version = version;
        }
        Ok(info)
    }

    async fn close(&self, session: &mut Session) {
        if !session.mark_closed() {
            return;
        }
        if session.credentials().is_none() {
            return;
        }
        let request = authorize(
            self.http
                .post(format!("{}/auth/logout", session.base_url())),
            session,
        );
        match request.send().await {
            Ok(response) if response.status().is_success() => info!("logged out"),
            Ok(response) => warn!("logout rejected: {}", response.status()),
            Err(e) => warn!("logout failed: {e}"),
        }
    }
}

/// Accepts a bare host (`192.168.1.20`), a host with port, or a full base URL.
pub fn api_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}/api/v1")
    } else {
        format!("http://{host}/api/v1")
    }
}

fn authorize(request: RequestBuilder, session: &Session) -> RequestBuilder {
    match session.credentials() {
        Some(credentials) => {
            request.basic_auth(&credentials.username, Some(&credentials.password))
        }
        None => request,
    }
}

fn is_session_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Maps an unsuccessful HTTP answer onto the error taxonomy. The inverter reports locked
/// accounts only through its message text.
pub fn classify_failure(status: StatusCode, body: &str) -> DeviceError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|body| body.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    };

    if message.to_lowercase().contains("locked") {
        DeviceError::Lockout(message)
    } else if is_session_rejection(status) {
        DeviceError::Auth(message)
    } else {
        DeviceError::Transport(message)
    }
}

async fn read_failure(response: Response) -> DeviceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_failure(status, &body)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, DeviceError> {
    if !response.status().is_success() {
        return Err(read_failure(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| DeviceError::Transport(format!("malformed response: {e}")))
}

async fn parse_process_data(response: Response) -> Result<Vec<RawPoint>, DeviceError> {
    let modules: Vec<ModuleProcessData> = read_json(response).await?;
    Ok(modules
        .into_iter()
        .flat_map(|module| {
            let module_id = module.moduleid;
            module
                .processdata
                .into_iter()
                .map(move |data| RawPoint {
                    module_id: module_id.clone(),
                    identifier: data.id,
                    value: data.value.as_f64(),
                    unit: data.unit,
                })
        })
        .collect())
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
