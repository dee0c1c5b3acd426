use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::field_catalog::ModuleRequests;

#[derive(Clone, Debug, Error)]
pub enum DeviceError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("account locked: {0}")]
    Lockout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("module {module} unavailable: {reason}")]
    PartialFetch { module: String, reason: String },
}

impl DeviceError {
    /// Short classification used as the `error` field of a failed record.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::Auth(_) => "authentication failed",
            DeviceError::Lockout(_) => "account locked",
            DeviceError::Transport(_) => "device unreachable",
            DeviceError::PartialFetch { .. } => "module unavailable",
        }
    }

    /// Human readable cause, with operator guidance where there is something to do.
    pub fn detail(&self) -> String {
        match self {
            DeviceError::Lockout(reason) => format!(
                "{reason}; the inverter blocks logins after repeated failures, \
                 check the configured password and wait for the lock to expire"
            ),
            DeviceError::Auth(reason) => {
                format!("{reason}; check the configured username and password")
            }
            DeviceError::Transport(reason) => reason.clone(),
            DeviceError::PartialFetch { module, reason } => format!("{module}: {reason}"),
        }
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeviceError::Transport(format!("request timed out: {e}"))
        } else {
            DeviceError::Transport(e.to_string())
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// read-only access without a login
    #[default]
    Anonymous,
    /// HTTP basic authentication on every request
    Basic,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub scheme: AuthScheme,
}

/// An open connection to the device. Closing it twice is a no-op.
#[derive(Debug)]
pub struct Session {
    base_url: String,
    credentials: Option<Credentials>,
    open: bool,
}

impl Session {
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            open: true,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credentials sent with each request, `None` for anonymous sessions.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Marks the session closed and reports whether it was still open.
    pub fn mark_closed(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }
}

/// A single process data value as reported by the device.
#[derive(Clone, Debug, PartialEq)]
pub struct RawPoint {
    pub module_id: String,
    pub identifier: String,
    pub value: Option<f64>,
    pub unit: String,
}

impl RawPoint {
    pub fn new(module_id: &str, identifier: &str, value: f64) -> Self {
        Self {
            module_id: module_id.to_string(),
            identifier: identifier.to_string(),
            value: Some(value),
            unit: String::new(),
        }
    }
}

/// Result of one fetch: all points that could be read plus one `PartialFetch` per module that
/// could not.
#[derive(Debug, Default)]
pub struct ProcessDataBatch {
    pub points: Vec<RawPoint>,
    pub failures: Vec<DeviceError>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub model: String,
    pub version: String,
    pub api_version: String,
    pub hostname: String,
}

#[async_trait]
pub trait DeviceClient: Send + Sync {
    // Implementations own the transport; the poll cycle only sees sessions, raw points and
    // classified errors.

    async fn connect(&self, host: &str, credentials: &Credentials)
        -> Result<Session, DeviceError>;

    /// Reads the requested points module by module. A failing module must not fail the batch;
    /// `Err` is reserved for a device on which no module delivered any point.
    async fn fetch_points(
        &self,
        session: &Session,
        requests: &ModuleRequests,
    ) -> Result<ProcessDataBatch, DeviceError>;

    async fn device_info(&self, session: &Session) -> Result<DeviceInfo, DeviceError>;

    /// Best-effort logout. Never fails; problems are logged.
    async fn close(&self, session: &mut Session);
}
