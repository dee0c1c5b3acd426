use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};
use tokio::time::{error::Elapsed, timeout};
use tokio_util::sync::CancellationToken;

use crate::canonical_record::CanonicalRecord;
use crate::device_client::{Credentials, DeviceClient, DeviceError, DeviceInfo, Session};
use crate::field_catalog::{self, ModuleRequests};
use crate::metric_collector::MetricCollector;
use crate::value_mapper::{EnergyTodayFallback, ValueMapper};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
// the id list and, when the device rejects it, the complete module
const REQUESTS_PER_MODULE: u32 = 2;

/// Immutable settings of the polling loop, built once at startup.
#[derive(Clone, Debug)]
pub struct PollSettings {
    pub host: String,
    pub credentials: Credentials,
    pub update_interval: Duration,
    /// upper bound for every single device call
    pub call_timeout: Duration,
    pub energy_today_fallback: EnergyTodayFallback,
}

impl PollSettings {
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            credentials,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            energy_today_fallback: EnergyTodayFallback::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkState {
    Unknown,
    Online,
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Connecting,
    Fetching,
    Mapping,
    Publishing,
    ErrorRecorded,
}

pub struct PollCycleController<D: DeviceClient> {
    device: D,
    settings: PollSettings,
    requests: ModuleRequests,
    mapper: ValueMapper,
    collectors: Vec<Box<dyn MetricCollector>>,
    network: NetworkState,
    state: CycleState,
}

impl<D: DeviceClient> PollCycleController<D> {
    pub fn new(
        device: D,
        settings: PollSettings,
        collectors: Vec<Box<dyn MetricCollector>>,
    ) -> Self {
        let mapper = ValueMapper::new(settings.energy_today_fallback);
        Self {
            device,
            settings,
            requests: field_catalog::module_requests(),
            mapper,
            collectors,
            network: NetworkState::Unknown,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn network_state(&self) -> NetworkState {
        self.network
    }

    fn enter(&mut self, state: CycleState) {
        debug!("{:?} -> {state:?}", self.state);
        self.state = state;
    }

    fn set_network_state(&mut self, new_state: NetworkState) {
        if self.network != new_state {
            self.network = new_state;
            info!("Inverter is {new_state:?}");
        }
    }

    /// Polls until `shutdown` is cancelled. Failed cycles are published and retried on the
    /// next tick; nothing inside the loop ends it.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "polling {} every {:.2}s",
            self.settings.host,
            self.settings.update_interval.as_secs_f64()
        );
        while !shutdown.is_cancelled() {
            if self.run_cycle(&shutdown).await.is_none() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.update_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("polling stopped");
    }

    /// One connect -> fetch -> map -> publish pass. Every collector receives exactly one
    /// record, the success or the error variant. Returns `None` only when `shutdown` interrupted
    /// the cycle before anything was published.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> Option<CanonicalRecord> {
        let record = self.acquire(shutdown).await?;

        self.enter(CycleState::Publishing);
        for collector in self.collectors.iter_mut() {
            collector.publish(&record);
        }
        self.enter(CycleState::Idle);
        Some(record)
    }

    async fn acquire(&mut self, shutdown: &CancellationToken) -> Option<CanonicalRecord> {
        self.enter(CycleState::Connecting);
        let limit = self.settings.call_timeout;
        let connected = tokio::select! {
            result = timeout(
                limit,
                self.device.connect(&self.settings.host, &self.settings.credentials),
            ) => within(result, "connect", limit),
            _ = shutdown.cancelled() => return None,
        };
        let mut session = match connected {
            Ok(session) => session,
            Err(e) => return Some(self.record_error(&e)),
        };

        self.enter(CycleState::Fetching);
        let limit =
            self.settings.call_timeout * REQUESTS_PER_MODULE * self.requests.len().max(1) as u32;
        let fetched = tokio::select! {
            result = timeout(limit, self.device.fetch_points(&session, &self.requests)) => {
                Some(within(result, "fetch", limit))
            }
            _ = shutdown.cancelled() => None,
        };

        // the session is torn down exactly once, whatever the fetch produced
        self.close(&mut session).await;

        let batch = match fetched? {
            Ok(batch) => batch,
            Err(e) => return Some(self.record_error(&e)),
        };
        self.set_network_state(NetworkState::Online);
        if !batch.failures.is_empty() {
            debug!(
                "{} module(s) unavailable, their fields keep default values",
                batch.failures.len()
            );
        }

        self.enter(CycleState::Mapping);
        Some(self.mapper.map(&batch.points, Local::now()))
    }

    async fn close(&self, session: &mut Session) {
        let limit = self.settings.call_timeout;
        if timeout(limit, self.device.close(session)).await.is_err() {
            warn!("logout did not finish within {limit:?}");
        }
    }

    fn record_error(&mut self, e: &DeviceError) -> CanonicalRecord {
        self.enter(CycleState::ErrorRecorded);
        match e {
            DeviceError::Lockout(_) => {
                self.set_network_state(NetworkState::Online);
                error!("{e}. Verify the password, the next attempt follows in the next cycle");
            }
            DeviceError::Auth(_) => {
                self.set_network_state(NetworkState::Online);
                error!("{e}");
            }
            DeviceError::Transport(_) | DeviceError::PartialFetch { .. } => {
                self.set_network_state(NetworkState::Offline);
                debug!("{e}");
            }
        }
        CanonicalRecord::failed(Local::now(), e.kind(), e.detail())
    }

    /// Reads the identity of the device in its own session.
    pub async fn identify(&self) -> Result<DeviceInfo, DeviceError> {
        let limit = self.settings.call_timeout;
        let mut session = within(
            timeout(
                limit,
                self.device
                    .connect(&self.settings.host, &self.settings.credentials),
            )
            .await,
            "connect",
            limit,
        )?;
        let info = within(
            timeout(limit * 2, self.device.device_info(&session)).await,
            "device info",
            limit * 2,
        );
        self.close(&mut session).await;
        info
    }
}

fn within<T>(
    result: Result<Result<T, DeviceError>, Elapsed>,
    call: &str,
    limit: Duration,
) -> Result<T, DeviceError> {
    result.unwrap_or_else(|_| {
        Err(DeviceError::Transport(format!(
            "{call} timed out after {:.1}s",
            limit.as_secs_f64()
        )))
    })
}
