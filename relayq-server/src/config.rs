use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};

use crate::core::constants::{
    DEFAULT_BROKERS_DIR, DEFAULT_BROKER_NAME, DEFAULT_HOST, DEFAULT_POOL_SERVICE,
    DEFAULT_POOL_SIZE, DEFAULT_PORT, DEFAULT_WORKER_ENDPOINT, HEARTBEAT_INTERVAL,
    HEARTBEAT_LIVENESS,
};
use crate::core::error::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Match requests to idle workers of the named service.
    Service,
    /// Forward frames to workers round-robin without reading them.
    Proxy,
}

/// Everything one broker instance needs. Owned by that instance; nothing here is global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Descriptor file name under `brokers_dir`.
    pub name: String,

    pub host: String,

    /// Client-facing TCP port. 0 picks a free one.
    pub port: u16,

    /// In-process address of the worker-facing endpoint.
    pub worker_endpoint: String,

    /// Where descriptors are published.
    pub brokers_dir: PathBuf,

    pub pool_size: usize,

    /// Service the built-in pool registers for.
    pub pool_service: String,

    pub dispatch: DispatchMode,

    /// How often workers heartbeat.
    pub heartbeat_interval: Duration,

    /// Missed heartbeats before a worker's lease runs out.
    pub heartbeat_liveness: u32,

    /// How often the liveness sweep runs.
    pub sweep_interval: Duration,

    pub verbose: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BROKER_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            worker_endpoint: DEFAULT_WORKER_ENDPOINT.to_string(),
            brokers_dir: PathBuf::from(DEFAULT_BROKERS_DIR),
            pool_size: DEFAULT_POOL_SIZE,
            pool_service: DEFAULT_POOL_SERVICE.to_string(),
            dispatch: DispatchMode::Service,
            heartbeat_interval: HEARTBEAT_INTERVAL,     // 2.5 s
            heartbeat_liveness: HEARTBEAT_LIVENESS,     // lease = 7.5 s
            sweep_interval: HEARTBEAT_INTERVAL,
            verbose: false,
        }
    }
}

impl BrokerConfig {

    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => Self::read_from_file(p), // propagate errors unchanged
            None => Ok(Self::default()),
        }
    }
    fn read_from_file<P: AsRef<Path>>(path: P)->Result<Self>{
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {:?}", path.as_ref()))?;
        let cfg: BrokerConfig = toml::from_str(&raw)
            .with_context(|| "parsing broker config TOML")?;
        Ok(cfg)
    }

    /// How long a worker stays registered without a heartbeat.
    pub fn lease(&self) -> Duration {
        self.heartbeat_interval * self.heartbeat_liveness
    }

    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) || self.name.starts_with('.') {
            return Err(BrokerError::Config(format!("invalid broker name {:?}", self.name)));
        }
        if self.pool_service.is_empty() {
            return Err(BrokerError::Config("pool_service must not be empty".into()));
        }
        if self.heartbeat_interval.is_zero() || self.sweep_interval.is_zero() {
            return Err(BrokerError::Config("intervals must be non-zero".into()));
        }
        if self.heartbeat_liveness == 0 {
            return Err(BrokerError::Config("heartbeat_liveness must be at least 1".into()));
        }
        Ok(())
    }
}
