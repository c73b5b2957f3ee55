use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DESCRIPTOR_EXTENSION: &str = "json";

/// What a running broker advertises in `<brokers_dir>/<name>.json`.
///
/// The file says a broker *was* started; it may be stale if that process
/// crashed. Probe the port before trusting it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BrokerDescriptor {
    pub name: String,
    pub port: String,
    pub pid: u32,
    #[serde(rename = "time")]
    pub started_at: DateTime<Utc>,
}

impl BrokerDescriptor {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        BrokerDescriptor {
            name: name.into(),
            port: port.to_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> std::io::Result<Option<BrokerDescriptor>> {
        if path.exists() {
            let file = File::open(path)?;
            let descriptor: BrokerDescriptor = serde_json::from_reader(file)?;
            Ok(Some(descriptor))
        } else {
            Ok(None)
        }
    }

    /// Loopback address for the advertised port.
    pub fn local_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

pub fn descriptor_path(brokers_dir: &Path, name: &str) -> PathBuf {
    brokers_dir.join(format!("{name}.{DESCRIPTOR_EXTENSION}"))
}
