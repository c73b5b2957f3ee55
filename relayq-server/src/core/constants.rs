use std::time::Duration;

pub const DEFAULT_BROKER_NAME: &str = "relayq";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_WORKER_ENDPOINT: &str = "inproc://workers";
pub const DEFAULT_BROKERS_DIR: &str = "brokers";
pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_POOL_SERVICE: &str = "default";

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2500);
// heartbeats a worker may miss before its lease runs out
pub const HEARTBEAT_LIVENESS: u32 = 3;

/// Frames buffered per attached peer and per endpoint inbox.
pub const ENDPOINT_QUEUE_DEPTH: usize = 1024;

/// Service name on error frames the broker itself raises.
pub const BROKER_SERVICE: &str = "relayq.broker";
