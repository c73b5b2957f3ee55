#![allow(dead_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relayq::BrokerConfig;

pub fn folder_to_use() -> PathBuf {
    tempfile::Builder::new()
        .prefix("relayq_test_")
        .tempdir()
        .expect("failed to create temp dir")
        .into_path()
}

/// Loopback, ephemeral port, fast heartbeats, unique name.
pub fn test_config(brokers_dir: &Path) -> BrokerConfig {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    BrokerConfig {
        name: format!("test-broker-{}", NEXT.fetch_add(1, Ordering::Relaxed)),
        host: "127.0.0.1".into(),
        port: 0,
        brokers_dir: brokers_dir.to_path_buf(),
        pool_size: 2,
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_liveness: 3,
        sweep_interval: Duration::from_millis(25),
        ..BrokerConfig::default()
    }
}

/// Polls `check` for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
