/*
Background routines that run for the broker's lifetime

The worker pool serves dispatched requests over the worker-facing endpoint

The liveness sweep evicts workers whose lease ran out
*/
use std::time::Duration;
use tokio::sync::watch::Receiver;
use tokio::task::JoinHandle;
use crate::types::SharedRegistry;

pub mod liveness;
pub mod pool;

pub fn spawn_liveness_sweep(
    registry: SharedRegistry,
    interval: Duration,
    shutdown_rx: Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(liveness::run_liveness_sweep(registry, shutdown_rx, interval))
}
