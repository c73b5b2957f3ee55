use std::time::Duration;

use relayq_protocol::RoutingId;
use tokio::sync::watch::Receiver;
use tokio::time::Instant;

use crate::core::registry::{InFlight, Registry, WorkerRef};
use crate::types::SharedRegistry;

pub async fn run_liveness_sweep(
    registry: SharedRegistry,
    mut shutdown_rx: Receiver<()>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = sweep_once(&mut *registry.lock().await, Instant::now());
                if !evicted.is_empty() {
                    tracing::debug!(count = evicted.len(), "liveness sweep evicted workers");
                }
            }

            _ = shutdown_rx.changed() => {
                tracing::info!("Shutdown signal received. Liveness sweep stopped.");
                break;
            }
        }
    }
}

/// One sweep under the caller's lock; logs each eviction and any request it strands.
pub fn sweep_once(registry: &mut Registry, now: Instant) -> Vec<WorkerRef> {
    let evicted = registry.sweep(now);
    for worker in &evicted {
        tracing::warn!(
            worker = %worker.identity,
            service = %worker.service,
            overdue_ms = now.saturating_duration_since(worker.expires_at).as_millis() as u64,
            "evicting stale worker"
        );
        report_lost(worker, "worker lease expired");
    }
    evicted
}

/// In-flight requests are not redelivered; the client never gets a reply.
pub fn report_lost(worker: &WorkerRef, reason: &'static str) {
    if let Some(in_flight) = worker.in_flight {
        log_lost(worker.identity, &worker.service, in_flight, reason);
    }
}

pub fn log_lost(worker: RoutingId, service: &str, in_flight: InFlight, reason: &'static str) {
    tracing::warn!(
        worker = %worker,
        client = %in_flight.client,
        correlation_id = in_flight.correlation_id,
        service = %service,
        reason,
        "request lost"
    );
}
