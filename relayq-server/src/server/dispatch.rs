use relayq_protocol::envelope::single_service;
use relayq_protocol::{Envelope, Frame, FrameType, RoutingId};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::constants::BROKER_SERVICE;
use crate::core::error::UnknownWorker;
use crate::core::registry::{Assignment, ClientRequest, Submitted};
use crate::runtime::liveness::{log_lost, report_lost};
use crate::server::transport::{Relay, Route, Routed};
use crate::types::SharedRegistry;

/// Service-aware dispatch: matches each client request to an idle worker of
/// the requested service, or queues it until one is ready.
pub struct ServiceDispatch {
    registry: SharedRegistry,
}

impl ServiceDispatch {
    pub fn new(registry: SharedRegistry) -> Self {
        ServiceDispatch { registry }
    }

    async fn client_request(&self, client: RoutingId, frame: Frame) -> Vec<Route> {
        let correlation_id = frame.correlation_id;
        let envelope = match Envelope::from_parts(&frame.parts) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%client, error = %e, "rejecting malformed request");
                return vec![Route::Client(
                    client,
                    Frame::error(correlation_id, BROKER_SERVICE, &e.to_string()),
                )];
            }
        };

        let request = ClientRequest {
            client,
            correlation_id,
            service: envelope.service,
            payload: envelope.payload,
        };
        let service = request.service.clone();
        let submitted = self.registry.lock().await.submit(request, Instant::now());

        match submitted {
            Submitted::Assigned(assignment) => vec![forward(assignment)],
            Submitted::Queued { depth } => {
                debug!(%client, service = %service, depth, "request queued");
                Vec::new()
            }
        }
    }

    async fn worker_ready(&self, worker: RoutingId, frame: Frame) -> Vec<Route> {
        let service = match single_service(&frame.parts) {
            Ok(service) => service,
            Err(e) => {
                warn!(%worker, error = %e, "malformed ready frame");
                return vec![Route::Worker(worker, Frame::disconnect())];
            }
        };
        let (abandoned, assignment) = self
            .registry
            .lock()
            .await
            .worker_ready(worker, &service, Instant::now());
        if let Some(in_flight) = abandoned {
            log_lost(worker, &service, in_flight, "busy worker re-registered");
        }
        debug!(%worker, service = %service, dispatched = assignment.is_some(), "worker ready");
        assignment.map(forward).into_iter().collect()
    }

    async fn worker_heartbeat(&self, worker: RoutingId) -> Vec<Route> {
        let beat = self.registry.lock().await.heartbeat(worker, Instant::now());
        match beat {
            Ok(assignment) => assignment.map(forward).into_iter().collect(),
            Err(UnknownWorker(_)) => {
                debug!(%worker, "heartbeat from unregistered worker");
                vec![Route::Worker(worker, Frame::disconnect())]
            }
        }
    }

    async fn worker_reply(&self, worker: RoutingId, mut frame: Frame) -> Vec<Route> {
        let client = match frame.pop_identity() {
            Ok(client) => client,
            Err(e) => {
                warn!(%worker, error = %e, "reply without client identity");
                return Vec::new();
            }
        };

        let completed = self.registry.lock().await.complete(worker, Instant::now());
        // frame is now [service, payload] with the client's correlation id
        let mut routes = vec![Route::Client(client, frame)];
        match completed {
            Ok((_, next)) => routes.extend(next.map(forward)),
            Err(UnknownWorker(_)) => {
                warn!(%worker, %client, "reply from evicted worker");
                routes.push(Route::Worker(worker, Frame::disconnect()));
            }
        }
        routes
    }
}

impl Relay for ServiceDispatch {
    async fn from_client(&self, routed: Routed) -> Vec<Route> {
        let Routed { identity, frame } = routed;
        match frame.frame_type {
            FrameType::Request => self.client_request(identity, frame).await,
            FrameType::Heartbeat => vec![Route::Client(
                identity,
                Frame::heartbeat(frame.correlation_id, None),
            )],
            other => vec![Route::Client(
                identity,
                Frame::error(
                    frame.correlation_id,
                    BROKER_SERVICE,
                    &format!("unexpected {:?} frame from client", other),
                ),
            )],
        }
    }

    async fn from_worker(&self, routed: Routed) -> Vec<Route> {
        let Routed { identity, frame } = routed;
        match frame.frame_type {
            FrameType::Ready => self.worker_ready(identity, frame).await,
            FrameType::Heartbeat => self.worker_heartbeat(identity).await,
            FrameType::Reply | FrameType::Error => self.worker_reply(identity, frame).await,
            FrameType::Disconnect => {
                let removed = self.registry.lock().await.remove(identity);
                if let Some(worker) = removed {
                    debug!(worker = %identity, service = %worker.service, "worker disconnected");
                    report_lost(&worker, "worker disconnected");
                }
                Vec::new()
            }
            FrameType::Request => {
                warn!(worker = %identity, "ignoring request frame from worker");
                Vec::new()
            }
        }
    }
}

fn forward(assignment: Assignment) -> Route {
    Route::Worker(assignment.worker, assignment.request.into_frame())
}
