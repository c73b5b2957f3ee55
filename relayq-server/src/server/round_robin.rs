use std::collections::VecDeque;

use relayq_protocol::{Frame, FrameType, RoutingId};
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::constants::BROKER_SERVICE;
use crate::server::transport::{Relay, Route, Routed};

/// Pure proxy mode. Client frames go to announced workers in turn with the
/// client identity prepended; worker frames have it stripped and go back.
/// Payloads and service names are never looked at.
#[derive(Default)]
pub struct RoundRobin {
    workers: Mutex<VecDeque<RoutingId>>,
}

impl RoundRobin {
    async fn next_worker(&self) -> Option<RoutingId> {
        let mut workers = self.workers.lock().await;
        let next = workers.pop_front()?;
        workers.push_back(next);
        Some(next)
    }
}

impl Relay for RoundRobin {
    async fn from_client(&self, routed: Routed) -> Vec<Route> {
        let Routed { identity, mut frame } = routed;
        if frame.frame_type == FrameType::Heartbeat {
            return vec![Route::Client(
                identity,
                Frame::heartbeat(frame.correlation_id, None),
            )];
        }
        match self.next_worker().await {
            Some(worker) => {
                frame.push_identity(identity);
                vec![Route::Worker(worker, frame)]
            }
            None => vec![Route::Client(
                identity,
                Frame::error(frame.correlation_id, BROKER_SERVICE, "no workers available"),
            )],
        }
    }

    async fn from_worker(&self, routed: Routed) -> Vec<Route> {
        let Routed { identity, mut frame } = routed;
        match frame.frame_type {
            FrameType::Ready => {
                let mut workers = self.workers.lock().await;
                if !workers.contains(&identity) {
                    workers.push_back(identity);
                }
                Vec::new()
            }
            FrameType::Disconnect => {
                self.workers.lock().await.retain(|w| *w != identity);
                Vec::new()
            }
            FrameType::Heartbeat => Vec::new(),
            _ => match frame.pop_identity() {
                Ok(client) => vec![Route::Client(client, frame)],
                Err(e) => {
                    warn!(worker = %identity, frame_type = ?frame.frame_type, error = %e, "dropping frame without client identity");
                    Vec::new()
                }
            },
        }
    }
}
