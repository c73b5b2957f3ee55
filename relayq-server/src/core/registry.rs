use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use relayq_protocol::{Frame, RoutingId};
use tokio::time::Instant;

use crate::core::error::UnknownWorker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub client: RoutingId,
    pub correlation_id: u32,
    pub service: String,
    pub payload: Bytes,
}

impl ClientRequest {
    /// `[client_id, service, payload]`, ready for the worker-facing endpoint.
    pub fn into_frame(self) -> Frame {
        let mut frame = Frame::request(self.correlation_id, &self.service, self.payload);
        frame.push_identity(self.client);
        frame
    }
}

/// The request a busy worker is holding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub client: RoutingId,
    pub correlation_id: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Registered, no heartbeat seen yet.
    Registered,
    Alive,
    Expired,
}

#[derive(Debug, Clone)]
pub struct WorkerRef {
    pub identity: RoutingId,
    pub service: String,
    pub expires_at: Instant,
    pub in_flight: Option<InFlight>,
    heartbeats: u64,
}

impl WorkerRef {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    pub fn liveness(&self, now: Instant) -> Liveness {
        if self.is_expired(now) {
            Liveness::Expired
        } else if self.heartbeats == 0 {
            Liveness::Registered
        } else {
            Liveness::Alive
        }
    }
}

#[derive(Debug)]
pub struct ServiceEntry {
    pub name: String,
    pending: VecDeque<ClientRequest>,
    // lookup keys into the worker table, never owners
    idle: VecDeque<RoutingId>,
}

impl ServiceEntry {
    fn new(name: &str) -> Self {
        ServiceEntry {
            name: name.to_string(),
            pending: VecDeque::new(),
            idle: VecDeque::new(),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &ClientRequest> {
        self.pending.iter()
    }

    pub fn idle(&self) -> impl Iterator<Item = &RoutingId> {
        self.idle.iter()
    }
}

/// A request leaving the registry for a specific worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub worker: RoutingId,
    pub request: ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Assigned(Assignment),
    Queued { depth: usize },
}

/// Worker table plus per-service queues.
///
/// Callers hold the broker's single lock around every call, so each method
/// is one critical section: a worker is never left in an idle list after its
/// table entry is gone, and never sits in an idle list while busy.
#[derive(Debug)]
pub struct Registry {
    lease: Duration,
    workers: HashMap<RoutingId, WorkerRef>,
    services: HashMap<String, ServiceEntry>,
}

impl Registry {
    pub fn new(lease: Duration) -> Self {
        Registry {
            lease,
            workers: HashMap::new(),
            services: HashMap::new(),
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Hands the request to the longest-idle live worker of its service, or
    /// queues it behind earlier requests for that service.
    pub fn submit(&mut self, request: ClientRequest, now: Instant) -> Submitted {
        let entry = self
            .services
            .entry(request.service.clone())
            .or_insert_with_key(|name| ServiceEntry::new(name));

        while let Some(identity) = entry.idle.pop_front() {
            let Some(worker) = self.workers.get_mut(&identity) else {
                continue;
            };
            // expired but not yet swept; the sweep will drop it from the table
            if worker.is_expired(now) {
                continue;
            }
            worker.expires_at = now + self.lease;
            worker.in_flight = Some(InFlight {
                client: request.client,
                correlation_id: request.correlation_id,
            });
            return Submitted::Assigned(Assignment {
                worker: identity,
                request,
            });
        }

        entry.pending.push_back(request);
        Submitted::Queued {
            depth: entry.pending.len(),
        }
    }

    /// Registers a worker, or returns a known one to its service. A worker
    /// that re-registers under another service leaves its old idle list.
    /// Returns the request a busy worker abandoned by re-registering.
    pub fn worker_ready(
        &mut self,
        identity: RoutingId,
        service: &str,
        now: Instant,
    ) -> (Option<InFlight>, Option<Assignment>) {
        let lease = self.lease;
        let abandoned = match self.workers.get_mut(&identity) {
            Some(worker) => {
                if worker.service != service {
                    let old = std::mem::replace(&mut worker.service, service.to_string());
                    if let Some(entry) = self.services.get_mut(&old) {
                        entry.idle.retain(|id| *id != identity);
                    }
                }
                worker.expires_at = now + lease;
                worker.in_flight.take()
            }
            None => {
                self.workers.insert(
                    identity,
                    WorkerRef {
                        identity,
                        service: service.to_string(),
                        expires_at: now + lease,
                        in_flight: None,
                        heartbeats: 0,
                    },
                );
                None
            }
        };
        (abandoned, self.make_available(identity, now))
    }

    /// Extends the lease. An idle worker is offered the oldest pending request.
    pub fn heartbeat(
        &mut self,
        identity: RoutingId,
        now: Instant,
    ) -> Result<Option<Assignment>, UnknownWorker> {
        let worker = self
            .workers
            .get_mut(&identity)
            .ok_or(UnknownWorker(identity))?;
        worker.expires_at = now + self.lease;
        worker.heartbeats += 1;
        if worker.is_busy() {
            return Ok(None);
        }
        Ok(self.make_available(identity, now))
    }

    /// Records a finished task and offers the worker the next pending
    /// request. Returns the request it was holding, if any.
    pub fn complete(
        &mut self,
        identity: RoutingId,
        now: Instant,
    ) -> Result<(Option<InFlight>, Option<Assignment>), UnknownWorker> {
        let worker = self
            .workers
            .get_mut(&identity)
            .ok_or(UnknownWorker(identity))?;
        let finished = worker.in_flight.take();
        worker.expires_at = now + self.lease;
        Ok((finished, self.make_available(identity, now)))
    }

    /// Drops the worker from the table and from its idle list together.
    pub fn remove(&mut self, identity: RoutingId) -> Option<WorkerRef> {
        let worker = self.workers.remove(&identity)?;
        if let Some(entry) = self.services.get_mut(&worker.service) {
            entry.idle.retain(|id| *id != identity);
        }
        Some(worker)
    }

    /// Evicts every worker whose lease ran out before `now`.
    pub fn sweep(&mut self, now: Instant) -> Vec<WorkerRef> {
        let expired: Vec<RoutingId> = self
            .workers
            .values()
            .filter(|w| w.is_expired(now))
            .map(|w| w.identity)
            .collect();

        expired
            .into_iter()
            .filter_map(|identity| self.remove(identity))
            .collect()
    }

    /// Empties every pending queue, oldest first within each service.
    pub fn drain_pending(&mut self) -> Vec<ClientRequest> {
        self.services
            .values_mut()
            .flat_map(|entry| entry.pending.drain(..))
            .collect()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.get(name)
    }

    pub fn worker(&self, identity: RoutingId) -> Option<&WorkerRef> {
        self.workers.get(&identity)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerRef> {
        self.workers.values()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn pending(&self, service: &str) -> usize {
        self.services.get(service).map_or(0, |e| e.pending.len())
    }

    pub fn idle(&self, service: &str) -> usize {
        self.services.get(service).map_or(0, |e| e.idle.len())
    }

    pub fn is_idle(&self, identity: RoutingId) -> bool {
        self.services.values().any(|e| e.idle.contains(&identity))
    }

    fn make_available(&mut self, identity: RoutingId, now: Instant) -> Option<Assignment> {
        let worker = self.workers.get_mut(&identity)?;
        let entry = self
            .services
            .entry(worker.service.clone())
            .or_insert_with_key(|name| ServiceEntry::new(name));

        match entry.pending.pop_front() {
            Some(request) => {
                entry.idle.retain(|id| *id != identity);
                worker.expires_at = now + self.lease;
                worker.in_flight = Some(InFlight {
                    client: request.client,
                    correlation_id: request.correlation_id,
                });
                Some(Assignment {
                    worker: identity,
                    request,
                })
            }
            None => {
                if !entry.idle.contains(&identity) {
                    entry.idle.push_back(identity);
                }
                None
            }
        }
    }
}
