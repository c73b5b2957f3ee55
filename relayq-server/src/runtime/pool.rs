use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use relayq_protocol::{Envelope, Frame, FrameType};
use tokio::sync::watch::Receiver;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tracing::{debug, info, warn};

use crate::core::error::{TaskError, WorkerFault};
use crate::core::task::TaskHandler;
use crate::server::transport::{WorkerConnection, WorkerFacing};

/// Fixed set of worker routines spawned at broker start. Workers that fault
/// are not replaced, so the pool only shrinks.
pub struct WorkerPool {
    service: String,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub async fn spawn(
        size: usize,
        endpoint: &WorkerFacing,
        service: &str,
        handler: Arc<dyn TaskHandler>,
        heartbeat: Duration,
        shutdown_rx: Receiver<()>,
    ) -> Self {
        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let conn = endpoint.connect().await;
            let worker = Worker {
                index,
                service: service.to_string(),
                handler: Arc::clone(&handler),
                heartbeat,
            };
            handles.push(tokio::spawn(worker.run_logged(conn, shutdown_rx.clone())));
        }
        info!(size, service, "worker pool spawned");

        WorkerPool {
            service: service.to_string(),
            handles,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Workers whose routine has not exited.
    pub fn alive(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// One pool routine: announce, then serve requests and heartbeat until told to stop.
pub struct Worker {
    index: usize,
    service: String,
    handler: Arc<dyn TaskHandler>,
    heartbeat: Duration,
}

impl Worker {
    async fn run_logged(self, conn: WorkerConnection, shutdown_rx: Receiver<()>) {
        let identity = conn.identity();
        match self.run(conn, shutdown_rx).await {
            Ok(()) => debug!(index = self.index, worker = %identity, "worker stopped"),
            Err(e) => warn!(
                index = self.index,
                worker = %identity,
                error = %e,
                "worker terminated, pool capacity reduced"
            ),
        }
    }

    pub async fn run(
        &self,
        mut conn: WorkerConnection,
        mut shutdown_rx: Receiver<()>,
    ) -> Result<(), WorkerFault> {
        conn.send(Frame::ready(&self.service)).await?;

        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = conn.send(Frame::disconnect()).await;
                    return Ok(());
                }
                _ = ticker.tick() => {
                    conn.send(Frame::heartbeat(0, Some(&self.service))).await?;
                }
                frame = conn.recv() => {
                    let Some(frame) = frame else {
                        return Err(WorkerFault::EndpointClosed);
                    };
                    match frame.frame_type {
                        FrameType::Request => {
                            let reply = self.serve(&conn, &mut ticker, frame).await?;
                            conn.send(reply).await?;
                        }
                        FrameType::Disconnect => {
                            debug!(index = self.index, "disconnected by broker");
                            return Ok(());
                        }
                        other => debug!(index = self.index, frame_type = ?other, "ignoring frame"),
                    }
                }
            }
        }
    }

    /// Executes one request, heartbeating on the same ticker until it
    /// finishes so a slow handler does not cost the worker its lease.
    async fn serve(
        &self,
        conn: &WorkerConnection,
        ticker: &mut Interval,
        frame: Frame,
    ) -> Result<Frame, WorkerFault> {
        let task = self.execute(frame);
        tokio::pin!(task);
        loop {
            tokio::select! {
                reply = &mut task => return Ok(reply),
                _ = ticker.tick() => {
                    conn.send(Frame::heartbeat(0, Some(&self.service))).await?;
                }
            }
        }
    }

    /// Runs the handler on `[client_id, service, payload]` and builds the
    /// reply, carrying the client identity part back untouched.
    async fn execute(&self, frame: Frame) -> Frame {
        let correlation_id = frame.correlation_id;
        let client = frame.parts.first().cloned().unwrap_or_else(Bytes::new);

        let (service, outcome) = match Envelope::from_parts(frame.parts.get(1..).unwrap_or(&[])) {
            Ok(envelope) => {
                let handler = Arc::clone(&self.handler);
                let outcome = tokio::task::spawn_blocking(move || handler.handle(envelope.payload))
                    .await
                    .unwrap_or_else(|e| Err(TaskError::Panicked(e.to_string())));
                (envelope.service, outcome)
            }
            Err(e) => (self.service.clone(), Err(TaskError::Malformed(e.to_string()))),
        };

        let mut reply = match outcome {
            Ok(response) => Frame::reply(correlation_id, &service, response),
            Err(e) => {
                debug!(index = self.index, service = %service, error = %e, "task failed");
                Frame::error(correlation_id, &service, &e.to_string())
            }
        };
        reply.parts.insert(0, client);
        reply
    }
}
