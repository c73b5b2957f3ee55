use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use relayq_protocol::{Frame, FrameType, RoutingId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::core::constants::ENDPOINT_QUEUE_DEPTH;
use crate::core::error::TransportError;

pub const INPROC_SCHEME: &str = "inproc://";

/// A frame tagged with the identity of the peer that sent it.
#[derive(Debug)]
pub struct Routed {
    pub identity: RoutingId,
    pub frame: Frame,
}

/// Where the proxy loop should deliver a frame.
#[derive(Debug)]
pub enum Route {
    Client(RoutingId, Frame),
    Worker(RoutingId, Frame),
}

/// Decides where frames arriving on either endpoint go next.
pub trait Relay: Send + Sync {
    fn from_client(&self, routed: Routed) -> impl Future<Output = Vec<Route>> + Send;
    fn from_worker(&self, routed: Routed) -> impl Future<Output = Vec<Route>> + Send;
}

type Peers = Arc<Mutex<HashMap<RoutingId, mpsc::Sender<Frame>>>>;

/// Router-style endpoint: attached peers get an identity, inbound frames
/// are tagged with it, outbound frames are routed by it.
#[derive(Clone)]
struct Endpoint {
    side: &'static str,
    peers: Peers,
    next_id: Arc<AtomicU64>,
    inbound: mpsc::Sender<Routed>,
}

impl Endpoint {
    fn new(side: &'static str) -> (Self, mpsc::Receiver<Routed>) {
        let (inbound, inbound_rx) = mpsc::channel(ENDPOINT_QUEUE_DEPTH);
        let endpoint = Endpoint {
            side,
            peers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            inbound,
        };
        (endpoint, inbound_rx)
    }

    async fn attach(&self) -> (RoutingId, mpsc::Receiver<Frame>) {
        let identity = RoutingId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(ENDPOINT_QUEUE_DEPTH);
        let mut peers = self.peers.lock().await;
        // in-process peers never detach themselves; drop the ones that went away
        peers.retain(|_, tx| !tx.is_closed());
        peers.insert(identity, tx);
        drop(peers);
        debug!(side = self.side, %identity, "peer attached");
        (identity, rx)
    }

    async fn detach(&self, identity: RoutingId) {
        if self.peers.lock().await.remove(&identity).is_some() {
            debug!(side = self.side, %identity, "peer detached");
        }
    }

    async fn send(&self, identity: RoutingId, frame: Frame) -> Result<(), TransportError> {
        let tx = self
            .peers
            .lock()
            .await
            .get(&identity)
            .cloned()
            .ok_or(TransportError::UnknownPeer(identity))?;
        if tx.send(frame).await.is_err() {
            self.detach(identity).await;
            return Err(TransportError::UnknownPeer(identity));
        }
        Ok(())
    }

    /// Peers whose receiving side is still open.
    async fn identities(&self) -> Vec<RoutingId> {
        self.peers
            .lock()
            .await
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(identity, _)| *identity)
            .collect()
    }

    // dropping every peer sender ends their connection tasks
    async fn close(&self) {
        self.peers.lock().await.clear();
    }
}

/// TCP endpoint for external clients, one identity per connection.
pub struct ClientFacing {
    endpoint: Endpoint,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ClientFacing {
    pub async fn bind(addr: &str) -> Result<(Self, mpsc::Receiver<Routed>), TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let (endpoint, inbound_rx) = Endpoint::new("client");
        Ok((
            ClientFacing {
                endpoint,
                listener,
                local_addr,
            },
            inbound_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn serve(&self, socket: TcpStream, peer: SocketAddr) {
        let endpoint = self.endpoint.clone();
        debug!(%peer, "new incoming connection");
        tokio::spawn(async move {
            let (identity, mut outbox) = endpoint.attach().await;
            if let Err(e) = pump(socket, identity, &endpoint, &mut outbox).await {
                debug!(%peer, %identity, error = %e, "connection error");
            }
            endpoint.detach(identity).await;
        });
    }
}

async fn pump(
    mut stream: TcpStream,
    identity: RoutingId,
    endpoint: &Endpoint,
    outbox: &mut mpsc::Receiver<Frame>,
) -> Result<(), TransportError> {
    let (mut reader, mut writer) = stream.split();
    let mut buf = BytesMut::with_capacity(4096);
    let mut out = BytesMut::new();

    loop {
        tokio::select! {
            n = reader.read_buf(&mut buf) => {
                if n? == 0 {
                    return Ok(());
                }
                while let Some(frame) = Frame::decode(&mut buf)? {
                    if endpoint.inbound.send(Routed { identity, frame }).await.is_err() {
                        return Err(TransportError::EndpointClosed(endpoint.side));
                    }
                }
            }
            frame = outbox.recv() => {
                // endpoint closed or peer detached
                let Some(frame) = frame else { return Ok(()) };
                out.clear();
                frame.encode(&mut out);
                writer.write_all(&out).await?;
                writer.flush().await?;
            }
        }
    }
}

/// In-process endpoint the worker routines attach to.
#[derive(Clone)]
pub struct WorkerFacing {
    endpoint: Endpoint,
    address: String,
}

impl WorkerFacing {
    pub fn bind(address: &str) -> Result<(Self, mpsc::Receiver<Routed>), TransportError> {
        match address.strip_prefix(INPROC_SCHEME) {
            Some(name) if !name.is_empty() => {}
            _ => return Err(TransportError::InvalidWorkerAddress(address.to_string())),
        }
        let (endpoint, inbound_rx) = Endpoint::new("worker");
        Ok((
            WorkerFacing {
                endpoint,
                address: address.to_string(),
            },
            inbound_rx,
        ))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn connect(&self) -> WorkerConnection {
        let (identity, inbox) = self.endpoint.attach().await;
        WorkerConnection {
            identity,
            inbox,
            outbound: self.endpoint.inbound.clone(),
        }
    }
}

/// One worker's attachment to the worker-facing endpoint.
pub struct WorkerConnection {
    identity: RoutingId,
    inbox: mpsc::Receiver<Frame>,
    outbound: mpsc::Sender<Routed>,
}

impl WorkerConnection {
    pub fn identity(&self) -> RoutingId {
        self.identity
    }

    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound
            .send(Routed {
                identity: self.identity,
                frame,
            })
            .await
            .map_err(|_| TransportError::EndpointClosed("worker"))
    }

    /// `None` once the broker has closed the worker-facing endpoint.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbox.recv().await
    }
}

pub struct TransportPair {
    client: ClientFacing,
    client_rx: mpsc::Receiver<Routed>,
    worker: WorkerFacing,
    worker_rx: mpsc::Receiver<Routed>,
    verbose: bool,
}

impl TransportPair {
    pub async fn bind(client_addr: &str, worker_addr: &str) -> Result<Self, TransportError> {
        let (worker, worker_rx) = WorkerFacing::bind(worker_addr)?;
        let (client, client_rx) = ClientFacing::bind(client_addr).await?;
        info!(client = %client.local_addr(), worker = %worker.address(), "transport bound");
        Ok(TransportPair {
            client,
            client_rx,
            worker,
            worker_rx,
            verbose: false,
        })
    }

    /// Logs every relayed frame at info level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.client.local_addr()
    }

    pub fn worker_endpoint(&self) -> WorkerFacing {
        self.worker.clone()
    }

    /// Relays frames until shutdown. Returns an error only when an endpoint
    /// fails underneath it; nothing re-binds after that.
    pub async fn run_proxy<R: Relay>(
        self,
        relay: R,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<(), TransportError> {
        let TransportPair {
            client,
            mut client_rx,
            worker,
            mut worker_rx,
            verbose,
        } = self;

        info!(addr = %client.local_addr(), "proxy loop started");
        let result = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break Ok(()),
                accepted = client.listener.accept() => match accepted {
                    Ok((socket, peer)) => client.serve(socket, peer),
                    Err(e) => {
                        error!(error = %e, "client endpoint accept failed");
                        break Err(TransportError::EndpointClosed("client"));
                    }
                },
                routed = client_rx.recv() => {
                    let Some(routed) = routed else {
                        break Err(TransportError::EndpointClosed("client"));
                    };
                    if verbose {
                        trace_frame("client", &routed);
                    }
                    let routes = relay.from_client(routed).await;
                    deliver(&client.endpoint, &worker.endpoint, routes).await;
                }
                routed = worker_rx.recv() => {
                    let Some(routed) = routed else {
                        break Err(TransportError::EndpointClosed("worker"));
                    };
                    if verbose {
                        trace_frame("worker", &routed);
                    }
                    let routes = relay.from_worker(routed).await;
                    deliver(&client.endpoint, &worker.endpoint, routes).await;
                }
            }
        };

        for identity in worker.endpoint.identities().await {
            let _ = worker.endpoint.send(identity, Frame::disconnect()).await;
        }
        worker.endpoint.close().await;
        client.endpoint.close().await;
        info!("proxy loop stopped");
        result
    }
}

async fn deliver(client: &Endpoint, worker: &Endpoint, routes: Vec<Route>) {
    for route in routes {
        match route {
            Route::Client(identity, frame) => {
                if let Err(e) = client.send(identity, frame).await {
                    debug!(client = %identity, error = %e, "dropping frame for departed client");
                }
            }
            Route::Worker(identity, frame) => {
                let frame_type = frame.frame_type;
                let correlation_id = frame.correlation_id;
                if let Err(e) = worker.send(identity, frame).await {
                    if frame_type == FrameType::Request {
                        warn!(worker = %identity, correlation_id, error = %e, "request lost: worker unreachable");
                    } else {
                        debug!(worker = %identity, error = %e, "dropping frame for departed worker");
                    }
                }
            }
        }
    }
}

fn trace_frame(side: &'static str, routed: &Routed) {
    info!(
        from = side,
        identity = %routed.identity,
        frame_type = ?routed.frame.frame_type,
        correlation_id = routed.frame.correlation_id,
        parts = routed.frame.parts.len(),
        "relay"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_worker_connection_is_detached() {
        let (workers, _rx) = WorkerFacing::bind("inproc://detach").unwrap();
        let kept = workers.connect().await;
        let gone = workers.connect().await;
        let gone_id = gone.identity();
        drop(gone);

        assert_eq!(workers.endpoint.identities().await, vec![kept.identity()]);

        let err = workers.endpoint.send(gone_id, Frame::disconnect()).await;
        assert!(matches!(err, Err(TransportError::UnknownPeer(id)) if id == gone_id));
        assert!(!workers.endpoint.peers.lock().await.contains_key(&gone_id));
        assert!(workers.endpoint.send(kept.identity(), Frame::disconnect()).await.is_ok());
    }

    #[tokio::test]
    async fn attach_prunes_departed_workers() {
        let (workers, _rx) = WorkerFacing::bind("inproc://prune").unwrap();
        for _ in 0..3 {
            drop(workers.connect().await);
        }
        let live = workers.connect().await;

        let peers = workers.endpoint.peers.lock().await;
        assert_eq!(peers.len(), 1);
        assert!(peers.contains_key(&live.identity()));
    }
}
