use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use relayq_protocol::BrokerDescriptor;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BrokerConfig, DispatchMode};
use crate::core::descriptor::DescriptorStore;
use crate::core::error::{BrokerError, TransportError};
use crate::core::registry::Registry;
use crate::core::task::{Echo, TaskHandler};
use crate::runtime::{self, pool::WorkerPool};
use crate::server::dispatch::ServiceDispatch;
use crate::server::round_robin::RoundRobin;
use crate::server::transport::{Relay, TransportPair, WorkerConnection, WorkerFacing};
use crate::types::SharedRegistry;

type ProxyHandle = JoinHandle<Result<(), TransportError>>;

/// A running broker: the transport pair, its proxy loop, the worker pool,
/// the liveness sweep and the published descriptor.
///
/// Call [`Broker::stop`] to shut down cleanly and withdraw the descriptor.
/// Dropping a broker stops its routines but leaves the descriptor on disk,
/// as does a crash; readers must probe the advertised port.
pub struct Broker {
    name: String,
    local_addr: SocketAddr,
    registry: SharedRegistry,
    workers: WorkerFacing,
    store: DescriptorStore,
    descriptor_path: Option<PathBuf>,
    shutdown_tx: watch::Sender<()>,
    proxy: Option<ProxyHandle>,
    sweeper: Option<JoinHandle<()>>,
    pool: Option<WorkerPool>,
}

impl Broker {
    /// Default config on the default port, echo handler for the pool.
    pub async fn new(verbose: bool) -> Result<Self, BrokerError> {
        let config = BrokerConfig {
            verbose,
            ..BrokerConfig::default()
        };
        Self::start(config, Arc::new(Echo)).await
    }

    pub async fn start(
        config: BrokerConfig,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, BrokerError> {
        config.validate()?;

        let client_addr = config.client_addr();
        let transport = TransportPair::bind(&client_addr, &config.worker_endpoint)
            .await
            .inspect_err(|e| error!(addr = %client_addr, error = %e, "bind failed"))?
            .verbose(config.verbose);
        let local_addr = transport.local_addr();
        let workers = transport.worker_endpoint();

        // advertise the bound port, which differs from config.port when that is 0
        let store = DescriptorStore::new(&config.brokers_dir);
        let descriptor = BrokerDescriptor::new(&config.name, local_addr.port());
        let descriptor_path = store.publish(&descriptor)?;

        let registry: SharedRegistry = Arc::new(Mutex::new(Registry::new(config.lease())));
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let proxy = match config.dispatch {
            DispatchMode::Service => spawn_proxy(
                transport,
                ServiceDispatch::new(Arc::clone(&registry)),
                shutdown_rx.clone(),
            ),
            DispatchMode::Proxy => spawn_proxy(transport, RoundRobin::default(), shutdown_rx.clone()),
        };
        let sweeper = runtime::spawn_liveness_sweep(
            Arc::clone(&registry),
            config.sweep_interval,
            shutdown_rx.clone(),
        );
        let pool = WorkerPool::spawn(
            config.pool_size,
            &workers,
            &config.pool_service,
            handler,
            config.heartbeat_interval,
            shutdown_rx,
        )
        .await;

        info!(
            name = %config.name,
            addr = %local_addr,
            pool = config.pool_size,
            dispatch = ?config.dispatch,
            "broker started"
        );

        Ok(Broker {
            name: config.name,
            local_addr,
            registry,
            workers,
            store,
            descriptor_path: Some(descriptor_path),
            shutdown_tx,
            proxy: Some(proxy),
            sweeper: Some(sweeper),
            pool: Some(pool),
        })
    }

    /// Closes both endpoints, stops every routine, discards queued requests
    /// and withdraws the descriptor.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());

        if let Some(proxy) = self.proxy.take() {
            match proxy.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "proxy loop had failed"),
                Err(e) => warn!(error = %e, "proxy task panicked"),
            }
        }
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.await;
        }
        if let Some(pool) = self.pool.take() {
            pool.join().await;
        }

        let discarded = self.registry.lock().await.drain_pending();
        if !discarded.is_empty() {
            warn!(count = discarded.len(), "discarding queued requests on shutdown");
        }

        if let Some(path) = self.descriptor_path.take() {
            if let Err(e) = self.store.withdraw(&path) {
                warn!(path = %path.display(), error = %e, "failed to withdraw descriptor");
            }
        }
        info!(name = %self.name, "broker stopped");
    }

    /// Resolves only if the proxy loop exits on its own, which means an
    /// endpoint failed. The broker does not recover from that.
    pub async fn fatal(&mut self) -> TransportError {
        let Some(proxy) = self.proxy.as_mut() else {
            return std::future::pending().await;
        };
        let exit = proxy.await;
        self.proxy = None;
        match exit {
            Ok(Err(e)) => e,
            Ok(Ok(())) => TransportError::EndpointClosed("client"),
            Err(e) => TransportError::Io(std::io::Error::other(e)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn descriptor_path(&self) -> Option<&Path> {
        self.descriptor_path.as_deref()
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Attaches an extra worker connection alongside the pool.
    pub async fn connect_worker(&self) -> WorkerConnection {
        self.workers.connect().await
    }

    pub async fn pending(&self, service: &str) -> usize {
        self.registry.lock().await.pending(service)
    }

    pub async fn idle(&self, service: &str) -> usize {
        self.registry.lock().await.idle(service)
    }

    pub async fn worker_count(&self) -> usize {
        self.registry.lock().await.worker_count()
    }

    /// Pool routines still running.
    pub fn pool_alive(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::alive)
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn spawn_proxy<R: Relay + 'static>(
    transport: TransportPair,
    relay: R,
    shutdown_rx: watch::Receiver<()>,
) -> ProxyHandle {
    tokio::spawn(async move {
        let result = transport.run_proxy(relay, shutdown_rx).await;
        if let Err(e) = &result {
            error!(error = %e, "proxy loop failed");
        }
        result
    })
}
