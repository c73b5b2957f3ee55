use std::io;
use std::path::PathBuf;

use relayq_protocol::{ProtocolError, RoutingId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Descriptor encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broker {0:?} is already published by a live process")]
    AlreadyPublished(String),

    #[error("Not a descriptor path: {0:?}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Worker endpoint {0:?} must be an inproc:// address")]
    InvalidWorkerAddress(String),

    #[error("{0} endpoint closed unexpectedly")]
    EndpointClosed(&'static str),

    #[error("Peer {0} is not attached")]
    UnknownPeer(RoutingId),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unsupported payload: {0}")]
    Unsupported(String),

    #[error("malformed task: {0}")]
    Malformed(String),

    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum WorkerFault {
    #[error("worker endpoint closed")]
    EndpointClosed,

    #[error("send failed: {0}")]
    Send(#[from] TransportError),
}

#[derive(Debug, Error)]
#[error("worker {0} is not registered")]
pub struct UnknownWorker(pub RoutingId);

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Invalid broker config: {0}")]
    Config(String),
}
