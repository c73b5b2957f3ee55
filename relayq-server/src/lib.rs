pub mod broker;
pub mod config;
pub mod core;
pub mod runtime;
pub mod server;
mod types;

pub use broker::Broker;
pub use config::{BrokerConfig, DispatchMode};
pub use crate::core::descriptor::DescriptorStore;
pub use crate::core::error::{BrokerError, DescriptorError, TaskError, TransportError, WorkerFault};
pub use crate::core::registry::Registry;
pub use crate::core::task::{Echo, Ping, TaskHandler};
pub use types::SharedRegistry;
