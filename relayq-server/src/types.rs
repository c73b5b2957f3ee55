use std::sync::Arc;
use tokio::sync::Mutex;
use crate::core::registry::Registry;

/// The broker's single coarse lock over the worker table and service queues.
pub type SharedRegistry = Arc<Mutex<Registry>>;
