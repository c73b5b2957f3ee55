use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::config::{BrokerConfig, DispatchMode};
use crate::core::task::{Echo, Ping, TaskHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HandlerKind {
    Echo,
    Ping,
}

impl HandlerKind {
    pub fn handler(self) -> Arc<dyn TaskHandler> {
        match self {
            HandlerKind::Echo => Arc::new(Echo),
            HandlerKind::Ping => Arc::new(Ping),
        }
    }
}

/// Flags override the TOML config file, which overrides built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "relayq-server")]
pub struct Params {
    #[arg(long, env = "RELAYQ_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "RELAYQ_NAME")]
    pub name: Option<String>,

    #[arg(long, env = "RELAYQ_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "RELAYQ_BROKERS_DIR")]
    pub brokers_dir: Option<PathBuf>,

    #[arg(long, env = "RELAYQ_WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, value_enum, env = "RELAYQ_DISPATCH")]
    pub dispatch: Option<DispatchMode>,

    #[arg(long, value_enum, env = "RELAYQ_HANDLER", default_value_t = HandlerKind::Echo)]
    pub handler: HandlerKind,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Params {
    pub fn apply(&self, config: &mut BrokerConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.brokers_dir {
            config.brokers_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.pool_size = workers;
        }
        if let Some(dispatch) = self.dispatch {
            config.dispatch = dispatch;
        }
        config.verbose |= self.verbose;
    }
}
