use anyhow::Context;
use tracing::{error, info};

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::server::params::Params;

pub mod dispatch;
pub mod params;
pub mod round_robin;
pub mod transport;

pub async fn start(params: Params) -> anyhow::Result<()> {
    let mut config = BrokerConfig::load_or_default(params.config.as_ref())?;
    params.apply(&mut config);

    let level = if config.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .compact()
        .init();

    info!("RelayQ starting with config: {:?}", config);
    let mut broker = Broker::start(config, params.handler.handler())
        .await
        .context("Failed to start broker")?;

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.context("waiting for shutdown signal"),
        fatal = broker.fatal() => {
            error!(error = %fatal, "broker transport failed; restart required");
            Err(anyhow::Error::from(fatal))
        }
    };

    broker.stop().await;
    outcome
}
