use clap::Parser;
use relayq::server::{self, params::Params};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::start(Params::parse()).await
}
