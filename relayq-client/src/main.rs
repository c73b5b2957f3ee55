use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use relayq_client::RelayqClient;

#[derive(Parser, Debug)]
#[command(name = "relayq-client")]
struct Args {
    /// Broker address; takes precedence over discovery.
    #[arg(long, env = "RELAYQ_ADDR")]
    addr: Option<String>,

    /// Broker name to look up in the brokers directory.
    #[arg(long, env = "RELAYQ_NAME", default_value = "relayq")]
    name: String,

    #[arg(long, env = "RELAYQ_BROKERS_DIR", default_value = "brokers")]
    brokers_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print the response.
    Request { service: String, payload: String },
    /// Check that the broker answers.
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut client = match &args.addr {
        Some(addr) => RelayqClient::connect(addr).await?,
        None => RelayqClient::discover(&args.brokers_dir, &args.name).await?,
    };

    match args.command {
        Command::Request { service, payload } => {
            let response = client.request(&service, payload.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&response));
        }
        Command::Ping => {
            let rtt = client.ping().await?;
            println!("pong in {:?}", rtt);
        }
    }
    Ok(())
}
