//! hexwire: a TCP/UDP diagnostic echo server
//!
//! Accepts stream connections and independent datagrams on one address and
//! answers every inbound payload with a hex/ASCII transcript of the bytes
//! received. All traffic is served from a single readiness-multiplexed
//! event loop; there are no per-connection threads.

mod codec;
mod config;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        "Starting hexwire server"
    );

    runtime::run(config)?;
    Ok(())
}
