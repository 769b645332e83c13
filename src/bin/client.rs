//! src/bin/client.rs
//!
//! Client binary entry point: dials a Collector's client-facing endpoint
//! and prints every received frame. CLI surface: a single positional
//! `collector_host` argument; exits 2 if it's missing.

use anyhow::Context;
use telemetry_net::client;
use telemetry_net::config::Config;
use telemetry_net::display::StdoutDisplay;
use telemetry_net::error::Error;
use telemetry_net::keys::{FileKeyProvider, KeyProvider};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let collector_host = match std::env::args().nth(1) {
        Some(host) => host,
        None => {
            eprintln!("usage: client <collector_host>");
            std::process::exit(2);
        }
    };

    let config = Config::load().context("failed to load configuration")?;
    let collector_ip: std::net::IpAddr = collector_host
        .parse()
        .or_else(|_| resolve_host(&collector_host))
        .with_context(|| format!("could not resolve collector host {collector_host:?}"))?;
    let target = SocketAddr::new(collector_ip, config.port_client);

    let key_provider = FileKeyProvider::new(&config.key_dir, "client");
    let signing_key = key_provider.load_local_keypair().context("failed to load client keypair")?;

    tracing::info!(%target, "starting client");
    client::run(target, &config, &signing_key, &StdoutDisplay)
        .await
        .map_err(anyhow::Error::from)
}

fn resolve_host(host: &str) -> Result<std::net::IpAddr, Error> {
    use std::net::ToSocketAddrs;
    (host, 0)
        .to_socket_addrs()
        .map_err(Error::Io)?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::HostResolution(host.to_string()))
}
