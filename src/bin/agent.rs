//! src/bin/agent.rs
//!
//! Agent binary entry point: samples this host and streams metrics to a
//! Collector. CLI surface: a single positional `collector_host` argument;
//! exits 2 if it's missing.

use anyhow::Context;
use telemetry_net::config::Config;
use telemetry_net::host::Host;
use telemetry_net::keys::{FileKeyProvider, KeyProvider};
use telemetry_net::sampling::ProcSampler;
use telemetry_net::{agent, Error};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let collector_host = match std::env::args().nth(1) {
        Some(host) => host,
        None => {
            eprintln!("usage: agent <collector_host>");
            std::process::exit(2);
        }
    };
    let collector_host: std::net::IpAddr = collector_host
        .parse()
        .or_else(|_| resolve_host(&collector_host))
        .with_context(|| format!("could not resolve collector host {collector_host:?}"))?;

    let config = Config::load().context("failed to load configuration")?;
    let key_provider = FileKeyProvider::new(&config.key_dir, "agent");
    let signing_key = key_provider.load_local_keypair().context("failed to load agent keypair")?;
    let host = Host::local().context("failed to resolve local hostname")?;

    tracing::info!(hostname = %host.hostname, %collector_host, "starting agent");
    agent::run(collector_host, &config, &signing_key, &ProcSampler, &host)
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
