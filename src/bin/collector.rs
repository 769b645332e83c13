//! src/bin/collector.rs
//!
//! Collector binary entry point: binds the agent-facing and client-facing
//! endpoints and runs the relay. CLI surface: a single positional `bind_ip`
//! argument; exits 2 if it's missing.

use anyhow::Context;
use telemetry_net::collector;
use telemetry_net::config::Config;
use telemetry_net::keys::{FileKeyProvider, KeyProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bind_ip = match std::env::args().nth(1) {
        Some(ip) => ip,
        None => {
            eprintln!("usage: collector <bind_ip>");
            std::process::exit(2);
        }
    };
    let bind_ip: std::net::IpAddr = bind_ip.parse().with_context(|| format!("invalid bind IP {bind_ip:?}"))?;

    let config = Config::load().context("failed to load configuration")?;
    let key_provider = FileKeyProvider::new(&config.key_dir, "collector");
    let signing_key = key_provider
        .load_local_keypair()
        .context("failed to load collector keypair")?;

    tracing::info!(%bind_ip, agent_port = config.port_agent, client_port = config.port_client, "starting collector");
    collector::run(bind_ip, &config, &signing_key, key_provider.authorized_client_dir())
        .await
        .map_err(anyhow::Error::from)
}
