//! tests/common/harness.rs
//!
//! Building blocks for end-to-end tests: spawning a real Collector, real
//! Agents, and real Clients against ephemeral loopback ports, wired through
//! temporary key directories so each test gets its own trust domain.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use tempfile::TempDir;
use telemetry_net::codec::{Message, MetricsKind};
use telemetry_net::config::Config;
use telemetry_net::display::Display;
use telemetry_net::host::Host;
use telemetry_net::keys::{FileKeyProvider, KeyProvider};
use telemetry_net::sampling::Sampler;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A background task that is aborted when its handle is dropped, so a test
/// never has to remember to clean up a spawned node.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Config with every interval shrunk so sweeps/retries happen fast enough
/// for a test to wait on them without a multi-second sleep.
pub fn fast_config() -> Config {
    Config {
        push_interval_ms: 40,
        liveness_interval_ms: 60,
        stale_window_ms: 200,
        model_request_debounce_ms: 20,
        agent_sweep_interval_ms: 40,
        stale_agent_window_ms: 200,
        client_sweep_interval_ms: 40,
        stale_client_window_ms: 200,
        ping_idle_window_ms: 150,
        client_hello_interval_ms: 60,
        ..Config::default()
    }
}

fn ephemeral_port() -> Result<u16> {
    let listener = TcpListener::bind((LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// A running Collector bound to ephemeral loopback ports. `config` is the
/// actual configuration the Collector bound with — its `port_agent`/
/// `port_client` have been rewritten to the ephemeral ports assigned at
/// spawn time, so Agents/Clients must dial using this config, not the one
/// originally passed to `spawn`.
pub struct TestCollector {
    pub agent_addr: SocketAddr,
    pub client_addr: SocketAddr,
    pub config: Config,
    authorized_dir: PathBuf,
    _temp: TempDir,
    _task: AbortOnDrop,
}

impl TestCollector {
    pub async fn spawn(mut config: Config) -> Result<Self> {
        let temp = tempfile::tempdir().context("collector temp dir")?;
        config.key_dir = temp.path().join("keys");
        config.port_agent = ephemeral_port()?;
        config.port_client = ephemeral_port()?;

        let key_provider = FileKeyProvider::new(&config.key_dir, "collector");
        let signing_key = key_provider.load_local_keypair().context("collector keypair")?;
        let authorized_dir = key_provider.authorized_client_dir().to_path_buf();
        std::fs::create_dir_all(&authorized_dir)?;

        let agent_addr = SocketAddr::new(LOCALHOST, config.port_agent);
        let client_addr = SocketAddr::new(LOCALHOST, config.port_client);

        let run_config = config.clone();
        let run_dir = authorized_dir.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = telemetry_net::collector::run(LOCALHOST, &run_config, &signing_key, &run_dir).await {
                tracing::error!(error = %e, "test collector exited");
            }
        });
        // Give the QUIC endpoints time to bind before any dialer is spawned.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Ok(Self {
            agent_addr,
            client_addr,
            config,
            authorized_dir,
            _temp: temp,
            _task: AbortOnDrop(task),
        })
    }

    /// Rebinds a fresh Collector instance on the same ports this one used,
    /// simulating a process restart with no prior in-memory state.
    pub async fn restart(self) -> Result<Self> {
        let config = fast_config_with_ports(self.agent_addr.port(), self.client_addr.port());
        drop(self);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        TestCollector::spawn(config).await
    }

    /// Authorizes a client's public key to connect to this collector's
    /// client-facing endpoint under `name`.
    pub fn authorize(&self, name: &str, signing_key: &ed25519_dalek::SigningKey) -> Result<()> {
        std::fs::write(
            self.authorized_dir.join(format!("{name}.key")),
            signing_key.verifying_key().to_bytes(),
        )?;
        Ok(())
    }

    pub fn authorized_dir(&self) -> &PathBuf {
        &self.authorized_dir
    }
}

fn fast_config_with_ports(port_agent: u16, port_client: u16) -> Config {
    Config { port_agent, port_client, ..fast_config() }
}

/// A sampler returning fixed, test-controlled values for both kinds.
pub struct FixedSampler {
    pub model: Vec<(String, f64)>,
    pub metrics: Vec<(String, f64)>,
}

impl FixedSampler {
    pub fn new(model_value: f64, metric_value: f64) -> Self {
        Self {
            model: vec![("mem.total".to_string(), model_value)],
            metrics: vec![("mem.free".to_string(), metric_value)],
        }
    }
}

impl Sampler for FixedSampler {
    fn sample(&self, kind: MetricsKind) -> Vec<(String, f64)> {
        match kind {
            MetricsKind::Model => self.model.clone(),
            MetricsKind::Metrics => self.metrics.clone(),
        }
    }
}

/// A running Agent, identified by `hostname`, dialing a collector's
/// agent-facing endpoint.
pub struct TestAgent {
    _task: AbortOnDrop,
}

impl TestAgent {
    /// Spawns an Agent dialing `collector`. `agent::run` rebuilds its dial
    /// target from `config.port_agent`, so it must use the collector's own
    /// (ephemeral-port-rewritten) config rather than whatever config the
    /// caller originally built.
    pub async fn spawn(collector: &TestCollector, hostname: &str, sampler: FixedSampler) -> Result<Self> {
        let temp = tempfile::tempdir().context("agent temp dir")?;
        let key_provider = FileKeyProvider::new(temp.path(), format!("agent-{hostname}"));
        let signing_key = key_provider.load_local_keypair().context("agent keypair")?;
        let host = Host { hostname: hostname.to_string() };
        let config = collector.config.clone();
        let collector_ip = collector.agent_addr.ip();

        let task = tokio::spawn(async move {
            let _keep_temp = temp;
            if let Err(e) = telemetry_net::agent::run(collector_ip, &config, &signing_key, &sampler, &host).await {
                tracing::error!(error = %e, "test agent exited");
            }
        });

        Ok(Self { _task: AbortOnDrop(task) })
    }
}

/// Forwards every frame the Client receives into an unbounded channel so
/// tests can assert on them.
struct ChannelDisplay {
    sender: mpsc::UnboundedSender<Message>,
}

impl Display for ChannelDisplay {
    fn show(&self, frame: &Message) {
        let _ = self.sender.send(frame.clone());
    }
}

/// A running Client, authorized ahead of time against the target collector.
pub struct TestClient {
    pub frames: mpsc::UnboundedReceiver<Message>,
    _task: AbortOnDrop,
}

impl TestClient {
    pub async fn spawn(collector: &TestCollector, config: &Config, name: &str) -> Result<Self> {
        let temp = tempfile::tempdir().context("client temp dir")?;
        let key_provider = FileKeyProvider::new(temp.path(), name);
        let signing_key = key_provider.load_local_keypair().context("client keypair")?;
        collector.authorize(name, &signing_key)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let display = ChannelDisplay { sender: tx };
        let target = collector.client_addr;
        let config = config.clone();

        let task = tokio::spawn(async move {
            let _keep_temp = temp;
            if let Err(e) = telemetry_net::client::run(target, &config, &signing_key, &display).await {
                tracing::error!(error = %e, "test client exited");
            }
        });

        Ok(Self { frames: rx, _task: AbortOnDrop(task) })
    }
}

/// Waits up to `timeout` for a frame satisfying `predicate`, discarding
/// frames that don't match (mirrors how a real client ignores interleaved
/// control frames while waiting for data).
pub async fn wait_for_frame<F>(
    rx: &mut mpsc::UnboundedReceiver<Message>,
    timeout: std::time::Duration,
    predicate: F,
) -> Result<Message>
where
    F: Fn(&Message) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            let frame = rx.recv().await.context("client channel closed")?;
            if predicate(&frame) {
                return Ok(frame);
            }
        }
    })
    .await
    .context("timed out waiting for matching frame")?
}

pub fn metrics_grid_value(message: &Message, hostname: &str) -> Option<f64> {
    match message {
        Message::Metrics { grid, .. } => grid.hosts.get(hostname).and_then(|row| row.first().copied().flatten()).map(|(v, _)| v),
        _ => None,
    }
}

pub fn model_cache_by_hostname(messages: &[Message]) -> HashMap<String, Message> {
    let mut map = HashMap::new();
    for message in messages {
        if let Message::Metrics { hostname, kind: MetricsKind::Model, .. } = message {
            map.insert(hostname.clone(), message.clone());
        }
    }
    map
}
