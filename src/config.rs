//! src/config.rs
//!
//! Defines the strongly-typed `Config` struct for all runtime parameters,
//! loaded from files and environment variables via `figment`. The timing
//! constants below are fixed in meaning but overridable here so integration
//! tests can shrink the windows.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default port of the Collector's agent-facing endpoint.
pub const PORT_AGENT: u16 = 5556;
/// Default port of the Collector's client-facing endpoint.
pub const PORT_CLIENT: u16 = 5557;

/// Top-level struct holding all runtime-tunable parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding each role's long-term keypair and, for the
    /// Collector, the `authorized_clients/` subdirectory.
    pub key_dir: PathBuf,
    pub port_agent: u16,
    pub port_client: u16,

    /// Agent: period of the data-push timer once streaming.
    pub push_interval_ms: u64,
    /// Agent: period of the liveness sweep timer.
    pub liveness_interval_ms: u64,
    /// Agent: max silence from the Collector before reconnecting.
    pub stale_window_ms: u64,
    /// Agent: minimum spacing between unsolicited `model` re-sends.
    pub model_request_debounce_ms: u64,

    /// Collector: period of the agent-registry liveness sweep.
    pub agent_sweep_interval_ms: u64,
    /// Collector: max silence from an agent before eviction.
    pub stale_agent_window_ms: u64,

    /// Collector: period of the client-registry liveness sweep.
    pub client_sweep_interval_ms: u64,
    /// Collector: max silence from a client before eviction.
    pub stale_client_window_ms: u64,
    /// Collector: max idle time before proactively pinging a client.
    pub ping_idle_window_ms: u64,

    /// Client: period of the `hello` resync sent upstream, keeping this
    /// client's entry in the Collector's `ClientRegistry` from going stale.
    pub client_hello_interval_ms: u64,
}

impl Config {
    /// Loads configuration from `config.toml` and environment variables
    /// prefixed `TELEMETRY_`, layered over [`Config::default`].
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("TELEMETRY_"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("keys"),
            port_agent: PORT_AGENT,
            port_client: PORT_CLIENT,
            push_interval_ms: 5_000,
            liveness_interval_ms: 30_000,
            stale_window_ms: 30_000,
            model_request_debounce_ms: 5_000,
            agent_sweep_interval_ms: 15_000,
            stale_agent_window_ms: 30_000,
            client_sweep_interval_ms: 5_000,
            stale_client_window_ms: 30_000,
            ping_idle_window_ms: 20_000,
            client_hello_interval_ms: 15_000,
        }
    }
}
