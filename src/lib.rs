//! src/lib.rs
//!
//! Library crate for the host-metrics telemetry system: the Agent
//! connection state machine, the Collector's dual-endpoint event loop, the
//! wire codec, and the supporting transport/key/config/sampling layers
//! shared by the `agent`, `collector`, and `client` binaries.

pub mod agent;
pub mod client;
pub mod codec;
pub mod collector;
pub mod config;
pub mod display;
pub mod error;
pub mod host;
pub mod keys;
pub mod relay;
pub mod registry;
pub mod sampling;
pub mod transport;

pub use config::Config;
pub use error::Error;
