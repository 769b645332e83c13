//! src/client.rs
//!
//! The Client: dials the Collector's authenticated client-facing endpoint,
//! sends `hello`, and hands every received frame to a [`Display`]
//! collaborator. Reconnects silently on any transport error, mirroring the
//! Agent's reconnect behavior.
//!
//! Grounded on `examples/original_source/app_client.py`'s `AppClient`,
//! which resends `hello` on a periodic timer (not just once at connect) so
//! the Collector's view of this client stays live between metric pushes.

use crate::codec::Message;
use crate::config::Config;
use crate::display::Display;
use crate::error::Result;
use crate::transport::{self, Frame};
use ed25519_dalek::SigningKey;
use std::net::SocketAddr;
use std::time::Duration;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub async fn run(target: SocketAddr, config: &Config, signing_key: &SigningKey, display: &dyn Display) -> Result<()> {
    loop {
        match run_connection(target, config, signing_key, display).await {
            Ok(()) => tracing::info!(%target, "connection to collector ended, reconnecting"),
            Err(e) => tracing::warn!(%target, error = %e, "connection to collector failed, reconnecting"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_connection(target: SocketAddr, config: &Config, signing_key: &SigningKey, display: &dyn Display) -> Result<()> {
    let connection = transport::dial(signing_key, target).await?;
    tracing::info!(%target, "connected to collector");
    transport::send_message(&connection, &Message::hello()).await?;

    let mut hello_resync = tokio::time::interval(Duration::from_millis(config.client_hello_interval_ms));
    hello_resync.tick().await; // consume the immediate first tick; hello was just sent above

    loop {
        tokio::select! {
            frame = transport::recv_message(&connection) => {
                match frame? {
                    None => return Ok(()),
                    Some(Frame::Malformed) => tracing::info!("discarding malformed frame from collector"),
                    Some(Frame::Message(message)) => display.show(&message),
                }
            }
            _ = hello_resync.tick() => {
                transport::send_message(&connection, &Message::hello()).await?;
            }
        }
    }
}
