//! src/relay.rs
//!
//! The fan-out relay: a pure function of a `Metrics` frame and the set of
//! currently-registered clients' send queues. Invoked synchronously from
//! the agent receive path so that a frame reaches every live client before
//! the next frame is processed; never invoked for non-metric frames.
//!
//! Each client's queue is a bounded `mpsc::Sender<Message>` owned by that
//! client's writer task — `try_send` never blocks, so a busy or gone client
//! simply loses this frame without holding up the receive loop.

use crate::codec::Message;
use crate::transport::PeerId;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Attempts to deliver `message` to every client in `senders`. Returns the
/// set of clients a send was attempted for, regardless of whether the queue
/// accepted it — attempting is what the registry's `last_send` bookkeeping
/// is keyed on.
pub fn fan_out(message: &Message, senders: &HashMap<PeerId, mpsc::Sender<Message>>) -> Vec<PeerId> {
    if !matches!(message, Message::Metrics { .. }) {
        return Vec::new();
    }

    let mut attempted = Vec::with_capacity(senders.len());
    for (&peer, sender) in senders {
        attempted.push(peer);
        if let Err(e) = sender.try_send(message.clone()) {
            tracing::debug!(peer = %peer, error = %e, "dropped relay frame for client");
        }
    }
    attempted
}
