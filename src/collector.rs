//! src/collector.rs
//!
//! The Collector: an agent-side listener and a client-side listener sharing
//! one single-owner event loop, exactly as described by
//! `examples/original_source/app_collector.py`'s `AppCollector` (one process,
//! two ZeroMQ sockets, all registry mutation on one callback thread) —
//! translated here into one `tokio::select!` loop fed by events from two
//! accept loops, so there is exactly one owner of `AgentRegistry` and
//! `ClientRegistry` and no lock is needed.
//!
//! The registry-mutating decisions are pure functions of `(state, frame)`
//! (`handle_agent_frame`/`handle_client_frame`/the two sweep wrappers),
//! kept separate from the connection/IO plumbing in [`run`] so they can be
//! tested without a live QUIC connection.

use crate::codec::{Message, MetricsKind};
use crate::config::Config;
use crate::error::Result;
use crate::registry::{AgentRegistry, ClientRegistry};
use crate::relay;
use crate::transport::{self, Frame, PeerId};
use ed25519_dalek::SigningKey;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const EVENT_QUEUE_CAPACITY: usize = 1024;
const CLIENT_QUEUE_CAPACITY: usize = 64;

#[derive(Default)]
struct CollectorState {
    agents: AgentRegistry,
    clients: ClientRegistry,
    agent_conns: HashMap<PeerId, quinn::Connection>,
    client_senders: HashMap<PeerId, mpsc::Sender<Message>>,
}

/// An outbound action the pure decision functions ask the IO layer to take
/// in response to one inbound frame. Kept separate from the act of sending
/// so the decision logic is testable without a connection.
#[derive(Debug, Clone, PartialEq)]
enum AgentAction {
    ReplyTo(PeerId, Message),
    Relay(Message),
}

/// Applies one frame received from agent `peer` to `state`, returning the
/// actions the caller must perform: touch liveness unconditionally, then
/// dispatch on the frame's tag.
fn handle_agent_frame(state: &mut CollectorState, peer: PeerId, frame: Frame, now: Instant) -> Vec<AgentAction> {
    state.agents.touch(peer, now);
    match frame {
        Frame::Malformed => Vec::new(),
        Frame::Message(Message::Control { kind }) if kind == "hello" => {
            vec![AgentAction::ReplyTo(peer, Message::control("model"))]
        }
        Frame::Message(Message::Control { .. }) => Vec::new(),
        Frame::Message(Message::Metrics { hostname, grid, kind }) => {
            state.agents.reconcile_hostname(&hostname, peer);
            let mut actions = Vec::new();
            match kind {
                MetricsKind::Model => {
                    state
                        .agents
                        .cache_model(&hostname, Message::Metrics { hostname: hostname.clone(), grid: grid.clone(), kind });
                }
                MetricsKind::Metrics if !state.agents.has_model(&hostname) => {
                    actions.push(AgentAction::ReplyTo(peer, Message::control("model")));
                }
                MetricsKind::Metrics => {}
            }
            actions.push(AgentAction::Relay(Message::Metrics { hostname, grid, kind }));
            actions
        }
        Frame::Message(Message::ClientMetrics { .. }) => Vec::new(),
    }
}

/// Applies one frame received from client `peer`. A `hello` triggers a
/// bootstrap of every cached model frame (resync-on-hello, per the
/// normative reading of the source's client-join handling); every other
/// control message is liveness-only.
fn handle_client_frame(state: &mut CollectorState, peer: PeerId, frame: Frame, now: Instant) -> Vec<Message> {
    state.clients.touch(peer, now);
    match frame {
        Frame::Message(Message::Control { kind }) if kind == "hello" => {
            state.agents.model_cache().values().cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Runs the Collector forever: binds both endpoints, accepts connections on
/// each, and owns the single event loop that mutates both registries.
pub async fn run(bind_ip: IpAddr, config: &Config, signing_key: &SigningKey, authorized_dir: &Path) -> Result<()> {
    let agent_endpoint = transport::bind_agent_endpoint(SocketAddr::new(bind_ip, config.port_agent), signing_key)?;
    let client_endpoint =
        transport::bind_client_endpoint(SocketAddr::new(bind_ip, config.port_client), signing_key, authorized_dir)?;
    tracing::info!(agent_port = config.port_agent, client_port = config.port_client, "collector listening");

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    tokio::spawn(run_agent_listener(agent_endpoint, events_tx.clone()));
    tokio::spawn(run_client_listener(client_endpoint, events_tx));

    let mut state = CollectorState::default();
    let mut agent_sweep = tokio::time::interval(Duration::from_millis(config.agent_sweep_interval_ms));
    let mut client_sweep = tokio::time::interval(Duration::from_millis(config.client_sweep_interval_ms));
    let stale_agent_window = Duration::from_millis(config.stale_agent_window_ms);
    let stale_client_window = Duration::from_millis(config.stale_client_window_ms);
    let ping_idle_window = Duration::from_millis(config.ping_idle_window_ms);

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { return Ok(()) };
                apply_event(&mut state, event);
            }
            _ = agent_sweep.tick() => {
                let result = state.agents.sweep(Instant::now(), stale_agent_window);
                for peer in result.to_ping {
                    send_agent(&state, peer, Message::control("ping"));
                }
                for peer in result.removed {
                    state.agent_conns.remove(&peer);
                }
            }
            _ = client_sweep.tick() => {
                let result = state.clients.sweep(Instant::now(), stale_client_window, ping_idle_window);
                let now = Instant::now();
                for peer in result.to_ping {
                    if let Some(sender) = state.client_senders.get(&peer) {
                        if sender.try_send(Message::control("ping")).is_ok() {
                            state.clients.record_send(peer, now);
                        }
                    }
                }
                for peer in result.removed {
                    state.client_senders.remove(&peer);
                }
            }
        }
    }
}

enum CollectorEvent {
    AgentConnected(PeerId, quinn::Connection),
    AgentFrame(PeerId, Frame),
    ClientConnected(PeerId, mpsc::Sender<Message>),
    ClientFrame(PeerId, Frame),
}

fn apply_event(state: &mut CollectorState, event: CollectorEvent) {
    let now = Instant::now();
    match event {
        CollectorEvent::AgentConnected(peer, connection) => {
            state.agent_conns.insert(peer, connection);
        }
        CollectorEvent::AgentFrame(peer, frame) => {
            for action in handle_agent_frame(state, peer, frame, now) {
                match action {
                    AgentAction::ReplyTo(peer, msg) => send_agent(state, peer, msg),
                    AgentAction::Relay(msg) => {
                        let attempted = relay::fan_out(&msg, &state.client_senders);
                        for peer in attempted {
                            state.clients.record_send(peer, now);
                        }
                    }
                }
            }
        }
        CollectorEvent::ClientConnected(peer, sender) => {
            state.client_senders.insert(peer, sender);
        }
        CollectorEvent::ClientFrame(peer, frame) => {
            for msg in handle_client_frame(state, peer, frame, now) {
                if let Some(sender) = state.client_senders.get(&peer) {
                    if sender.try_send(msg).is_ok() {
                        state.clients.record_send(peer, now);
                    }
                }
            }
        }
    }
}

/// Agent control replies (`model`, `ping`) don't need to block the event
/// loop on a slow peer, so each rides its own best-effort send task.
fn send_agent(state: &CollectorState, peer: PeerId, msg: Message) {
    if let Some(connection) = state.agent_conns.get(&peer).cloned() {
        tokio::spawn(async move {
            if let Err(e) = transport::send_message(&connection, &msg).await {
                tracing::debug!(%peer, error = %e, "failed to send to agent");
            }
        });
    }
}

async fn run_agent_listener(endpoint: quinn::Endpoint, events: mpsc::Sender<CollectorEvent>) {
    loop {
        match transport::accept(&endpoint).await {
            None => return,
            Some(Err(e)) => tracing::debug!(error = %e, "agent connection attempt failed"),
            Some(Ok((connection, peer))) => {
                if events
                    .send(CollectorEvent::AgentConnected(peer, connection.clone()))
                    .await
                    .is_err()
                {
                    return;
                }
                let events = events.clone();
                tokio::spawn(async move {
                    loop {
                        match transport::recv_message(&connection).await {
                            Ok(Some(frame)) => {
                                if events.send(CollectorEvent::AgentFrame(peer, frame)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => return,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "agent connection closed");
                                return;
                            }
                        }
                    }
                });
            }
        }
    }
}

async fn run_client_listener(endpoint: quinn::Endpoint, events: mpsc::Sender<CollectorEvent>) {
    loop {
        match transport::accept(&endpoint).await {
            None => return,
            Some(Err(e)) => tracing::debug!(error = %e, "client connection attempt failed"),
            Some(Ok((connection, peer))) => {
                let (sender, mut receiver) = mpsc::channel::<Message>(CLIENT_QUEUE_CAPACITY);
                let write_conn = connection.clone();
                tokio::spawn(async move {
                    while let Some(msg) = receiver.recv().await {
                        if transport::send_message(&write_conn, &msg).await.is_err() {
                            return;
                        }
                    }
                });

                if events.send(CollectorEvent::ClientConnected(peer, sender)).await.is_err() {
                    return;
                }

                let events = events.clone();
                tokio::spawn(async move {
                    loop {
                        match transport::recv_message(&connection).await {
                            Ok(Some(frame)) => {
                                if events.send(CollectorEvent::ClientFrame(peer, frame)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => return,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "client connection closed");
                                return;
                            }
                        }
                    }
                });
            }
        }
    }
}
