//! src/agent.rs
//!
//! The Agent connection state machine: `Disconnected -> Connecting ->
//! AwaitingModelRequest -> Streaming -> StaleDetected`, looping back to
//! `Disconnected` on any transport error or silence from the Collector.
//! Grounded on `examples/original_source/app_agent.py`'s `AppAgent`/
//! `AgentDealerConnection`, translated from its callback-driven ZeroMQ
//! DEALER style into a single `tokio::select!` loop per connection attempt.

use crate::codec::{Message, MetricGrid, MetricsKind};
use crate::config::Config;
use crate::error::Result;
use crate::host::Host;
use crate::sampling::Sampler;
use crate::transport::{self, Frame};
use ed25519_dalek::SigningKey;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Interval;

/// Runs the agent forever: dials `collector_host`, streams metrics, and
/// silently reconnects on any stale or failed connection. Returns only on
/// a fatal local error (never on a peer's misbehavior or disappearance).
pub async fn run(
    collector_host: IpAddr,
    config: &Config,
    signing_key: &SigningKey,
    sampler: &dyn Sampler,
    host: &Host,
) -> Result<()> {
    let target = SocketAddr::new(collector_host, config.port_agent);
    loop {
        match run_connection(target, config, signing_key, sampler, host).await {
            Ok(()) => tracing::info!(%target, "connection to collector ended, reconnecting"),
            Err(e) => tracing::warn!(%target, error = %e, "connection to collector failed, reconnecting"),
        }
    }
}

async fn run_connection(
    target: SocketAddr,
    config: &Config,
    signing_key: &SigningKey,
    sampler: &dyn Sampler,
    host: &Host,
) -> Result<()> {
    let connection = transport::dial(signing_key, target).await?;
    tracing::info!(%target, "connected to collector");
    transport::send_message(&connection, &Message::hello()).await?;

    let stale_window = Duration::from_millis(config.stale_window_ms);
    let debounce = Duration::from_millis(config.model_request_debounce_ms);
    let push_interval = Duration::from_millis(config.push_interval_ms);
    let now = tokio::time::Instant::now();
    let mut liveness_sweep =
        tokio::time::interval_at(now + Duration::from_millis(config.liveness_interval_ms), Duration::from_millis(config.liveness_interval_ms));

    let mut last_collector_msg_at: Option<tokio::time::Instant> = None;
    let mut last_model_request_at: Option<tokio::time::Instant> = None;
    let mut push_timer: Option<Interval> = None;

    loop {
        tokio::select! {
            frame = transport::recv_message(&connection) => {
                match frame? {
                    None => return Ok(()),
                    Some(Frame::Malformed) => {
                        tracing::info!("discarding malformed frame from collector");
                    }
                    Some(Frame::Message(Message::Control { kind })) => {
                        let now = tokio::time::Instant::now();
                        last_collector_msg_at = Some(now);
                        if kind == "model" {
                            let debounced = last_model_request_at
                                .is_some_and(|t| now.duration_since(t) < debounce);
                            if !debounced {
                                last_model_request_at = Some(now);
                                send_metrics(&connection, sampler, host, MetricsKind::Model).await?;
                                if push_timer.is_none() {
                                    push_timer = Some(tokio::time::interval_at(now + push_interval, push_interval));
                                }
                            }
                        }
                    }
                    Some(Frame::Message(_)) => {
                        last_collector_msg_at = Some(tokio::time::Instant::now());
                    }
                }
            }
            _ = next_push_tick(&mut push_timer) => {
                send_metrics(&connection, sampler, host, MetricsKind::Metrics).await?;
            }
            _ = liveness_sweep.tick() => {
                let stale = match last_collector_msg_at {
                    None => true,
                    Some(t) => t.elapsed() > stale_window,
                };
                if stale {
                    tracing::warn!(%target, "no message from collector within the stale window");
                    return Ok(());
                }
            }
        }
    }
}

async fn next_push_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn send_metrics(
    connection: &quinn::Connection,
    sampler: &dyn Sampler,
    host: &Host,
    kind: MetricsKind,
) -> Result<()> {
    let grid = build_grid(sampler, host, kind);
    transport::send_message(
        connection,
        &Message::Metrics {
            hostname: host.hostname.clone(),
            grid,
            kind,
        },
    )
    .await
}

fn build_grid(sampler: &dyn Sampler, host: &Host, kind: MetricsKind) -> MetricGrid {
    let samples = sampler.sample(kind);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    let metric_names: Vec<String> = samples.iter().map(|(name, _)| name.clone()).collect();
    let row = samples.into_iter().map(|(_, value)| Some((value, timestamp))).collect();

    let mut hosts = HashMap::new();
    hosts.insert(host.hostname.clone(), row);
    MetricGrid { metric_names, hosts }
}
