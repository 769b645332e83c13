//! tests/integration/resilience.rs
//!
//! Recovery behavior: a collector restarting loses no correctness (new
//! connections cold-start cleanly), and an agent reconnects on its own when
//! the collector goes silent.

use crate::common::harness::{fast_config, metrics_grid_value, wait_for_frame, FixedSampler, TestAgent, TestClient, TestCollector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry_net::codec::{Message, MetricsKind};
use telemetry_net::config::Config;
use telemetry_net::keys::{FileKeyProvider, KeyProvider};
use telemetry_net::transport;

#[tokio::test]
async fn collector_restart_cold_starts_new_connections() {
    let config = fast_config();
    let collector = TestCollector::spawn(config.clone()).await.unwrap();
    {
        let _agent = TestAgent::spawn(&collector, "host-a", FixedSampler::new(10.0, 20.0))
            .await
            .unwrap();
        let mut client = TestClient::spawn(&collector, &config, "client-a").await.unwrap();
        wait_for_frame(&mut client.frames, Duration::from_secs(2), |m| {
            matches!(m, Message::Metrics { hostname, kind: MetricsKind::Metrics, .. } if hostname == "host-a")
        })
        .await
        .unwrap();
    }

    let collector = collector.restart().await.unwrap();

    let _agent = TestAgent::spawn(&collector, "host-a", FixedSampler::new(99.0, 77.0))
        .await
        .unwrap();
    let mut client = TestClient::spawn(&collector, &config, "client-b").await.unwrap();

    let model = wait_for_frame(&mut client.frames, Duration::from_secs(2), |m| {
        matches!(m, Message::Metrics { hostname, kind: MetricsKind::Model, .. } if hostname == "host-a")
    })
    .await
    .unwrap();
    assert_eq!(metrics_grid_value(&model, "host-a"), Some(99.0));

    let metrics = wait_for_frame(&mut client.frames, Duration::from_secs(2), |m| {
        matches!(m, Message::Metrics { hostname, kind: MetricsKind::Metrics, .. } if hostname == "host-a")
    })
    .await
    .unwrap();
    assert_eq!(metrics_grid_value(&metrics, "host-a"), Some(77.0));
}

#[tokio::test]
async fn agent_reconnects_after_collector_goes_silent() {
    let config = fast_config();
    let temp = tempfile::tempdir().unwrap();
    let key_provider = FileKeyProvider::new(temp.path(), "stub-collector");
    let signing_key = key_provider.load_local_keypair().unwrap();

    let bind_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let endpoint = transport::bind_agent_endpoint(bind_addr, &signing_key).unwrap();
    let stub_addr = endpoint.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let stub_attempts = attempts.clone();
    tokio::spawn(async move {
        while let Some(Ok((connection, _peer))) = transport::accept(&endpoint).await {
            stub_attempts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move { while let Ok(Some(_frame)) = transport::recv_message(&connection).await {} });
        }
    });

    let agent_key_dir = tempfile::tempdir().unwrap();
    let agent_key_provider = FileKeyProvider::new(agent_key_dir.path(), "agent-host-a");
    let agent_signing_key = agent_key_provider.load_local_keypair().unwrap();
    let host = telemetry_net::host::Host { hostname: "host-a".to_string() };
    let sampler = FixedSampler::new(1.0, 1.0);
    // agent::run rebuilds its dial target from config.port_agent, so the
    // agent's config must carry the stub's actual bound port.
    let agent_config = Config { port_agent: stub_addr.port(), ..config.clone() };
    tokio::spawn(async move {
        let _ = telemetry_net::agent::run(stub_addr.ip(), &agent_config, &agent_signing_key, &sampler, &host).await;
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        attempts.load(Ordering::SeqCst) >= 3,
        "agent should have redialed several times while the collector stayed silent, saw {}",
        attempts.load(Ordering::SeqCst)
    );
}
