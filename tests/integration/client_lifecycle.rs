//! tests/integration/client_lifecycle.rs
//!
//! A client joining after an agent is already streaming, and one that was
//! never authorized in the first place.

use crate::common::harness::{fast_config, metrics_grid_value, wait_for_frame, FixedSampler, TestAgent, TestClient, TestCollector};
use std::time::Duration;
use telemetry_net::codec::{Message, MetricsKind};
use telemetry_net::keys::{FileKeyProvider, KeyProvider};
use telemetry_net::transport;

#[tokio::test]
async fn late_client_receives_cached_model_on_hello() {
    let config = fast_config();
    let collector = TestCollector::spawn(config.clone()).await.unwrap();
    let _agent = TestAgent::spawn(&collector, "host-a", FixedSampler::new(777.0, 1.0))
        .await
        .unwrap();

    // Give the agent time to complete its handshake and push a model frame
    // before any client exists to observe it directly.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut client = TestClient::spawn(&collector, &config, "latecomer").await.unwrap();
    let model = wait_for_frame(&mut client.frames, Duration::from_secs(2), |m| {
        matches!(m, Message::Metrics { hostname, kind: MetricsKind::Model, .. } if hostname == "host-a")
    })
    .await
    .unwrap();
    assert_eq!(metrics_grid_value(&model, "host-a"), Some(777.0));
}

#[tokio::test]
async fn unauthorized_client_is_rejected_at_the_transport() {
    let config = fast_config();
    let collector = TestCollector::spawn(config.clone()).await.unwrap();

    let temp = tempfile::tempdir().unwrap();
    let key_provider = FileKeyProvider::new(temp.path(), "intruder");
    let signing_key = key_provider.load_local_keypair().unwrap();

    // TLS 1.3 lets the client finish its own handshake before the server has
    // validated the client certificate, so `dial` itself can still succeed;
    // the rejection shows up as the connection closing out from under the
    // first attempt to use it.
    let connection = transport::dial(&signing_key, collector.client_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let result = transport::send_message(&connection, &Message::hello()).await;
    assert!(result.is_err(), "an unauthorized client's certificate must be rejected");
}
