//! Integration tests for retrying event delivery.
//!
//! Drives a real [`EventClient`] against a mock HTTP receiver through the
//! [`DeliveryManager`] retry loop.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use cecli_core::{ErrorCode, Event, EventOptions, TransportConfig};
use cecli_delivery::{
    ClientConfig, DeliveryManager, DeliveryOutcome, DeliveryPolicy, DeliveryState, EventClient,
    EventSender,
};
use serde_json::json;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn insecure() -> TransportConfig {
    TransportConfig { insecure: true, ..Default::default() }
}

fn order_event() -> Event {
    Event::new(&EventOptions {
        source: Some("shop/orders".to_string()),
        event_type: Some("order.created".to_string()),
        data: Some(json!({"order": 42})),
    })
}

#[tokio::test]
async fn recovers_after_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("ce-type", "order.created"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = EventClient::build_for_target(&insecure(), &server.uri()).unwrap();
    let policy = DeliveryPolicy::from_millis(3, 10).unwrap();
    let mut manager = DeliveryManager::with_policy(order_event(), policy);

    let report = manager.send(&client).await.expect("third attempt should be acknowledged");

    assert_eq!(report.state, DeliveryState::Acked);
    assert_eq!(report.attempts, 3);
}

#[tokio::test]
async fn persistent_rejection_is_not_accepted() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unsupported type"))
        .expect(2)
        .mount(&server)
        .await;

    let client = EventClient::build_for_target(&insecure(), &server.uri()).unwrap();
    let policy = DeliveryPolicy::from_millis(2, 10).unwrap();
    let mut manager = DeliveryManager::with_policy(order_event(), policy);

    let error = manager.send(&client).await.unwrap_err();

    assert_eq!(error.code(), ErrorCode::NotAccepted);
    assert!(error.message().contains("unsupported type"));
}

#[tokio::test]
async fn slow_receiver_is_undelivered() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = ClientConfig { timeout: Duration::from_millis(100), ..Default::default() };
    let client = EventClient::build_for_target_with(&insecure(), &server.uri(), config).unwrap();

    let outcome = client.send(&order_event()).await;

    assert!(matches!(outcome, DeliveryOutcome::Undelivered { .. }), "got {outcome:?}");
}

#[tokio::test]
async fn loaded_data_is_sent_as_body() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("content-type", "application/json"))
        .and(matchers::body_json(json!({"sku": "A-1", "qty": 2})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = EventClient::build_for_target(&insecure(), &server.uri()).unwrap();
    let mut manager = DeliveryManager::new(order_event());
    manager.load_json_data(br#"{"sku": "A-1", "qty": 2}"#).unwrap();

    let report = manager.send(&client).await.unwrap();

    assert_eq!(report.state, DeliveryState::Acked);
}
