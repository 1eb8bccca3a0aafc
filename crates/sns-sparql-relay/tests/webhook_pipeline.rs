// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests: webhook in, SPARQL update out.
//!
//! Runs a full relay on 127.0.0.1 with the in-memory provider and a fake
//! triple store, then drives it over HTTP the way SNS would.

use axum::{extract::State, routing::post, Form, Router};
use parking_lot::Mutex;
use sns_sparql_relay::provider::ProviderCall;
use sns_sparql_relay::{
    MockPubSubClient, Relay, RelayConfig, RelayHandle, SubscriptionState,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

type Received = Arc<Mutex<Vec<String>>>;

/// Fake triple store recording every `update` form field.
async fn spawn_store(reply: &'static str) -> (String, Received) {
    async fn update(
        State((received, reply)): State<(Received, &'static str)>,
        Form(form): Form<HashMap<String, String>>,
    ) -> &'static str {
        received
            .lock()
            .push(form.get("update").cloned().unwrap_or_default());
        reply
    }

    let received: Received = Arc::default();
    let app = Router::new()
        .route("/statements", post(update))
        .with_state((received.clone(), reply));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/statements", addr), received)
}

fn config(update_endpoint: &str, fake_publish: bool) -> RelayConfig {
    let json = format!(
        r#"{{
            "SNSTopics": [
                {{
                    "TopicARN": "T1",
                    "SubjectURIPrefix": "http://ex.org/e",
                    "SubjectType": "http://ex.org#Event",
                    "ObjectTypes": [
                        {{ "property": "ts", "convert": "DateTimeFromEpochOrString", "type": "xsd:dateTime" }}
                    ]
                }},
                {{
                    "TopicARN": "T2",
                    "SubjectURIPrefix": "http://ex.org/alarms/",
                    "SubjectType": "http://ex.org#Alarm",
                    "FilterField": "severity",
                    "FilterValue": "HIGH"
                }}
            ],
            "snsEndpointURL": "http://relay.example.org:8765/",
            "PrivatePort": 8765,
            "SPARQL_Update_Endpoint": "{}",
            "FakePublish": {},
            "ProviderTimeoutSecs": 2,
            "ReloadGraceSecs": 0
        }}"#,
        update_endpoint, fake_publish
    );
    RelayConfig::from_json(&json).unwrap()
}

async fn start(
    update_endpoint: &str,
    fake_publish: bool,
) -> (RelayHandle<MockPubSubClient>, Arc<MockPubSubClient>) {
    start_with(config(update_endpoint, fake_publish)).await
}

async fn start_with(cfg: RelayConfig) -> (RelayHandle<MockPubSubClient>, Arc<MockPubSubClient>) {
    let client = Arc::new(MockPubSubClient::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay = Relay::start_on(cfg, client.clone(), listener).await.unwrap();
    (relay, client)
}

/// POST a body the way SNS does and check the acknowledgement.
async fn deliver(addr: SocketAddr, body: &str) {
    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .header("content-type", "text/plain; charset=UTF-8")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "");
}

/// Poll until `cond` holds; processing runs after the 200 is sent.
async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

fn notification(topic: &str, message_id: &str, message: &str) -> String {
    serde_json::json!({
        "Type": "Notification",
        "TopicArn": topic,
        "MessageId": message_id,
        "Message": message,
        "Timestamp": "2021-01-01T00:00:01.000Z",
    })
    .to_string()
}

#[tokio::test]
async fn test_start_subscribes_every_topic() {
    let (endpoint, _) = spawn_store("Update succeeded").await;
    let (relay, client) = start(&endpoint, false).await;

    assert_eq!(
        client.calls(),
        vec![
            ProviderCall::Subscribe {
                topic_id: "T1".into(),
                endpoint: "http://relay.example.org:8765/".into()
            },
            ProviderCall::Subscribe {
                topic_id: "T2".into(),
                endpoint: "http://relay.example.org:8765/".into()
            },
        ]
    );
    assert_eq!(
        relay.registry().state("T1").unwrap(),
        SubscriptionState::SubscriptionRequested
    );

    relay.shutdown().await;
}

#[tokio::test]
async fn test_confirmation_then_notification() {
    let (endpoint, received) = spawn_store("<html><body>Update succeeded</body></html>").await;
    let (relay, client) = start(&endpoint, false).await;
    let addr = relay.local_addr();

    deliver(
        addr,
        r#"{"Type":"SubscriptionConfirmation","TopicArn":"T1","Token":"tok-1",
            "SubscribeURL":"https://sns.example/?Action=ConfirmSubscription"}"#,
    )
    .await;
    let registry = relay.registry().clone();
    assert!(eventually(|| registry.subscription_handle("T1").is_some()).await);
    assert_eq!(registry.subscription_handle("T1").as_deref(), Some("T1:tok-1"));
    assert!(client.calls().contains(&ProviderCall::Confirm {
        topic_id: "T1".into(),
        token: "tok-1".into()
    }));

    deliver(
        addr,
        &notification("T1", "m1", r#"{"status":"ok","ts":"2021-01-01T00:00:00Z"}"#),
    )
    .await;
    assert!(eventually(|| received.lock().len() == 1).await);
    assert_eq!(
        received.lock()[0],
        "INSERT DATA {\n\
         <http://ex.org/e/m1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://ex.org#Event> .\n\
         <http://ex.org/e/m1> <http://ex.org/e#status> \"ok\" .\n\
         <http://ex.org/e/m1> <http://ex.org/e#ts> \"2021-01-01T00:00:00\"^^<http://www.w3.org/2001/XMLSchema#dateTime> .\n\
         }"
    );

    let report = relay.shutdown().await;
    assert_eq!(report.requested, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(client.unsubscribed(), vec!["T1:tok-1"]);
}

#[tokio::test]
async fn test_filter_suppresses_mismatch_only() {
    let (endpoint, received) = spawn_store("Update succeeded").await;
    let (relay, _) = start(&endpoint, false).await;
    let addr = relay.local_addr();

    deliver(addr, &notification("T2", "a1", r#"{"severity":"low","zone":"3"}"#)).await;
    deliver(addr, &notification("T2", "a2", r#"{"severity":"high","zone":"4"}"#)).await;
    deliver(addr, &notification("T2", "a3", r#"{"zone":"5"}"#)).await;

    assert!(eventually(|| received.lock().len() == 2).await);
    // Give a stray third update the chance to arrive.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let received = received.lock().clone();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|s| !s.contains("alarms/a1")));
    assert!(received.iter().any(|s| s.contains("<http://ex.org/alarms/a2>")));
    assert!(received.iter().any(|s| s.contains("<http://ex.org/alarms/a3>")));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let (endpoint, received) = spawn_store("Update succeeded").await;
    let (relay, _) = start(&endpoint, true).await;

    deliver(relay.local_addr(), &notification("T1", "m1", r#"{"status":"ok"}"#)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(received.lock().is_empty());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_bad_requests_still_acknowledged() {
    let (endpoint, received) = spawn_store("Update succeeded").await;
    let (relay, client) = start(&endpoint, false).await;
    let addr = relay.local_addr();

    deliver(addr, "this is not json").await;
    deliver(addr, &notification("T9", "m1", r#"{"status":"ok"}"#)).await;
    deliver(addr, r#"{"Type":"UnsubscribeConfirmation","TopicArn":"T1"}"#).await;

    let response = reqwest::get(format!("http://{}/anything", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().is_empty());
    assert_eq!(client.calls().len(), 2);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_rejected_update_is_not_retried() {
    let (endpoint, received) = spawn_store("Error: MALFORMED QUERY").await;
    let (relay, _) = start(&endpoint, false).await;

    deliver(relay.local_addr(), &notification("T1", "m1", r#"{"status":"ok"}"#)).await;
    assert!(eventually(|| received.lock().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(received.lock().len(), 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_and_closes_listener() {
    let (endpoint, _) = spawn_store("Update succeeded").await;
    let (relay, client) = start(&endpoint, false).await;
    let addr = relay.local_addr();

    for (topic, token) in [("T1", "a"), ("T2", "b")] {
        relay
            .subscriptions()
            .on_confirmation(topic, token)
            .await
            .unwrap();
    }
    client.delay_unsubscribe("T1:a", Duration::from_millis(50));
    client.hang_unsubscribe("T2:b");

    let registry = relay.registry().clone();
    let report = relay.shutdown().await;
    assert_eq!(report.requested, 2);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed, 1);

    assert!(registry.subscription_handle("T1").is_none());
    assert!(registry.subscription_handle("T2").is_none());
    assert!(reqwest::get(format!("http://{}/", addr)).await.is_err());
}

#[tokio::test]
async fn test_oversized_requests_still_acknowledged() {
    let (endpoint, received) = spawn_store("Update succeeded").await;
    let (relay, client) = start(&endpoint, false).await;
    let addr = relay.local_addr();
    let big = "x".repeat(3 * 1024 * 1024);

    deliver(addr, &big).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/", addr))
        .body(big)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().is_empty());
    assert_eq!(client.calls().len(), 2);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_confirmation_during_shutdown_is_refused() {
    let (endpoint, _) = spawn_store("Update succeeded").await;
    let mut cfg = config(&endpoint, false);
    cfg.reload_grace_secs = 1;
    let (relay, client) = start_with(cfg).await;
    let addr = relay.local_addr();
    let registry = relay.registry().clone();

    let shutdown = tokio::spawn(relay.shutdown());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The listener stays open through the grace period.
    deliver(
        addr,
        r#"{"Type":"SubscriptionConfirmation","TopicArn":"T1","Token":"late",
            "SubscribeURL":"https://sns.example/?Action=ConfirmSubscription"}"#,
    )
    .await;

    let report = shutdown.await.unwrap();
    assert_eq!(report.requested, 0);
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, ProviderCall::Confirm { .. })));
    assert!(registry.subscription_handle("T1").is_none());
}

#[tokio::test]
async fn test_relay_without_topics_serves_webhook() {
    let (endpoint, received) = spawn_store("Update succeeded").await;
    let mut cfg = config(&endpoint, false);
    cfg.topics.clear();
    let (relay, client) = start_with(cfg).await;
    assert!(relay.registry().is_empty());

    deliver(relay.local_addr(), &notification("T1", "m1", r#"{"status":"ok"}"#)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(received.lock().is_empty());
    assert!(client.calls().is_empty());
    assert_eq!(relay.shutdown().await.requested, 0);
}
