//! RPC channel integration tests
//!
//! Round-trip, timeout exhaustion, late-reply discard, and correlation of
//! concurrent calls over the in-memory broker.

use messaging::{serve, BrokerTransport, Envelope, InMemoryBroker, RpcClient, RpcError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn broker() -> Arc<InMemoryBroker> {
    Arc::new(InMemoryBroker::new())
}

#[tokio::test]
async fn call_round_trips_through_responsive_server() {
    let broker = broker();

    let server_broker = Arc::clone(&broker);
    let server = tokio::spawn(async move {
        let transport: Arc<dyn messaging::BrokerTransport> = server_broker;
        serve(Arc::clone(&transport), "echo", |payload: Value| async move {
            json!({"status": "ok", "echo": payload})
        })
        .await
    });

    let client = RpcClient::connect(broker).await.unwrap();
    let response = client
        .call(
            "echo",
            &json!({"n": 42}),
            Duration::from_secs(1),
            3,
        )
        .await
        .unwrap();

    assert_eq!(response["status"], "ok");
    assert_eq!(response["echo"]["n"], 42);
    assert_eq!(client.in_flight(), 0);

    server.abort();
}

#[tokio::test]
async fn call_with_no_server_exhausts_attempts() {
    let broker = broker();
    let client = RpcClient::connect(Arc::clone(&broker) as Arc<dyn messaging::BrokerTransport>)
        .await
        .unwrap();

    let result = client
        .call(
            "nobody_home",
            &json!({"n": 1}),
            Duration::from_millis(50),
            3,
        )
        .await;

    match result {
        Err(RpcError::Timeout { attempts }) => assert_eq!(attempts, 3),
        other => panic!("Expected timeout, got {other:?}"),
    }

    // One publish per attempt, each with its own correlation id
    assert_eq!(broker.pending_len("nobody_home"), 3);
    // Stale entries were deregistered, not leaked
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn late_reply_is_discarded_and_channel_stays_usable() {
    let broker = broker();

    // A server that replies well after the caller's deadline
    let slow_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        let mut consumer = slow_broker.subscribe("slow").await.unwrap();
        while let Some(delivery) = consumer.next().await {
            let reply_to = delivery.envelope.reply_to.clone().unwrap();
            let correlation_id = delivery.envelope.correlation_id.clone();
            tokio::time::sleep(Duration::from_millis(150)).await;
            slow_broker
                .publish(
                    &reply_to,
                    Envelope::response(json!({"late": true}), correlation_id),
                )
                .await
                .unwrap();
            slow_broker.ack(&delivery).await.unwrap();
        }
    });

    let echo_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        let transport: Arc<dyn messaging::BrokerTransport> = echo_broker;
        serve(Arc::clone(&transport), "echo", |payload: Value| async move { payload }).await
    });

    let client = RpcClient::connect(Arc::clone(&broker) as Arc<dyn messaging::BrokerTransport>)
        .await
        .unwrap();

    let result = client
        .call("slow", &json!({}), Duration::from_millis(50), 1)
        .await;
    assert!(matches!(result, Err(RpcError::Timeout { attempts: 1 })));

    // Let the stale reply arrive; the pump must drop it silently
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The channel still resolves fresh calls correctly afterwards
    let response = client
        .call("echo", &json!({"n": 7}), Duration::from_secs(1), 1)
        .await
        .unwrap();
    assert_eq!(response["n"], 7);
}

#[tokio::test]
async fn concurrent_calls_resolve_by_correlation_id() {
    let broker = broker();

    // Two servers with different latencies sharing the caller's reply queue,
    // so replies arrive in the opposite order of the requests.
    for (queue, delay_ms) in [("slow_echo", 80u64), ("fast_echo", 10u64)] {
        let server_broker = Arc::clone(&broker);
        tokio::spawn(async move {
            let transport: Arc<dyn messaging::BrokerTransport> = server_broker;
            serve(Arc::clone(&transport), queue, move |payload: Value| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                payload
            })
            .await
        });
    }

    let client = Arc::new(
        RpcClient::connect(Arc::clone(&broker) as Arc<dyn messaging::BrokerTransport>)
            .await
            .unwrap(),
    );

    let c1 = Arc::clone(&client);
    let slow = tokio::spawn(async move {
        c1.call("slow_echo", &json!({"n": 1}), Duration::from_secs(1), 1)
            .await
    });
    let c2 = Arc::clone(&client);
    let fast = tokio::spawn(async move {
        c2.call("fast_echo", &json!({"n": 2}), Duration::from_secs(1), 1)
            .await
    });

    let slow = slow.await.unwrap().unwrap();
    let fast = fast.await.unwrap().unwrap();

    // Out-of-order replies land with their own callers
    assert_eq!(slow["n"], 1);
    assert_eq!(fast["n"], 2);
}

#[tokio::test]
async fn closed_broker_surfaces_transport_error() {
    let broker = broker();
    let client = RpcClient::connect(Arc::clone(&broker) as Arc<dyn messaging::BrokerTransport>)
        .await
        .unwrap();

    broker.close();

    let result = client
        .call("anywhere", &json!({}), Duration::from_millis(50), 3)
        .await;
    assert!(matches!(result, Err(RpcError::Transport(_))));
}
