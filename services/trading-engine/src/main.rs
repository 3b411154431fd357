//! Single-process demo
//!
//! Wires the in-memory broker, the store, the matching service, and the
//! trading engine together, then drives a short crossing scenario as a
//! client would: connect, rest a sell, cross it with a buy, cancel the
//! remainder.

use matching_service::{MatchingService, ObsConfig};
use messaging::{BrokerTransport, InMemoryBroker, RpcClient};
use persistence::{MemoryStore, OrderStore};
use serde_json::json;
use std::sync::Arc;
use trading_engine::{TesConfig, TradingEngine};
use types::ids::AccountId;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting trading system demo");

    let broker: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());

    // Matching service (OBS)
    let obs_config = ObsConfig::from_env();
    let matching = Arc::new(MatchingService::new(Arc::clone(&store))?);
    let obs_broker = Arc::clone(&broker);
    let obs_queue = obs_config.request_queue.clone();
    let obs_task = tokio::spawn(async move { matching.run(obs_broker, &obs_queue).await });

    // Trading engine (TES): handshakes against the matching service before
    // accepting client traffic
    let tes_config = TesConfig::from_env();
    let tes_queue = tes_config.request_queue.clone();
    let engine = Arc::new(
        TradingEngine::connect(Arc::clone(&broker), Arc::clone(&store), tes_config).await?,
    );
    let tes_broker = Arc::clone(&broker);
    let tes_task = tokio::spawn(async move { engine.run(tes_broker).await });

    // A trading client
    let client = RpcClient::connect(Arc::clone(&broker)).await?;
    let trader_id = AccountId::new();
    let timeout = std::time::Duration::from_secs(5);

    let ack = client
        .call(
            &tes_queue,
            &json!({
                "action": "connect",
                "caller_id": trader_id,
                "timestamp": chrono::Utc::now().timestamp(),
            }),
            timeout,
            3,
        )
        .await?;
    tracing::info!(message = %ack["message"], "Connected");

    let resting = client
        .call(
            &tes_queue,
            &json!({
                "action": "place_order",
                "caller_id": trader_id,
                "symbol": "AAPL",
                "side": "sell",
                "quantity": "100",
                "price": "150.00",
                "order_type": "limit",
            }),
            timeout,
            3,
        )
        .await?;
    tracing::info!(order_id = %resting["order_id"], "Sell resting");

    let crossing = client
        .call(
            &tes_queue,
            &json!({
                "action": "place_order",
                "caller_id": AccountId::new(),
                "symbol": "AAPL",
                "side": "buy",
                "quantity": "60",
                "price": "151.00",
                "order_type": "limit",
            }),
            timeout,
            3,
        )
        .await?;
    for trade in crossing["trades"].as_array().into_iter().flatten() {
        tracing::info!(
            quantity = %trade["quantity"],
            price = %trade["price"],
            "Trade executed"
        );
    }

    let cancel = client
        .call(
            &tes_queue,
            &json!({
                "action": "cancel_order",
                "order_id": resting["order_id"],
            }),
            timeout,
            3,
        )
        .await?;
    tracing::info!(found = %cancel["found"], "Cancelled resting remainder");

    obs_task.abort();
    tes_task.abort();

    tracing::info!("Demo complete");
    Ok(())
}
