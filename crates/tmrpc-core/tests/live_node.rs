use std::env;
use std::sync::Once;
use std::time::Duration;

use futures::StreamExt;

use tmrpc_core::requests::TxSearchParams;
use tmrpc_core::{build_tx_query, Client, TransportConfig, TxQuery};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tmrpc_core=debug")),
            )
            .with_target(true)
            .try_init();
    });
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Tendermint node; set TMRPC_TEST_URL"]
async fn live_node_answers_queries() {
    init_tracing();
    let url = env::var("TMRPC_TEST_URL").expect("TMRPC_TEST_URL must be set");

    let client = Client::connect(&url, &TransportConfig::default())
        .await
        .expect("connect and detect version");
    eprintln!("[itest] {url} speaks {}", client.version());

    let status = client.status().await.expect("status must decode");
    let height = status.sync_info.latest_block_height;
    assert!(height > 0, "node has produced no blocks yet");

    let block = client.block(Some(height)).await.expect("block must decode");
    assert_eq!(block.block_meta.header.height, height);
    assert_eq!(block.block.header.chain_id, status.node_info.network);

    let validators = client.validators(Some(height)).await.expect("validators");
    assert!(!validators.results.is_empty());

    client.genesis().await.expect("genesis must decode");
    client.abci_info().await.expect("abci_info must decode");

    let query = build_tx_query(&TxQuery {
        min_height: Some(0),
        ..TxQuery::default()
    });
    let found = client
        .tx_search(&TxSearchParams::new(query))
        .await
        .expect("tx_search must decode");
    eprintln!("[itest] {} indexed transactions", found.total_count);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Tendermint node; set TMRPC_TEST_WS_URL"]
async fn live_node_streams_headers() {
    init_tracing();
    let url = env::var("TMRPC_TEST_WS_URL").expect("TMRPC_TEST_WS_URL must be set");

    let client = Client::connect(&url, &TransportConfig::default())
        .await
        .expect("connect and detect version");
    let mut headers = client
        .subscribe_new_block_header()
        .await
        .expect("subscribe");
    let first = tokio::time::timeout(Duration::from_secs(30), headers.next())
        .await
        .expect("a header within 30s")
        .expect("stream open")
        .expect("header must decode");

    let height = client.watch_height().await.expect("watch height");
    let reached = tokio::time::timeout(
        Duration::from_secs(30),
        height.wait_for(move |h| *h > first.height),
    )
    .await
    .expect("height advances within 30s");
    assert!(reached.is_some());
    client.disconnect();
}
