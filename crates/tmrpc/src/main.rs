mod cli;

use std::time::Duration;

use clap::Parser;
use eyre::{eyre, WrapErr};
use futures::{Stream, StreamExt};

use tmrpc_core::requests::{TxParams, TxSearchParams};
use tmrpc_core::responses::{Block, Header, TxEvent, TxResponse};
use tmrpc_core::rpc::connect_transport;
use tmrpc_core::{build_tx_query, tx_commit_success, Client, TransportConfig, TxHash, TxQuery, Version};

use cli::{BroadcastMode, Cli, Command, WatchKind};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config = TransportConfig {
        request_timeout: Duration::from_secs(args.timeout_secs),
        requests_per_second: args.requests_per_second,
        ..TransportConfig::default()
    };
    let client = connect(&args, &config).await?;
    tracing::info!(url = %args.url, version = %client.version(), "connected");

    let outcome = run(&client, args.command).await;
    client.disconnect();
    outcome
}

async fn connect(args: &Cli, config: &TransportConfig) -> eyre::Result<Client> {
    let client = match &args.node_version {
        Some(version) => {
            let version: Version = version.parse().wrap_err("parse --node-version")?;
            let rpc = connect_transport(&args.url, config).await?;
            Client::new(rpc, version)
        }
        None => Client::connect(&args.url, config).await?,
    };
    Ok(client)
}

async fn run(client: &Client, command: Command) -> eyre::Result<()> {
    match command {
        Command::Status => {
            let status = client.status().await.wrap_err("fetch status")?;
            let node = &status.node_info;
            let sync = &status.sync_info;
            println!("moniker:      {}", node.moniker);
            println!("network:      {}", node.network);
            println!("version:      {}", node.version);
            println!("height:       {}", sync.latest_block_height);
            println!("block time:   {}", sync.latest_block_time);
            println!("block hash:   {}", hex::encode_upper(&sync.latest_block_hash));
            println!("catching up:  {}", sync.catching_up);
            println!("voting power: {}", status.validator_info.voting_power);
        }
        Command::Block { height } => {
            let response = client.block(height).await.wrap_err("fetch block")?;
            print_block(&response.block);
        }
        Command::Tx { hash, prove } => {
            let hash = TxHash::from_hex(&hash).wrap_err("parse transaction hash")?;
            let tx = client
                .tx(&TxParams { hash, prove })
                .await
                .wrap_err("fetch transaction")?;
            print_tx(&tx);
            if let Some(proof) = &tx.proof {
                println!(
                    "  proof: index {} of {}, root {}",
                    proof.index,
                    proof.total,
                    hex::encode_upper(&proof.root_hash)
                );
            }
        }
        Command::Search {
            tags,
            height,
            min_height,
            max_height,
            page,
            per_page,
            all,
        } => {
            let query = build_tx_query(&TxQuery {
                tags,
                height,
                min_height,
                max_height,
                hash: None,
            });
            if query.as_str().is_empty() {
                return Err(eyre!("search needs at least one --tag or height filter"));
            }
            let mut params = TxSearchParams::new(query);
            params.page = page;
            params.per_page = per_page;

            let results = if all {
                client.tx_search_all(&params).await
            } else {
                client.tx_search(&params).await
            };
            let results = results.wrap_err("search transactions")?;
            println!("{} of {} matches", results.txs.len(), results.total_count);
            for tx in &results.txs {
                print_tx(tx);
            }
        }
        Command::Broadcast { tx, mode } => {
            let tx = hex::decode(tx.trim()).wrap_err("parse transaction hex")?;
            match mode {
                BroadcastMode::Async => {
                    let response = client.broadcast_tx_async(&tx).await?;
                    println!("submitted {}", response.hash);
                }
                BroadcastMode::Sync => {
                    let response = client.broadcast_tx_sync(&tx).await?;
                    println!("{} check code {}", response.hash, response.result.code);
                }
                BroadcastMode::Commit => {
                    let response = client.broadcast_tx_commit(&tx).await?;
                    let outcome = if tx_commit_success(&response) {
                        "committed"
                    } else {
                        "rejected"
                    };
                    match response.height {
                        Some(height) => println!("{} {outcome} at height {height}", response.hash),
                        None => println!("{} {outcome}", response.hash),
                    }
                }
            }
        }
        Command::Watch { kind, tags } => match kind {
            WatchKind::Blocks => {
                let blocks = client.subscribe_new_block().await?;
                follow(blocks, |block: Block| print_block(&block)).await;
            }
            WatchKind::Headers => {
                let headers = client.subscribe_new_block_header().await?;
                follow(headers, |header: Header| print_header(&header)).await;
            }
            WatchKind::Txs => {
                let query = build_tx_query(&TxQuery {
                    tags,
                    ..TxQuery::default()
                });
                let txs = client.subscribe_tx(&query).await?;
                follow(txs, |tx: TxEvent| {
                    println!(
                        "{} height {} index {} code {}",
                        tx.hash, tx.height, tx.index, tx.result.code
                    )
                })
                .await;
            }
        },
        Command::Height => {
            let height = client.watch_height().await.wrap_err("watch height")?;
            follow(height.subscribe().map(Ok::<_, tmrpc_core::CoreError>), |h| {
                println!("{h}")
            })
            .await;
            if let Some(err) = height.error() {
                return Err(eyre!("height watch failed: {err}"));
            }
        }
    }
    Ok(())
}

/// Print stream items until the stream ends or the user interrupts.
async fn follow<T, S>(mut items: S, mut print: impl FnMut(T))
where
    S: Stream<Item = Result<T, tmrpc_core::CoreError>> + Unpin,
{
    loop {
        tokio::select! {
            item = items.next() => match item {
                Some(Ok(item)) => print(item),
                Some(Err(e)) => tracing::warn!(error = %e, "skipping event"),
                None => {
                    tracing::info!("subscription closed");
                    return;
                }
            },
            _ = tokio::signal::ctrl_c() => return,
        }
    }
}

fn print_header(header: &Header) {
    println!(
        "height {} at {} with {} txs",
        header.height, header.time, header.num_txs
    );
}

fn print_block(block: &Block) {
    print_header(&block.header);
    let signatures = block
        .last_commit
        .precommits
        .iter()
        .filter(|vote| vote.is_some())
        .count();
    println!("  last commit signatures: {signatures}");
    for tx in &block.txs {
        println!("  tx {}", hex::encode_upper(tx));
    }
}

fn print_tx(tx: &TxResponse) {
    println!(
        "{} height {} index {} code {}",
        tx.hash, tx.height, tx.index, tx.tx_result.code
    );
}
