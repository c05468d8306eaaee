//! Typed client facade.
//!
//! A [`Client`] pairs one transport with the adaptor for the node's protocol
//! version. Both are fixed at construction: either the caller names the
//! version, or [`Client::detect_version`] asks the node. Every endpoint
//! method builds its request, executes it and decodes the result with the
//! bound adaptor; callers never see wire JSON.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adaptor::{Adaptor, Version};
use crate::broadcaster::{Broadcaster, Producer, Updater};
use crate::error::{CoreError, DecodeError, RpcError};
use crate::requests::{
    encode_blockchain, encode_broadcast_tx, encode_height, encode_subscribe, encode_tx,
    encode_tx_search, AbciQueryParams, EventKind, Method, QueryString, TxParams, TxSearchParams,
};
use crate::responses::{
    AbciInfoResponse, AbciQueryResponse, BlockResponse, BlockResultsResponse, BlockchainResponse,
    BroadcastTxAsyncResponse, BroadcastTxCommitResponse, BroadcastTxSyncResponse,
    CommitResponse, GenesisResponse, HealthResponse, NewBlockEvent, NewBlockHeaderEvent,
    StatusResponse, TxEvent, TxResponse, TxSearchResponse, ValidatorsResponse,
};
use crate::rpc::{connect_transport, JsonRpcEvent, JsonRpcRequest, Params, RpcClient, TransportConfig};

/// Page size used by [`Client::tx_search_all`] when the caller sets none.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Live stream of decoded events from one subscription.
pub type EventFeed<T> = BoxStream<'static, Result<T, CoreError>>;

type EventDecoder<T> = fn(&dyn Adaptor, &JsonRpcEvent) -> Result<T, DecodeError>;

#[derive(Clone)]
pub struct Client {
    rpc: Arc<dyn RpcClient>,
    adaptor: &'static dyn Adaptor,
}

impl Client {
    /// Bind `rpc` to a known protocol version.
    pub fn new(rpc: Arc<dyn RpcClient>, version: Version) -> Self {
        Self {
            rpc,
            adaptor: version.adaptor(),
        }
    }

    /// Open a transport for `connection` and detect the node's version.
    pub async fn connect(connection: &str, config: &TransportConfig) -> Result<Self, CoreError> {
        let rpc = connect_transport(connection, config).await?;
        Self::detect_version(rpc).await
    }

    /// Ask the node for its version and bind the matching adaptor.
    ///
    /// The status call is decoded only as far as `node_info.version`, since
    /// the full decode depends on the version being detected.
    pub async fn detect_version(rpc: Arc<dyn RpcClient>) -> Result<Self, CoreError> {
        let response = rpc
            .execute(JsonRpcRequest::new(Method::Status, Params::new()))
            .await?;
        let node_version = response
            .result
            .get("node_info")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::MissingField("node_info.version".to_owned()))?;

        let version = Version::detect(node_version)?;
        info!(node.version = node_version, adaptor = %version, "detected node version");
        Ok(Self::new(rpc, version))
    }

    pub fn version(&self) -> Version {
        self.adaptor.version()
    }

    pub fn adaptor(&self) -> &'static dyn Adaptor {
        self.adaptor
    }

    /// Close the transport. Outstanding calls and subscriptions end with a
    /// transport-closed error.
    pub fn disconnect(&self) {
        self.rpc.disconnect();
    }

    async fn call(&self, method: Method, params: Params) -> Result<Value, CoreError> {
        let response = self.rpc.execute(JsonRpcRequest::new(method, params)).await?;
        Ok(response.result)
    }

    // ==========================================================================
    // Endpoints
    // ==========================================================================

    pub async fn health(&self) -> Result<HealthResponse, CoreError> {
        let result = self.call(Method::Health, Params::new()).await?;
        Ok(self.adaptor.decode_health(&result)?)
    }

    pub async fn status(&self) -> Result<StatusResponse, CoreError> {
        let result = self.call(Method::Status, Params::new()).await?;
        Ok(self.adaptor.decode_status(&result)?)
    }

    pub async fn abci_info(&self) -> Result<AbciInfoResponse, CoreError> {
        let result = self.call(Method::AbciInfo, Params::new()).await?;
        Ok(self.adaptor.decode_abci_info(&result)?)
    }

    pub async fn abci_query(&self, params: &AbciQueryParams) -> Result<AbciQueryResponse, CoreError> {
        let result = self
            .call(Method::AbciQuery, self.adaptor.encode_abci_query(params))
            .await?;
        Ok(self.adaptor.decode_abci_query(&result)?)
    }

    /// The block at `height`, or the latest block for `None`.
    pub async fn block(&self, height: Option<u64>) -> Result<BlockResponse, CoreError> {
        let result = self.call(Method::Block, encode_height(height)).await?;
        Ok(self.adaptor.decode_block(&result)?)
    }

    /// Block metadata for an inclusive height range.
    pub async fn blockchain(
        &self,
        min_height: Option<u64>,
        max_height: Option<u64>,
    ) -> Result<BlockchainResponse, CoreError> {
        let result = self
            .call(Method::Blockchain, encode_blockchain(min_height, max_height))
            .await?;
        Ok(self.adaptor.decode_blockchain(&result)?)
    }

    pub async fn block_results(&self, height: Option<u64>) -> Result<BlockResultsResponse, CoreError> {
        let result = self.call(Method::BlockResults, encode_height(height)).await?;
        Ok(self.adaptor.decode_block_results(&result)?)
    }

    pub async fn commit(&self, height: Option<u64>) -> Result<CommitResponse, CoreError> {
        let result = self.call(Method::Commit, encode_height(height)).await?;
        Ok(self.adaptor.decode_commit(&result)?)
    }

    pub async fn genesis(&self) -> Result<GenesisResponse, CoreError> {
        let result = self.call(Method::Genesis, Params::new()).await?;
        Ok(self.adaptor.decode_genesis(&result)?)
    }

    pub async fn validators(&self, height: Option<u64>) -> Result<ValidatorsResponse, CoreError> {
        let result = self.call(Method::Validators, encode_height(height)).await?;
        Ok(self.adaptor.decode_validators(&result)?)
    }

    pub async fn broadcast_tx_sync(&self, tx: &[u8]) -> Result<BroadcastTxSyncResponse, CoreError> {
        let result = self
            .call(Method::BroadcastTxSync, encode_broadcast_tx(tx))
            .await?;
        Ok(self.adaptor.decode_broadcast_tx_sync(&result)?)
    }

    pub async fn broadcast_tx_async(
        &self,
        tx: &[u8],
    ) -> Result<BroadcastTxAsyncResponse, CoreError> {
        let result = self
            .call(Method::BroadcastTxAsync, encode_broadcast_tx(tx))
            .await?;
        Ok(self.adaptor.decode_broadcast_tx_async(&result)?)
    }

    /// Broadcast and wait for the transaction to be committed. Check
    /// [`crate::responses::tx_commit_success`] for the overall outcome.
    pub async fn broadcast_tx_commit(
        &self,
        tx: &[u8],
    ) -> Result<BroadcastTxCommitResponse, CoreError> {
        let result = self
            .call(Method::BroadcastTxCommit, encode_broadcast_tx(tx))
            .await?;
        Ok(self.adaptor.decode_broadcast_tx_commit(&result)?)
    }

    pub async fn tx(&self, params: &TxParams) -> Result<TxResponse, CoreError> {
        let result = self.call(Method::Tx, encode_tx(params)).await?;
        Ok(self.adaptor.decode_tx(&result)?)
    }

    pub async fn tx_search(&self, params: &TxSearchParams) -> Result<TxSearchResponse, CoreError> {
        let result = self.call(Method::TxSearch, encode_tx_search(params)).await?;
        Ok(self.adaptor.decode_tx_search(&result)?)
    }

    /// Page through `tx_search` until every match is collected.
    ///
    /// Starts at `params.page` (default 1) and uses `params.per_page`
    /// (default [`DEFAULT_PAGE_SIZE`]). Stops early if a page comes back
    /// empty.
    pub async fn tx_search_all(
        &self,
        params: &TxSearchParams,
    ) -> Result<TxSearchResponse, CoreError> {
        let mut page_params = params.clone();
        page_params.per_page = Some(params.per_page.unwrap_or(DEFAULT_PAGE_SIZE));
        let mut page = params.page.unwrap_or(1);

        let mut txs = Vec::new();
        loop {
            page_params.page = Some(page);
            let response = self.tx_search(&page_params).await?;
            let received = response.txs.len();
            txs.extend(response.txs);
            debug!(page, received, total = response.total_count, "tx_search page");

            if received == 0 || txs.len() as u64 >= response.total_count {
                return Ok(TxSearchResponse {
                    total_count: response.total_count,
                    txs,
                });
            }
            page += 1;
        }
    }

    // ==========================================================================
    // Subscriptions
    // ==========================================================================

    pub async fn subscribe_new_block(&self) -> Result<EventFeed<NewBlockEvent>, CoreError> {
        self.subscribe(EventKind::NewBlock.query(), |adaptor, event| {
            adaptor.decode_new_block_event(event)
        })
        .await
    }

    pub async fn subscribe_new_block_header(
        &self,
    ) -> Result<EventFeed<NewBlockHeaderEvent>, CoreError> {
        self.subscribe(EventKind::NewBlockHeader.query(), |adaptor, event| {
            adaptor.decode_new_block_header_event(event)
        })
        .await
    }

    /// Transactions matching `query`, which is combined with the tx event
    /// filter. Pass an empty query for every transaction.
    pub async fn subscribe_tx(&self, query: &QueryString) -> Result<EventFeed<TxEvent>, CoreError> {
        self.subscribe(EventKind::Tx.query().and(query), |adaptor, event| {
            adaptor.decode_tx_event(event)
        })
        .await
    }

    async fn subscribe<T: Send + 'static>(
        &self,
        query: QueryString,
        decode: EventDecoder<T>,
    ) -> Result<EventFeed<T>, CoreError> {
        let streaming = self
            .rpc
            .as_streaming()
            .ok_or(CoreError::StreamingUnsupported)?;
        let events = streaming
            .listen(JsonRpcRequest::new(Method::Subscribe, encode_subscribe(&query)))
            .await?;
        debug!(query = %query, "subscribed");

        let adaptor = self.adaptor;
        Ok(events
            .map(move |event| -> Result<T, CoreError> { Ok(decode(adaptor, &event?)?) })
            .boxed())
    }

    /// The chain height as a live value.
    ///
    /// Seeded from `status`. While the returned broadcaster has listeners it
    /// holds a new-block-header subscription open and publishes each
    /// header's height. If the subscription cannot be opened or its
    /// transport closes, the broadcaster fails with that error and every
    /// listener stream ends.
    pub async fn watch_height(&self) -> Result<Broadcaster<u64>, CoreError> {
        if self.rpc.as_streaming().is_none() {
            return Err(CoreError::StreamingUnsupported);
        }
        let status = self.status().await?;
        Ok(Broadcaster::with_producer(
            status.sync_info.latest_block_height,
            HeightProducer {
                client: self.clone(),
                task: Mutex::new(None),
            },
        ))
    }
}

/// Feeds header heights into a broadcaster from a background task.
struct HeightProducer {
    client: Client,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Producer<u64> for HeightProducer {
    fn start(&self, updater: Updater<u64>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("height watch needs a tokio runtime; not started");
            updater.fail(CoreError::InvalidConfig(
                "height watch needs a tokio runtime".to_owned(),
            ));
            return;
        };

        let client = self.client.clone();
        let task = runtime.spawn(async move {
            let mut headers = match client.subscribe_new_block_header().await {
                Ok(headers) => headers,
                Err(e) => {
                    warn!(error = %e, "height watch failed to subscribe");
                    updater.fail(e);
                    return;
                }
            };
            while let Some(header) = headers.next().await {
                match header {
                    Ok(header) => {
                        if !updater.update(header.height) {
                            return;
                        }
                    }
                    Err(CoreError::Rpc(RpcError::TransportClosed)) => {
                        warn!("height watch lost its transport");
                        updater.fail(CoreError::Rpc(RpcError::TransportClosed));
                        return;
                    }
                    Err(e) => warn!(error = %e, "height watch skipped an event"),
                }
            }
            debug!("height watch ended");
            updater.complete();
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
