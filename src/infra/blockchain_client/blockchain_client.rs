use std::future::Future;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::Bytes;
use alloy_primitives::U64;
use alloy_primitives::U256;
use anyhow::Context;
use anyhow::anyhow;
use futures::StreamExt;
use futures::stream::BoxStream;
use jsonrpsee::core::ClientError;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::client::Subscription;
use jsonrpsee::core::client::SubscriptionClientT;
use jsonrpsee::http_client::HttpClient;
use jsonrpsee::http_client::HttpClientBuilder;
use jsonrpsee::ws_client::WsClient;
use jsonrpsee::ws_client::WsClientBuilder;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;

use crate::GlobalState;
use crate::alias::AlloyLog;
use crate::alias::JsonValue;
use crate::eth::primitives::BlockNumber;
use crate::eth::primitives::ChainId;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::ExternalReceipt;
use crate::eth::primitives::LogFilter;
use crate::eth::relay::ChainReader;
use crate::eth::relay::LogSubscriber;
use crate::eth::relay::SubmitError;
use crate::ext::DisplayExt;
use crate::ext::to_json_value;
#[cfg(feature = "metrics")]
use crate::infra::metrics;
use crate::log_and_err;

/// JSON-RPC client for one chain.
///
/// HTTP is used for queries and writes. The websocket connection is only opened when the first
/// subscription is requested and is rebuilt when the node drops it.
#[derive(Debug)]
pub struct BlockchainClient {
    chain: ChainKey,
    http: HttpClient,
    pub http_url: String,
    ws: RwLock<Option<WsClient>>,
    ws_url: Option<String>,
    timeout: Duration,
}

impl BlockchainClient {
    /// Creates a new RPC client connected only to HTTP.
    pub fn new_http(chain: ChainKey, http_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::new_http_ws(chain, http_url, None, timeout)
    }

    /// Creates a new RPC client connected to HTTP and optionally to WS.
    pub fn new_http_ws(chain: ChainKey, http_url: &str, ws_url: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        tracing::info!(%chain, %http_url, ws_url = ?ws_url, "creating blockchain client");

        let http = Self::build_http_client(http_url, timeout)?;
        Ok(Self {
            chain,
            http,
            http_url: http_url.to_owned(),
            ws: RwLock::new(None),
            ws_url: ws_url.map(|x| x.to_owned()),
            timeout,
        })
    }

    fn build_http_client(url: &str, timeout: Duration) -> anyhow::Result<HttpClient> {
        tracing::info!(%url, timeout = %timeout.to_string_ext(), "creating blockchain http client");
        match HttpClientBuilder::default().request_timeout(timeout).build(url) {
            Ok(http) => {
                tracing::info!(%url, timeout = %timeout.to_string_ext(), "created blockchain http client");
                Ok(http)
            }
            Err(e) => {
                tracing::error!(reason = ?e, %url, timeout = %timeout.to_string_ext(), "failed to create blockchain http client");
                Err(e).context("failed to create blockchain http client")
            }
        }
    }

    async fn build_ws_client(url: &str, timeout: Duration) -> anyhow::Result<WsClient> {
        tracing::info!(%url, timeout = %timeout.to_string_ext(), "creating blockchain websocket client");
        match WsClientBuilder::new().connection_timeout(timeout).request_timeout(timeout).build(url).await {
            Ok(ws) => {
                tracing::info!(%url, timeout = %timeout.to_string_ext(), "created blockchain websocket client");
                Ok(ws)
            }
            Err(e) => {
                tracing::error!(reason = ?e, %url, timeout = %timeout.to_string_ext(), "failed to create blockchain websocket client");
                Err(e).context("failed to create blockchain websocket client")
            }
        }
    }

    pub fn chain(&self) -> &ChainKey {
        &self.chain
    }

    /// Checks if the client can open websocket subscriptions.
    pub fn supports_ws(&self) -> bool {
        self.ws_url.is_some()
    }

    /// Executes a HTTP request and records its duration.
    async fn request<T: DeserializeOwned>(&self, method: &'static str, params: Vec<JsonValue>) -> Result<T, ClientError> {
        #[cfg(feature = "metrics")]
        let start = metrics::now();

        let result = self.http.request::<T, Vec<JsonValue>>(method, params).await;

        #[cfg(feature = "metrics")]
        metrics::inc_rpc_client_request(start.elapsed(), self.chain.as_str(), method, result.is_ok());

        result
    }

    // -------------------------------------------------------------------------
    // RPC queries
    // -------------------------------------------------------------------------

    /// Fetches the chain id reported by the node.
    pub async fn fetch_chain_id(&self) -> anyhow::Result<ChainId> {
        tracing::debug!(chain = %self.chain, "fetching chain id");

        match self.request::<ChainId>("eth_chainId", vec![]).await {
            Ok(chain_id) => Ok(chain_id),
            Err(e) => log_and_err!(reason = e, "failed to fetch chain id"),
        }
    }

    /// Fetches the current block number.
    pub async fn fetch_block_number(&self) -> anyhow::Result<BlockNumber> {
        tracing::debug!(chain = %self.chain, "fetching block number");

        match self.request::<BlockNumber>("eth_blockNumber", vec![]).await {
            Ok(number) => Ok(number),
            Err(e) => log_and_err!(reason = e, "failed to fetch current block number"),
        }
    }

    /// Fetches logs matching the filter in a single block.
    pub async fn fetch_logs(&self, filter: &LogFilter, block: BlockNumber) -> anyhow::Result<Vec<AlloyLog>> {
        tracing::debug!(chain = %self.chain, %block, address = %filter.address, "fetching logs");

        match self.request::<Vec<AlloyLog>>("eth_getLogs", vec![filter.to_block_query(block)]).await {
            Ok(logs) => Ok(logs),
            Err(e) => log_and_err!(reason = e, payload = filter, "failed to fetch logs"),
        }
    }

    /// Fetches a transaction by hash.
    pub async fn fetch_transaction(&self, tx_hash: B256) -> anyhow::Result<Option<JsonValue>> {
        tracing::debug!(%tx_hash, "fetching transaction");

        let hash = to_json_value(tx_hash);
        match self.request::<Option<JsonValue>>("eth_getTransactionByHash", vec![hash]).await {
            Ok(tx) => Ok(tx.filter(|tx| !tx.is_null())),
            Err(e) => log_and_err!(reason = e, "failed to fetch transaction by hash"),
        }
    }

    /// Fetches a receipt by hash.
    pub async fn fetch_receipt(&self, tx_hash: B256) -> anyhow::Result<Option<ExternalReceipt>> {
        tracing::debug!(%tx_hash, "fetching transaction receipt");

        let hash = to_json_value(tx_hash);
        match self.request::<Option<ExternalReceipt>>("eth_getTransactionReceipt", vec![hash]).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => log_and_err!(reason = e, "failed to fetch transaction receipt by hash"),
        }
    }

    /// Fetches the next nonce of an account, pending transactions included.
    pub async fn fetch_transaction_count(&self, address: Address) -> Result<u64, SubmitError> {
        tracing::debug!(%address, "fetching transaction count");

        let params = vec![to_json_value(address), JsonValue::String("pending".to_owned())];
        match self.request::<U64>("eth_getTransactionCount", params).await {
            Ok(count) => Ok(count.to::<u64>()),
            Err(e) => {
                tracing::warn!(reason = ?e, %address, "failed to fetch transaction count");
                Err(SubmitError::from_client_error(e))
            }
        }
    }

    /// Fetches the current gas price.
    pub async fn fetch_gas_price(&self) -> Result<u128, SubmitError> {
        tracing::debug!(chain = %self.chain, "fetching gas price");

        match self.request::<U256>("eth_gasPrice", vec![]).await {
            Ok(price) => u128::try_from(price).map_err(|e| SubmitError::Unknown(format!("gas price out of range: {e}"))),
            Err(e) => {
                tracing::warn!(reason = ?e, "failed to fetch gas price");
                Err(SubmitError::from_client_error(e))
            }
        }
    }

    /// Estimates the gas of a call. Reverts surface here, before anything is sent.
    pub async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> Result<u64, SubmitError> {
        tracing::debug!(%from, %to, "estimating gas");

        let call = json!({ "from": from, "to": to, "data": data });
        match self.request::<U64>("eth_estimateGas", vec![call]).await {
            Ok(gas) => Ok(gas.to::<u64>()),
            Err(e) => {
                tracing::warn!(reason = ?e, %to, "failed to estimate gas");
                Err(SubmitError::from_client_error(e))
            }
        }
    }

    // -------------------------------------------------------------------------
    // RPC mutations
    // -------------------------------------------------------------------------

    /// Sends a signed transaction.
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, SubmitError> {
        tracing::debug!(chain = %self.chain, "sending raw transaction");

        let tx = JsonValue::String(const_hex::encode_prefixed(&raw));
        match self.request::<B256>("eth_sendRawTransaction", vec![tx]).await {
            Ok(hash) => Ok(hash),
            Err(e) => {
                tracing::warn!(reason = ?e, chain = %self.chain, "failed to send raw transaction");
                Err(SubmitError::from_client_error(e))
            }
        }
    }

    // -------------------------------------------------------------------------
    // RPC subscriptions
    // -------------------------------------------------------------------------

    /// Subscribes to logs matching the filter, connecting the websocket client if needed.
    pub async fn subscribe_to_logs(&self, filter: &LogFilter) -> anyhow::Result<Subscription<AlloyLog>> {
        const TASK_NAME: &str = "blockchain::subscribe_to_logs";
        tracing::debug!(chain = %self.chain, address = %filter.address, "subscribing to logs");

        let Some(ws_url) = self.ws_url.as_deref() else {
            return log_and_err!("blockchain client not configured with websocket");
        };
        let params = vec![JsonValue::String("logs".to_owned()), filter.to_subscription()];

        let mut first_attempt = true;
        loop {
            if GlobalState::is_shutdown_warn(TASK_NAME) {
                return Err(anyhow!("shutdown in progress"));
            };

            // connect when never connected or when the previous connection was closed
            connect_if_needed(&self.ws, WsClient::is_connected, || Self::build_ws_client(ws_url, self.timeout)).await?;

            let ws_read = self.ws.read().await;
            let Some(ws) = ws_read.as_ref() else {
                return log_and_err!("websocket client disappeared while subscribing");
            };

            #[cfg(feature = "metrics")]
            let start = metrics::now();

            let result = ws.subscribe::<AlloyLog, Vec<JsonValue>>("eth_subscribe", params.clone(), "eth_unsubscribe").await;

            #[cfg(feature = "metrics")]
            metrics::inc_rpc_client_request(start.elapsed(), self.chain.as_str(), "eth_subscribe", result.is_ok());

            match result {
                // subscribed
                Ok(sub) => return Ok(sub),

                // failed and need to reconnect
                e @ Err(ClientError::RestartNeeded(_)) => {
                    // will try to reconnect websocket client only in first attempt
                    if first_attempt {
                        tracing::error!(reason = ?e, %first_attempt, "failed to subscribe to logs. trying to reconnect websocket client now.");
                    } else {
                        tracing::error!(reason = ?e, %first_attempt, "failed to subscribe to logs. will not try to reconnect websocket client.");
                        return e.context("failed to subscribe to logs");
                    }
                    // the closed client is replaced on the next iteration
                    first_attempt = false;
                }

                // failed and cannot do anything
                Err(e) => return log_and_err!(reason = e, "failed to subscribe to logs"),
            }
        }
    }
}

/// Stores a newly built client in `slot` unless it already holds a connected one.
///
/// The check is repeated under the write lock so concurrent subscribers build at most one client
/// and never replace a connection another subscriber is using. Returns `true` if a client was built.
async fn connect_if_needed<T, F, Fut>(slot: &RwLock<Option<T>>, is_connected: impl Fn(&T) -> bool, connect: F) -> anyhow::Result<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if slot.read().await.as_ref().is_some_and(&is_connected) {
        return Ok(false);
    }

    let mut slot = slot.write().await;
    if slot.as_ref().is_some_and(&is_connected) {
        return Ok(false);
    }
    *slot = Some(connect().await?);
    Ok(true)
}

// -----------------------------------------------------------------------------
// Relay seams
// -----------------------------------------------------------------------------

impl ChainReader for BlockchainClient {
    async fn fetch_block_number(&self) -> anyhow::Result<BlockNumber> {
        BlockchainClient::fetch_block_number(self).await
    }

    async fn fetch_logs(&self, filter: &LogFilter, block: BlockNumber) -> anyhow::Result<Vec<AlloyLog>> {
        BlockchainClient::fetch_logs(self, filter, block).await
    }
}

impl LogSubscriber for BlockchainClient {
    async fn subscribe_logs(&self, filter: &LogFilter) -> anyhow::Result<BoxStream<'static, anyhow::Result<AlloyLog>>> {
        let subscription = self.subscribe_to_logs(filter).await?;
        Ok(subscription.map(|log| log.map_err(anyhow::Error::from)).boxed())
    }
}
