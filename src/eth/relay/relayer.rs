use std::sync::Arc;
use std::time::Duration;

use alloy_signer_local::PrivateKeySigner;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::eth::primitives::AssetClass;
use crate::eth::primitives::BlockNumber;
use crate::eth::primitives::ChainId;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::LogFilter;
use crate::eth::relay::BlockPoller;
use crate::eth::relay::ChainEndpoint;
use crate::eth::relay::ChainReader;
use crate::eth::relay::ChainSigner;
use crate::eth::relay::CheckpointStore;
use crate::eth::relay::CursorDefaults;
use crate::eth::relay::CursorKey;
use crate::eth::relay::EventListener;
use crate::eth::relay::PollIntervals;
use crate::eth::relay::RelayConfig;
use crate::eth::relay::RelayEndpoints;
use crate::eth::relay::ReplayBacklog;
use crate::eth::relay::RetryExecutor;
use crate::eth::relay::TransferEventKind;
use crate::eth::relay::TransferProcessor;
use crate::eth::relay::load_wallet;
use crate::eth::relay::run_replay;
use crate::ext::DisplayExt;
use crate::ext::SleepReason;
use crate::ext::spawn_named;
use crate::ext::to_json_string;
use crate::ext::traced_sleep;
use crate::infra::BlockchainClient;
use crate::infra::tracing::warn_task_cancellation;

type RelayEndpoint = ChainEndpoint<BlockchainClient, ChainSigner>;

// -----------------------------------------------------------------------------
// Watch targets
// -----------------------------------------------------------------------------

/// One (chain, contract, event) observed by pollers and listeners.
pub struct WatchTarget<R, W> {
    pub endpoint: Arc<ChainEndpoint<R, W>>,
    pub kind: TransferEventKind,
    pub filter: LogFilter,
}

impl<R, W> WatchTarget<R, W> {
    pub fn cursor_key(&self) -> CursorKey {
        CursorKey::new(self.endpoint.key.clone(), self.kind.asset_class())
    }
}

/// Lock events on the source vaults and burn events on every destination with the contract configured.
pub fn watch_targets<R, W>(endpoints: &RelayEndpoints<R, W>) -> Vec<WatchTarget<R, W>> {
    let mut targets = Vec::new();
    for asset in [AssetClass::Fungible, AssetClass::NonFungible] {
        let source_kind = TransferEventKind::source_event(asset);
        if let Some(address) = endpoints.source.contract(asset) {
            targets.push(WatchTarget {
                endpoint: Arc::clone(&endpoints.source),
                kind: source_kind,
                filter: LogFilter::new(address, source_kind.signature_hash()),
            });
        }

        let destination_kind = TransferEventKind::destination_event(asset);
        for endpoint in &endpoints.destinations {
            if let Some(address) = endpoint.contract(asset) {
                targets.push(WatchTarget {
                    endpoint: Arc::clone(endpoint),
                    kind: destination_kind,
                    filter: LogFilter::new(address, destination_kind.signature_hash()),
                });
            }
        }
    }
    targets
}

/// Default cursor of every polled target: the chain head minus the confirmation depth.
///
/// A chain whose head cannot be fetched starts from block zero.
pub async fn seed_cursor_defaults<R, W>(targets: &[WatchTarget<R, W>], confirmations: u64) -> CursorDefaults
where
    R: ChainReader,
{
    let mut defaults = CursorDefaults::new();
    for target in targets {
        let Some(reader) = &target.endpoint.reader else {
            continue;
        };
        let key = target.cursor_key();
        if defaults.contains_key(&key) {
            continue;
        }

        let default = match reader.fetch_block_number().await {
            Ok(head) => head.saturating_sub(confirmations),
            Err(e) => {
                tracing::warn!(reason = ?e, cursor = %key, "failed to fetch chain head, cursor defaults to block zero");
                BlockNumber::ZERO
            }
        };
        defaults.insert(key, default);
    }
    defaults
}

// -----------------------------------------------------------------------------
// Flush scheduler
// -----------------------------------------------------------------------------

/// Flushes the checkpoint every `interval` when it has pending changes.
pub async fn run_flush_scheduler(store: Arc<CheckpointStore>, interval: Duration, cancellation: CancellationToken) {
    const TASK_NAME: &str = "relay::checkpoint-flush";

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                warn_task_cancellation(TASK_NAME);
                return;
            }
            _ = traced_sleep(interval, SleepReason::FlushInterval) => {}
        }

        // failures are logged by the store and retried on the next tick
        if let Ok(true) = store.flush().await {
            tracing::info!(task = TASK_NAME, "auto flush");
        }
    }
}

// -----------------------------------------------------------------------------
// Relayer
// -----------------------------------------------------------------------------

/// Wires chains, checkpoint and processor together and runs every relay task.
pub struct Relayer {
    config: RelayConfig,
    targets: Vec<WatchTarget<BlockchainClient, ChainSigner>>,
    store: Arc<CheckpointStore>,
    processor: Arc<TransferProcessor<BlockchainClient, ChainSigner>>,
    backlog: Option<Arc<ReplayBacklog>>,
}

impl Relayer {
    /// Builds the relayer. Fails if the keystore cannot be decrypted or the configuration is invalid.
    pub async fn new(config: RelayConfig) -> anyhow::Result<Self> {
        tracing::info!("creating relayer");

        let wallet = load_wallet(&config.keystore_path, &config.keystore_password)?;
        tracing::info!(address = %wallet.address(), "relayer wallet loaded");

        let endpoints = Arc::new(Self::build_endpoints(&config, &wallet)?);
        Self::check_chain_ids(&endpoints).await;

        let targets = watch_targets(&endpoints);
        let defaults = seed_cursor_defaults(&targets, config.confirmations).await;

        let store = Arc::new(CheckpointStore::load(&config.state_file, config.max_processed_ids, config.source.source_key.clone(), defaults).await);
        let restored = store.snapshot();
        tracing::info!(
            state = %to_json_string(&restored),
            processed_ids = restored.processed_ids.len(),
            "restored relay state"
        );

        let backlog = ReplayBacklog::new(config.replay_backlog_capacity).map(Arc::new);
        let retry = RetryExecutor::new(config.retry_attempts, config.retry_base_delay);
        let processor = Arc::new(TransferProcessor::new(endpoints, Arc::clone(&store), retry, backlog.clone()));

        Ok(Self {
            config,
            targets,
            store,
            processor,
            backlog,
        })
    }

    fn build_endpoints(config: &RelayConfig, wallet: &PrivateKeySigner) -> anyhow::Result<RelayEndpoints<BlockchainClient, ChainSigner>> {
        let source = &config.source;
        let timeout = config.rpc_timeout;

        // source: read and write are always available
        let read = Arc::new(BlockchainClient::new_http_ws(source.source_key.clone(), &source.source_read_rpc, source.wss_rpc(), timeout)?);
        let write = if source.write_rpc() == source.source_read_rpc {
            Arc::clone(&read)
        } else {
            Arc::new(BlockchainClient::new_http(source.source_key.clone(), source.write_rpc(), timeout)?)
        };
        let source_endpoint = RelayEndpoint {
            key: source.source_key.clone(),
            name: source.source_name.clone(),
            chain_id: source.source_chain_id,
            token_contract: Some(source.vault_address()?),
            nft_contract: source.nft_vault_address()?,
            subscriber: source.wss_rpc().map(|_| Arc::clone(&read)),
            reader: Some(read),
            writer: Some(Arc::new(Self::signer(config, &source.source_key, source.source_chain_id, write, wallet))),
        };

        // destinations: every capability is optional
        let mut destinations = Vec::new();
        for destination in config.destinations()? {
            let key = destination.key.clone();
            let read = match destination.read_rpc.as_deref() {
                Some(url) => Some(Arc::new(BlockchainClient::new_http_ws(key.clone(), url, destination.wss_rpc.as_deref(), timeout)?)),
                None => {
                    tracing::warn!(chain = %key, "no read rpc configured, burns on this chain are not observed");
                    None
                }
            };
            let writer = match destination.write_rpc.as_deref() {
                Some(url) => {
                    let client = Arc::new(BlockchainClient::new_http(key.clone(), url, timeout)?);
                    Some(Arc::new(Self::signer(config, &key, destination.chain_id, client, wallet)))
                }
                None => {
                    tracing::warn!(chain = %key, "no write rpc configured, mints to this chain are not possible");
                    None
                }
            };
            let subscriber = read.as_ref().filter(|client| client.supports_ws()).cloned();

            tracing::info!(chain = %key, name = %destination.name, chain_id = %destination.chain_id, "destination chain configured");
            destinations.push(Arc::new(RelayEndpoint {
                key,
                name: destination.name,
                chain_id: destination.chain_id,
                token_contract: destination.wmrt_address,
                nft_contract: destination.wnft_address,
                reader: read,
                subscriber,
                writer,
            }));
        }

        Ok(RelayEndpoints {
            source: Arc::new(source_endpoint),
            destinations,
        })
    }

    fn signer(config: &RelayConfig, key: &ChainKey, chain_id: ChainId, client: Arc<BlockchainClient>, wallet: &PrivateKeySigner) -> ChainSigner {
        ChainSigner::new(key.clone(), chain_id, client, wallet.clone(), config.receipt_timeout)
    }

    /// Warns when a node reports a chain id different from the configured one.
    async fn check_chain_ids(endpoints: &RelayEndpoints<BlockchainClient, ChainSigner>) {
        for endpoint in endpoints.all() {
            let Some(reader) = &endpoint.reader else {
                continue;
            };
            match reader.fetch_chain_id().await {
                Ok(chain_id) if chain_id == endpoint.chain_id => {}
                Ok(chain_id) => tracing::warn!(chain = %endpoint.key, configured = %endpoint.chain_id, reported = %chain_id, "node reports unexpected chain id"),
                Err(e) => tracing::warn!(reason = ?e, chain = %endpoint.key, "failed to check chain id"),
            }
        }
    }

    /// Runs pollers, listeners, flush scheduler and replay until `cancellation` fires, then performs the final flush.
    pub async fn run(self, cancellation: CancellationToken) -> anyhow::Result<()> {
        let mut tasks: Vec<(String, JoinHandle<()>)> = Vec::new();
        let intervals = PollIntervals::new(self.config.poll_slow, self.config.poll_fast);

        for target in &self.targets {
            if let Some(reader) = &target.endpoint.reader {
                let poller = BlockPoller::new(
                    target.endpoint.key.clone(),
                    target.kind,
                    target.filter,
                    Arc::clone(reader),
                    Arc::clone(&self.processor),
                    self.config.confirmations,
                    intervals,
                );
                let name = poller.task_name();
                let handle = spawn_named(&name, poller.run(cancellation.child_token()));
                tasks.push((name, handle));
            }

            if let Some(subscriber) = &target.endpoint.subscriber {
                let listener = EventListener::new(
                    target.endpoint.key.clone(),
                    target.kind,
                    target.filter,
                    Arc::clone(subscriber),
                    Arc::clone(&self.processor),
                    self.config.listener_retry_interval,
                );
                let name = listener.task_name();
                let token = cancellation.child_token();
                let handle = spawn_named(&name, async move { listener.run(token).await });
                tasks.push((name, handle));
            }
        }

        let name = "relay::checkpoint-flush".to_owned();
        let handle = spawn_named(
            &name,
            run_flush_scheduler(Arc::clone(&self.store), self.config.flush_interval, cancellation.child_token()),
        );
        tasks.push((name, handle));

        if let Some(backlog) = &self.backlog {
            let name = "relay::replay-backlog".to_owned();
            let handle = spawn_named(
                &name,
                run_replay(Arc::clone(&self.processor), Arc::clone(backlog), self.config.replay_interval, cancellation.child_token()),
            );
            tasks.push((name, handle));
        }

        tracing::info!(tasks = tasks.len(), "relayer started");
        cancellation.cancelled().await;

        shutdown(tasks, self.config.shutdown_timeout).await;

        // final flush
        match self.store.flush().await {
            Ok(true) => tracing::info!(path = %self.store.path().display(), "final checkpoint flush"),
            Ok(false) => tracing::info!("checkpoint already up to date"),
            Err(e) => tracing::error!(reason = ?e, "final checkpoint flush failed"),
        }
        Ok(())
    }
}

/// Waits for tasks to finish after cancellation, aborting them after `grace`.
async fn shutdown(tasks: Vec<(String, JoinHandle<()>)>, grace: Duration) {
    tracing::info!(tasks = tasks.len(), grace = %grace.to_string_ext(), "waiting relay tasks to finish");

    let abort_handles = tasks.iter().map(|(name, handle)| (name.clone(), handle.abort_handle())).collect::<Vec<_>>();
    let names = tasks.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>();
    let handles = tasks.into_iter().map(|(_, handle)| handle);

    match timeout(grace, join_all(handles)).await {
        Ok(results) => {
            for (name, result) in names.iter().zip(results) {
                if let Err(e) = result {
                    tracing::error!(reason = ?e, task = %name, "relay task ended abnormally");
                }
            }
        }
        Err(_) => {
            for (name, handle) in abort_handles {
                if !handle.is_finished() {
                    tracing::warn!(task = %name, "relay task did not finish in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;

    use super::*;

    struct NoClient;

    fn endpoint(key: &str, token: Option<Address>, nft: Option<Address>) -> Arc<ChainEndpoint<NoClient, NoClient>> {
        Arc::new(ChainEndpoint {
            key: ChainKey::from(key),
            name: key.to_owned(),
            chain_id: ChainId::from(1u64),
            token_contract: token,
            nft_contract: nft,
            reader: None,
            subscriber: None,
            writer: None,
        })
    }

    #[test]
    fn watch_targets_skip_chains_without_contracts() {
        let endpoints = RelayEndpoints {
            source: endpoint("sepolia", Some(Address::repeat_byte(1)), None),
            destinations: vec![
                endpoint("hoodi", Some(Address::repeat_byte(2)), Some(Address::repeat_byte(3))),
                endpoint("base", None, None),
            ],
        };

        let targets = watch_targets(&endpoints);
        let described = targets
            .iter()
            .map(|target| (target.endpoint.key.to_string(), target.kind, target.filter.address))
            .collect::<Vec<_>>();

        assert_eq!(
            described,
            vec![
                ("sepolia".to_owned(), TransferEventKind::TokensLocked, Address::repeat_byte(1)),
                ("hoodi".to_owned(), TransferEventKind::TokensBurned, Address::repeat_byte(2)),
                ("hoodi".to_owned(), TransferEventKind::NftBurned, Address::repeat_byte(3)),
            ]
        );
        assert_eq!(targets[2].filter.topic0, TransferEventKind::NftBurned.signature_hash());
    }
}
