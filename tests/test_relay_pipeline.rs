use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::Log as PrimitiveLog;
use alloy_primitives::U256;
use alloy_sol_types::SolEvent;
use anyhow::anyhow;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use hybrid_relayer::alias::AlloyLog;
use hybrid_relayer::eth::primitives::AssetClass;
use hybrid_relayer::eth::primitives::BlockNumber;
use hybrid_relayer::eth::primitives::ChainId;
use hybrid_relayer::eth::primitives::ChainKey;
use hybrid_relayer::eth::primitives::LogFilter;
use hybrid_relayer::eth::primitives::TransferId;
use hybrid_relayer::eth::relay::BlockPoller;
use hybrid_relayer::eth::relay::ChainEndpoint;
use hybrid_relayer::eth::relay::ChainReader;
use hybrid_relayer::eth::relay::CheckpointStore;
use hybrid_relayer::eth::relay::CursorDefaults;
use hybrid_relayer::eth::relay::CursorKey;
use hybrid_relayer::eth::relay::EventListener;
use hybrid_relayer::eth::relay::LogSubscriber;
use hybrid_relayer::eth::relay::ObservationPath;
use hybrid_relayer::eth::relay::OutboundTx;
use hybrid_relayer::eth::relay::PollIntervals;
use hybrid_relayer::eth::relay::PollOutcome;
use hybrid_relayer::eth::relay::ProcessError;
use hybrid_relayer::eth::relay::ProcessOutcome;
use hybrid_relayer::eth::relay::RelayCall;
use hybrid_relayer::eth::relay::RelayEndpoints;
use hybrid_relayer::eth::relay::ReplayBacklog;
use hybrid_relayer::eth::relay::RetryError;
use hybrid_relayer::eth::relay::RetryExecutor;
use hybrid_relayer::eth::relay::SkipReason;
use hybrid_relayer::eth::relay::SubmissionReceipt;
use hybrid_relayer::eth::relay::SubmitError;
use hybrid_relayer::eth::relay::TransferEvent;
use hybrid_relayer::eth::relay::TransferEventKind;
use hybrid_relayer::eth::relay::TransferProcessor;
use hybrid_relayer::eth::relay::TransferSubmitter;
use hybrid_relayer::eth::relay::contracts::TokenVault;
use hybrid_relayer::eth::relay::contracts::WrappedToken;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

const SOURCE_VAULT: Address = Address::repeat_byte(0xa1);
const SOURCE_NFT_VAULT: Address = Address::repeat_byte(0xa2);
const HOODI_WMRT: Address = Address::repeat_byte(0xb1);
const HOODI_WNFT: Address = Address::repeat_byte(0xb2);
const HOODI_CHAIN_ID: u64 = 560048;

const SLOW: Duration = Duration::from_millis(2500);
const FAST: Duration = Duration::from_millis(800);

// -----------------------------------------------------------------------------
// Mocks
// -----------------------------------------------------------------------------

#[derive(Default)]
struct MockChain {
    head: Mutex<u64>,
    logs: Mutex<Vec<AlloyLog>>,
    fail_reads: AtomicBool,
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<anyhow::Result<AlloyLog>>>>,
    subscribe_calls: AtomicUsize,
}

impl MockChain {
    fn with_head(head: u64) -> Arc<Self> {
        let chain = Self::default();
        *chain.head.lock() = head;
        Arc::new(chain)
    }

    fn add_log(&self, log: AlloyLog) {
        self.logs.lock().push(log);
    }

    /// Queues a subscription the next `subscribe_logs` call will return.
    fn queue_subscription(&self) -> mpsc::UnboundedSender<anyhow::Result<AlloyLog>> {
        let (tx, rx) = mpsc::unbounded();
        self.subscriptions.lock().push_back(rx);
        tx
    }
}

impl ChainReader for MockChain {
    async fn fetch_block_number(&self) -> anyhow::Result<BlockNumber> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(anyhow!("connection refused"));
        }
        Ok(BlockNumber::from(*self.head.lock()))
    }

    async fn fetch_logs(&self, filter: &LogFilter, block: BlockNumber) -> anyhow::Result<Vec<AlloyLog>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(anyhow!("connection refused"));
        }
        let logs = self
            .logs
            .lock()
            .iter()
            .filter(|log| log.block_number == Some(block.as_u64()))
            .filter(|log| log.inner.address == filter.address && log.inner.data.topics().first() == Some(&filter.topic0))
            .cloned()
            .collect();
        Ok(logs)
    }
}

impl LogSubscriber for MockChain {
    async fn subscribe_logs(&self, _filter: &LogFilter) -> anyhow::Result<BoxStream<'static, anyhow::Result<AlloyLog>>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.subscriptions.lock().pop_front();
        match next {
            Some(rx) => Ok(rx.boxed()),
            None => Err(anyhow!("subscription refused")),
        }
    }
}

#[derive(Default)]
struct MockWriter {
    failures: Mutex<VecDeque<SubmitError>>,
    sent: Mutex<Vec<OutboundTx>>,
    latency: Duration,
}

impl MockWriter {
    fn fail_with(&self, errors: impl IntoIterator<Item = SubmitError>) {
        self.failures.lock().extend(errors);
    }

    fn sent(&self) -> Vec<OutboundTx> {
        self.sent.lock().clone()
    }
}

impl TransferSubmitter for MockWriter {
    async fn submit(&self, tx: &OutboundTx) -> Result<SubmissionReceipt, SubmitError> {
        self.sent.lock().push(tx.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self.failures.lock().pop_front();
        match failure {
            Some(e) => Err(e),
            None => Ok(SubmissionReceipt {
                chain_key: tx.chain_key.clone(),
                tx_hash: B256::repeat_byte(0xee),
                block_number: Some(BlockNumber::from(1u64)),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// Harness
// -----------------------------------------------------------------------------

struct Harness {
    source: Arc<MockChain>,
    hoodi: Arc<MockChain>,
    source_writer: Arc<MockWriter>,
    hoodi_writer: Arc<MockWriter>,
    backlog: Arc<ReplayBacklog>,
    processor: Arc<TransferProcessor<MockChain, MockWriter>>,
}

fn sepolia() -> ChainKey {
    ChainKey::from("sepolia")
}

fn hoodi() -> ChainKey {
    ChainKey::from("hoodi")
}

fn cursor_defaults(source: u64, hoodi_cursor: u64) -> CursorDefaults {
    let mut defaults = CursorDefaults::new();
    defaults.insert(CursorKey::new(sepolia(), AssetClass::Fungible), BlockNumber::from(source));
    defaults.insert(CursorKey::new(sepolia(), AssetClass::NonFungible), BlockNumber::from(source));
    defaults.insert(CursorKey::new(hoodi(), AssetClass::Fungible), BlockNumber::from(hoodi_cursor));
    defaults.insert(CursorKey::new(hoodi(), AssetClass::NonFungible), BlockNumber::from(hoodi_cursor));
    defaults
}

fn harness_with(store: CheckpointStore, source_head: u64, hoodi_head: u64, writer_latency: Duration) -> Harness {
    harness_with_retry(store, source_head, hoodi_head, writer_latency, RetryExecutor::new(5, Duration::from_secs(1)))
}

fn harness_with_retry(store: CheckpointStore, source_head: u64, hoodi_head: u64, writer_latency: Duration, retry: RetryExecutor) -> Harness {
    let source = MockChain::with_head(source_head);
    let hoodi_chain = MockChain::with_head(hoodi_head);
    let source_writer = Arc::new(MockWriter::default());
    let hoodi_writer = Arc::new(MockWriter {
        latency: writer_latency,
        ..MockWriter::default()
    });

    let endpoints = RelayEndpoints {
        source: Arc::new(ChainEndpoint {
            key: sepolia(),
            name: "Sepolia".to_owned(),
            chain_id: ChainId::from(11155111u64),
            token_contract: Some(SOURCE_VAULT),
            nft_contract: Some(SOURCE_NFT_VAULT),
            reader: Some(Arc::clone(&source)),
            subscriber: Some(Arc::clone(&source)),
            writer: Some(Arc::clone(&source_writer)),
        }),
        destinations: vec![Arc::new(ChainEndpoint {
            key: hoodi(),
            name: "Hoodi".to_owned(),
            chain_id: ChainId::from(HOODI_CHAIN_ID),
            token_contract: Some(HOODI_WMRT),
            nft_contract: Some(HOODI_WNFT),
            reader: Some(Arc::clone(&hoodi_chain)),
            subscriber: None,
            writer: Some(Arc::clone(&hoodi_writer)),
        })],
    };

    let backlog = Arc::new(ReplayBacklog::new(16).unwrap());
    let processor = TransferProcessor::new(
        Arc::new(endpoints),
        Arc::new(store),
        retry,
        Some(Arc::clone(&backlog)),
    );

    Harness {
        source,
        hoodi: hoodi_chain,
        source_writer,
        hoodi_writer,
        backlog,
        processor: Arc::new(processor),
    }
}

fn harness(source_head: u64, hoodi_head: u64) -> Harness {
    let store = CheckpointStore::from_state(PathBuf::from("unused-state.json"), 100, sepolia(), cursor_defaults(100, 100), None);
    harness_with(store, source_head, hoodi_head, Duration::ZERO)
}

impl Harness {
    fn poller(&self, chain: &str, kind: TransferEventKind) -> BlockPoller<MockChain, MockWriter> {
        let (reader, address) = match chain {
            "sepolia" => (Arc::clone(&self.source), SOURCE_VAULT),
            _ => (Arc::clone(&self.hoodi), HOODI_WMRT),
        };
        BlockPoller::new(
            ChainKey::from(chain),
            kind,
            LogFilter::new(address, kind.signature_hash()),
            reader,
            Arc::clone(&self.processor),
            1,
            PollIntervals::new(SLOW, FAST),
        )
    }

    fn source_listener(&self, retry_interval: Duration) -> EventListener<MockChain, MockWriter> {
        let kind = TransferEventKind::TokensLocked;
        EventListener::new(
            sepolia(),
            kind,
            LogFilter::new(SOURCE_VAULT, kind.signature_hash()),
            Arc::clone(&self.source),
            Arc::clone(&self.processor),
            retry_interval,
        )
    }

    fn cursor(&self, chain: &ChainKey) -> u64 {
        self.processor.store().get(chain, AssetClass::Fungible).unwrap().as_u64()
    }
}

// -----------------------------------------------------------------------------
// Fixtures
// -----------------------------------------------------------------------------

fn rpc_log<E: SolEvent>(event: &E, address: Address, block: u64, log_index: u64) -> AlloyLog {
    AlloyLog {
        inner: PrimitiveLog {
            address,
            data: event.encode_log_data(),
        },
        block_hash: Some(B256::repeat_byte(0xbb)),
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(B256::repeat_byte(0xcc)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

fn locked(dest_chain_id: u64, transfer_id: B256) -> TokenVault::TokensLockedV2 {
    TokenVault::TokensLockedV2 {
        user: Address::repeat_byte(0x11),
        destToken: HOODI_WMRT,
        recipient: Address::repeat_byte(0x33),
        amount: U256::from(1_000u64),
        nonce: U256::from(1u64),
        destChainId: U256::from(dest_chain_id),
        transferId: transfer_id,
    }
}

fn burned(transfer_id: B256) -> WrappedToken::TokensBurned {
    WrappedToken::TokensBurned {
        user: Address::repeat_byte(0x44),
        amount: U256::from(250u64),
        transferId: transfer_id,
    }
}

fn lock_event(transfer_id: B256) -> TransferEvent {
    let log = rpc_log(&locked(HOODI_CHAIN_ID, transfer_id), SOURCE_VAULT, 101, 0);
    TransferEvent::decode(TransferEventKind::TokensLocked, &sepolia(), &log).unwrap()
}

// -----------------------------------------------------------------------------
// Poller
// -----------------------------------------------------------------------------

#[tokio::test]
async fn hoodi_poller_walks_blocks_up_to_safe_head() {
    let h = harness(1_000, 105);
    h.hoodi.add_log(rpc_log(&burned(B256::repeat_byte(0x01)), HOODI_WMRT, 102, 0));
    let poller = h.poller("hoodi", TransferEventKind::TokensBurned);

    for (tick, expected_block) in (101u64..=104).enumerate() {
        let outcome = poller.poll_once().await.unwrap();
        let PollOutcome::Advanced { block, safe_head, .. } = &outcome else {
            panic!("tick {tick} should advance, got {outcome:?}");
        };
        assert_eq!(block.as_u64(), expected_block);
        assert_eq!(safe_head.as_u64(), 104);
        assert_eq!(outcome.has_more_work(), expected_block < 104);
        assert_eq!(poller.next_delay(&outcome), SLOW);
    }
    assert_eq!(h.cursor(&hoodi()), 104);

    let fifth = poller.poll_once().await.unwrap();
    assert!(matches!(fifth, PollOutcome::Idle { .. }));
    assert!(!fifth.has_more_work());
    assert_eq!(h.cursor(&hoodi()), 104);

    // the burn in block 102 is released on the source chain
    let sent = h.source_writer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].call,
        RelayCall::ReleaseV2 {
            user: Address::repeat_byte(0x44),
            amount: U256::from(250u64),
            src_chain_id: U256::from(HOODI_CHAIN_ID),
            transfer_id: B256::repeat_byte(0x01),
        }
    );
    assert_eq!(sent[0].to, SOURCE_VAULT);
}

#[tokio::test]
async fn poller_uses_fast_interval_only_when_more_than_twenty_blocks_behind() {
    // safe head 122, cursor after tick 101: 21 blocks behind
    let h = harness(123, 0);
    let poller = h.poller("sepolia", TransferEventKind::TokensLocked);
    let outcome = poller.poll_once().await.unwrap();
    assert_eq!(poller.next_delay(&outcome), FAST);

    // safe head 121, cursor after tick 101: exactly 20 blocks behind
    let h = harness(122, 0);
    let poller = h.poller("sepolia", TransferEventKind::TokensLocked);
    let outcome = poller.poll_once().await.unwrap();
    assert_eq!(poller.next_delay(&outcome), SLOW);
}

#[tokio::test]
async fn poller_handles_one_block_per_tick_even_when_far_behind() {
    let h = harness(10_000, 0);
    let poller = h.poller("sepolia", TransferEventKind::TokensLocked);

    for expected in 101..=103 {
        poller.poll_once().await.unwrap();
        assert_eq!(h.cursor(&sepolia()), expected);
    }
}

#[tokio::test]
async fn failed_rpc_leaves_cursor_untouched() {
    let h = harness(200, 0);
    h.source.fail_reads.store(true, Ordering::Relaxed);
    let poller = h.poller("sepolia", TransferEventKind::TokensLocked);

    assert!(poller.poll_once().await.is_err());
    assert_eq!(h.cursor(&sepolia()), 100);

    h.source.fail_reads.store(false, Ordering::Relaxed);
    poller.poll_once().await.unwrap();
    assert_eq!(h.cursor(&sepolia()), 101);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_retry_keeps_the_block_for_the_next_run() {
    let cancellation = CancellationToken::new();
    let retry = RetryExecutor::new(5, Duration::from_secs(1)).with_cancellation(cancellation.clone());
    let store = CheckpointStore::from_state(PathBuf::from("unused-state.json"), 100, sepolia(), cursor_defaults(100, 100), None);
    let h = harness_with_retry(store, 102, 0, Duration::ZERO, retry);
    h.hoodi_writer.fail_with((0..5).map(|_| SubmitError::Transient("request timeout".to_owned())));
    h.source.add_log(rpc_log(&locked(HOODI_CHAIN_ID, B256::repeat_byte(0x09)), SOURCE_VAULT, 101, 0));
    let poller = h.poller("sepolia", TransferEventKind::TokensLocked);

    // attempts at 0s and 1s, shutdown during the 2s backoff
    let shutdown = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancellation.cancel();
    });
    let result = poller.poll_once().await;
    shutdown.await.unwrap();

    assert!(result.is_err());
    assert_eq!(h.cursor(&sepolia()), 100);
    assert!(!h.processor.store().is_processed(&TransferId::from(B256::repeat_byte(0x09))));
    assert_eq!(h.hoodi_writer.sent().len(), 2);
    assert!(h.backlog.is_empty());
}

#[tokio::test]
async fn unroutable_transfer_does_not_stop_the_block() {
    let h = harness(200, 0);
    h.source.add_log(rpc_log(&locked(999, B256::repeat_byte(0x07)), SOURCE_VAULT, 101, 0));
    h.source.add_log(rpc_log(&locked(HOODI_CHAIN_ID, B256::repeat_byte(0x08)), SOURCE_VAULT, 101, 1));
    let poller = h.poller("sepolia", TransferEventKind::TokensLocked);

    poller.poll_once().await.unwrap();

    assert_eq!(h.cursor(&sepolia()), 101);
    assert!(!h.processor.store().is_processed(&TransferId::from(B256::repeat_byte(0x07))));
    assert!(h.processor.store().is_processed(&TransferId::from(B256::repeat_byte(0x08))));
    assert_eq!(h.backlog.len(), 1);
    assert_eq!(h.hoodi_writer.sent().len(), 1);
}

// -----------------------------------------------------------------------------
// Processor
// -----------------------------------------------------------------------------

#[tokio::test]
async fn processed_id_short_circuits_processing() {
    let h = harness(0, 0);
    let store = h.processor.store();

    store.mark_processed(TransferId::from("0xabc"));
    assert!(store.is_processed(&TransferId::from("0xabc")));

    let event = lock_event(B256::left_padding_from(&[0x0a, 0xbc]));
    let outcome = h.processor.process(&event, ObservationPath::Poller).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::AlreadyProcessed));
    assert!(h.hoodi_writer.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_after_four_transient_failures() {
    let h = harness(0, 0);
    h.hoodi_writer.fail_with((0..4).map(|_| SubmitError::Transient("request timeout".to_owned())));
    let event = lock_event(B256::repeat_byte(0x21));

    let outcome = h.processor.process(&event, ObservationPath::Poller).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Submitted(_)));
    assert_eq!(h.hoodi_writer.sent().len(), 5);
    assert!(h.processor.store().is_processed(&event.id()));
}

#[tokio::test(start_paused = true)]
async fn five_transient_failures_leave_transfer_unrecorded() {
    let h = harness(0, 0);
    h.hoodi_writer.fail_with((0..5).map(|_| SubmitError::Transient("nonce too low".to_owned())));
    let event = lock_event(B256::repeat_byte(0x22));

    let result = h.processor.process(&event, ObservationPath::Poller).await;

    assert!(matches!(
        result,
        Err(ProcessError::SubmissionFailed(RetryError::SubmissionFailed { attempts: 5, .. }))
    ));
    assert_eq!(h.hoodi_writer.sent().len(), 5);
    assert!(!h.processor.store().is_processed(&event.id()));
}

#[tokio::test]
async fn already_applied_transfer_is_recorded() {
    let h = harness(0, 0);
    h.hoodi_writer.fail_with([SubmitError::AlreadyApplied("Transfer already processed".to_owned())]);
    let event = lock_event(B256::repeat_byte(0x23));

    let outcome = h.processor.process(&event, ObservationPath::Listener).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::AlreadyApplied);
    assert_eq!(h.hoodi_writer.sent().len(), 1);
    assert!(h.processor.store().is_processed(&event.id()));
}

#[tokio::test]
async fn unknown_destination_is_not_recorded() {
    let h = harness(0, 0);
    let log = rpc_log(&locked(31337, B256::repeat_byte(0x24)), SOURCE_VAULT, 101, 0);
    let event = TransferEvent::decode(TransferEventKind::TokensLocked, &sepolia(), &log).unwrap();

    let result = h.processor.process(&event, ObservationPath::Poller).await;

    assert!(matches!(result, Err(ProcessError::UnknownDestination(_))));
    assert!(!h.processor.store().is_processed(&event.id()));
    assert!(h.hoodi_writer.sent().is_empty());
}

// -----------------------------------------------------------------------------
// Dual path
// -----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn concurrent_paths_converge_on_one_transaction() {
    let store = CheckpointStore::from_state(PathBuf::from("unused-state.json"), 100, sepolia(), cursor_defaults(100, 100), None);
    let h = harness_with(store, 0, 0, Duration::from_secs(2));
    let event = lock_event(B256::repeat_byte(0x31));

    let (listener, poller) = tokio::join!(
        h.processor.process(&event, ObservationPath::Listener),
        h.processor.process(&event, ObservationPath::Poller),
    );

    let outcomes = [listener.unwrap(), poller.unwrap()];
    assert_eq!(outcomes.iter().filter(|outcome| matches!(outcome, ProcessOutcome::Submitted(_))).count(), 1);
    assert!(outcomes.contains(&ProcessOutcome::Skipped(SkipReason::InFlight)));
    assert_eq!(h.hoodi_writer.sent().len(), 1);

    let again = h.processor.process(&event, ObservationPath::Replay).await.unwrap();
    assert_eq!(again, ProcessOutcome::Skipped(SkipReason::AlreadyProcessed));
    assert_eq!(h.hoodi_writer.sent().len(), 1);
}

#[tokio::test]
async fn listener_delivery_after_poller_is_a_no_op() {
    let h = harness(200, 0);
    let log = rpc_log(&locked(HOODI_CHAIN_ID, B256::repeat_byte(0x32)), SOURCE_VAULT, 101, 0);
    h.source.add_log(log.clone());

    h.poller("sepolia", TransferEventKind::TokensLocked).poll_once().await.unwrap();
    let outcome = h.source_listener(Duration::from_secs(10)).handle_log(log).await;

    assert_eq!(outcome, Some(ProcessOutcome::Skipped(SkipReason::AlreadyProcessed)));
    assert_eq!(h.hoodi_writer.sent().len(), 1);
}

// -----------------------------------------------------------------------------
// Listener supervision
// -----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn listener_reattaches_after_dropped_subscription() {
    let h = harness(0, 0);
    let first = h.source.queue_subscription();
    let second = h.source.queue_subscription();

    let listener = Arc::new(h.source_listener(Duration::from_secs(10)));
    let cancellation = CancellationToken::new();
    let task = {
        let listener = Arc::clone(&listener);
        let cancellation = cancellation.clone();
        tokio::spawn(async move { listener.run(cancellation).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(listener.is_attached());
    assert_eq!(h.source.subscribe_calls.load(Ordering::SeqCst), 1);

    // node drops the subscription
    drop(first);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!listener.is_attached());

    // attached again after the supervision interval
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(listener.is_attached());
    assert_eq!(h.source.subscribe_calls.load(Ordering::SeqCst), 2);

    // deliveries on the new subscription are relayed
    let log = rpc_log(&locked(HOODI_CHAIN_ID, B256::repeat_byte(0x41)), SOURCE_VAULT, 101, 0);
    second.unbounded_send(Ok(log)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.hoodi_writer.sent().len(), 1);
    assert!(h.processor.store().is_processed(&TransferId::from(B256::repeat_byte(0x41))));

    cancellation.cancel();
    task.await.unwrap();
    assert!(!listener.is_attached());
}

#[tokio::test(start_paused = true)]
async fn listener_keeps_trying_while_node_refuses_subscriptions() {
    let h = harness(0, 0);
    let listener = Arc::new(h.source_listener(Duration::from_secs(10)));
    let cancellation = CancellationToken::new();
    let task = {
        let listener = Arc::clone(&listener);
        let cancellation = cancellation.clone();
        tokio::spawn(async move { listener.run(cancellation).await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(!listener.is_attached());
    assert_eq!(h.source.subscribe_calls.load(Ordering::SeqCst), 3);

    cancellation.cancel();
    task.await.unwrap();
}

// -----------------------------------------------------------------------------
// Restart
// -----------------------------------------------------------------------------

#[tokio::test]
async fn relayed_transfer_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("hybrid-state.json");

    let store = CheckpointStore::load(&path, 100, sepolia(), cursor_defaults(100, 100)).await;
    let h = harness_with(store, 200, 0, Duration::ZERO);
    h.source.add_log(rpc_log(&locked(HOODI_CHAIN_ID, B256::repeat_byte(0x51)), SOURCE_VAULT, 101, 0));
    h.poller("sepolia", TransferEventKind::TokensLocked).poll_once().await.unwrap();
    assert!(h.processor.store().flush().await.unwrap());

    // defaults are ignored for cursors present in the file
    let reloaded = CheckpointStore::load(&path, 100, sepolia(), cursor_defaults(150, 150)).await;
    assert_eq!(reloaded.get(&sepolia(), AssetClass::Fungible), Some(BlockNumber::from(101u64)));
    assert!(reloaded.is_processed(&TransferId::from(B256::repeat_byte(0x51))));
}
