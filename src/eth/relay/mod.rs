//! Cross-chain transfer relay engine.

mod block_poller;
mod chain_client;
mod chain_signer;
mod checkpoint;
pub mod contracts;
mod endpoint;
mod event_listener;
mod relay_config;
mod relayer;
mod replay_backlog;
mod retry_executor;
mod submit_error;
mod transfer_event;
mod transfer_processor;

pub use block_poller::BlockPoller;
pub use block_poller::PollIntervals;
pub use block_poller::PollOutcome;
pub use chain_client::ChainReader;
pub use chain_client::LogSubscriber;
pub use chain_client::OutboundTx;
pub use chain_client::RelayCall;
pub use chain_client::SubmissionReceipt;
pub use chain_client::TransferSubmitter;
pub use chain_signer::ChainSigner;
pub use chain_signer::gas_limit_with_margin;
pub use chain_signer::load_wallet;
pub use checkpoint::CheckpointError;
pub use checkpoint::CheckpointStore;
pub use checkpoint::CursorDefaults;
pub use checkpoint::CursorKey;
pub use checkpoint::ProcessedLedger;
pub use checkpoint::RelayState;
pub use endpoint::ChainEndpoint;
pub use endpoint::RelayEndpoints;
pub use event_listener::EventListener;
pub use relay_config::DestinationChainConfig;
pub use relay_config::RelayConfig;
pub use relay_config::SourceChainConfig;
pub use relayer::Relayer;
pub use relayer::WatchTarget;
pub use relayer::run_flush_scheduler;
pub use relayer::seed_cursor_defaults;
pub use relayer::watch_targets;
pub use replay_backlog::ReplayBacklog;
pub use replay_backlog::replay_once;
pub use replay_backlog::run_replay;
pub use retry_executor::RetryError;
pub use retry_executor::RetryExecutor;
pub use submit_error::SubmitError;
pub use transfer_event::BurnEvent;
pub use transfer_event::DecodeError;
pub use transfer_event::EventOrigin;
pub use transfer_event::LockEvent;
pub use transfer_event::NftBurnEvent;
pub use transfer_event::NftLockEvent;
pub use transfer_event::TransferEvent;
pub use transfer_event::TransferEventKind;
pub use transfer_processor::ObservationPath;
pub use transfer_processor::ProcessError;
pub use transfer_processor::ProcessOutcome;
pub use transfer_processor::SkipReason;
pub use transfer_processor::TransferProcessor;
