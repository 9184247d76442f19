use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::U256;
use parking_lot::Mutex;
use tracing::Span;

use crate::eth::primitives::ChainId;
use crate::eth::primitives::TransferId;
use crate::eth::relay::ChainEndpoint;
use crate::eth::relay::CheckpointStore;
use crate::eth::relay::OutboundTx;
use crate::eth::relay::RelayCall;
use crate::eth::relay::RelayEndpoints;
use crate::eth::relay::ReplayBacklog;
use crate::eth::relay::RetryError;
use crate::eth::relay::RetryExecutor;
use crate::eth::relay::SubmissionReceipt;
use crate::eth::relay::TransferEvent;
use crate::eth::relay::TransferSubmitter;
#[cfg(feature = "metrics")]
use crate::infra::metrics;
use crate::infra::tracing::SpanExt;
use crate::infra::tracing::new_cid;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Path through which an event reached the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ObservationPath {
    #[strum(to_string = "poller")]
    Poller,

    #[strum(to_string = "listener")]
    Listener,

    #[strum(to_string = "replay")]
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Transfer id is in the processed ledger.
    AlreadyProcessed,

    /// The same transfer id is being submitted by another path.
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Submitted(SubmissionReceipt),

    /// Destination reported the transfer as already applied.
    AlreadyApplied,

    Skipped(SkipReason),
}

impl ProcessOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Submitted(_) => "submitted",
            Self::AlreadyApplied => "already-applied",
            Self::Skipped(SkipReason::AlreadyProcessed) => "skipped-processed",
            Self::Skipped(SkipReason::InFlight) => "skipped-in-flight",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("no destination for {0}")]
    UnknownDestination(String),

    #[error("chain {chain} cannot submit {call}: {reason}")]
    NoWriteCapability { chain: String, call: &'static str, reason: &'static str },

    #[error(transparent)]
    SubmissionFailed(RetryError),
}

impl ProcessError {
    /// Errors caused by missing routing configuration. The transfer id is not recorded for them.
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::UnknownDestination(_) | Self::NoWriteCapability { .. })
    }

    /// Submission stopped by cancellation before its outcome was known.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::SubmissionFailed(RetryError::Interrupted { .. }))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::UnknownDestination(_) => "unknown-destination",
            Self::NoWriteCapability { .. } => "no-write-capability",
            Self::SubmissionFailed(RetryError::Interrupted { .. }) => "interrupted",
            Self::SubmissionFailed(_) => "submission-failed",
        }
    }
}

// -----------------------------------------------------------------------------
// Processor
// -----------------------------------------------------------------------------

/// Turns decoded transfer events into destination transactions, at most once per transfer id
/// as far as the local ledger can tell.
pub struct TransferProcessor<R, W> {
    endpoints: Arc<RelayEndpoints<R, W>>,
    store: Arc<CheckpointStore>,
    retry: RetryExecutor,
    in_flight: Mutex<HashSet<TransferId>>,
    backlog: Option<Arc<ReplayBacklog>>,
}

impl<R, W> TransferProcessor<R, W>
where
    R: Send + Sync + 'static,
    W: TransferSubmitter,
{
    pub fn new(endpoints: Arc<RelayEndpoints<R, W>>, store: Arc<CheckpointStore>, retry: RetryExecutor, backlog: Option<Arc<ReplayBacklog>>) -> Self {
        Self {
            endpoints,
            store,
            retry,
            in_flight: Mutex::new(HashSet::new()),
            backlog,
        }
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    /// Processes a transfer event.
    #[tracing::instrument(name = "relay::process", skip_all, fields(cid, id, kind, path, origin_chain))]
    pub async fn process(&self, event: &TransferEvent, path: ObservationPath) -> Result<ProcessOutcome, ProcessError> {
        let id = event.id();
        Span::with(|s| {
            s.rec_str("cid", &new_cid());
            s.rec_str("id", &id);
            s.rec_str("kind", &event.kind());
            s.rec_str("path", &path);
            s.rec_str("origin_chain", &event.origin().chain_key);
        });

        let result = self.process_inner(event, id).await;

        #[cfg(feature = "metrics")]
        {
            let outcome = match &result {
                Ok(outcome) => outcome.label(),
                Err(e) => e.label(),
            };
            metrics::inc_relay_events_processed(event.kind().to_string(), path.to_string(), outcome);
        }

        match &result {
            Ok(ProcessOutcome::Skipped(reason)) => tracing::debug!(?reason, "transfer skipped"),
            Ok(outcome) => tracing::info!(outcome = %outcome.label(), "transfer relayed"),
            Err(e) if e.is_routing() => {
                tracing::warn!(reason = %e, "transfer not routable");
                if let Some(backlog) = &self.backlog {
                    backlog.push(event.clone());
                }
            }
            Err(e) if e.is_interrupted() => tracing::warn!(reason = %e, "transfer submission interrupted, transfer id not recorded"),
            Err(e) => tracing::error!(reason = %e, "transfer submission failed, transfer id not recorded"),
        }

        result
    }

    async fn process_inner(&self, event: &TransferEvent, id: TransferId) -> Result<ProcessOutcome, ProcessError> {
        // dedup
        if self.store.is_processed(&id) {
            return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyProcessed));
        }
        let Some(_claim) = InFlightClaim::try_claim(&self.in_flight, &id) else {
            return Ok(ProcessOutcome::Skipped(SkipReason::InFlight));
        };
        // the other path may have finished between the check and the claim
        if self.store.is_processed(&id) {
            return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        // route
        let (endpoint, tx) = self.resolve(event)?;
        let call = tx.call.name();
        let Some(writer) = endpoint.writer.as_deref() else {
            return Err(ProcessError::NoWriteCapability {
                chain: endpoint.key.to_string(),
                call,
                reason: "no signer configured",
            });
        };

        // submit
        let label = format!("{}@{}", call, endpoint.key);
        tracing::info!(%label, contract = %tx.to, "submitting transfer");

        #[cfg(feature = "metrics")]
        let start = metrics::now();

        let tx = &tx;
        let result = self
            .retry
            .execute(&label, |_| async move {
                let result = writer.submit(tx).await;
                #[cfg(feature = "metrics")]
                {
                    if let Err(e) = &result {
                        metrics::inc_relay_submission_failures(tx.chain_key.as_str(), call, e.class());
                    }
                }
                result
            })
            .await;

        #[cfg(feature = "metrics")]
        metrics::inc_relay_submission(start.elapsed(), tx.chain_key.as_str(), call, result.is_ok());

        match result {
            Ok(receipt) => {
                tracing::info!(tx_hash = %receipt.tx_hash, chain = %receipt.chain_key, "transfer submitted");
                self.store.mark_processed(id);
                Ok(ProcessOutcome::Submitted(receipt))
            }
            Err(RetryError::AlreadyApplied { .. }) => {
                self.store.mark_processed(id);
                Ok(ProcessOutcome::AlreadyApplied)
            }
            Err(e) => Err(ProcessError::SubmissionFailed(e)),
        }
    }

    /// Finds the chain that completes the transfer and builds the call.
    fn resolve(&self, event: &TransferEvent) -> Result<(&Arc<ChainEndpoint<R, W>>, OutboundTx), ProcessError> {
        let (endpoint, to, call) = match event {
            TransferEvent::Lock(ev) => {
                let endpoint = self.destination_by_raw_chain_id(ev.dest_chain_id)?;
                let call = RelayCall::MintWrapped {
                    to: ev.recipient,
                    amount: ev.amount,
                    transfer_id: ev.transfer_id,
                };
                (endpoint, endpoint.token_contract, call)
            }
            TransferEvent::NftLock(ev) => {
                let endpoint = self.destination_by_raw_chain_id(ev.dest_chain_id)?;
                let call = RelayCall::MintWrappedNft {
                    to: ev.recipient,
                    token_id: ev.token_id,
                    uri: ev.uri.clone(),
                    transfer_id: ev.transfer_id,
                };
                (endpoint, endpoint.nft_contract, call)
            }
            TransferEvent::Burn(ev) => {
                let burn_chain = self
                    .endpoints
                    .destination_by_key(&ev.origin.chain_key)
                    .ok_or_else(|| ProcessError::UnknownDestination(format!("burn on unknown chain {}", ev.origin.chain_key)))?;
                let source = &self.endpoints.source;
                let call = RelayCall::ReleaseV2 {
                    user: ev.user,
                    amount: ev.amount,
                    src_chain_id: <U256 as From<ChainId>>::from(burn_chain.chain_id),
                    transfer_id: ev.transfer_id,
                };
                (source, source.token_contract, call)
            }
            TransferEvent::NftBurn(ev) => {
                let source = &self.endpoints.source;
                let call = RelayCall::ReleaseNft {
                    collection: ev.original_collection,
                    token_id: ev.token_id,
                    to: ev.sender,
                    transfer_id: ev.transfer_id,
                };
                (source, source.nft_contract, call)
            }
        };

        let Some(to) = to else {
            return Err(ProcessError::NoWriteCapability {
                chain: endpoint.key.to_string(),
                call: call.name(),
                reason: "contract address not configured",
            });
        };
        let tx = OutboundTx {
            chain_key: endpoint.key.clone(),
            to,
            call,
        };
        Ok((endpoint, tx))
    }

    fn destination_by_raw_chain_id(&self, dest_chain_id: U256) -> Result<&Arc<ChainEndpoint<R, W>>, ProcessError> {
        ChainId::try_from(dest_chain_id)
            .ok()
            .and_then(|chain_id| self.endpoints.destination_by_chain_id(chain_id))
            .ok_or_else(|| ProcessError::UnknownDestination(format!("chain id {dest_chain_id}")))
    }
}

// -----------------------------------------------------------------------------
// In-flight claim
// -----------------------------------------------------------------------------

/// Marks a transfer id as being submitted. Released on drop.
struct InFlightClaim<'a> {
    set: &'a Mutex<HashSet<TransferId>>,
    id: TransferId,
}

impl<'a> InFlightClaim<'a> {
    fn try_claim(set: &'a Mutex<HashSet<TransferId>>, id: &TransferId) -> Option<Self> {
        if set.lock().insert(id.clone()) {
            Some(Self { set, id: id.clone() })
        } else {
            None
        }
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}
