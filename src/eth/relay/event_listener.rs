use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::alias::AlloyLog;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::LogFilter;
use crate::eth::relay::LogSubscriber;
use crate::eth::relay::ObservationPath;
use crate::eth::relay::ProcessOutcome;
use crate::eth::relay::SkipReason;
use crate::eth::relay::TransferEvent;
use crate::eth::relay::TransferEventKind;
use crate::eth::relay::TransferProcessor;
use crate::eth::relay::TransferSubmitter;
use crate::ext::DisplayExt;
use crate::ext::SleepReason;
use crate::ext::traced_sleep;
#[cfg(feature = "metrics")]
use crate::infra::metrics;
use crate::infra::tracing::warn_task_cancellation;

/// Supervised push subscription for one (chain, contract, event).
///
/// While detached it keeps trying to attach every `retry_interval`. Logs delivered while attached
/// go through the same processor used by the pollers, so a transfer seen by both paths is
/// submitted once.
pub struct EventListener<R, W> {
    chain_key: ChainKey,
    kind: TransferEventKind,
    filter: LogFilter,
    subscriber: Arc<R>,
    processor: Arc<TransferProcessor<R, W>>,
    retry_interval: Duration,
    attached: AtomicBool,
}

impl<R, W> EventListener<R, W>
where
    R: LogSubscriber,
    W: TransferSubmitter,
{
    pub fn new(
        chain_key: ChainKey,
        kind: TransferEventKind,
        filter: LogFilter,
        subscriber: Arc<R>,
        processor: Arc<TransferProcessor<R, W>>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            chain_key,
            kind,
            filter,
            subscriber,
            processor,
            retry_interval,
            attached: AtomicBool::new(false),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Relaxed)
    }

    /// Name of the task running this listener.
    pub fn task_name(&self) -> String {
        format!("relay::listener::{}::{}", self.chain_key, self.kind)
    }

    /// Decodes and processes one delivered log.
    ///
    /// Returns `None` when the log is ignored or its processing failed.
    pub async fn handle_log(&self, log: AlloyLog) -> Option<ProcessOutcome> {
        let event = match TransferEvent::decode(self.kind, &self.chain_key, &log) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(reason = %e, chain = %self.chain_key, tx_hash = ?log.transaction_hash, "skipping delivered log");
                return None;
            }
        };

        // the poller usually got there first
        if self.processor.store().is_processed(&event.id()) {
            tracing::debug!(id = %event.id(), chain = %self.chain_key, "delivered transfer already processed");
            return Some(ProcessOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        self.processor.process(&event, ObservationPath::Listener).await.ok()
    }

    /// Keeps the subscription attached until cancelled.
    pub async fn run(&self, cancellation: CancellationToken) {
        let task_name = self.task_name();
        tracing::info!(task = %task_name, contract = %self.filter.address, "starting event listener");

        loop {
            // attach
            let subscription = tokio::select! {
                _ = cancellation.cancelled() => {
                    warn_task_cancellation(&task_name);
                    return;
                }
                subscription = self.subscriber.subscribe_logs(&self.filter) => subscription,
            };

            #[cfg(feature = "metrics")]
            metrics::inc_relay_listener_attach(self.chain_key.as_str(), self.kind.asset_class().to_string(), subscription.is_ok());

            match subscription {
                Ok(mut stream) => {
                    self.attached.store(true, Ordering::Relaxed);
                    tracing::info!(task = %task_name, "listener attached");

                    // consume until the node drops the subscription
                    loop {
                        let next = tokio::select! {
                            _ = cancellation.cancelled() => {
                                self.attached.store(false, Ordering::Relaxed);
                                warn_task_cancellation(&task_name);
                                return;
                            }
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(log)) => {
                                self.handle_log(log).await;
                            }
                            Some(Err(e)) => {
                                tracing::warn!(reason = ?e, task = %task_name, "subscription failed");
                                break;
                            }
                            None => {
                                tracing::warn!(task = %task_name, "subscription ended");
                                break;
                            }
                        }
                    }

                    self.attached.store(false, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!(reason = ?e, task = %task_name, retry_in = %self.retry_interval.to_string_ext(), "failed to attach listener");
                }
            }

            // supervision interval
            tokio::select! {
                _ = cancellation.cancelled() => {
                    warn_task_cancellation(&task_name);
                    return;
                }
                _ = traced_sleep(self.retry_interval, SleepReason::ListenerSupervision) => {}
            }
        }
    }
}
