use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::anyhow;
use itertools::Itertools;
use tokio_util::sync::CancellationToken;

use crate::eth::primitives::AssetClass;
use crate::eth::primitives::BlockNumber;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::LogFilter;
use crate::eth::relay::ChainReader;
use crate::eth::relay::CheckpointStore;
use crate::eth::relay::ObservationPath;
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

// -----------------------------------------------------------------------------
// Intervals
// -----------------------------------------------------------------------------

/// Delays between poll ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub slow: Duration,
    pub fast: Duration,
}

impl PollIntervals {
    /// Distance to the safe head above which the poller is considered catching up.
    pub const CATCH_UP_DISTANCE: u64 = 20;

    pub fn new(slow: Duration, fast: Duration) -> Self {
        Self { slow, fast }
    }

    /// Fast interval while more than [`Self::CATCH_UP_DISTANCE`] blocks behind, slow otherwise.
    pub fn select(&self, safe_head: BlockNumber, cursor: BlockNumber) -> Duration {
        if safe_head.distance_from(cursor) > Self::CATCH_UP_DISTANCE { self.fast } else { self.slow }
    }
}

// -----------------------------------------------------------------------------
// Outcome
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Next block is not yet behind the safe head.
    Idle { cursor: BlockNumber, safe_head: BlockNumber },

    /// One block was handled and the cursor moved to it.
    Advanced { block: BlockNumber, safe_head: BlockNumber, events: usize },
}

impl PollOutcome {
    pub fn has_more_work(&self) -> bool {
        match self {
            Self::Idle { .. } => false,
            Self::Advanced { block, safe_head, .. } => block < safe_head,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::Advanced { .. } => "advanced",
        }
    }
}

// -----------------------------------------------------------------------------
// Poller
// -----------------------------------------------------------------------------

/// Walks one (chain, asset class) cursor one block at a time.
pub struct BlockPoller<R, W> {
    chain_key: ChainKey,
    kind: TransferEventKind,
    filter: LogFilter,
    reader: Arc<R>,
    processor: Arc<TransferProcessor<R, W>>,
    confirmations: u64,
    intervals: PollIntervals,
}

impl<R, W> BlockPoller<R, W>
where
    R: ChainReader,
    W: TransferSubmitter,
{
    pub fn new(
        chain_key: ChainKey,
        kind: TransferEventKind,
        filter: LogFilter,
        reader: Arc<R>,
        processor: Arc<TransferProcessor<R, W>>,
        confirmations: u64,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            chain_key,
            kind,
            filter,
            reader,
            processor,
            confirmations,
            intervals,
        }
    }

    pub fn asset(&self) -> AssetClass {
        self.kind.asset_class()
    }

    /// Name of the task running this poller.
    pub fn task_name(&self) -> String {
        format!("relay::poller::{}::{}", self.chain_key, self.asset())
    }

    fn store(&self) -> &CheckpointStore {
        self.processor.store()
    }

    /// Handles the block after the cursor if it is already behind the safe head.
    ///
    /// RPC failures and interrupted submissions are returned without touching the cursor.
    #[tracing::instrument(name = "relay::poll_once", skip_all, fields(chain = %self.chain_key, asset = %self.asset()))]
    pub async fn poll_once(&self) -> anyhow::Result<PollOutcome> {
        let asset = self.asset();
        let Some(cursor) = self.store().get(&self.chain_key, asset) else {
            return Err(anyhow!("cursor {}/{} is not tracked", self.chain_key, asset));
        };

        let head = self.reader.fetch_block_number().await.context("failed to fetch chain head")?;
        let safe_head = head.saturating_sub(self.confirmations);
        let next = cursor.next_block_number();
        if next > safe_head {
            return Ok(PollOutcome::Idle { cursor, safe_head });
        }

        let logs = self.reader.fetch_logs(&self.filter, next).await.context("failed to fetch logs")?;

        #[cfg(feature = "metrics")]
        metrics::inc_relay_block_logs(logs.len(), self.chain_key.as_str(), asset.to_string());

        // within a block, events are handled in log order
        let logs = logs.into_iter().sorted_by_key(|log| log.log_index.unwrap_or(u64::MAX)).collect_vec();

        let mut events = 0;
        for log in logs {
            if log.block_number.is_some_and(|number| BlockNumber::from(number) != next) {
                tracing::warn!(block = %next, log_block = ?log.block_number, "ignoring log from another block");
                continue;
            }
            let event = match TransferEvent::decode(self.kind, &self.chain_key, &log) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(reason = %e, block = %next, log_index = ?log.log_index, "skipping log that could not be decoded");
                    continue;
                }
            };
            events += 1;

            // failures are logged by the processor and never stop the block, except an interrupted
            // submission: the block must be seen again after restart
            if let Err(e) = self.processor.process(&event, ObservationPath::Poller).await {
                if e.is_interrupted() {
                    return Err(anyhow!(e).context(format!("block {next} left unfinished")));
                }
            }
        }

        self.store().advance(&self.chain_key, asset, next)?;

        #[cfg(feature = "metrics")]
        metrics::inc_relay_blocks_advanced(self.chain_key.as_str(), asset.to_string());

        tracing::debug!(block = %next, %safe_head, %events, "block handled");
        Ok(PollOutcome::Advanced {
            block: next,
            safe_head,
            events,
        })
    }

    /// Delay before the tick that follows `outcome`.
    pub fn next_delay(&self, outcome: &PollOutcome) -> Duration {
        match outcome {
            PollOutcome::Idle { .. } => self.intervals.slow,
            PollOutcome::Advanced { block, safe_head, .. } => self.intervals.select(*safe_head, *block),
        }
    }

    /// Polls until cancelled.
    pub async fn run(self, cancellation: CancellationToken) {
        let task_name = self.task_name();
        tracing::info!(task = %task_name, contract = %self.filter.address, event = %self.kind, "starting block poller");

        loop {
            if cancellation.is_cancelled() {
                warn_task_cancellation(&task_name);
                return;
            }

            let delay = match self.poll_once().await {
                Ok(outcome) => {
                    #[cfg(feature = "metrics")]
                    metrics::inc_relay_poll_ticks(self.chain_key.as_str(), self.asset().to_string(), outcome.label());
                    self.next_delay(&outcome)
                }
                Err(e) => {
                    tracing::error!(reason = ?e, task = %task_name, "poll tick failed");
                    #[cfg(feature = "metrics")]
                    metrics::inc_relay_poll_ticks(self.chain_key.as_str(), self.asset().to_string(), "failed");
                    self.intervals.slow
                }
            };

            tracing::trace!(task = %task_name, delay = %delay.to_string_ext(), "next poll scheduled");
            tokio::select! {
                _ = cancellation.cancelled() => {
                    warn_task_cancellation(&task_name);
                    return;
                }
                _ = traced_sleep(delay, SleepReason::PollInterval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_up_distance_boundary() {
        let intervals = PollIntervals::new(Duration::from_millis(2500), Duration::from_millis(800));
        let cursor = BlockNumber::from(100u64);

        assert_eq!(intervals.select(BlockNumber::from(121u64), cursor), Duration::from_millis(800));
        assert_eq!(intervals.select(BlockNumber::from(120u64), cursor), Duration::from_millis(2500));
        assert_eq!(intervals.select(BlockNumber::from(90u64), cursor), Duration::from_millis(2500));
    }

    #[test]
    fn has_more_work_only_when_behind_safe_head() {
        let advanced = |block: u64| PollOutcome::Advanced {
            block: BlockNumber::from(block),
            safe_head: BlockNumber::from(104u64),
            events: 0,
        };
        assert!(advanced(103).has_more_work());
        assert!(!advanced(104).has_more_work());
        assert!(
            !PollOutcome::Idle {
                cursor: BlockNumber::from(104u64),
                safe_head: BlockNumber::from(104u64)
            }
            .has_more_work()
        );
    }
}
