use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::eth::relay::ObservationPath;
use crate::eth::relay::TransferEvent;
use crate::eth::relay::TransferProcessor;
use crate::eth::relay::TransferSubmitter;
use crate::ext::SleepReason;
use crate::ext::traced_sleep;
#[cfg(feature = "metrics")]
use crate::infra::metrics;
use crate::infra::tracing::warn_task_cancellation;

/// Bounded FIFO of transfers that could not be routed to a destination.
///
/// Entries are unique by transfer id. When full, the oldest entry is dropped.
pub struct ReplayBacklog {
    capacity: usize,
    queue: Mutex<VecDeque<TransferEvent>>,
}

impl ReplayBacklog {
    /// Returns `None` when the capacity is zero, which disables the backlog.
    pub fn new(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        Some(Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    /// Queues an event. Returns `false` if an event with the same transfer id is already queued.
    pub fn push(&self, event: TransferEvent) -> bool {
        let mut queue = self.queue.lock();
        let id = event.transfer_id();
        if queue.iter().any(|queued| queued.transfer_id() == id) {
            return false;
        }

        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(id = %dropped.id(), kind = %dropped.kind(), capacity = %self.capacity, "replay backlog is full, dropping oldest transfer");
            }
        }
        tracing::info!(id = %event.id(), kind = %event.kind(), "transfer queued for replay");
        queue.push_back(event);

        #[cfg(feature = "metrics")]
        metrics::set_relay_replay_backlog(queue.len() as u64);
        true
    }

    /// Removes and returns every queued event.
    pub fn drain(&self) -> Vec<TransferEvent> {
        let mut queue = self.queue.lock();
        let drained = queue.drain(..).collect();

        #[cfg(feature = "metrics")]
        metrics::set_relay_replay_backlog(0);
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Offers every queued transfer to the processor again.
///
/// Transfers still without a destination are queued again by the processor itself.
/// Returns the number of transfers that left the backlog.
pub async fn replay_once<R, W>(processor: &TransferProcessor<R, W>, backlog: &ReplayBacklog) -> usize
where
    R: Send + Sync + 'static,
    W: TransferSubmitter,
{
    let events = backlog.drain();
    if events.is_empty() {
        return 0;
    }
    tracing::info!(count = %events.len(), "replaying queued transfers");

    let mut resolved = 0;
    for event in events {
        match processor.process(&event, ObservationPath::Replay).await {
            Ok(outcome) => {
                tracing::info!(id = %event.id(), ?outcome, "replayed transfer");
                resolved += 1;
            }
            Err(e) if e.is_routing() => {}
            Err(e) => {
                tracing::error!(reason = ?e, id = %event.id(), "replayed transfer failed");
                resolved += 1;
            }
        }
    }
    resolved
}

/// Replays the backlog every `interval` until cancelled.
pub async fn run_replay<R, W>(processor: Arc<TransferProcessor<R, W>>, backlog: Arc<ReplayBacklog>, interval: Duration, cancellation: CancellationToken)
where
    R: Send + Sync + 'static,
    W: TransferSubmitter,
{
    const TASK_NAME: &str = "relay::replay-backlog";

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                warn_task_cancellation(TASK_NAME);
                return;
            }
            _ = traced_sleep(interval, SleepReason::PollInterval) => {}
        }
        replay_once(&processor, &backlog).await;
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;
    use alloy_primitives::B256;
    use alloy_primitives::U256;

    use super::*;
    use crate::eth::primitives::ChainKey;
    use crate::eth::relay::BurnEvent;
    use crate::eth::relay::EventOrigin;

    fn burn(id: u8) -> TransferEvent {
        TransferEvent::Burn(BurnEvent {
            origin: EventOrigin {
                chain_key: ChainKey::from("hoodi"),
                block_number: None,
                log_index: None,
                tx_hash: None,
            },
            user: Address::ZERO,
            amount: U256::from(1u64),
            transfer_id: B256::repeat_byte(id),
        })
    }

    #[test]
    fn zero_capacity_disables_backlog() {
        assert!(ReplayBacklog::new(0).is_none());
    }

    #[test]
    fn backlog_dedups_and_drops_oldest() {
        let backlog = ReplayBacklog::new(2).unwrap();
        assert!(backlog.push(burn(1)));
        assert!(!backlog.push(burn(1)));
        assert!(backlog.push(burn(2)));
        assert!(backlog.push(burn(3)));

        let ids: Vec<B256> = backlog.drain().iter().map(TransferEvent::transfer_id).collect();
        assert_eq!(ids, vec![B256::repeat_byte(2), B256::repeat_byte(3)]);
        assert!(backlog.is_empty());
    }
}
