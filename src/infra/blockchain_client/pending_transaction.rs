use std::fmt::Debug;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use alloy_primitives::B256;
use anyhow::anyhow;
use futures::Future;
use futures::Stream;
use futures_timer::Delay;
use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::stream;
use pin_project::pin_project;

use super::BlockchainClient;
use crate::alias::JsonValue;
use crate::eth::primitives::ExternalReceipt;

type PinBoxFut<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Create a stream that emits items at a fixed interval. Used for rate control
pub fn interval(duration: Duration) -> impl futures::stream::Stream<Item = ()> + Send + Unpin {
    stream::unfold((), move |_| Delay::new(duration).map(|_| Some(((), ())))).map(drop)
}

enum PendingTxState<'a> {
    /// Initial delay so the node has a chance to index the transaction
    InitialDelay(Pin<Box<Delay>>),

    /// Waiting for interval to elapse before calling API again
    PausedGettingTx,

    /// Polling the chain to see if the tx was mined or dropped
    GettingTx(PinBoxFut<'a, Option<JsonValue>>),

    /// Waiting for interval to elapse before calling API again
    PausedGettingReceipt,

    /// Polling the chain for the receipt
    GettingReceipt(PinBoxFut<'a, Option<ExternalReceipt>>),

    CheckingReceipt(Option<ExternalReceipt>),

    Completed,
}

impl Debug for PendingTxState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitialDelay(_) => "InitialDelay",
            Self::CheckingReceipt(_) => "CheckingReceipt",
            Self::Completed => "Completed",
            Self::GettingReceipt(_) => "GettingReceipt",
            Self::GettingTx(_) => "GettingTx",
            Self::PausedGettingReceipt => "PausedGettingReceipt",
            Self::PausedGettingTx => "PausedGettingTx",
        }
        .fmt(f)
    }
}

/// Resolves to the receipt of a sent transaction once it is mined.
///
/// Resolves to `None` if the node stops knowing the transaction (dropped or replaced).
/// Callers bound the wait with a timeout.
#[pin_project]
pub struct PendingTransaction<'a> {
    state: PendingTxState<'a>,
    provider: &'a BlockchainClient,
    tx_hash: B256,
    interval: Box<dyn Stream<Item = ()> + Send + Unpin>,
    retries_remaining: i32,
}

impl<'a> PendingTransaction<'a> {
    pub fn new(tx_hash: B256, provider: &'a BlockchainClient, poll_interval: Duration) -> Self {
        let delay = Box::pin(Delay::new(poll_interval));
        PendingTransaction {
            state: PendingTxState::InitialDelay(delay),
            provider,
            tx_hash,
            interval: Box::new(interval(poll_interval)),
            retries_remaining: 3,
        }
    }
}

impl Future for PendingTransaction<'_> {
    type Output = anyhow::Result<Option<ExternalReceipt>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        tracing::trace!(tx_hash = %this.tx_hash, state = ?this.state, "polling pending transaction");

        match this.state {
            PendingTxState::InitialDelay(fut) => {
                futures_util::ready!(fut.as_mut().poll(ctx));
                let fut = Box::pin(this.provider.fetch_transaction(*this.tx_hash));
                *this.state = PendingTxState::GettingTx(fut);
                ctx.waker().wake_by_ref();
                return Poll::Pending;
            }
            PendingTxState::PausedGettingTx => {
                let _ready = futures_util::ready!(this.interval.poll_next_unpin(ctx));
                let fut = Box::pin(this.provider.fetch_transaction(*this.tx_hash));
                *this.state = PendingTxState::GettingTx(fut);
                ctx.waker().wake_by_ref();
            }
            PendingTxState::GettingTx(fut) => {
                // provider errors are retried after the interval
                let Ok(tx) = futures_util::ready!(fut.as_mut().poll(ctx)) else {
                    *this.state = PendingTxState::PausedGettingTx;
                    ctx.waker().wake_by_ref();
                    return Poll::Pending;
                };

                let Some(tx) = tx else {
                    if *this.retries_remaining == 0 {
                        *this.state = PendingTxState::Completed;
                        return Poll::Ready(Ok(None));
                    }
                    *this.retries_remaining -= 1;
                    *this.state = PendingTxState::PausedGettingTx;
                    ctx.waker().wake_by_ref();
                    return Poll::Pending;
                };

                // not mined yet
                if tx.get("blockNumber").is_none_or(JsonValue::is_null) {
                    *this.state = PendingTxState::PausedGettingTx;
                    ctx.waker().wake_by_ref();
                    return Poll::Pending;
                }

                let fut = Box::pin(this.provider.fetch_receipt(*this.tx_hash));
                *this.state = PendingTxState::GettingReceipt(fut);
                ctx.waker().wake_by_ref();
                return Poll::Pending;
            }
            PendingTxState::PausedGettingReceipt => {
                let _ready = futures_util::ready!(this.interval.poll_next_unpin(ctx));
                let fut = Box::pin(this.provider.fetch_receipt(*this.tx_hash));
                *this.state = PendingTxState::GettingReceipt(fut);
                ctx.waker().wake_by_ref();
            }
            PendingTxState::GettingReceipt(fut) => {
                if let Ok(receipt) = futures_util::ready!(fut.as_mut().poll(ctx)) {
                    *this.state = PendingTxState::CheckingReceipt(receipt);
                } else {
                    *this.state = PendingTxState::PausedGettingReceipt;
                }
                ctx.waker().wake_by_ref();
            }
            PendingTxState::CheckingReceipt(receipt) => {
                if receipt.is_none() {
                    *this.state = PendingTxState::PausedGettingReceipt;
                    ctx.waker().wake_by_ref();
                    return Poll::Pending;
                }

                let receipt = receipt.take();
                *this.state = PendingTxState::Completed;
                return Poll::Ready(Ok(receipt));
            }
            PendingTxState::Completed => {
                return Poll::Ready(Err(anyhow!("pending transaction polled after completion")));
            }
        };

        Poll::Pending
    }
}
