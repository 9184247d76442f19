//! Seams between the relay engine and the chains it talks to.

use std::future::Future;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::Bytes;
use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use display_json::DebugAsJson;
use futures::stream::BoxStream;

use crate::alias::AlloyLog;
use crate::eth::primitives::BlockNumber;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::LogFilter;
use crate::eth::relay::SubmitError;
use crate::eth::relay::contracts::NftVault;
use crate::eth::relay::contracts::TokenVault;
use crate::eth::relay::contracts::WrappedNft;
use crate::eth::relay::contracts::WrappedToken;

// -----------------------------------------------------------------------------
// Traits
// -----------------------------------------------------------------------------

/// Read access used by block pollers.
pub trait ChainReader: Send + Sync + 'static {
    /// Current chain head.
    fn fetch_block_number(&self) -> impl Future<Output = anyhow::Result<BlockNumber>> + Send;

    /// Logs matching the filter in exactly one block.
    fn fetch_logs(&self, filter: &LogFilter, block: BlockNumber) -> impl Future<Output = anyhow::Result<Vec<AlloyLog>>> + Send;
}

/// Push delivery of logs used by event listeners.
pub trait LogSubscriber: Send + Sync + 'static {
    /// Subscribes to logs matching the filter. The stream ends when the subscription is dropped by the node.
    fn subscribe_logs(&self, filter: &LogFilter) -> impl Future<Output = anyhow::Result<BoxStream<'static, anyhow::Result<AlloyLog>>>> + Send;
}

/// Signed writes used by the transfer processor.
pub trait TransferSubmitter: Send + Sync + 'static {
    /// Signs, sends and waits for the receipt of a transaction.
    fn submit(&self, tx: &OutboundTx) -> impl Future<Output = Result<SubmissionReceipt, SubmitError>> + Send;
}

// -----------------------------------------------------------------------------
// Outbound transactions
// -----------------------------------------------------------------------------

/// Contract call that completes a transfer on its counterpart chain.
#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub enum RelayCall {
    /// `wMRT.mintWrapped(to, amount, transferId)`.
    MintWrapped { to: Address, amount: U256, transfer_id: B256 },

    /// `TokenVault.releaseV2(user, amount, srcChainId, transferId)`.
    ReleaseV2 {
        user: Address,
        amount: U256,
        src_chain_id: U256,
        transfer_id: B256,
    },

    /// `WrappedNFT.mintWrapped(to, tokenId, uri, transferId)`.
    MintWrappedNft {
        to: Address,
        token_id: U256,
        uri: String,
        transfer_id: B256,
    },

    /// `NFTVault.releaseNFT(collection, tokenId, to, transferId)`.
    ReleaseNft {
        collection: Address,
        token_id: U256,
        to: Address,
        transfer_id: B256,
    },
}

impl RelayCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MintWrapped { .. } => "mintWrapped",
            Self::ReleaseV2 { .. } => "releaseV2",
            Self::MintWrappedNft { .. } => "mintWrappedNFT",
            Self::ReleaseNft { .. } => "releaseNFT",
        }
    }

    /// ABI encoded calldata.
    pub fn abi_encode(&self) -> Bytes {
        let input = match self.clone() {
            Self::MintWrapped { to, amount, transfer_id } => WrappedToken::mintWrappedCall {
                to,
                amount,
                transferId: transfer_id,
            }
            .abi_encode(),
            Self::ReleaseV2 {
                user,
                amount,
                src_chain_id,
                transfer_id,
            } => TokenVault::releaseV2Call {
                user,
                amount,
                srcChainId: src_chain_id,
                transferId: transfer_id,
            }
            .abi_encode(),
            Self::MintWrappedNft { to, token_id, uri, transfer_id } => WrappedNft::mintWrappedCall {
                to,
                tokenId: token_id,
                uri,
                transferId: transfer_id,
            }
            .abi_encode(),
            Self::ReleaseNft {
                collection,
                token_id,
                to,
                transfer_id,
            } => NftVault::releaseNFTCall {
                collection,
                tokenId: token_id,
                to,
                transferId: transfer_id,
            }
            .abi_encode(),
        };
        input.into()
    }
}

/// Transaction to be signed and sent by the submitter of `chain_key`.
#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OutboundTx {
    pub chain_key: ChainKey,
    pub to: Address,
    pub call: RelayCall,
}

/// Mined transaction of a successful submission.
#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SubmissionReceipt {
    pub chain_key: ChainKey,
    pub tx_hash: B256,
    pub block_number: Option<BlockNumber>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_starts_with_the_function_selector() {
        let call = RelayCall::ReleaseV2 {
            user: Address::repeat_byte(0x01),
            amount: U256::from(5u64),
            src_chain_id: U256::from(560048u64),
            transfer_id: B256::repeat_byte(0x02),
        };
        let input = call.abi_encode();
        assert_eq!(&input[..4], TokenVault::releaseV2Call::SELECTOR.as_slice());
        assert_eq!(input.len(), 4 + 4 * 32);
    }

    #[test]
    fn wrapped_mints_have_distinct_selectors() {
        assert_ne!(WrappedToken::mintWrappedCall::SELECTOR, WrappedNft::mintWrappedCall::SELECTOR);

        let call = RelayCall::MintWrappedNft {
            to: Address::repeat_byte(0x01),
            token_id: U256::from(1u64),
            uri: "ipfs://x".to_owned(),
            transfer_id: B256::ZERO,
        };
        assert_eq!(&call.abi_encode()[..4], WrappedNft::mintWrappedCall::SELECTOR.as_slice());
        assert_eq!(call.name(), "mintWrappedNFT");
    }
}
