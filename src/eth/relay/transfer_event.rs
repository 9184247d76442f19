use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use alloy_sol_types::SolEvent;
use display_json::DebugAsJson;

use crate::alias::AlloyLog;
use crate::eth::primitives::AssetClass;
use crate::eth::primitives::BlockNumber;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::TransferId;
use crate::eth::relay::contracts::NftVault;
use crate::eth::relay::contracts::TokenVault;
use crate::eth::relay::contracts::WrappedNft;
use crate::eth::relay::contracts::WrappedToken;

// -----------------------------------------------------------------------------
// Kind
// -----------------------------------------------------------------------------

/// Bridge events observed by the relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize)]
pub enum TransferEventKind {
    /// Native tokens locked in the source vault.
    #[strum(to_string = "TokensLockedV2")]
    TokensLocked,

    /// Wrapped tokens burned on a destination chain.
    #[strum(to_string = "TokensBurned")]
    TokensBurned,

    /// NFT locked in the source NFT vault.
    #[strum(to_string = "NFTLocked")]
    NftLocked,

    /// Wrapped NFT burned on a destination chain.
    #[strum(to_string = "NFTBurned")]
    NftBurned,
}

impl TransferEventKind {
    /// Event topic0.
    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::TokensLocked => TokenVault::TokensLockedV2::SIGNATURE_HASH,
            Self::TokensBurned => WrappedToken::TokensBurned::SIGNATURE_HASH,
            Self::NftLocked => NftVault::NFTLocked::SIGNATURE_HASH,
            Self::NftBurned => WrappedNft::NFTBurned::SIGNATURE_HASH,
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        match self {
            Self::TokensLocked | Self::TokensBurned => AssetClass::Fungible,
            Self::NftLocked | Self::NftBurned => AssetClass::NonFungible,
        }
    }

    /// Event emitted by the source chain vault of the asset class.
    pub fn source_event(asset_class: AssetClass) -> Self {
        match asset_class {
            AssetClass::Fungible => Self::TokensLocked,
            AssetClass::NonFungible => Self::NftLocked,
        }
    }

    /// Event emitted by the wrapped contract of the asset class on a destination chain.
    pub fn destination_event(asset_class: AssetClass) -> Self {
        match asset_class {
            AssetClass::Fungible => Self::TokensBurned,
            AssetClass::NonFungible => Self::NftBurned,
        }
    }
}

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("log was removed by a chain reorganization")]
    Removed,

    #[error("log topic0 {found:?} does not match {expected} event")]
    UnexpectedTopic { expected: TransferEventKind, found: Option<B256> },

    #[error("failed to decode {kind} event: {source}")]
    Abi {
        kind: TransferEventKind,
        #[source]
        source: alloy_sol_types::Error,
    },
}

// -----------------------------------------------------------------------------
// Events
// -----------------------------------------------------------------------------

/// Where a transfer event was observed.
#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EventOrigin {
    pub chain_key: ChainKey,
    pub block_number: Option<BlockNumber>,
    pub log_index: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl EventOrigin {
    fn from_log(chain_key: &ChainKey, log: &AlloyLog) -> Self {
        Self {
            chain_key: chain_key.clone(),
            block_number: log.block_number.map(BlockNumber::from),
            log_index: log.log_index,
            tx_hash: log.transaction_hash,
        }
    }
}

#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LockEvent {
    pub origin: EventOrigin,
    pub user: Address,
    pub dest_token: Address,
    pub recipient: Address,
    pub amount: U256,
    pub nonce: U256,
    pub dest_chain_id: U256,
    pub transfer_id: B256,
}

/// Burn of wrapped tokens. The chain it happened on is the origin chain.
#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BurnEvent {
    pub origin: EventOrigin,
    pub user: Address,
    pub amount: U256,
    pub transfer_id: B256,
}

#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NftLockEvent {
    pub origin: EventOrigin,
    pub transfer_id: B256,
    pub nft_address: Address,
    pub token_id: U256,
    pub sender: Address,
    pub recipient: Address,
    pub dest_chain_id: U256,
    pub uri: String,
    pub name: String,
    pub symbol: String,
}

#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NftBurnEvent {
    pub origin: EventOrigin,
    pub transfer_id: B256,
    pub sender: Address,
    pub token_id: U256,
    pub original_collection: Address,
    pub uri: String,
}

/// Decoded bridge event. Immutable once decoded.
#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub enum TransferEvent {
    Lock(LockEvent),
    Burn(BurnEvent),
    NftLock(NftLockEvent),
    NftBurn(NftBurnEvent),
}

impl TransferEvent {
    /// Decodes a log emitted by `chain_key` as an event of the expected kind.
    pub fn decode(kind: TransferEventKind, chain_key: &ChainKey, log: &AlloyLog) -> Result<Self, DecodeError> {
        if log.removed {
            return Err(DecodeError::Removed);
        }
        let topic0 = log.topics().first().copied();
        if topic0 != Some(kind.signature_hash()) {
            return Err(DecodeError::UnexpectedTopic { expected: kind, found: topic0 });
        }

        let origin = EventOrigin::from_log(chain_key, log);
        let data = log.data();
        let abi_err = |source| DecodeError::Abi { kind, source };

        let event = match kind {
            TransferEventKind::TokensLocked => {
                let ev = TokenVault::TokensLockedV2::decode_log_data(data).map_err(abi_err)?;
                Self::Lock(LockEvent {
                    origin,
                    user: ev.user,
                    dest_token: ev.destToken,
                    recipient: ev.recipient,
                    amount: ev.amount,
                    nonce: ev.nonce,
                    dest_chain_id: ev.destChainId,
                    transfer_id: ev.transferId,
                })
            }
            TransferEventKind::TokensBurned => {
                let ev = WrappedToken::TokensBurned::decode_log_data(data).map_err(abi_err)?;
                Self::Burn(BurnEvent {
                    origin,
                    user: ev.user,
                    amount: ev.amount,
                    transfer_id: ev.transferId,
                })
            }
            TransferEventKind::NftLocked => {
                let ev = NftVault::NFTLocked::decode_log_data(data).map_err(abi_err)?;
                Self::NftLock(NftLockEvent {
                    origin,
                    transfer_id: ev.transferId,
                    nft_address: ev.nftAddress,
                    token_id: ev.tokenId,
                    sender: ev.sender,
                    recipient: ev.recipient,
                    dest_chain_id: ev.destChainId,
                    uri: ev.uri,
                    name: ev.name,
                    symbol: ev.symbol,
                })
            }
            TransferEventKind::NftBurned => {
                let ev = WrappedNft::NFTBurned::decode_log_data(data).map_err(abi_err)?;
                Self::NftBurn(NftBurnEvent {
                    origin,
                    transfer_id: ev.transferId,
                    sender: ev.sender,
                    token_id: ev.tokenId,
                    original_collection: ev.originalCollection,
                    uri: ev.uri,
                })
            }
        };
        Ok(event)
    }

    /// Canonical transfer id.
    pub fn id(&self) -> TransferId {
        TransferId::from(self.transfer_id())
    }

    pub fn transfer_id(&self) -> B256 {
        match self {
            Self::Lock(ev) => ev.transfer_id,
            Self::Burn(ev) => ev.transfer_id,
            Self::NftLock(ev) => ev.transfer_id,
            Self::NftBurn(ev) => ev.transfer_id,
        }
    }

    pub fn kind(&self) -> TransferEventKind {
        match self {
            Self::Lock(_) => TransferEventKind::TokensLocked,
            Self::Burn(_) => TransferEventKind::TokensBurned,
            Self::NftLock(_) => TransferEventKind::NftLocked,
            Self::NftBurn(_) => TransferEventKind::NftBurned,
        }
    }

    pub fn origin(&self) -> &EventOrigin {
        match self {
            Self::Lock(ev) => &ev.origin,
            Self::Burn(ev) => &ev.origin,
            Self::NftLock(ev) => &ev.origin,
            Self::NftBurn(ev) => &ev.origin,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy_primitives::Log as PrimitiveLog;
    use alloy_sol_types::SolEvent;

    use super::*;

    /// Wraps an event into an RPC log as returned by `eth_getLogs`.
    pub(crate) fn rpc_log<E: SolEvent>(event: &E, address: Address, block: u64, log_index: u64) -> AlloyLog {
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

    pub(crate) fn tokens_locked(dest_chain_id: u64, transfer_id: B256) -> TokenVault::TokensLockedV2 {
        TokenVault::TokensLockedV2 {
            user: Address::repeat_byte(0x11),
            destToken: Address::repeat_byte(0x22),
            recipient: Address::repeat_byte(0x33),
            amount: U256::from(1_000u64),
            nonce: U256::from(7u64),
            destChainId: U256::from(dest_chain_id),
            transferId: transfer_id,
        }
    }

    #[test]
    fn decodes_tokens_locked() {
        let log = rpc_log(&tokens_locked(560048, B256::repeat_byte(0xAB)), Address::repeat_byte(0x01), 101, 3);
        let event = TransferEvent::decode(TransferEventKind::TokensLocked, &ChainKey::from("sepolia"), &log).unwrap();

        let TransferEvent::Lock(lock) = &event else { panic!("expected lock event") };
        assert_eq!(lock.recipient, Address::repeat_byte(0x33));
        assert_eq!(lock.dest_chain_id, U256::from(560048u64));
        assert_eq!(lock.origin.block_number, Some(BlockNumber::from(101u64)));
        assert_eq!(lock.origin.log_index, Some(3));
        assert_eq!(event.id().as_str(), format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn decodes_nft_burned_with_indexed_transfer_id() {
        let burned = WrappedNft::NFTBurned {
            transferId: B256::repeat_byte(0x05),
            sender: Address::repeat_byte(0x44),
            tokenId: U256::from(9u64),
            originalCollection: Address::repeat_byte(0x55),
            uri: "ipfs://token/9".to_owned(),
        };
        let log = rpc_log(&burned, Address::repeat_byte(0x02), 10, 0);
        let event = TransferEvent::decode(TransferEventKind::NftBurned, &ChainKey::from("base"), &log).unwrap();

        let TransferEvent::NftBurn(burn) = event else { panic!("expected nft burn event") };
        assert_eq!(burn.transfer_id, B256::repeat_byte(0x05));
        assert_eq!(burn.original_collection, Address::repeat_byte(0x55));
        assert_eq!(burn.uri, "ipfs://token/9");
        assert_eq!(burn.origin.chain_key.as_str(), "base");
    }

    #[test]
    fn rejects_log_of_another_event() {
        let log = rpc_log(&tokens_locked(1, B256::ZERO), Address::ZERO, 1, 0);
        let result = TransferEvent::decode(TransferEventKind::TokensBurned, &ChainKey::from("hoodi"), &log);
        assert!(matches!(result, Err(DecodeError::UnexpectedTopic { .. })));
    }

    #[test]
    fn rejects_removed_log() {
        let mut log = rpc_log(&tokens_locked(1, B256::ZERO), Address::ZERO, 1, 0);
        log.removed = true;
        assert!(matches!(
            TransferEvent::decode(TransferEventKind::TokensLocked, &ChainKey::from("sepolia"), &log),
            Err(DecodeError::Removed)
        ));
    }

    #[test]
    fn kinds_map_to_asset_classes() {
        assert_eq!(TransferEventKind::source_event(AssetClass::NonFungible), TransferEventKind::NftLocked);
        assert_eq!(TransferEventKind::destination_event(AssetClass::Fungible), TransferEventKind::TokensBurned);
        assert_eq!(TransferEventKind::NftBurned.asset_class(), AssetClass::NonFungible);
    }
}
