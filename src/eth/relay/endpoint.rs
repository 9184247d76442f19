use std::sync::Arc;

use alloy_primitives::Address;

use crate::eth::primitives::AssetClass;
use crate::eth::primitives::ChainId;
use crate::eth::primitives::ChainKey;

/// Read-only description of a chain and of the clients used to talk to it.
///
/// On the source chain `token_contract` is the token vault and `nft_contract` the NFT vault.
/// On destination chains they are the wrapped token (wMRT) and the wrapped NFT.
pub struct ChainEndpoint<R, W> {
    pub key: ChainKey,
    pub name: String,
    pub chain_id: ChainId,
    pub token_contract: Option<Address>,
    pub nft_contract: Option<Address>,

    /// Client used for polling. Absent when no read RPC is configured.
    pub reader: Option<Arc<R>>,

    /// Client used for log subscriptions. Absent when no websocket RPC is configured.
    pub subscriber: Option<Arc<R>>,

    /// Signing client. Absent when the chain cannot be written to.
    pub writer: Option<Arc<W>>,
}

impl<R, W> ChainEndpoint<R, W> {
    /// Contract emitting and receiving transfers of the asset class.
    pub fn contract(&self, asset: AssetClass) -> Option<Address> {
        match asset {
            AssetClass::Fungible => self.token_contract,
            AssetClass::NonFungible => self.nft_contract,
        }
    }
}

/// All chains known to the relayer. Built once at startup.
pub struct RelayEndpoints<R, W> {
    pub source: Arc<ChainEndpoint<R, W>>,
    pub destinations: Vec<Arc<ChainEndpoint<R, W>>>,
}

impl<R, W> RelayEndpoints<R, W> {
    pub fn destination_by_chain_id(&self, chain_id: ChainId) -> Option<&Arc<ChainEndpoint<R, W>>> {
        self.destinations.iter().find(|endpoint| endpoint.chain_id == chain_id)
    }

    pub fn destination_by_key(&self, key: &ChainKey) -> Option<&Arc<ChainEndpoint<R, W>>> {
        self.destinations.iter().find(|endpoint| &endpoint.key == key)
    }

    /// Source followed by every destination.
    pub fn all(&self) -> impl Iterator<Item = &Arc<ChainEndpoint<R, W>>> {
        std::iter::once(&self.source).chain(self.destinations.iter())
    }
}
