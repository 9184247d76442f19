use alloy_primitives::Address;
use alloy_primitives::B256;
use display_json::DebugAsJson;
use serde_json::json;

use crate::alias::JsonValue;
use crate::eth::primitives::BlockNumber;

/// Filter for logs of a single event emitted by a single contract.
#[derive(DebugAsJson, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
}

impl LogFilter {
    pub fn new(address: Address, topic0: B256) -> Self {
        Self { address, topic0 }
    }

    /// Parameters of `eth_getLogs` restricted to a single block.
    pub fn to_block_query(&self, block: BlockNumber) -> JsonValue {
        json!({
            "address": self.address,
            "topics": [self.topic0],
            "fromBlock": block,
            "toBlock": block,
        })
    }

    /// Parameters of `eth_subscribe("logs", ..)`.
    pub fn to_subscription(&self) -> JsonValue {
        json!({
            "address": self.address,
            "topics": [self.topic0],
        })
    }
}
