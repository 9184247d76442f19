use alloy_primitives::B256;
use alloy_primitives::U64;
use serde::Deserialize;

use crate::alias::JsonValue;
use crate::eth::primitives::BlockNumber;
use crate::log_and_err;

/// Subset of a transaction receipt returned by `eth_getTransactionReceipt` that the relayer inspects.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U64>,
}

impl ExternalReceipt {
    /// Returns the block number, if the receipt is already mined.
    pub fn block_number(&self) -> Option<BlockNumber> {
        self.block_number.map(BlockNumber::from)
    }

    /// Checks if the transaction was completed with success.
    ///
    /// Receipts without status (pre-Byzantium) are considered successful.
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|status| status == U64::ONE)
    }
}

// -----------------------------------------------------------------------------
// Conversions: Other -> Self
// -----------------------------------------------------------------------------

impl TryFrom<JsonValue> for ExternalReceipt {
    type Error = anyhow::Error;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match ExternalReceipt::deserialize(&value) {
            Ok(v) => Ok(v),
            Err(e) => log_and_err!(reason = e, payload = value, "failed to convert payload value to ExternalReceipt"),
        }
    }
}
