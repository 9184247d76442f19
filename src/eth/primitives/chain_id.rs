use std::str::FromStr;

use alloy_primitives::U64;
use alloy_primitives::U256;
use anyhow::anyhow;
use display_json::DebugAsJson;

#[derive(DebugAsJson, derive_more::Display, Clone, Copy, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub U64);

impl ChainId {
    pub fn as_u64(&self) -> u64 {
        self.0.to::<u64>()
    }
}

// -----------------------------------------------------------------------------
// Conversions: Other -> Self
// -----------------------------------------------------------------------------

impl TryFrom<U256> for ChainId {
    type Error = anyhow::Error;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        Ok(ChainId(U64::from(u64::try_from(value).map_err(|err| anyhow!(err))?)))
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(U64::from(value))
    }
}

impl FromStr for ChainId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed.map(Self::from).map_err(|e| anyhow!("invalid chain id \"{}\": {}", s, e))
    }
}

// -----------------------------------------------------------------------------
// Conversions: Self -> Other
// -----------------------------------------------------------------------------
impl From<ChainId> for u64 {
    fn from(value: ChainId) -> Self {
        value.as_u64()
    }
}

impl From<ChainId> for U256 {
    fn from(value: ChainId) -> Self {
        U256::from(u64::from(value))
    }
}
