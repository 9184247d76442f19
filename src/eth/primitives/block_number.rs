use std::ops::Add;
use std::str::FromStr;

use alloy_primitives::U64;
use alloy_primitives::U256;
use anyhow::anyhow;
use display_json::DebugAsJson;

use crate::gen_newtype_from;

#[derive(DebugAsJson, derive_more::Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(pub U64);

impl BlockNumber {
    pub const ZERO: BlockNumber = BlockNumber(U64::ZERO);
    pub const ONE: BlockNumber = BlockNumber(U64::ONE);

    /// Returns the previous block number.
    pub fn prev(&self) -> Option<Self> {
        if self.is_zero() { None } else { Some(Self(self.0 - U64::ONE)) }
    }

    /// Returns the next block number.
    pub fn next_block_number(&self) -> Self {
        Self(self.0.saturating_add(U64::ONE))
    }

    /// Checks if it is the zero block number.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtracts a number of blocks without going below zero.
    pub fn saturating_sub(&self, blocks: u64) -> Self {
        Self(self.0.saturating_sub(U64::from(blocks)))
    }

    /// Number of blocks from `lower` up to `self`, zero if `lower` is ahead.
    pub fn distance_from(&self, lower: BlockNumber) -> u64 {
        self.as_u64().saturating_sub(lower.as_u64())
    }

    pub fn as_u64(&self) -> u64 {
        self.0.to::<u64>()
    }
}

// -----------------------------------------------------------------------------
// Math
// -----------------------------------------------------------------------------

impl Add<u64> for BlockNumber {
    type Output = BlockNumber;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(U64::from(rhs)))
    }
}

// -----------------------------------------------------------------------------
// Conversions: Other -> Self
// -----------------------------------------------------------------------------
gen_newtype_from!(self = BlockNumber, other = U64);

impl From<u64> for BlockNumber {
    fn from(value: u64) -> Self {
        Self(U64::from(value))
    }
}

impl From<u32> for BlockNumber {
    fn from(value: u32) -> Self {
        Self(U64::from(value))
    }
}

impl FromStr for BlockNumber {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        // accepts both decimal and 0x-prefixed hexadecimal
        let s = s.trim();
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        match parsed {
            Ok(parsed) => Ok(Self::from(parsed)),
            Err(e) => {
                tracing::warn!(reason = ?e, value = %s, "failed to parse block number");
                Err(anyhow!("failed to parse field '{}' with value '{}'", "blockNumber", s))
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Conversions: Self -> Other
// -----------------------------------------------------------------------------
impl From<BlockNumber> for U64 {
    fn from(block_number: BlockNumber) -> Self {
        block_number.0
    }
}

impl From<BlockNumber> for u64 {
    fn from(block_number: BlockNumber) -> Self {
        block_number.as_u64()
    }
}

impl From<BlockNumber> for U256 {
    fn from(block_number: BlockNumber) -> Self {
        Self::from(block_number.as_u64())
    }
}
