use alloy_primitives::B256;

/// Canonical form of the `bytes32` transfer id: lowercase `0x`-prefixed hex.
///
/// Membership of this value in the processed ledger is what prevents double delivery.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// -----------------------------------------------------------------------------
// Conversions: Other -> Self
// -----------------------------------------------------------------------------
impl From<B256> for TransferId {
    fn from(value: B256) -> Self {
        Self(const_hex::encode_prefixed(value))
    }
}

impl From<&str> for TransferId {
    fn from(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        let digits = value.strip_prefix("0x").unwrap_or(&value);

        // short hex ids are left-padded to the bytes32 width
        if !digits.is_empty() && digits.len() <= 64 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self(format!("0x{digits:0>64}"));
        }
        Self(format!("0x{digits}"))
    }
}

impl From<String> for TransferId {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}
