use std::str::FromStr;

use anyhow::anyhow;

/// Short lowercase identifier of a chain (`sepolia`, `hoodi`, `base`, ...).
///
/// Used as key of the persisted cursors and as prefix of the per-chain environment variables.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ChainKey(String);

impl ChainKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(key.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix of the environment variables holding this chain settings.
    pub fn env_prefix(&self) -> String {
        self.0.to_uppercase().replace('-', "_")
    }
}

impl FromStr for ChainKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = Self::new(s);
        if key.0.is_empty() {
            return Err(anyhow!("chain key cannot be empty"));
        }
        if not_a_key(&key.0) {
            return Err(anyhow!("invalid chain key \"{}\": only letters, digits, '-' and '_' are allowed", s));
        }
        Ok(key)
    }
}

fn not_a_key(s: &str) -> bool {
    s.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
}

impl From<&str> for ChainKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_key_is_lowercased() {
        assert_eq!(ChainKey::from_str(" Hoodi ").unwrap().as_str(), "hoodi");
        assert_eq!(ChainKey::from("optimism-sepolia").env_prefix(), "OPTIMISM_SEPOLIA");
    }

    #[test]
    fn chain_key_rejects_invalid_values() {
        assert!(ChainKey::from_str("").is_err());
        assert!(ChainKey::from_str("base mainnet").is_err());
    }
}
