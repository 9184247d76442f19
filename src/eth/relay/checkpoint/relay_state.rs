use std::collections::BTreeMap;

use crate::alias::JsonValue;
use crate::eth::primitives::AssetClass;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::TransferId;

/// Document persisted in the checkpoint file.
///
/// `sepoliaBlock` and `sepoliaNftBlock` are the single-cursor fields of the previous relayer.
/// They are read when the maps lack the source chain entries and are still written.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RelayState {
    pub blocks: BTreeMap<ChainKey, u64>,

    pub blocks_nft: BTreeMap<ChainKey, u64>,

    #[serde(rename = "processedIds")]
    pub processed_ids: Vec<TransferId>,

    #[serde(rename = "sepoliaBlock", skip_serializing_if = "Option::is_none")]
    pub legacy_source_block: Option<u64>,

    #[serde(rename = "sepoliaNftBlock", skip_serializing_if = "Option::is_none")]
    pub legacy_source_nft_block: Option<u64>,
}

impl RelayState {
    /// Parses a document field by field. Invalid fields are logged and ignored so a single bad value
    /// does not discard the rest of the checkpoint.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let object = value.as_object()?;

        let mut state = Self {
            blocks: parse_cursor_map(object.get("blocks"), "blocks"),
            blocks_nft: parse_cursor_map(object.get("blocks_nft"), "blocks_nft"),
            processed_ids: Vec::new(),
            legacy_source_block: object.get("sepoliaBlock").and_then(parse_block),
            legacy_source_nft_block: object.get("sepoliaNftBlock").and_then(parse_block),
        };

        if let Some(ids) = object.get("processedIds").and_then(JsonValue::as_array) {
            for id in ids {
                match id.as_str() {
                    Some(id) => state.processed_ids.push(TransferId::from(id)),
                    None => tracing::warn!(%id, "ignoring invalid processed transfer id in checkpoint"),
                }
            }
        }

        Some(state)
    }

    pub fn cursors(&self, asset: AssetClass) -> &BTreeMap<ChainKey, u64> {
        match asset {
            AssetClass::Fungible => &self.blocks,
            AssetClass::NonFungible => &self.blocks_nft,
        }
    }

    pub fn cursors_mut(&mut self, asset: AssetClass) -> &mut BTreeMap<ChainKey, u64> {
        match asset {
            AssetClass::Fungible => &mut self.blocks,
            AssetClass::NonFungible => &mut self.blocks_nft,
        }
    }

    pub fn legacy_source_cursor(&self, asset: AssetClass) -> Option<u64> {
        match asset {
            AssetClass::Fungible => self.legacy_source_block,
            AssetClass::NonFungible => self.legacy_source_nft_block,
        }
    }
}

fn parse_cursor_map(value: Option<&JsonValue>, field: &str) -> BTreeMap<ChainKey, u64> {
    let Some(value) = value else { return BTreeMap::new() };
    let Some(object) = value.as_object() else {
        tracing::warn!(%field, %value, "ignoring checkpoint field because it is not an object");
        return BTreeMap::new();
    };

    let mut cursors = BTreeMap::new();
    for (chain, block) in object {
        match parse_block(block) {
            Some(block) => {
                cursors.insert(ChainKey::new(chain), block);
            }
            None => tracing::warn!(%field, %chain, %block, "ignoring invalid checkpoint cursor"),
        }
    }
    cursors
}

/// Accepts numbers and numeric strings (decimal or hex).
fn parse_block(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}
