use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use display_json::DebugAsJson;
use parking_lot::Mutex;
use tracing::Span;

use crate::alias::JsonValue;
use crate::eth::primitives::AssetClass;
use crate::eth::primitives::BlockNumber;
use crate::eth::primitives::ChainKey;
use crate::eth::primitives::TransferId;
use crate::eth::relay::checkpoint::ProcessedLedger;
use crate::eth::relay::checkpoint::RelayState;
use crate::ext::to_json_string;
#[cfg(feature = "metrics")]
use crate::infra::metrics;
use crate::infra::tracing::SpanExt;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Identifies one block cursor.
#[derive(DebugAsJson, derive_more::Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[display(fmt = "{}/{}", chain, asset)]
pub struct CursorKey {
    pub chain: ChainKey,
    pub asset: AssetClass,
}

impl CursorKey {
    pub fn new(chain: ChainKey, asset: AssetClass) -> Self {
        Self { chain, asset }
    }
}

/// Cursor values used when the checkpoint file does not have them.
pub type CursorDefaults = BTreeMap<CursorKey, BlockNumber>;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("cursor {0} is not tracked")]
    UnknownCursor(CursorKey),

    #[error("cursor {cursor} cannot advance from {current} to {requested}")]
    NonContiguous {
        cursor: CursorKey,
        current: BlockNumber,
        requested: BlockNumber,
    },

    #[error("failed to serialize checkpoint")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write checkpoint file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// -----------------------------------------------------------------------------
// Store
// -----------------------------------------------------------------------------

/// Owner of the block cursors and of the processed transfer ledger.
///
/// Every mutation marks the store as dirty. Flushes write the whole document to a temporary file
/// and rename it over the checkpoint file.
pub struct CheckpointStore {
    path: PathBuf,
    source_key: ChainKey,
    inner: Mutex<StoreInner>,

    /// Serializes concurrent flushes so an older snapshot never overwrites a newer one.
    flush_lock: tokio::sync::Mutex<()>,
}

struct StoreInner {
    cursors: BTreeMap<CursorKey, BlockNumber>,
    ledger: ProcessedLedger,
    dirty: bool,

    /// Incremented on every mutation.
    revision: u64,
}

impl StoreInner {
    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

impl CheckpointStore {
    /// Loads the checkpoint file. Never fails: a missing or corrupt file falls back to `defaults`.
    pub async fn load(path: impl AsRef<Path>, capacity: usize, source_key: ChainKey, defaults: CursorDefaults) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), %capacity, "loading checkpoint");

        let persisted = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<JsonValue>(&content) {
                Ok(json) => {
                    let state = RelayState::from_json(&json);
                    if state.is_none() {
                        tracing::warn!(path = %path.display(), "checkpoint file is not a json object, using defaults");
                    }
                    state
                }
                Err(e) => {
                    tracing::warn!(reason = ?e, path = %path.display(), "checkpoint file is corrupt, using defaults");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "checkpoint file not found, using defaults");
                None
            }
            Err(e) => {
                tracing::warn!(reason = ?e, path = %path.display(), "failed to read checkpoint file, using defaults");
                None
            }
        };

        Self::from_state(path, capacity, source_key, defaults, persisted)
    }

    /// Builds a store merging a persisted document over the defaults.
    pub fn from_state(path: PathBuf, capacity: usize, source_key: ChainKey, defaults: CursorDefaults, persisted: Option<RelayState>) -> Self {
        let mut dirty = persisted.is_none();
        let persisted = persisted.unwrap_or_default();

        // cursors of chains no longer configured are kept so they are not lost on the next flush
        let mut cursors = BTreeMap::new();
        for asset in [AssetClass::Fungible, AssetClass::NonFungible] {
            for (chain, block) in persisted.cursors(asset) {
                cursors.insert(CursorKey::new(chain.clone(), asset), BlockNumber::from(*block));
            }
        }

        for (key, default) in defaults {
            if cursors.contains_key(&key) {
                continue;
            }
            let legacy = if key.chain == source_key { persisted.legacy_source_cursor(key.asset) } else { None };
            match legacy {
                Some(block) => {
                    tracing::info!(cursor = %key, %block, "migrating legacy source cursor");
                    cursors.insert(key, BlockNumber::from(block));
                }
                None => {
                    tracing::info!(cursor = %key, block = %default, "cursor not found in checkpoint, using default");
                    cursors.insert(key, default);
                }
            }
            dirty = true;
        }

        let ledger = ProcessedLedger::from_ids(capacity, persisted.processed_ids);

        Self {
            path,
            source_key,
            inner: Mutex::new(StoreInner {
                cursors,
                ledger,
                dirty,
                revision: 0,
            }),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    // -------------------------------------------------------------------------
    // Cursors
    // -------------------------------------------------------------------------

    /// Last fully processed block of a cursor.
    pub fn get(&self, chain: &ChainKey, asset: AssetClass) -> Option<BlockNumber> {
        let key = CursorKey::new(chain.clone(), asset);
        self.inner.lock().cursors.get(&key).copied()
    }

    /// Advances a cursor by exactly one block.
    pub fn advance(&self, chain: &ChainKey, asset: AssetClass, block: BlockNumber) -> Result<(), CheckpointError> {
        let key = CursorKey::new(chain.clone(), asset);
        let mut inner = self.inner.lock();

        let Some(current) = inner.cursors.get(&key).copied() else {
            tracing::error!(cursor = %key, %block, "refusing to advance unknown cursor");
            return Err(CheckpointError::UnknownCursor(key));
        };
        if block != current.next_block_number() {
            tracing::error!(cursor = %key, %current, requested = %block, "refusing to advance cursor to a non-contiguous block");
            return Err(CheckpointError::NonContiguous {
                cursor: key,
                current,
                requested: block,
            });
        }

        #[cfg(feature = "metrics")]
        metrics::set_relay_cursor_block(block.as_u64(), key.chain.as_str(), key.asset.to_string());

        inner.cursors.insert(key, block);
        inner.touch();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Processed ledger
    // -------------------------------------------------------------------------

    pub fn is_processed(&self, id: &TransferId) -> bool {
        self.inner.lock().ledger.contains(id)
    }

    /// Records a transfer id as processed. Re-marking an id is a no-op.
    pub fn mark_processed(&self, id: TransferId) {
        let mut inner = self.inner.lock();
        if inner.ledger.insert(id) {
            inner.touch();

            #[cfg(feature = "metrics")]
            metrics::set_relay_processed_ids(inner.ledger.len() as u64);
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state as it would be persisted.
    pub fn snapshot(&self) -> RelayState {
        let inner = self.inner.lock();
        self.snapshot_of(&inner)
    }

    fn snapshot_of(&self, inner: &StoreInner) -> RelayState {
        let mut state = RelayState {
            processed_ids: inner.ledger.iter().cloned().collect(),
            ..RelayState::default()
        };
        for (key, block) in &inner.cursors {
            state.cursors_mut(key.asset).insert(key.chain.clone(), block.as_u64());
        }
        state.legacy_source_block = state.blocks.get(&self.source_key).copied();
        state.legacy_source_nft_block = state.blocks_nft.get(&self.source_key).copied();
        state
    }

    /// Writes the checkpoint file if the store is dirty.
    ///
    /// Returns `false` if there was nothing to write. On failure the store stays dirty.
    #[tracing::instrument(name = "checkpoint::flush", skip_all, fields(path, revision))]
    pub async fn flush(&self) -> Result<bool, CheckpointError> {
        let _flush_guard = self.flush_lock.lock().await;

        let (state, revision) = {
            let inner = self.inner.lock();
            if !inner.dirty {
                return Ok(false);
            }
            (self.snapshot_of(&inner), inner.revision)
        };
        Span::with(|s| {
            s.rec_str("path", &self.path.display());
            s.rec_str("revision", &revision);
        });

        #[cfg(feature = "metrics")]
        let start = metrics::now();

        let result = self.write_atomically(&state).await;

        #[cfg(feature = "metrics")]
        metrics::inc_relay_checkpoint_flush(start.elapsed(), result.is_ok());

        if let Err(e) = result {
            tracing::error!(reason = ?e, path = %self.path.display(), "failed to flush checkpoint, keeping changes pending");
            return Err(e);
        }

        // mutations that happened while writing keep the store dirty
        let mut inner = self.inner.lock();
        if inner.revision == revision {
            inner.dirty = false;
        }
        tracing::info!(
            path = %self.path.display(),
            processed_ids = state.processed_ids.len(),
            still_dirty = inner.dirty,
            "checkpoint flushed"
        );
        Ok(true)
    }

    async fn write_atomically(&self, state: &RelayState) -> Result<(), CheckpointError> {
        let content = serde_json::to_string_pretty(state)?;
        let tmp_path = temporary_path(&self.path);

        let io_err = |source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp_path, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), state = %to_json_string(state), "checkpoint written");
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn sepolia() -> ChainKey {
        ChainKey::from("sepolia")
    }

    fn hoodi() -> ChainKey {
        ChainKey::from("hoodi")
    }

    fn defaults() -> CursorDefaults {
        let mut defaults = CursorDefaults::new();
        defaults.insert(CursorKey::new(sepolia(), AssetClass::Fungible), BlockNumber::from(500u64));
        defaults.insert(CursorKey::new(sepolia(), AssetClass::NonFungible), BlockNumber::from(500u64));
        defaults.insert(CursorKey::new(hoodi(), AssetClass::Fungible), BlockNumber::from(100u64));
        defaults
    }

    async fn load(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::load(dir.path().join("state.json"), 1000, sepolia(), defaults()).await
    }

    #[tokio::test]
    async fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = load(&dir).await;

        assert_eq!(store.get(&hoodi(), AssetClass::Fungible), Some(BlockNumber::from(100u64)));
        assert_eq!(store.get(&hoodi(), AssetClass::NonFungible), None);
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn corrupt_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state.json"), "{ not json").unwrap();
        let store = load(&dir).await;

        assert_eq!(store.get(&sepolia(), AssetClass::Fungible), Some(BlockNumber::from(500u64)));
        assert!(!store.is_processed(&TransferId::from("0xabc")));
    }

    #[tokio::test]
    async fn persisted_cursors_win_over_defaults_and_legacy_fields_migrate() {
        let dir = TempDir::new().unwrap();
        let content = json!({
            "blocks": { "hoodi": 120 },
            "processedIds": ["0xabc"],
            "sepoliaBlock": 450,
            "sepoliaNftBlock": 440
        });
        std::fs::write(dir.path().join("state.json"), content.to_string()).unwrap();
        let store = load(&dir).await;

        assert_eq!(store.get(&hoodi(), AssetClass::Fungible), Some(BlockNumber::from(120u64)));
        assert_eq!(store.get(&sepolia(), AssetClass::Fungible), Some(BlockNumber::from(450u64)));
        assert_eq!(store.get(&sepolia(), AssetClass::NonFungible), Some(BlockNumber::from(440u64)));
        assert!(store.is_processed(&TransferId::from("0xABC")));
    }

    #[tokio::test]
    async fn advance_only_accepts_the_next_block() {
        let dir = TempDir::new().unwrap();
        let store = load(&dir).await;

        assert!(store.advance(&hoodi(), AssetClass::Fungible, BlockNumber::from(101u64)).is_ok());
        assert!(matches!(
            store.advance(&hoodi(), AssetClass::Fungible, BlockNumber::from(103u64)),
            Err(CheckpointError::NonContiguous { .. })
        ));
        assert!(matches!(
            store.advance(&hoodi(), AssetClass::Fungible, BlockNumber::from(101u64)),
            Err(CheckpointError::NonContiguous { .. })
        ));
        assert!(matches!(
            store.advance(&hoodi(), AssetClass::NonFungible, BlockNumber::from(1u64)),
            Err(CheckpointError::UnknownCursor(_))
        ));
        assert_eq!(store.get(&hoodi(), AssetClass::Fungible), Some(BlockNumber::from(101u64)));
    }

    #[tokio::test]
    async fn mark_processed_then_is_processed() {
        let dir = TempDir::new().unwrap();
        let store = load(&dir).await;

        store.mark_processed(TransferId::from("0xabc"));
        assert!(store.is_processed(&TransferId::from("0xabc")));
    }

    #[tokio::test]
    async fn flush_writes_document_and_clears_dirty_flag() {
        let dir = TempDir::new().unwrap();
        let store = load(&dir).await;
        store.mark_processed(TransferId::from("0xabc"));
        store.advance(&sepolia(), AssetClass::Fungible, BlockNumber::from(501u64)).unwrap();

        assert!(store.flush().await.unwrap());
        assert!(!store.is_dirty());
        assert!(!store.flush().await.unwrap());

        let written: JsonValue = serde_json::from_str(&std::fs::read_to_string(dir.path().join("state.json")).unwrap()).unwrap();
        assert_eq!(written["blocks"]["sepolia"], 501);
        assert_eq!(written["blocks"]["hoodi"], 100);
        assert_eq!(written["sepoliaBlock"], 501);
        assert_eq!(written["processedIds"], json!([format!("0x{:0>64}", "abc")]));
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_flush_keeps_dirty_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("state.json");
        let store = CheckpointStore::load(&path, 10, sepolia(), defaults()).await;
        store.mark_processed(TransferId::from("0x01"));

        assert!(matches!(store.flush().await, Err(CheckpointError::Io { .. })));
        assert!(store.is_dirty());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        assert!(store.flush().await.unwrap());
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn reload_after_flush_restores_state() {
        let dir = TempDir::new().unwrap();
        let store = load(&dir).await;
        store.advance(&hoodi(), AssetClass::Fungible, BlockNumber::from(101u64)).unwrap();
        store.mark_processed(TransferId::from("0x02"));
        store.flush().await.unwrap();

        let reloaded = load(&dir).await;
        assert_eq!(reloaded.get(&hoodi(), AssetClass::Fungible), Some(BlockNumber::from(101u64)));
        assert!(reloaded.is_processed(&TransferId::from("0x02")));
        assert!(!reloaded.is_dirty());
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }
}
