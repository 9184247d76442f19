//! Durable relay progress: block cursors and processed transfer ids.

mod checkpoint_store;
mod processed_ledger;
mod relay_state;

pub use checkpoint_store::CheckpointError;
pub use checkpoint_store::CheckpointStore;
pub use checkpoint_store::CursorDefaults;
pub use checkpoint_store::CursorKey;
pub use processed_ledger::ProcessedLedger;
pub use relay_state::RelayState;
