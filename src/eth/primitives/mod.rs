//! Ethereum and relay primitives.

mod asset_class;
mod block_number;
mod chain_id;
mod chain_key;
mod external_receipt;
mod log_filter;
mod transfer_id;

pub use asset_class::AssetClass;
pub use block_number::BlockNumber;
pub use chain_id::ChainId;
pub use chain_key::ChainKey;
pub use external_receipt::ExternalReceipt;
pub use log_filter::LogFilter;
pub use transfer_id::TransferId;
