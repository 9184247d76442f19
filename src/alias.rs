//! Type aliases for external crates types that conflict with our own types or are too verbose.

// -----------------------------------------------------------------------------
// Serde
// -----------------------------------------------------------------------------
pub type JsonValue = serde_json::Value;

// -----------------------------------------------------------------------------
// Alloy
// -----------------------------------------------------------------------------
pub type AlloyLog = alloy_rpc_types_eth::Log;
pub type AlloyLogData = alloy_primitives::LogData;
pub type AlloyTxEnvelope = alloy_consensus::TxEnvelope;
