mod blockchain_client;
mod pending_transaction;

pub use blockchain_client::BlockchainClient;
pub use pending_transaction::PendingTransaction;
