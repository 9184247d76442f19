use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use alloy_consensus::SignableTransaction;
use alloy_consensus::TxEnvelope;
use alloy_consensus::TxLegacy;
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::TxKind;
use alloy_primitives::U256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::eth::primitives::ChainId;
use crate::eth::primitives::ChainKey;
use crate::eth::relay::OutboundTx;
use crate::eth::relay::SubmissionReceipt;
use crate::eth::relay::SubmitError;
use crate::eth::relay::TransferSubmitter;
use crate::ext::DisplayExt;
use crate::infra::BlockchainClient;
use crate::infra::blockchain_client::PendingTransaction;
use crate::log_and_err;

/// Interval between receipt queries while waiting for a sent transaction.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Decrypts the relayer wallet from a JSON keystore.
pub fn load_wallet(path: impl AsRef<Path>, password: &str) -> anyhow::Result<PrivateKeySigner> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "decrypting relayer keystore");

    match PrivateKeySigner::decrypt_keystore(path, password) {
        Ok(wallet) => Ok(wallet),
        Err(e) => log_and_err!(reason = e, "failed to decrypt relayer keystore"),
    }
}

/// Gas limit sent with a transaction: the estimate plus 20%.
pub fn gas_limit_with_margin(estimate: u64) -> u64 {
    estimate.saturating_add(estimate / 5)
}

/// Signs relay transactions for one chain and waits for their receipts.
///
/// The nonce is cached between submissions and fetched again after any failed send.
pub struct ChainSigner {
    chain_key: ChainKey,
    chain_id: ChainId,
    client: Arc<BlockchainClient>,
    wallet: PrivateKeySigner,
    nonce: Mutex<Option<u64>>,
    receipt_timeout: Duration,
}

impl ChainSigner {
    pub fn new(chain_key: ChainKey, chain_id: ChainId, client: Arc<BlockchainClient>, wallet: PrivateKeySigner, receipt_timeout: Duration) -> Self {
        Self {
            chain_key,
            chain_id,
            client,
            wallet,
            nonce: Mutex::new(None),
            receipt_timeout,
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs a legacy (EIP-155) transaction and returns its 2718 encoding.
    pub fn sign_legacy(&self, nonce: u64, gas_price: u128, gas_limit: u64, to: Address, input: Bytes) -> Result<(TxEnvelope, Bytes), SubmitError> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id.as_u64()),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: U256::ZERO,
            input,
        };

        let signature = match self.wallet.sign_hash_sync(&tx.signature_hash()) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::error!(reason = ?e, chain = %self.chain_key, "failed to sign transaction");
                return Err(SubmitError::Unknown(format!("signing failed: {e}")));
            }
        };

        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let raw = Bytes::from(envelope.encoded_2718());
        Ok((envelope, raw))
    }

    async fn submit_once(&self, tx: &OutboundTx) -> Result<SubmissionReceipt, SubmitError> {
        let from = self.address();
        let input = tx.call.abi_encode();

        // reverts (including already applied transfers) surface here
        let estimate = self.client.estimate_gas(from, tx.to, &input).await?;
        let gas_limit = gas_limit_with_margin(estimate);
        let gas_price = self.client.fetch_gas_price().await?;

        // the nonce lock is held until the transaction is accepted by the node
        let tx_hash = {
            let mut cached_nonce = self.nonce.lock().await;
            let nonce = match *cached_nonce {
                Some(nonce) => nonce,
                None => self.client.fetch_transaction_count(from).await?,
            };

            let (envelope, raw) = self.sign_legacy(nonce, gas_price, gas_limit, tx.to, input)?;
            tracing::info!(chain = %self.chain_key, call = %tx.call.name(), %nonce, %gas_limit, %gas_price, tx_hash = %envelope.tx_hash(), "sending transaction");

            match self.client.send_raw_transaction(raw).await {
                Ok(hash) => {
                    *cached_nonce = Some(nonce + 1);
                    hash
                }
                Err(e) => {
                    *cached_nonce = None;
                    return Err(e);
                }
            }
        };

        // wait for the receipt
        let pending = PendingTransaction::new(tx_hash, &self.client, RECEIPT_POLL_INTERVAL);
        let receipt = match timeout(self.receipt_timeout, pending).await {
            Ok(Ok(Some(receipt))) => receipt,
            Ok(Ok(None)) => return Err(SubmitError::Transient(format!("transaction {tx_hash} dropped by the node"))),
            Ok(Err(e)) => return Err(SubmitError::Transient(format!("failed waiting receipt of {tx_hash}: {e}"))),
            Err(_) => {
                return Err(SubmitError::Transient(format!(
                    "no receipt for {tx_hash} after {}",
                    self.receipt_timeout.to_string_ext()
                )));
            }
        };

        if !receipt.is_success() {
            return Err(SubmitError::Rejected(format!("transaction {tx_hash} failed with status 0")));
        }

        Ok(SubmissionReceipt {
            chain_key: self.chain_key.clone(),
            tx_hash,
            block_number: receipt.block_number(),
        })
    }
}

impl TransferSubmitter for ChainSigner {
    async fn submit(&self, tx: &OutboundTx) -> Result<SubmissionReceipt, SubmitError> {
        self.submit_once(tx).await
    }
}

#[cfg(test)]
mod tests {
    use alloy_consensus::Transaction;
    use alloy_primitives::B256;

    use super::*;
    use crate::eth::relay::RelayCall;

    fn signer() -> ChainSigner {
        let client = BlockchainClient::new_http(ChainKey::from("hoodi"), "http://localhost:8545", Duration::from_secs(1)).unwrap();
        ChainSigner::new(
            ChainKey::from("hoodi"),
            ChainId::from(560048u64),
            Arc::new(client),
            PrivateKeySigner::random(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn gas_margin_is_twenty_percent() {
        assert_eq!(gas_limit_with_margin(100_000), 120_000);
        assert_eq!(gas_limit_with_margin(u64::MAX), u64::MAX);
    }

    #[test]
    fn signed_transaction_recovers_the_relayer_address() {
        let signer = signer();
        let call = RelayCall::MintWrapped {
            to: Address::repeat_byte(0x01),
            amount: U256::from(10u64),
            transfer_id: B256::repeat_byte(0xab),
        };

        let (envelope, raw) = signer.sign_legacy(7, 1_000_000_000, 120_000, Address::repeat_byte(0x02), call.abi_encode()).unwrap();

        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.chain_id(), Some(560048));
        let signed = envelope.as_legacy().unwrap();
        let recovered = signed.signature().recover_address_from_prehash(&signed.tx().signature_hash()).unwrap();
        assert_eq!(recovered, signer.address());
        assert!(!raw.is_empty());
    }
}
