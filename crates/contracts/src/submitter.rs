use std::sync::Arc;
use std::time::Duration;

use ethers::abi::Detokenize;
use ethers::prelude::builders::ContractCall;
use ethers::types::{Address, Bytes, H256};
use tally_relayer_config::evm::TxConfig;
use tally_relayer_utils::explorer_link::ExplorerLink;
use tally_relayer_utils::{probe, Error, Result, SignerClient};

use crate::VoteVault;

/// Signs and submits the two state-changing vault calls with the
/// relayer-held key, and waits for their confirmation.
///
/// Sends are serialized behind a mutex so concurrent coordinator
/// invocations never race on nonce assignment. Retry policy lives with
/// the callers; a failed call surfaces as [`Error::TxFailed`] exactly
/// once.
#[derive(Debug)]
pub struct TxSubmitter {
    vault: VoteVault<SignerClient>,
    explorer: Option<url::Url>,
    gas_limit: u64,
    confirm_interval: Duration,
    confirm_retries: usize,
    send_lock: tokio::sync::Mutex<()>,
}

impl TxSubmitter {
    /// Creates a submitter for the vault at `address`.
    pub fn new(
        address: Address,
        client: Arc<SignerClient>,
        tx_config: TxConfig,
        explorer: Option<url::Url>,
    ) -> Self {
        Self {
            vault: VoteVault::new(address, client),
            explorer,
            gas_limit: tx_config.gas_limit,
            confirm_interval: Duration::from_millis(
                tx_config.confirmation_interval_ms,
            ),
            confirm_retries: tx_config.confirmation_retries,
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Marks the target's ciphertext handles as publicly decryptable
    /// on-chain. Returns the confirmed transaction hash.
    pub async fn request_decryption_data(
        &self,
        target_id: H256,
    ) -> Result<H256> {
        let call = self
            .vault
            .request_decryption_data(target_id.to_fixed_bytes());
        self.submit(call, "requestDecryptionData").await
    }

    /// Commits the decrypted values on-chain, checked by the vault
    /// against the attestation proof. Returns the confirmed
    /// transaction hash.
    pub async fn verify_and_store_decryption(
        &self,
        target_id: H256,
        clear_values: Bytes,
        proof: Bytes,
    ) -> Result<H256> {
        let call = self.vault.verify_and_store_decryption(
            target_id.to_fixed_bytes(),
            clear_values,
            proof,
        );
        self.submit(call, "verifyAndStoreDecryption").await
    }

    /// Dry-runs, sends and confirms one vault call.
    ///
    /// The dry run catches calls the contract would revert before any
    /// fee is spent; the explicit gas ceiling bounds the cost of the
    /// real submission.
    async fn submit<D: Detokenize>(
        &self,
        call: ContractCall<SignerClient, D>,
        label: &str,
    ) -> Result<H256> {
        let call = call.gas(self.gas_limit);
        let pending = {
            // nonce discipline: one build-and-send at a time.
            let _guard = self.send_lock.lock().await;
            call.call().await.map_err(|e| {
                Error::TxFailed(format!("{label} dry run: {e}"))
            })?;
            call.send().await.map_err(|e| {
                Error::TxFailed(format!("{label} submission: {e}"))
            })?
        };
        let tx_hash = *pending;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSubmit,
            call = label,
            pending = true,
            %tx_hash,
        );
        let receipt = pending
            .interval(self.confirm_interval)
            .retries(self.confirm_retries)
            .await
            .map_err(|e| {
                Error::TxFailed(format!("{label} confirmation: {e}"))
            })?
            .ok_or_else(|| {
                Error::TxFailed(format!(
                    "{label} tx 0x{tx_hash:x} dropped from mempool"
                ))
            })?;
        if matches!(receipt.status, Some(v) if v.is_zero()) {
            return Err(Error::TxFailed(format!(
                "{label} tx 0x{:x} reverted",
                receipt.transaction_hash
            )));
        }
        let tx_hash_string = format!("0x{:x}", receipt.transaction_hash);
        if let Some(mut url) = self.explorer.clone() {
            url.set_path(&format!("tx/{tx_hash_string}"));
            let link = ExplorerLink::new(&tx_hash_string, url.as_str());
            tracing::info!("{} finalized: {}", label, link);
        } else {
            tracing::info!("{} finalized: {}", label, tx_hash_string);
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSubmit,
            call = label,
            finalized = true,
            tx_hash = %receipt.transaction_hash,
        );
        Ok(receipt.transaction_hash)
    }
}
