use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, H256};
use tally_relayer_utils::{Error, Result};

use crate::{TargetRecord, VoteVault};

/// Read-only access to vote vault target records.
#[derive(Debug, Clone)]
pub struct TargetStateReader<M> {
    vault: VoteVault<M>,
}

impl<M: Middleware + 'static> TargetStateReader<M> {
    /// Creates a reader for the vault at `address`.
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            vault: VoteVault::new(address, client),
        }
    }

    /// Reads one target record.
    ///
    /// Node and network problems surface as [`Error::ReadFailure`]; a
    /// target the vault has never seen comes back with
    /// `exists == false`, which is a normal answer, not an error.
    pub async fn read(&self, target_id: H256) -> Result<TargetRecord> {
        let (
            target_type,
            enc_sum,
            enc_count,
            dec_sum,
            dec_count,
            last_decrypt_time,
            exists,
            total_votes,
        ) = self
            .vault
            .targets(target_id.to_fixed_bytes())
            .call()
            .await
            .map_err(|e| Error::ReadFailure(e.to_string()))?;
        Ok(TargetRecord {
            target_id,
            target_type,
            exists,
            total_votes,
            decrypted_sum: dec_sum,
            decrypted_count: dec_count,
            enc_sum_handle: H256(enc_sum),
            enc_count_handle: H256(enc_count),
            last_decrypt_time,
        })
    }
}
