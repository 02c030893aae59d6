// Copyright 2024 Tally Labs Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Tally Contracts
//!
//! Bindings and typed wrappers for the two contracts the relayer talks
//! to: the vote vault (per-target encrypted aggregates and the
//! decryption entry points) and the decryption ACL.

use ethers::contract::abigen;
use ethers::types::{H256, U256};
use ethers::utils::keccak256;
use serde::Serialize;

/// ACL permission checks for ciphertext handles.
pub mod acl;
/// Read side of the vote vault.
pub mod reader;
/// Write side of the vote vault.
pub mod submitter;

abigen!(
    VoteVault,
    r#"[
        function targets(bytes32 targetId) external view returns (uint8 targetType, bytes32 encSum, bytes32 encCount, uint256 decSum, uint256 decCount, uint256 lastDecryptTime, bool exists, uint256 totalVotes)
        function requestDecryptionData(bytes32 targetId) external
        function verifyAndStoreDecryption(bytes32 targetId, bytes clearValues, bytes proof) external
        event VoteCast(bytes32 indexed targetId, address indexed voter, uint256 totalVotes)
    ]"#
);

abigen!(
    DecryptionAcl,
    r#"[
        function isAllowedForDecryption(bytes32 handle) external view returns (bool)
    ]"#
);

/// The distinguished "no ciphertext yet" handle value.
pub const ZERO_HANDLE: H256 = H256([0u8; 32]);

/// Derives the fixed-width on-chain target id from a storefront dApp
/// UUID. One-way, deterministic and case-insensitive: the same UUID
/// always maps to the same id.
pub fn target_id_from_uuid(uuid: &str) -> H256 {
    H256(keccak256(uuid.trim().to_lowercase().as_bytes()))
}

/// A vote vault target record, decoded into a typed struct at the read
/// boundary so nothing downstream inspects raw tuples.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    /// The derived target id this record belongs to.
    pub target_id: H256,
    /// Discriminator recorded by the vault (dApp, poll, ...).
    pub target_type: u8,
    /// Set once the vault has recorded at least one vote for this id.
    pub exists: bool,
    /// Votes cast, monotonically non-decreasing.
    pub total_votes: U256,
    /// Last committed plaintext sum.
    pub decrypted_sum: U256,
    /// Votes covered by the last committed plaintext, never above
    /// `total_votes`.
    pub decrypted_count: U256,
    /// Ciphertext handle of the running sum.
    pub enc_sum_handle: H256,
    /// Ciphertext handle of the running count.
    pub enc_count_handle: H256,
    /// Unix time of the last successful on-chain decryption write.
    pub last_decrypt_time: U256,
}

impl TargetRecord {
    /// Votes cast but not yet covered by a committed plaintext.
    pub fn pending_count(&self) -> U256 {
        self.total_votes.saturating_sub(self.decrypted_count)
    }

    /// Whether the vault holds any ciphertext for this target. Both
    /// handles are written together, so one zero handle means none.
    pub fn has_ciphertext(&self) -> bool {
        self.enc_sum_handle != ZERO_HANDLE
            && self.enc_count_handle != ZERO_HANDLE
    }

    /// The two ciphertext handles, sum first.
    pub fn handles(&self) -> [H256; 2] {
        [self.enc_sum_handle, self.enc_count_handle]
    }
}
