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

//! The decryption coordinator: given a target id, decides between the
//! fast and the slow decryption path, drives the gateway and the
//! transaction submitter, and reports a typed outcome.
//!
//! Fast path: the ACL already flags both handles publicly decryptable,
//! so the on-chain `requestDecryptionData` transaction (and its gas)
//! is skipped entirely. Slow path: submit the request transaction,
//! wait a settling delay for the grant to propagate, then decrypt.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::{Bytes, H256, U256};
use serde::Serialize;

use tally_contracts::acl::{AclChecker, AclDecision, DecryptionPermissions};
use tally_contracts::reader::TargetStateReader;
use tally_contracts::submitter::TxSubmitter;
use tally_contracts::TargetRecord;
use tally_gateway_client::{Decryption, GatewayClient};
use tally_relayer_config::poller::PollerConfig;
use tally_relayer_monitor::{Metrics, Monitor};
use tally_relayer_utils::retry::FixedIntervalRetry;
use tally_relayer_utils::{probe, Error, Result};

/// Read side of the vote vault, as the coordinator sees it.
#[async_trait]
pub trait TargetReader: Send + Sync {
    /// Reads one target record.
    async fn read_target(&self, target_id: H256) -> Result<TargetRecord>;
}

/// ACL permission checks, as the coordinator sees them.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Queries the "publicly decryptable" flag for every handle.
    /// Infallible: lookup errors fail closed to `false`.
    async fn check_permissions(&self, handles: &[H256]) -> AclDecision;
}

/// The decryption gateway, as the coordinator sees it.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Submits handles for public decryption.
    async fn public_decrypt(&self, handles: &[H256]) -> Result<Decryption>;
}

/// Write side of the vote vault, as the coordinator sees it.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Flags the target's handles publicly decryptable on-chain.
    async fn request_decryption_data(&self, target_id: H256) -> Result<H256>;
    /// Commits decrypted values on-chain.
    async fn verify_and_store_decryption(
        &self,
        target_id: H256,
        clear_values: Bytes,
        proof: Bytes,
    ) -> Result<H256>;
}

/// Why an invocation ended without touching the gateway or the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The vault has never recorded a vote for this id.
    UnknownTarget,
    /// Every vote is already covered by a committed plaintext.
    NothingPending,
    /// Votes are pending but the vault holds no ciphertext. Indicates
    /// an upstream inconsistency; logged as a warning.
    MissingCiphertext,
    /// Another invocation for this target is still running.
    AlreadyInFlight,
    /// The fast-path gateway call failed; the next poll retries from
    /// scratch.
    GatewayFailed,
}

/// The result of one coordinator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// Nothing was (or could be) done.
    Skipped {
        /// Why the invocation was a no-op.
        reason: SkipReason,
    },
    /// Decrypted and committed on-chain.
    Stored {
        /// Hash of the confirmed `verifyAndStoreDecryption` transaction.
        tx_hash: H256,
    },
    /// The gateway decrypted, but the store transaction failed; the
    /// on-chain record lags until a later cycle.
    DecryptedNotStored {
        /// The request-path transaction, if the slow path ran.
        request_tx: Option<H256>,
    },
    /// Slow path made progress: the ACL request is on-chain, decryption
    /// itself did not complete this cycle.
    Requested {
        /// Hash of the confirmed `requestDecryptionData` transaction.
        request_tx: H256,
    },
}

impl Outcome {
    /// The transaction hash the caller should report, if any.
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            Outcome::Stored { tx_hash } => Some(*tx_hash),
            Outcome::Requested { request_tx } => Some(*request_tx),
            Outcome::DecryptedNotStored { request_tx } => *request_tx,
            Outcome::Skipped { .. } => None,
        }
    }

    /// Whether this invocation was a no-op.
    pub fn is_noop(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }
}

/// A target's current decryption status, derived from its vault record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    /// The derived on-chain id.
    pub target_id: H256,
    /// Whether the vault has recorded any vote for it.
    pub exists: bool,
    /// Votes cast.
    pub total_votes: U256,
    /// Last committed plaintext sum.
    pub decrypted_sum: U256,
    /// Votes covered by the last committed plaintext.
    pub decrypted_count: U256,
    /// Votes not yet covered; zero means nothing to do.
    pub pending_count: U256,
    /// Whether any ciphertext exists for this target.
    pub has_ciphertext: bool,
    /// Unix time of the last successful on-chain decryption write.
    pub last_decrypt_time: U256,
}

impl From<&TargetRecord> for TargetStatus {
    fn from(record: &TargetRecord) -> Self {
        Self {
            target_id: record.target_id,
            exists: record.exists,
            total_votes: record.total_votes,
            decrypted_sum: record.decrypted_sum,
            decrypted_count: record.decrypted_count,
            pending_count: record.pending_count(),
            has_ciphertext: record.has_ciphertext(),
            last_decrypt_time: record.last_decrypt_time,
        }
    }
}

/// Timing of the slow path: the ACL settling delay, then a bounded
/// constant-interval retry of the gateway call.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    /// Wait after the request transaction before the first gateway call.
    pub settle_delay: Duration,
    /// Gateway retries while the grant propagates.
    pub attempts: usize,
    /// Spacing between those retries.
    pub delay: Duration,
}

impl From<&PollerConfig> for RetrySchedule {
    fn from(config: &PollerConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            attempts: config.gateway_retries,
            delay: config.gateway_retry_delay(),
        }
    }
}

/// Drops its target id from the in-flight set when the invocation ends.
struct InFlightGuard {
    set: Arc<parking_lot::Mutex<HashSet<H256>>>,
    target_id: H256,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.target_id);
    }
}

/// The decryption coordinator.
///
/// At most one invocation is in flight per target id at a time; a
/// second caller gets [`SkipReason::AlreadyInFlight`] instead of a
/// duplicate gateway round trip or a double-submitted transaction.
pub struct DecryptionCoordinator<R, P, G, S> {
    reader: R,
    permissions: P,
    gateway: G,
    submitter: S,
    monitor: Monitor,
    metrics: Arc<Metrics>,
    schedule: RetrySchedule,
    in_flight: Arc<parking_lot::Mutex<HashSet<H256>>>,
}

impl<R, P, G, S> DecryptionCoordinator<R, P, G, S>
where
    R: TargetReader,
    P: PermissionChecker,
    G: Gateway,
    S: Submitter,
{
    /// Wires the coordinator to its four collaborators.
    pub fn new(
        reader: R,
        permissions: P,
        gateway: G,
        submitter: S,
        monitor: Monitor,
        metrics: Arc<Metrics>,
        schedule: RetrySchedule,
    ) -> Self {
        Self {
            reader,
            permissions,
            gateway,
            submitter,
            monitor,
            metrics,
            schedule,
            in_flight: Arc::new(parking_lot::Mutex::new(HashSet::new())),
        }
    }

    /// Reads a target's status without triggering any work.
    pub async fn check_target(&self, target_id: H256) -> Result<TargetStatus> {
        let record = self
            .reader
            .read_target(target_id)
            .await
            .map_err(|e| self.raise(target_id, e))?;
        Ok(TargetStatus::from(&record))
    }

    /// Reads the status and runs the full decryption flow only if
    /// anything is pending. The form the poll scheduler and manual
    /// "check now" actions use.
    pub async fn check_and_decrypt(
        &self,
        target_id: H256,
    ) -> Result<(TargetStatus, Outcome)> {
        let record = self
            .reader
            .read_target(target_id)
            .await
            .map_err(|e| self.raise(target_id, e))?;
        let status = TargetStatus::from(&record);
        if let Some(reason) = skip_before_work(&record) {
            return Ok((status, Outcome::Skipped { reason }));
        }
        let outcome = self.decrypt_record(record).await?;
        Ok((status, outcome))
    }

    /// Runs the full decryption flow for one target.
    pub async fn request_decryption(&self, target_id: H256) -> Result<Outcome> {
        let record = self
            .reader
            .read_target(target_id)
            .await
            .map_err(|e| self.raise(target_id, e))?;
        if let Some(reason) = skip_before_work(&record) {
            return Ok(Outcome::Skipped { reason });
        }
        self.decrypt_record(record).await
    }

    /// Fast-only entry point for flows that must never pay for the
    /// on-chain request transaction. Fails with [`Error::AclNotAllowed`]
    /// when the fast path is not available.
    pub async fn decrypt_fast(&self, target_id: H256) -> Result<Outcome> {
        let record = self
            .reader
            .read_target(target_id)
            .await
            .map_err(|e| self.raise(target_id, e))?;
        if !record.exists {
            return Ok(Outcome::Skipped {
                reason: SkipReason::UnknownTarget,
            });
        }
        if !record.has_ciphertext() {
            return Ok(Outcome::Skipped {
                reason: SkipReason::MissingCiphertext,
            });
        }
        let Some(_guard) = self.try_begin(record.target_id) else {
            return Ok(Outcome::Skipped {
                reason: SkipReason::AlreadyInFlight,
            });
        };
        let handles = record.handles();
        let decision = self.permissions.check_permissions(&handles).await;
        if !decision.all_allowed {
            return Err(self.raise(record.target_id, Error::AclNotAllowed));
        }
        match self.gateway.public_decrypt(&handles).await {
            Ok(decryption) => self.store(&record, decryption, None).await,
            Err(e) => {
                self.metrics.gateway_errors.inc();
                Err(self.raise(record.target_id, e))
            }
        }
    }

    /// Steps 3-6: ciphertext presence, ACL check, path split, gateway,
    /// store. The record already passed the existence and pending
    /// checks.
    async fn decrypt_record(&self, record: TargetRecord) -> Result<Outcome> {
        let target_id = record.target_id;
        let Some(_guard) = self.try_begin(target_id) else {
            self.monitor.warn(format!(
                "decryption for 0x{target_id:x} already in flight, skipping"
            ));
            return Ok(Outcome::Skipped {
                reason: SkipReason::AlreadyInFlight,
            });
        };
        if !record.has_ciphertext() {
            // pending votes without ciphertext: the vault recorded
            // votes the encryption layer never produced handles for.
            self.monitor.log(
                tally_relayer_monitor::LogLevel::Warn,
                format!(
                    "0x{target_id:x} has {} pending votes but no ciphertext",
                    record.pending_count()
                ),
                Some(serde_json::json!({
                    "targetId": format!("0x{target_id:x}"),
                    "pendingCount": record.pending_count().as_u64(),
                })),
            );
            tracing::warn!(
                %target_id,
                pending = %record.pending_count(),
                "pending votes but no encrypted data, upstream inconsistency?"
            );
            return Ok(Outcome::Skipped {
                reason: SkipReason::MissingCiphertext,
            });
        }
        let handles = record.handles();
        let decision = self.permissions.check_permissions(&handles).await;
        let outcome = if decision.all_allowed {
            self.fast_path(&record, &handles).await?
        } else {
            self.slow_path(&record, &handles).await?
        };
        if !outcome.is_noop() {
            self.monitor.note_processed();
            self.metrics.targets_processed.inc();
        }
        Ok(outcome)
    }

    /// Both handles are already decryptable: call the gateway directly
    /// and skip the request transaction and its gas entirely.
    async fn fast_path(
        &self,
        record: &TargetRecord,
        handles: &[H256; 2],
    ) -> Result<Outcome> {
        let target_id = record.target_id;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Gateway,
            %target_id,
            path = "fast",
        );
        self.monitor.info(format!(
            "0x{target_id:x}: handles already decryptable, taking the fast path"
        ));
        match self.gateway.public_decrypt(handles).await {
            Ok(decryption) => self.store(record, decryption, None).await,
            Err(e) => {
                // the next poll retries from scratch; no progress to report.
                self.monitor.error(format!(
                    "0x{target_id:x}: fast-path gateway call failed: {e}"
                ));
                self.monitor.note_error();
                self.metrics.gateway_errors.inc();
                tracing::error!(%target_id, error = %e, "fast path gateway call failed");
                Ok(Outcome::Skipped {
                    reason: SkipReason::GatewayFailed,
                })
            }
        }
    }

    /// Grant the permission on-chain first, give the grant a settling
    /// delay, then decrypt with a bounded retry while it propagates.
    async fn slow_path(
        &self,
        record: &TargetRecord,
        handles: &[H256; 2],
    ) -> Result<Outcome> {
        let target_id = record.target_id;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Gateway,
            %target_id,
            path = "slow",
        );
        self.monitor.info(format!(
            "0x{target_id:x}: requesting decryption data on-chain (slow path)"
        ));
        let request_tx = self
            .submitter
            .request_decryption_data(target_id)
            .await
            .map_err(|e| self.raise(target_id, e))?;
        self.metrics.transactions_submitted.inc();
        self.monitor.info(format!(
            "0x{target_id:x}: decryption data requested in tx 0x{request_tx:x}"
        ));
        // the grant is not instantly visible to the gateway.
        tokio::time::sleep(self.schedule.settle_delay).await;
        let backoff =
            FixedIntervalRetry::new(self.schedule.delay, self.schedule.attempts);
        let attempt = || async {
            self.gateway.public_decrypt(handles).await.map_err(|e| match e {
                Error::NotYetDecryptable => {
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Retry,
                        %target_id,
                        reason = "not yet decryptable",
                    );
                    backoff::Error::transient(e)
                }
                other => backoff::Error::permanent(other),
            })
        };
        match backoff::future::retry(backoff, attempt).await {
            Ok(decryption) => self.store(record, decryption, Some(request_tx)).await,
            Err(Error::NotYetDecryptable) => {
                // progress was made: the grant is on-chain and a future
                // poll will find the fast path open.
                self.monitor.warn(format!(
                    "0x{target_id:x}: gateway still reports not decryptable, \
                     will retry on a later poll"
                ));
                Ok(Outcome::Requested { request_tx })
            }
            Err(e) => {
                self.monitor.error(format!(
                    "0x{target_id:x}: slow-path gateway call failed: {e}"
                ));
                self.monitor.note_error();
                self.metrics.gateway_errors.inc();
                tracing::error!(%target_id, error = %e, "slow path gateway call failed");
                Ok(Outcome::Requested { request_tx })
            }
        }
    }

    /// Step 5: commit the gateway result on-chain.
    async fn store(
        &self,
        record: &TargetRecord,
        decryption: Decryption,
        request_tx: Option<H256>,
    ) -> Result<Outcome> {
        let target_id = record.target_id;
        let (sum, count) = match decryption.cleartexts.as_slice() {
            [sum, count] => (*sum, *count),
            other => {
                return Err(self.raise(
                    target_id,
                    Error::UnexpectedFormat(format!(
                        "expected 2 cleartexts, got {}",
                        other.len()
                    )),
                ))
            }
        };
        match self
            .submitter
            .verify_and_store_decryption(
                target_id,
                decryption.clear_values.clone(),
                decryption.proof.clone(),
            )
            .await
        {
            Ok(tx_hash) => {
                self.metrics.transactions_submitted.inc();
                self.metrics.decryptions_stored.inc();
                self.monitor.note_decryption();
                self.monitor.log(
                    tally_relayer_monitor::LogLevel::Success,
                    format!(
                        "0x{target_id:x}: decrypted sum={sum} count={count}, \
                         stored in tx 0x{tx_hash:x}"
                    ),
                    Some(serde_json::json!({
                        "targetId": format!("0x{target_id:x}"),
                        "sum": sum.to_string(),
                        "count": count.to_string(),
                        "txHash": format!("0x{tx_hash:x}"),
                        "signers": decryption.signer_count,
                    })),
                );
                Ok(Outcome::Stored { tx_hash })
            }
            Err(e) => {
                // decryption happened; only the on-chain record lags.
                self.monitor.warn(format!(
                    "0x{target_id:x}: decrypted sum={sum} count={count} but \
                     the store transaction failed: {e}"
                ));
                tracing::warn!(%target_id, error = %e, "decrypted but not stored");
                Ok(Outcome::DecryptedNotStored { request_tx })
            }
        }
    }

    /// Claims the per-target in-flight slot, or `None` when an
    /// invocation is already running for this target.
    fn try_begin(&self, target_id: H256) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock();
        if !set.insert(target_id) {
            return None;
        }
        Some(InFlightGuard {
            set: self.in_flight.clone(),
            target_id,
        })
    }

    /// Step 7: count, log and re-raise a failure the state machine does
    /// not recover from locally.
    fn raise(&self, target_id: H256, e: Error) -> Error {
        self.monitor
            .error(format!("0x{target_id:x}: decryption failed: {e}"));
        self.monitor.note_error();
        tracing::error!(%target_id, error = %e, "decryption attempt failed");
        e
    }
}

/// Steps 1-2 of the state machine: terminal no-ops that need no guard
/// and no network write.
fn skip_before_work(record: &TargetRecord) -> Option<SkipReason> {
    if !record.exists {
        return Some(SkipReason::UnknownTarget);
    }
    if record.pending_count().is_zero() {
        return Some(SkipReason::NothingPending);
    }
    None
}

// --- wiring the chain-backed collaborators into the seams ---

#[async_trait]
impl<M: Middleware + 'static> TargetReader for TargetStateReader<M> {
    async fn read_target(&self, target_id: H256) -> Result<TargetRecord> {
        self.read(target_id).await
    }
}

#[async_trait]
impl<P: DecryptionPermissions> PermissionChecker for AclChecker<P> {
    async fn check_permissions(&self, handles: &[H256]) -> AclDecision {
        self.check(handles).await
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn public_decrypt(&self, handles: &[H256]) -> Result<Decryption> {
        GatewayClient::public_decrypt(self, handles).await
    }
}

#[async_trait]
impl Submitter for TxSubmitter {
    async fn request_decryption_data(&self, target_id: H256) -> Result<H256> {
        TxSubmitter::request_decryption_data(self, target_id).await
    }

    async fn verify_and_store_decryption(
        &self,
        target_id: H256,
        clear_values: Bytes,
        proof: Bytes,
    ) -> Result<H256> {
        TxSubmitter::verify_and_store_decryption(
            self,
            target_id,
            clear_values,
            proof,
        )
        .await
    }
}
