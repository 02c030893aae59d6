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

//! The relayer service object the host application holds.
//!
//! Constructed once at process start and passed by reference. Every
//! call here runs under the relayer's own key; none requires end-user
//! wallet interaction.

use std::sync::Arc;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::Signer;
use ethers::types::{Address, H256, U256};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use tally_contracts::acl::{AclChecker, AclContract};
use tally_contracts::reader::TargetStateReader;
use tally_contracts::submitter::TxSubmitter;
use tally_contracts::target_id_from_uuid;
use tally_gateway_client::GatewayClient;
use tally_relayer_context::RelayerContext;
use tally_relayer_monitor::{LogEntry, RelayerState};
use tally_relayer_utils::{probe, Result};

use crate::coordinator::{
    DecryptionCoordinator, Outcome, RetrySchedule, TargetStatus,
};
use crate::poller::{watch_vote_events, VotePoller};

/// The coordinator wired to the real chain and gateway.
pub type ChainCoordinator = DecryptionCoordinator<
    TargetStateReader<Provider<Http>>,
    AclChecker<AclContract<Provider<Http>>>,
    GatewayClient,
    TxSubmitter,
>;

/// The confidential-vote decryption relayer.
pub struct TallyRelayer {
    ctx: RelayerContext,
    coordinator: Arc<ChainCoordinator>,
    provider: Arc<Provider<Http>>,
    address: Address,
    watch_list: Arc<RwLock<Vec<H256>>>,
    stop_watching: broadcast::Sender<()>,
}

impl TallyRelayer {
    /// Builds the relayer from its context: providers, wallet, contract
    /// wrappers, gateway client and coordinator.
    pub fn new(ctx: RelayerContext) -> Result<Self> {
        let config = &ctx.config;
        let provider = Arc::new(ctx.evm_provider()?);
        let wallet = ctx.evm_wallet()?;
        let address = wallet.address();
        let signer =
            Arc::new(SignerMiddleware::new((*provider).clone(), wallet));

        let reader = TargetStateReader::new(
            config.evm.vault.address,
            provider.clone(),
        );
        let permissions = AclChecker::new(AclContract::new(
            config.evm.acl.address,
            provider.clone(),
        ));
        let gateway = GatewayClient::new(
            config.gateway.url.as_url().clone(),
            config.gateway.request_timeout(),
            config.gateway.rate_limit_cooldown_secs,
        )?;
        let submitter = TxSubmitter::new(
            config.evm.vault.address,
            signer,
            config.evm.tx,
            config.evm.explorer.clone(),
        );
        let coordinator = Arc::new(DecryptionCoordinator::new(
            reader,
            permissions,
            gateway,
            submitter,
            ctx.monitor.clone(),
            ctx.metrics.clone(),
            RetrySchedule::from(&config.poller),
        ));
        let watch_list = Arc::new(RwLock::new(
            config
                .poller
                .targets
                .iter()
                .map(|uuid| target_id_from_uuid(uuid))
                .collect::<Vec<_>>(),
        ));
        let (stop_watching, _) = broadcast::channel(2);
        Ok(Self {
            ctx,
            coordinator,
            provider,
            address,
            watch_list,
            stop_watching,
        })
    }

    /// A defensive snapshot of the operational state.
    pub fn state(&self) -> RelayerState {
        self.ctx.monitor.state()
    }

    /// Subscribes to the live operational log. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.ctx.monitor.subscribe()
    }

    /// The relayer's own account address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The relayer account balance, in wei. Also refreshes the balance
    /// gauge for the metrics scrape.
    pub async fn balance(&self) -> Result<U256> {
        let balance =
            self.provider.get_balance(self.address, None).await?;
        let gwei = ethers::utils::format_units(balance, "gwei")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or_default();
        self.ctx.metrics.account_balance_gwei.set(gwei);
        Ok(balance)
    }

    /// Reads a target's status without triggering any work.
    pub async fn check_target(&self, uuid: &str) -> Result<TargetStatus> {
        self.coordinator
            .check_target(target_id_from_uuid(uuid))
            .await
    }

    /// Runs the full decryption flow for one target.
    pub async fn request_decryption(&self, uuid: &str) -> Result<Outcome> {
        self.coordinator
            .request_decryption(target_id_from_uuid(uuid))
            .await
    }

    /// Reads the status and decrypts only if votes are pending.
    pub async fn check_and_decrypt(
        &self,
        uuid: &str,
    ) -> Result<(TargetStatus, Outcome)> {
        self.coordinator
            .check_and_decrypt(target_id_from_uuid(uuid))
            .await
    }

    /// Fast-only decryption; fails rather than paying for the on-chain
    /// permission request.
    pub async fn decrypt_fast(&self, uuid: &str) -> Result<Outcome> {
        self.coordinator
            .decrypt_fast(target_id_from_uuid(uuid))
            .await
    }

    /// Starts the poll scheduler (and, if configured, the vote-event
    /// stream) over `ids`, or over the configured watch-list when `ids`
    /// is `None`. Starting while already running is a warning no-op.
    pub fn start_watching(&self, ids: Option<&[String]>) {
        if self.ctx.monitor.is_running() {
            self.ctx.monitor.warn("already watching, start ignored");
            tracing::warn!("start_watching called while already running");
            return;
        }
        if let Some(ids) = ids {
            *self.watch_list.write() = ids
                .iter()
                .map(|uuid| target_id_from_uuid(uuid))
                .collect();
        }
        let watched = self.watch_list.read().len();
        self.ctx.monitor.set_running(true);
        self.ctx
            .monitor
            .info(format!("watching {watched} targets for pending votes"));
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            watching = true,
            targets = watched,
        );
        let poller = VotePoller::new(
            self.coordinator.clone(),
            self.watch_list.clone(),
            self.ctx.monitor.clone(),
            self.ctx.config.poller.interval(),
        );
        let monitor = self.ctx.monitor.clone();
        let stop = self.stop_watching.subscribe();
        tokio::spawn(async move {
            poller.run(stop).await;
            monitor.set_running(false);
        });
        if self.ctx.config.poller.vote_events {
            tokio::spawn(watch_vote_events(
                self.provider.clone(),
                self.ctx.config.evm.vault.address,
                self.ctx.config.evm.vault.deployed_at,
                self.ctx.monitor.clone(),
                self.stop_watching.subscribe(),
            ));
        }
    }

    /// Stops the scheduler and detaches the event stream. Safe to call
    /// repeatedly; an in-flight coordinator call is allowed to finish
    /// and its result discarded.
    pub fn stop_watching(&self) {
        let _ = self.stop_watching.send(());
        if self.ctx.monitor.is_running() {
            self.ctx.monitor.info("stopped watching");
        }
        self.ctx.monitor.set_running(false);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            watching = false,
        );
    }

    /// The context this relayer was built from.
    pub fn context(&self) -> &RelayerContext {
        &self.ctx
    }
}
