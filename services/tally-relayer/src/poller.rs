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

//! The watch-list poll scheduler, plus the optional vote-cast event
//! stream that gives operators a hint when new votes arrive.

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, Middleware, Provider};
use futures::StreamExt;
use ethers::types::{Address, H256, U64};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use tally_contracts::{VoteCastFilter, VoteVault};
use tally_relayer_monitor::Monitor;
use tally_relayer_utils::probe;

use crate::coordinator::{
    DecryptionCoordinator, Gateway, PermissionChecker, Submitter,
    TargetReader,
};

/// The recurring scheduler that walks the watch-list and invokes the
/// coordinator wherever pending votes exist.
///
/// One target's failure never aborts the tick for the remaining
/// targets; each iteration is isolated and only logged.
pub struct VotePoller<R, P, G, S> {
    coordinator: Arc<DecryptionCoordinator<R, P, G, S>>,
    watch_list: Arc<RwLock<Vec<H256>>>,
    monitor: Monitor,
    interval: Duration,
}

impl<R, P, G, S> VotePoller<R, P, G, S>
where
    R: TargetReader,
    P: PermissionChecker,
    G: Gateway,
    S: Submitter,
{
    /// Creates a poller over a shared watch-list.
    pub fn new(
        coordinator: Arc<DecryptionCoordinator<R, P, G, S>>,
        watch_list: Arc<RwLock<Vec<H256>>>,
        monitor: Monitor,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            watch_list,
            monitor,
            interval,
        }
    }

    /// Runs the scheduler until `stop` fires. An in-progress tick is
    /// allowed to finish; its results are simply the last ones.
    pub async fn run(self, mut stop: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker
            .set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Poller,
            interval_ms = self.interval.as_millis() as u64,
            started = true,
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = stop.recv() => break,
            }
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Poller,
            stopped = true,
        );
    }

    /// One pass over the watch-list.
    pub async fn tick(&self) {
        let targets = self.watch_list.read().clone();
        tracing::trace!(targets = targets.len(), "poller tick");
        for target_id in targets {
            match self.coordinator.check_and_decrypt(target_id).await {
                Ok((status, outcome)) => {
                    if !outcome.is_noop() {
                        tracing::debug!(
                            %target_id,
                            pending = %status.pending_count,
                            ?outcome,
                            "target processed"
                        );
                    }
                }
                Err(e) => {
                    // already counted and logged by the coordinator;
                    // keep going with the rest of the watch-list.
                    tracing::error!(
                        %target_id,
                        error = %e,
                        "target failed this tick, continuing"
                    );
                }
            }
        }
        self.monitor.note_check();
    }
}

/// Streams `VoteCast` events from the vault purely as an observability
/// hint. Any subscription problem degrades to a warning and ends the
/// stream; polling remains the source of truth.
pub async fn watch_vote_events(
    provider: Arc<Provider<Http>>,
    vault_address: Address,
    deployed_at: u64,
    monitor: Monitor,
    mut stop: broadcast::Receiver<()>,
) {
    let vault = VoteVault::new(vault_address, provider.clone());
    let from_block = match provider.get_block_number().await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "vote event stream unavailable");
            return;
        }
    };
    let from_block = from_block.max(U64::from(deployed_at));
    let events = vault.event::<VoteCastFilter>().from_block(from_block);
    let mut stream = match events.stream().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "failed to subscribe to VoteCast events");
            monitor.warn(format!(
                "vote event stream unavailable, relying on polling only: {e}"
            ));
            return;
        }
    };
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::VoteEvents,
        subscribed = true,
    );
    loop {
        tokio::select! {
            maybe_event = stream.next() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        let target_id = H256(event.target_id);
                        monitor.info(format!(
                            "new vote for 0x{target_id:x}, total now {}",
                            event.total_votes
                        ));
                        tracing::event!(
                            target: probe::TARGET,
                            tracing::Level::DEBUG,
                            kind = %probe::Kind::VoteEvents,
                            %target_id,
                            total_votes = %event.total_votes,
                        );
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "vote event stream error");
                    }
                    None => {
                        tracing::warn!("vote event stream ended");
                        break;
                    }
                }
            }
            _ = stop.recv() => break,
        }
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::VoteEvents,
        detached = true,
    );
}
