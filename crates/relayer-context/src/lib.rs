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
//! # Relayer Context Module
//!
//! A module for managing the context of the relayer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use ethers::prelude::*;
use tally_relayer_monitor::{Metrics, Monitor};

/// RelayerContext contains the relayer's configuration, its operational
/// monitor and the shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: tally_relayer_config::TallyRelayerConfig,
    /// Broadcasts a shutdown signal to all active background tasks.
    ///
    /// The initial `shutdown` trigger is provided by the caller of
    /// `run`. When a background task is spawned, it is handed a
    /// broadcast receiver. When a graceful shutdown is initiated, a
    /// `()` value is sent; each task receives it, reaches a safe
    /// terminal state, and completes.
    notify_shutdown: broadcast::Sender<()>,
    /// The bounded operational log and state counters.
    pub monitor: Monitor,
    /// Prometheus metrics for the relayer.
    pub metrics: Arc<Metrics>,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: tally_relayer_config::TallyRelayerConfig,
    ) -> tally_relayer_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            notify_shutdown,
            monitor: Monitor::new(),
            metrics,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns a new read-only provider for the configured chain.
    pub fn evm_provider(
        &self,
    ) -> tally_relayer_utils::Result<Provider<Http>> {
        let provider =
            Provider::try_from(self.config.evm.http_endpoint.as_str())?
                .interval(Duration::from_millis(5u64));
        Ok(provider)
    }

    /// Sets up and returns the relayer wallet for the configured chain.
    pub fn evm_wallet(&self) -> tally_relayer_utils::Result<LocalWallet> {
        let private_key = self
            .config
            .evm
            .private_key
            .as_ref()
            .ok_or(tally_relayer_utils::Error::MissingSecrets)?;
        let chain_id = self.config.evm.chain_id;
        let wallet = LocalWallet::from_bytes(private_key.as_bytes())?
            .with_chain_id(chain_id);
        Ok(wallet)
    }
}

/// Listens for the shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single
/// value is ever sent. Once a value has been sent via the broadcast
/// channel, every task should shut down.
///
/// The `Shutdown` struct listens for the signal and tracks that the
/// signal has been received. Callers may query for whether the shutdown
/// signal has been received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,
    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }
        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;
        // Remember that the signal has been received.
        self.shutdown = true;
    }
}
