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

//! # Relayer Configuration Module
//!
//! A module for configuring the Tally decryption relayer.
//!
//! ## Overview
//!
//! Configuration is read from all `*.toml`/`*.json` files under a config
//! directory, with a `TALLY_*` environment overlay. Possible
//! configuration includes:
//! * `port`: The port the HTTP monitor API will listen on. Defaults to 9755.
//! * `evm`: the chain that holds the vote vault and ACL contracts.
//! * `gateway`: the external decryption gateway endpoint.
//! * `poller`: the watch-list poll scheduler knobs.

/// CLI configuration
pub mod cli;
/// EVM chain and contract configuration
pub mod evm;
/// Decryption gateway configuration
pub mod gateway;
/// Poll scheduler configuration
pub mod poller;
/// Utils for processing configuration
pub mod utils;

use evm::EvmChainConfig;
use gateway::GatewayConfig;
use poller::PollerConfig;
use serde::{Deserialize, Serialize};

/// The default port the relayer monitor API will listen on.
const fn default_port() -> u16 {
    9755
}

/// TallyRelayerConfig is the configuration for the Tally relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TallyRelayerConfig {
    /// HTTP monitor API port number.
    ///
    /// default to 9755
    #[serde(default = "default_port", skip_serializing)]
    pub port: u16,
    /// The EVM network that holds the vote vault and ACL contracts.
    pub evm: EvmChainConfig,
    /// The external decryption gateway.
    pub gateway: GatewayConfig,
    /// Poll scheduler configuration.
    #[serde(default)]
    pub poller: PollerConfig,
}

impl TallyRelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    ///
    /// The relayer always submits state-changing transactions, so a
    /// private key is required unconditionally.
    pub fn verify(&self) -> tally_relayer_utils::Result<()> {
        self.evm
            .private_key
            .is_some()
            .then_some(())
            .ok_or(tally_relayer_utils::Error::MissingSecrets)
    }
}
