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

use prometheus::{
    Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder,
};

/// A struct definition for collecting metrics in the relayer.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Targets the coordinator fully processed.
    pub targets_processed: IntCounter,
    /// Decrypted results committed on-chain.
    pub decryptions_stored: IntCounter,
    /// Failed gateway round trips (including rate limits).
    pub gateway_errors: IntCounter,
    /// State-changing transactions submitted by the relayer key.
    pub transactions_submitted: IntCounter,
    /// Gas spent (in gwei) by the relayer account.
    pub gas_spent_gwei: Gauge,
    /// Relayer account balance (in gwei).
    pub account_balance_gwei: Gauge,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also
    /// creates a registry for the counters and registers them.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let targets_processed = IntCounter::with_opts(Opts::new(
            "targets_processed",
            "How many targets the decryption coordinator fully processed",
        ))?;
        let decryptions_stored = IntCounter::with_opts(Opts::new(
            "decryptions_stored",
            "How many decrypted results were committed on-chain",
        ))?;
        let gateway_errors = IntCounter::with_opts(Opts::new(
            "gateway_errors",
            "Failed decryption gateway round trips",
        ))?;
        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "transactions_submitted",
            "State-changing transactions submitted by the relayer",
        ))?;
        let gas_spent_gwei = Gauge::with_opts(Opts::new(
            "gas_spent_gwei",
            "Cumulative gas spent by the relayer account, in gwei",
        ))?;
        let account_balance_gwei = Gauge::with_opts(Opts::new(
            "account_balance_gwei",
            "Relayer account balance, in gwei",
        ))?;
        registry.register(Box::new(targets_processed.clone()))?;
        registry.register(Box::new(decryptions_stored.clone()))?;
        registry.register(Box::new(gateway_errors.clone()))?;
        registry.register(Box::new(transactions_submitted.clone()))?;
        registry.register(Box::new(gas_spent_gwei.clone()))?;
        registry.register(Box::new(account_balance_gwei.clone()))?;
        Ok(Self {
            registry,
            targets_processed,
            decryptions_stored,
            gateway_errors,
            transactions_submitted,
            gas_spent_gwei,
            account_balance_gwei,
        })
    }

    /// Text-encodes the current values for a `/metrics` scrape.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_scrape_output() {
        let metrics = Metrics::new().unwrap();
        metrics.targets_processed.inc();
        metrics.decryptions_stored.inc();
        metrics.decryptions_stored.inc();
        let output = metrics.gather().unwrap();
        assert!(output.contains("targets_processed 1"));
        assert!(output.contains("decryptions_stored 2"));
    }

    #[test]
    fn two_instances_do_not_collide() {
        // each Metrics owns its registry, so tests and multiple
        // relayers in one process can coexist.
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.gateway_errors.inc();
        assert!(b.gather().unwrap().contains("gateway_errors 0"));
    }
}
