use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The poll interval is set to `30_000` ms by default.
const fn default_interval_ms() -> u64 {
    30_000
}
/// ACL-propagation settling delay on the slow path, `3_000` ms by
/// default. An empirically chosen buffer, not a guaranteed bound.
const fn default_settle_delay_ms() -> u64 {
    3_000
}
/// Gateway retries after the settling delay, `5` by default.
const fn default_gateway_retries() -> usize {
    5
}
/// Delay between those gateway retries, `2_000` ms by default.
const fn default_gateway_retry_delay_ms() -> u64 {
    2_000
}
/// Vote-cast event stream is enabled by default.
const fn enable_vote_events_default() -> bool {
    true
}

/// PollerConfig is the configuration for the watch-list poll scheduler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollerConfig {
    /// Milliseconds between scheduler ticks.
    #[serde(default = "default_interval_ms", rename(serialize = "intervalMs"))]
    pub interval_ms: u64,
    /// Milliseconds to wait after a `requestDecryptionData` submission
    /// before the first gateway attempt.
    #[serde(
        default = "default_settle_delay_ms",
        rename(serialize = "settleDelayMs")
    )]
    pub settle_delay_ms: u64,
    /// How many times the slow path re-polls the gateway while the ACL
    /// grant propagates.
    #[serde(
        default = "default_gateway_retries",
        rename(serialize = "gatewayRetries")
    )]
    pub gateway_retries: usize,
    /// Milliseconds between those gateway retries.
    #[serde(
        default = "default_gateway_retry_delay_ms",
        rename(serialize = "gatewayRetryDelayMs")
    )]
    pub gateway_retry_delay_ms: u64,
    /// Initial watch-list of dApp UUIDs to poll for pending decryptions.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Whether to also stream `VoteCast` events for observability.
    #[serde(
        default = "enable_vote_events_default",
        rename(serialize = "voteEvents")
    )]
    pub vote_events: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            gateway_retries: default_gateway_retries(),
            gateway_retry_delay_ms: default_gateway_retry_delay_ms(),
            targets: Vec::new(),
            vote_events: enable_vote_events_default(),
        }
    }
}

impl PollerConfig {
    /// The scheduler tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The slow-path settling delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// The slow-path gateway retry spacing as a [`Duration`].
    pub fn gateway_retry_delay(&self) -> Duration {
        Duration::from_millis(self.gateway_retry_delay_ms)
    }
}
