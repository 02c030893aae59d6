use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_relayer_types::rpc_url::RpcUrl;

/// Gateway requests time out after `15_000` ms by default.
const fn default_request_timeout_ms() -> u64 {
    15_000
}
/// Suggested cooldown after an HTTP 429, in seconds.
const fn default_rate_limit_cooldown_secs() -> u64 {
    60
}

/// GatewayConfig is the configuration for the external decryption
/// gateway the relayer fetches plaintexts from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Base URL of the gateway, e.g. `https://gateway.example.com`.
    /// The client appends `/v1/public-decrypt`.
    #[serde(skip_serializing)]
    pub url: RpcUrl,
    /// Per-request timeout, in milliseconds.
    #[serde(
        default = "default_request_timeout_ms",
        rename(serialize = "requestTimeoutMs")
    )]
    pub request_timeout_ms: u64,
    /// Cooldown the relayer reports when the gateway rate-limits us.
    #[serde(
        default = "default_rate_limit_cooldown_secs",
        rename(serialize = "rateLimitCooldownSecs")
    )]
    pub rate_limit_cooldown_secs: u64,
}

impl GatewayConfig {
    /// The per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
