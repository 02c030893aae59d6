use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tally_relayer_types::{private_key::PrivateKey, rpc_url::RpcUrl};

/// The gas ceiling is set to `500_000` by default. Both vault calls are
/// small; anything above this indicates a mispriced node or a bug.
const fn default_gas_limit() -> u64 {
    500_000
}
/// Receipt polling interval is set to `1_000` ms by default.
const fn default_confirmation_interval_ms() -> u64 {
    1_000
}
/// Receipt polling gives up after `30` attempts by default.
const fn default_confirmation_retries() -> usize {
    30
}

/// EvmChainConfig is the configuration for the chain that hosts the
/// vote vault and its decryption ACL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// Block Explorer for this chain.
    ///
    /// Optional, and only used for printing a clickable links
    /// for transactions and contracts.
    #[serde(skip_serializing)]
    pub explorer: Option<url::Url>,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u32,
    /// The Private Key of the relayer account on this network.
    ///
    /// 1. if it starts with '0x' then this would be a raw (64 chars) hex
    ///    encoded private key.
    /// 2. if it starts with '$' then it would be considered as an
    ///    Environment variable holding a hex-encoded private key.
    ///    Example: $TALLY_RELAYER_KEY
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// The vote vault contract: target records, vote aggregates and the
    /// decryption entry points.
    pub vault: ContractConfig,
    /// The decryption ACL contract.
    pub acl: ContractConfig,
    /// Transaction submission knobs.
    #[serde(default)]
    pub tx: TxConfig,
}

/// ContractConfig represents a deployed contract the relayer talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractConfig {
    /// The address of this contract on this chain.
    pub address: Address,
    /// the block number where this contract got deployed at.
    #[serde(rename(serialize = "deployedAt"))]
    pub deployed_at: u64,
}

/// TxConfig bounds the cost and the confirmation wait of the two
/// state-changing vault calls.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TxConfig {
    /// Explicit gas limit ceiling applied to every submission.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Milliseconds between receipt polls while waiting for confirmation.
    #[serde(
        default = "default_confirmation_interval_ms",
        rename(serialize = "confirmationIntervalMs")
    )]
    pub confirmation_interval_ms: u64,
    /// Maximum receipt polls before the wait surfaces a failed transaction.
    #[serde(
        default = "default_confirmation_retries",
        rename(serialize = "confirmationRetries")
    )]
    pub confirmation_retries: usize,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            confirmation_interval_ms: default_confirmation_interval_ms(),
            confirmation_retries: default_confirmation_retries(),
        }
    }
}
