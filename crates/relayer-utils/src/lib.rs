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
//! # Relayer Utils
//!
//! Shared error taxonomy and small utilities used across the Tally
//! decryption relayer crates.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ethers::middleware::SignerMiddleware;
use ethers::prelude::Wallet;
use ethers::providers::{Http, Provider};

/// Terminal hyperlinks for explorer URLs.
pub mod explorer_link;
/// A module used for debugging relayer lifecycle, poller and decryption state.
pub mod probe;
/// Retry policies for async calls.
pub mod retry;

/// Ethereum client the relayer signs and submits transactions with.
pub type SignerClient = SignerMiddleware<
    Provider<Http>,
    Wallet<ethers::core::k256::ecdsa::SigningKey>,
>;

/// An enum of all possible errors that could be encountered during the
/// execution of the Tally relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying Http server.
    #[error(transparent)]
    Axum(#[from] axum::Error),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// HTTP client error.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Smart contract error on a read-only client.
    #[error(transparent)]
    EthersContractCall(#[from] ethers::contract::ContractError<Provider<Http>>),
    /// Smart contract error on the signing client.
    #[error(transparent)]
    EthersContractCallWithSigner(
        #[from] ethers::contract::ContractError<SignerClient>,
    ),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWallet(#[from] ethers::signers::WalletError),
    /// ABI encoding/decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::abi::Error),
    /// Hex decoding error.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Prometheus error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Missing Secrets in the config, e.g. the relayer private key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,

    /// A read-only chain call failed. Retryable on the next poll.
    #[error("Chain read failed: {}", _0)]
    ReadFailure(String),
    /// The decryption gateway asked us to back off.
    #[error(
        "Gateway rate limited, cooldown for {} seconds before retrying",
        cooldown_secs
    )]
    RateLimited {
        /// Suggested cooldown before the next gateway request.
        cooldown_secs: u64,
    },
    /// The gateway refused because the handles are not yet flagged as
    /// publicly decryptable. Signals the caller to take the slow path.
    #[error("Ciphertext handles are not publicly decryptable yet")]
    NotYetDecryptable,
    /// Any other non-2xx answer from the decryption gateway.
    #[error("Gateway error (status {}): {}", status, body)]
    Gateway {
        /// Raw HTTP status code.
        status: u16,
        /// Truncated response body, for diagnostics.
        body: String,
    },
    /// The gateway returned 2xx but the payload shape was not usable.
    /// No partial result is ever returned for these.
    #[error("Unexpected gateway response format: {}", _0)]
    UnexpectedFormat(String),
    /// A state-changing transaction failed to submit or confirm.
    #[error("Transaction failed: {}", _0)]
    TxFailed(String),
    /// Fast-path precondition not met: the ACL does not allow public
    /// decryption of the target's handles.
    #[error("ACL does not allow public decryption for this target")]
    AclNotAllowed,
}

/// A type alias for the result for the Tally relayer, that uses the
/// [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        let status = match &value {
            Error::AclNotAllowed | Error::NotYetDecryptable => {
                StatusCode::CONFLICT
            }
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Gateway { .. } | Error::UnexpectedFormat(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HandlerError(status, value.to_string())
    }
}

/// Error type for HTTP handlers
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}
