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
//! # Gateway Client
//!
//! Turns a list of ciphertext handles into plaintext values plus an
//! on-chain-verifiable attestation, by calling the external decryption
//! gateway over HTTP.

use std::time::Duration;

use ethers::types::{Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use tally_relayer_utils::{probe, Error, Result};

/// ABI codec for the gateway's clear-value payload.
pub mod codec;
/// Attestation proof blob building and parsing.
pub mod proof;

/// Path of the public decryption endpoint, relative to the gateway base URL.
pub const PUBLIC_DECRYPT_PATH: &str = "v1/public-decrypt";

/// The marker the gateway puts in a 400 body when the handles are not
/// flagged publicly decryptable yet.
const NOT_DECRYPTABLE_MARKER: &str = "not publicly decryptable";

/// How much of an error body we keep for diagnostics.
const MAX_BODY_SNIPPET: usize = 256;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicDecryptRequest {
    ciphertext_handles: Vec<String>,
    extra_data: String,
}

#[derive(Debug, Deserialize)]
struct PublicDecryptResponse {
    #[allow(dead_code)]
    status: Option<String>,
    #[serde(default)]
    response: Vec<DecryptedPayload>,
}

#[derive(Debug, Deserialize)]
struct DecryptedPayload {
    decrypted_value: String,
    #[serde(default)]
    signatures: Vec<String>,
}

/// A successful gateway round trip: the recovered plaintexts, the raw
/// ABI-encoded clear-value blob (passed through to the vault verifier)
/// and the packed attestation proof.
#[derive(Debug, Clone)]
pub struct Decryption {
    /// One plaintext per submitted handle, in submission order.
    pub cleartexts: Vec<U256>,
    /// The gateway's ABI-encoded payload, verbatim.
    pub clear_values: Bytes,
    /// The packed proof blob the vault verifier expects.
    pub proof: Bytes,
    /// How many attesters signed this result.
    pub signer_count: usize,
}

/// HTTP client for the decryption gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    endpoint: url::Url,
    cooldown_secs: u64,
}

impl GatewayClient {
    /// Creates a client for the gateway at `base_url`.
    ///
    /// Every request carries `timeout`; `cooldown_secs` is the backoff
    /// hint reported when the gateway rate-limits us.
    pub fn new(
        base_url: url::Url,
        timeout: Duration,
        cooldown_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = base_url.join(PUBLIC_DECRYPT_PATH)?;
        Ok(Self {
            http,
            endpoint,
            cooldown_secs,
        })
    }

    /// Submits `handles` for public decryption and returns the parsed
    /// result.
    ///
    /// Never retries on its own: a 429 surfaces as
    /// [`Error::RateLimited`] and the caller decides if and when to try
    /// again.
    pub async fn public_decrypt(&self, handles: &[H256]) -> Result<Decryption> {
        let body = PublicDecryptRequest {
            ciphertext_handles: handles
                .iter()
                .map(|h| format!("0x{}", hex::encode(h.as_bytes())))
                .collect(),
            extra_data: "0x00".to_string(),
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Gateway,
            handles = handles.len(),
            requested = true,
        );
        let res = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                cooldown_secs: self.cooldown_secs,
            });
        }
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let snippet: String =
                text.chars().take(MAX_BODY_SNIPPET).collect();
            if status == reqwest::StatusCode::BAD_REQUEST
                && snippet.contains(NOT_DECRYPTABLE_MARKER)
            {
                return Err(Error::NotYetDecryptable);
            }
            return Err(Error::Gateway {
                status: status.as_u16(),
                body: snippet,
            });
        }
        let payload: PublicDecryptResponse = res
            .json()
            .await
            .map_err(|e| Error::UnexpectedFormat(e.to_string()))?;
        parse_decryption(payload, handles.len())
    }
}

/// Turns a raw gateway payload into a [`Decryption`], validating the
/// response shape and the attestation signatures. No partial result is
/// ever produced.
fn parse_decryption(
    payload: PublicDecryptResponse,
    handle_count: usize,
) -> Result<Decryption> {
    let first = payload.response.into_iter().next().ok_or_else(|| {
        Error::UnexpectedFormat("empty response array".into())
    })?;
    let raw = first
        .decrypted_value
        .strip_prefix("0x")
        .unwrap_or(&first.decrypted_value);
    let blob = hex::decode(raw).map_err(|e| {
        Error::UnexpectedFormat(format!("decrypted_value is not hex: {e}"))
    })?;
    let cleartexts = codec::decode_clear_values(&blob, handle_count)?;
    if first.signatures.is_empty() {
        return Err(Error::UnexpectedFormat(
            "no attester signatures in response".into(),
        ));
    }
    let signatures = first
        .signatures
        .iter()
        .map(|s| proof::normalize_signature(s))
        .collect::<Result<Vec<_>>>()?;
    let proof = proof::build_decryption_proof(&signatures)?;
    Ok(Decryption {
        cleartexts,
        clear_values: blob.into(),
        proof: proof.into(),
        signer_count: signatures.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_formed_payload() -> PublicDecryptResponse {
        let blob = codec::encode_clear_values(
            &[U256::from(42u64), U256::from(7u64)],
            &[],
        );
        PublicDecryptResponse {
            status: Some("success".into()),
            response: vec![DecryptedPayload {
                decrypted_value: format!("0x{}", hex::encode(blob)),
                signatures: vec![
                    format!("0x{}", hex::encode([0xAAu8; 65])),
                    format!("0x{}", hex::encode([0xBBu8; 65])),
                ],
            }],
        }
    }

    #[test]
    fn parses_a_well_formed_response() {
        let decryption = parse_decryption(well_formed_payload(), 2).unwrap();
        assert_eq!(decryption.cleartexts.len(), 2);
        assert_eq!(decryption.cleartexts[0], U256::from(42u64));
        assert_eq!(decryption.cleartexts[1], U256::from(7u64));
        assert_eq!(decryption.signer_count, 2);
    }

    #[test]
    fn empty_response_array_is_a_format_error() {
        let payload = PublicDecryptResponse {
            status: Some("success".into()),
            response: vec![],
        };
        let err = parse_decryption(payload, 2).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFormat(_)));
    }

    #[test]
    fn missing_signatures_are_a_format_error() {
        let mut payload = well_formed_payload();
        payload.response[0].signatures.clear();
        let err = parse_decryption(payload, 2).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFormat(_)));
    }

    #[test]
    fn non_hex_decrypted_value_is_a_format_error() {
        let mut payload = well_formed_payload();
        payload.response[0].decrypted_value = "0xzz".into();
        let err = parse_decryption(payload, 2).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFormat(_)));
    }
}
