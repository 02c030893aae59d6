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

//! ABI codec for the gateway's clear-value payload.
//!
//! The gateway encodes exactly `handle_count` leading `uint256` slots
//! followed by one trailing dynamic `bytes` value. Decoding with the
//! wrong shape makes values silently come out as zero, so this module
//! is the only place that knows the layout and it is covered by
//! fixture round-trip tests.

use ethers::abi::{self, ParamType, Token};
use ethers::types::U256;
use tally_relayer_utils::{Error, Result};

/// Decodes the gateway's ABI-encoded payload into one plaintext per
/// submitted handle.
pub fn decode_clear_values(
    blob: &[u8],
    handle_count: usize,
) -> Result<Vec<U256>> {
    let mut params = vec![ParamType::Uint(256); handle_count];
    params.push(ParamType::Bytes);
    let tokens = abi::decode(&params, blob).map_err(|e| {
        Error::UnexpectedFormat(format!("clear values do not decode: {e}"))
    })?;
    tokens
        .into_iter()
        .take(handle_count)
        .map(|t| {
            t.into_uint().ok_or_else(|| {
                Error::UnexpectedFormat(
                    "clear value slot is not a uint256".into(),
                )
            })
        })
        .collect()
}

/// Encodes `values` the way the gateway does. Only used by tests and
/// local fixtures.
pub fn encode_clear_values(values: &[U256], extra: &[u8]) -> Vec<u8> {
    let mut tokens: Vec<Token> =
        values.iter().map(|v| Token::Uint(*v)).collect();
    tokens.push(Token::Bytes(extra.to_vec()));
    abi::encode(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_fixture_exactly() {
        // sum = 42, count = 7, empty trailing bytes.
        let blob =
            encode_clear_values(&[U256::from(42u64), U256::from(7u64)], &[]);
        let values = decode_clear_values(&blob, 2).unwrap();
        assert_eq!(values, vec![U256::from(42u64), U256::from(7u64)]);
    }

    #[test]
    fn trailing_bytes_do_not_disturb_the_head_slots() {
        let blob = encode_clear_values(
            &[U256::from(1u64), U256::from(2u64)],
            &[0xDE, 0xAD, 0xBE, 0xEF],
        );
        let values = decode_clear_values(&blob, 2).unwrap();
        assert_eq!(values, vec![U256::from(1u64), U256::from(2u64)]);
    }

    #[test]
    fn truncated_fixture_fails_instead_of_decoding_zeroes() {
        let blob =
            encode_clear_values(&[U256::from(42u64), U256::from(7u64)], &[]);
        let truncated = &blob[..blob.len() - 16];
        let err = decode_clear_values(truncated, 2).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFormat(_)));
    }

    #[test]
    fn wrong_handle_count_fails_loudly() {
        let blob = encode_clear_values(&[U256::from(42u64)], &[]);
        // expecting 2 head slots from a 1-slot payload must not
        // silently produce zeros.
        assert!(decode_clear_values(&blob, 2).is_err());
    }
}
