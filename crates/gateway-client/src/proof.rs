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

//! Attestation proof blob building and parsing.
//!
//! Layout expected by the vault verifier, byte for byte:
//! one signer-count byte, then each 65-byte signature back to back,
//! then a single zero terminator byte (the empty extra-data slot).

use tally_relayer_utils::{Error, Result};

/// Length of one attester signature (r || s || v).
pub const SIGNATURE_LEN: usize = 65;

/// The empty extra-data terminator closing the blob.
const TERMINATOR: u8 = 0x00;

/// Strips the `0x` prefix and hex-decodes one attester signature,
/// enforcing the 65-byte length.
pub fn normalize_signature(sig: &str) -> Result<Vec<u8>> {
    let raw = sig.strip_prefix("0x").unwrap_or(sig);
    let bytes = hex::decode(raw).map_err(|e| {
        Error::UnexpectedFormat(format!("signature is not hex: {e}"))
    })?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(Error::UnexpectedFormat(format!(
            "signature is {} bytes, expected {SIGNATURE_LEN}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Packs normalized signatures into the proof blob the vault verifier
/// expects.
pub fn build_decryption_proof(signatures: &[Vec<u8>]) -> Result<Vec<u8>> {
    if signatures.is_empty() || signatures.len() > u8::MAX as usize {
        return Err(Error::UnexpectedFormat(format!(
            "unsupported signer count: {}",
            signatures.len()
        )));
    }
    let mut out =
        Vec::with_capacity(1 + signatures.len() * SIGNATURE_LEN + 1);
    out.push(signatures.len() as u8);
    for sig in signatures {
        debug_assert_eq!(sig.len(), SIGNATURE_LEN);
        out.extend_from_slice(sig);
    }
    out.push(TERMINATOR);
    Ok(out)
}

/// Reference decoder for the proof blob. The submitter never needs
/// this; it exists so the byte layout is pinned by round-trip tests.
pub fn parse_decryption_proof(blob: &[u8]) -> Result<Vec<Vec<u8>>> {
    let (&count, rest) = blob.split_first().ok_or_else(|| {
        Error::UnexpectedFormat("empty proof blob".into())
    })?;
    let expected = count as usize * SIGNATURE_LEN + 1;
    if rest.len() != expected {
        return Err(Error::UnexpectedFormat(format!(
            "proof blob is {} bytes after the count, expected {expected}",
            rest.len()
        )));
    }
    if rest[rest.len() - 1] != TERMINATOR {
        return Err(Error::UnexpectedFormat(
            "proof blob is missing the terminator".into(),
        ));
    }
    Ok(rest[..rest.len() - 1]
        .chunks_exact(SIGNATURE_LEN)
        .map(|c| c.to_vec())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_round_trips_byte_for_byte() {
        let sig_a = vec![0xAA; SIGNATURE_LEN];
        let sig_b = vec![0xBB; SIGNATURE_LEN];
        let blob =
            build_decryption_proof(&[sig_a.clone(), sig_b.clone()]).unwrap();
        assert_eq!(blob[0], 2);
        assert_eq!(blob.len(), 1 + 2 * SIGNATURE_LEN + 1);
        let parsed = parse_decryption_proof(&blob).unwrap();
        assert_eq!(parsed, vec![sig_a, sig_b]);
    }

    #[test]
    fn normalization_strips_the_prefix_and_checks_length() {
        let hexed = format!("0x{}", hex::encode([0x11u8; SIGNATURE_LEN]));
        assert_eq!(normalize_signature(&hexed).unwrap(), [0x11u8; 65]);
        assert!(normalize_signature("0x1234").is_err());
        assert!(normalize_signature("zz").is_err());
    }

    #[test]
    fn empty_signer_set_is_rejected() {
        assert!(build_decryption_proof(&[]).is_err());
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let blob =
            build_decryption_proof(&[vec![0xCC; SIGNATURE_LEN]]).unwrap();
        // flip the count byte
        let mut wrong_count = blob.clone();
        wrong_count[0] = 2;
        assert!(parse_decryption_proof(&wrong_count).is_err());
        // drop the terminator
        let missing_term = &blob[..blob.len() - 1];
        assert!(parse_decryption_proof(missing_term).is_err());
    }
}
