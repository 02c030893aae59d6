use std::str::FromStr;

use ethers::types::H256;
use serde::Deserialize;

/// The relayer's transaction signing key.
///
/// End users never sign anything in this system; every state-changing
/// call goes out under this key. It is configured out-of-band, either
/// inline as a `0x`-prefixed hex string or indirectly through an
/// environment variable reference.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, even at trace level.
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = H256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVisitor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVisitor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with("0x") {
                    // hex value
                    H256::from_str(value).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "{e}\n got {} chars but expected a 66 chars string (including the 0x prefix)",
                            value.len()
                        ))
                    })
                } else if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    H256::from_str(&val).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",
                            val.len()
                        ))
                    })
                } else {
                    Err(serde::de::Error::custom(
                        "expected a 0x-prefixed hex private key or a $ENV_VAR reference",
                    ))
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVisitor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        key: PrivateKey,
    }

    #[test]
    fn parses_inline_hex() {
        let json = r#"{"key": "0x000000000000000000000000000000000000000000000000000000000000002a"}"#;
        let w: Wrapper = serde_json::from_str(json).unwrap();
        assert_eq!(w.key.0, H256::from_low_u64_be(42));
    }

    #[test]
    fn reads_from_env_reference() {
        std::env::set_var(
            "TEST_TALLY_RELAYER_KEY",
            "0x0000000000000000000000000000000000000000000000000000000000000007",
        );
        let json = r#"{"key": "$TEST_TALLY_RELAYER_KEY"}"#;
        let w: Wrapper = serde_json::from_str(json).unwrap();
        assert_eq!(w.key.0, H256::from_low_u64_be(7));
    }

    #[test]
    fn rejects_bare_strings() {
        let json = r#"{"key": "not a key"}"#;
        assert!(serde_json::from_str::<Wrapper>(json).is_err());
    }
}
