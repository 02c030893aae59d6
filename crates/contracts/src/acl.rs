use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, H256};
use tally_relayer_utils::{probe, Result};

use crate::{DecryptionAcl, ZERO_HANDLE};

/// Per-handle answer of an ACL check.
#[derive(Debug, Clone)]
pub struct AclDecision {
    /// Each queried handle with its "publicly decryptable" flag.
    pub per_handle: Vec<(H256, bool)>,
    /// AND of all per-handle flags. The fast path requires this.
    pub all_allowed: bool,
}

/// The raw per-handle permission lookup. The contract-backed
/// implementation lives below; tests substitute their own.
#[async_trait::async_trait]
pub trait DecryptionPermissions: Send + Sync {
    /// Whether the gateway is currently permitted to reveal this
    /// handle's plaintext.
    async fn is_publicly_decryptable(&self, handle: H256) -> Result<bool>;
}

/// [`DecryptionPermissions`] backed by the on-chain ACL contract.
#[derive(Debug, Clone)]
pub struct AclContract<M> {
    acl: DecryptionAcl<M>,
}

impl<M: Middleware + 'static> AclContract<M> {
    /// Creates a lookup against the ACL at `address`.
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            acl: DecryptionAcl::new(address, client),
        }
    }
}

#[async_trait::async_trait]
impl<M: Middleware + 'static> DecryptionPermissions for AclContract<M> {
    async fn is_publicly_decryptable(&self, handle: H256) -> Result<bool> {
        let allowed = self
            .acl
            .is_allowed_for_decryption(handle.to_fixed_bytes())
            .call()
            .await
            .map_err(|e| {
                tally_relayer_utils::Error::ReadFailure(e.to_string())
            })?;
        Ok(allowed)
    }
}

/// Checks whether ciphertext handles are publicly decryptable.
///
/// Permission flags are never cached across calls: a pending
/// `requestDecryptionData` transaction from this very relayer can flip
/// them between two checks.
#[derive(Debug, Clone)]
pub struct AclChecker<P> {
    permissions: P,
}

impl<P: DecryptionPermissions> AclChecker<P> {
    /// Wraps a permission lookup.
    pub fn new(permissions: P) -> Self {
        Self { permissions }
    }

    /// Queries the flag for every handle.
    ///
    /// The all-zero sentinel short-circuits to `false` without a
    /// network call: there is no data to decrypt. Lookup errors also
    /// come back as `false` (fail closed onto the slow path) with a
    /// warning; this method never fails the caller.
    pub async fn check(&self, handles: &[H256]) -> AclDecision {
        let mut per_handle = Vec::with_capacity(handles.len());
        for handle in handles {
            let allowed = if *handle == ZERO_HANDLE {
                false
            } else {
                match self.permissions.is_publicly_decryptable(*handle).await {
                    Ok(allowed) => allowed,
                    Err(e) => {
                        tracing::warn!(
                            ?handle,
                            error = %e,
                            "ACL read failed, treating handle as not decryptable"
                        );
                        false
                    }
                }
            };
            per_handle.push((*handle, allowed));
        }
        let all_allowed =
            !per_handle.is_empty() && per_handle.iter().all(|(_, a)| *a);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::AclCheck,
            handles = handles.len(),
            all_allowed,
        );
        AclDecision {
            per_handle,
            all_allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records how often it is asked, answers from a fixed map.
    struct FakePermissions {
        allowed: Vec<(H256, bool)>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DecryptionPermissions for FakePermissions {
        async fn is_publicly_decryptable(
            &self,
            handle: H256,
        ) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .allowed
                .iter()
                .find(|(h, _)| *h == handle)
                .map(|(_, a)| *a)
                .unwrap_or(false))
        }
    }

    struct FailingPermissions;

    #[async_trait::async_trait]
    impl DecryptionPermissions for FailingPermissions {
        async fn is_publicly_decryptable(&self, _: H256) -> Result<bool> {
            Err(tally_relayer_utils::Error::ReadFailure("boom".into()))
        }
    }

    #[tokio::test]
    async fn zero_handles_never_touch_the_network() {
        let fake = FakePermissions {
            allowed: vec![],
            calls: AtomicUsize::new(0),
        };
        let checker = AclChecker::new(fake);
        let decision = checker.check(&[ZERO_HANDLE, ZERO_HANDLE]).await;
        assert!(!decision.all_allowed);
        assert_eq!(decision.per_handle, vec![
            (ZERO_HANDLE, false),
            (ZERO_HANDLE, false)
        ]);
        assert_eq!(checker.permissions.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_allowed_is_the_conjunction() {
        let h1 = H256::repeat_byte(1);
        let h2 = H256::repeat_byte(2);
        for (a1, a2, expected) in [
            (true, true, true),
            (true, false, false),
            (false, true, false),
            (false, false, false),
        ] {
            let fake = FakePermissions {
                allowed: vec![(h1, a1), (h2, a2)],
                calls: AtomicUsize::new(0),
            };
            let decision = AclChecker::new(fake).check(&[h1, h2]).await;
            assert_eq!(decision.all_allowed, expected);
        }
    }

    #[tokio::test]
    async fn lookup_errors_fail_closed() {
        let h = H256::repeat_byte(3);
        let decision =
            AclChecker::new(FailingPermissions).check(&[h, h]).await;
        assert!(!decision.all_allowed);
        assert!(decision.per_handle.iter().all(|(_, a)| !a));
    }
}
