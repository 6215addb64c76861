use crate::order::OrderSubmission;

/// The marketplace SDK operations this system treats as a trusted external
/// library: order-hash computation and signature verification. We never
/// reimplement the signing scheme ourselves; intake calls through this trait
/// and trusts the answer.
pub trait MarketplaceSdk: Send + Sync {
    /// The content hash a valid signature must cover. Two semantically
    /// identical submissions always hash the same way.
    fn order_hash(&self, submission: &OrderSubmission) -> anyhow::Result<crate::hash::Hash32>;

    /// Recovers the signer of `submission.signature` over its order hash, or
    /// `None` if the signature does not verify.
    fn recover_signer(&self, submission: &OrderSubmission) -> Option<crate::address::Address>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use crate::address::Address;
    use crate::hash::Hash32;

    /// A deterministic stand-in for the real SDK, used by tests that need a
    /// `MarketplaceSdk` but do not exercise signature verification itself.
    pub struct AlwaysValidSdk {
        pub signer: Address,
    }

    impl MarketplaceSdk for AlwaysValidSdk {
        fn order_hash(&self, submission: &OrderSubmission) -> anyhow::Result<Hash32> {
            let bytes = serde_json::to_vec(submission)?;
            Ok(Hash32::from_bytes(blake_like_digest(&bytes)))
        }

        fn recover_signer(&self, _submission: &OrderSubmission) -> Option<Address> {
            Some(self.signer)
        }
    }

    fn blake_like_digest(bytes: &[u8]) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}
