//! # Threshold Verifier
//!
//! Decides whether a proof (an ordered list of detached signatures) is
//! enough to authorize a digest against the current signer registry.
//!
//! For each signature, in order:
//!
//! 1. Recover the signer address. Failure is [`BridgeError::InvalidSigner`].
//! 2. Reject a signer already seen in this proof with
//!    [`BridgeError::DuplicateSigner`].
//! 3. Reject a signer not in the registry with [`BridgeError::InvalidSigner`].
//!
//! After the loop, fewer than `threshold` signers is
//! [`BridgeError::ThresholdNotMet`]. A single bad signature anywhere fails
//! the whole proof; there is no partial credit.
//!
//! ## Duplicate detection
//!
//! Two strategies, selected by [`DedupStrategy`]:
//!
//! - **Prefix bitmap.** A 256-bit set indexed by the top byte of each
//!   recovered address. O(1) per signature, no allocation. It treats any two
//!   addresses with the same top byte as the same signer, so it is only
//!   sound while the registry's prefixes are pairwise distinct. The verifier
//!   checks that invariant first and falls back to the address set when it
//!   does not hold.
//! - **Address set.** A `HashSet<Address>`. Always sound.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::{BridgeError, BridgeResult};
use super::signers::SignerRegistry;
use crate::crypto::{recover_signer, Address, Digest, Signature};

/// How the verifier detects the same signer appearing twice in one proof.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Bitmap over address prefixes, guarded by the registry invariant.
    #[default]
    PrefixBitmap,
    /// General hash-set dedup.
    AddressSet,
}

/// A 256-bit set of address prefixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixBitmap([u64; 4]);

impl PrefixBitmap {
    /// Sets the bit for `prefix`. Returns `false` if it was already set.
    pub fn insert(&mut self, prefix: u8) -> bool {
        let word = (prefix >> 6) as usize;
        let bit = 1u64 << (prefix & 0x3F);
        if self.0[word] & bit != 0 {
            return false;
        }
        self.0[word] |= bit;
        true
    }

    pub fn contains(&self, prefix: u8) -> bool {
        self.0[(prefix >> 6) as usize] & (1u64 << (prefix & 0x3F)) != 0
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }
}

enum SeenSigners {
    Bitmap(PrefixBitmap),
    Set(HashSet<Address>),
}

impl SeenSigners {
    fn insert(&mut self, signer: &Address) -> bool {
        match self {
            SeenSigners::Bitmap(bitmap) => bitmap.insert(signer.prefix()),
            SeenSigners::Set(set) => set.insert(*signer),
        }
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Recovered signers, in proof order.
    pub signers: Vec<Address>,
    /// The dedup strategy that actually ran.
    pub strategy: DedupStrategy,
}

/// Borrowed view over the registry and quorum for one verification.
pub struct ThresholdVerifier<'a> {
    registry: &'a SignerRegistry,
    threshold: usize,
    strategy: DedupStrategy,
}

impl<'a> ThresholdVerifier<'a> {
    pub fn new(registry: &'a SignerRegistry, threshold: usize, strategy: DedupStrategy) -> Self {
        Self {
            registry,
            threshold,
            strategy,
        }
    }

    /// The strategy that will run given the registry's current state.
    pub fn effective_strategy(&self) -> DedupStrategy {
        match self.strategy {
            // The registry already warned when the colliding signer was added.
            DedupStrategy::PrefixBitmap if !self.registry.has_distinct_prefixes() => {
                DedupStrategy::AddressSet
            }
            other => other,
        }
    }

    pub fn verify(&self, digest: &Digest, signatures: &[Signature]) -> BridgeResult<Verification> {
        let strategy = self.effective_strategy();
        let mut seen = match strategy {
            DedupStrategy::PrefixBitmap => SeenSigners::Bitmap(PrefixBitmap::default()),
            DedupStrategy::AddressSet => SeenSigners::Set(HashSet::with_capacity(signatures.len())),
        };

        let mut signers = Vec::with_capacity(signatures.len());
        for (index, signature) in signatures.iter().enumerate() {
            let signer = recover_signer(digest, signature).map_err(|e| {
                tracing::warn!(index, error = %e, "signature recovery failed");
                BridgeError::InvalidSigner
            })?;

            if !seen.insert(&signer) {
                tracing::warn!(index, signer = %signer, "duplicate signer in proof");
                return Err(BridgeError::DuplicateSigner);
            }

            if !self.registry.contains(&signer) {
                tracing::warn!(index, signer = %signer, "signature from untrusted address");
                return Err(BridgeError::InvalidSigner);
            }

            tracing::debug!(index, signer = %signer, "signature accepted");
            signers.push(signer);
        }

        if signers.len() < self.threshold {
            return Err(BridgeError::ThresholdNotMet {
                valid: signers.len(),
                required: self.threshold,
            });
        }

        Ok(Verification { signers, strategy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignerKeypair;

    fn digest() -> Digest {
        Digest::from_bytes([0x42; 32])
    }

    fn registry_of(keys: &[&SignerKeypair]) -> SignerRegistry {
        let mut registry = SignerRegistry::new();
        let addresses: Vec<Address> = keys.iter().map(|k| k.address()).collect();
        registry.add_signers(&addresses).unwrap();
        registry
    }

    fn distinct_keys(n: usize) -> Vec<SignerKeypair> {
        SignerKeypair::generate_with_distinct_prefixes(n)
    }

    /// A fresh key whose prefix matches `target`'s.
    fn key_with_prefix_of(target: &SignerKeypair) -> SignerKeypair {
        loop {
            let candidate = SignerKeypair::generate();
            if candidate.address().prefix() == target.address().prefix()
                && candidate.address() != target.address()
            {
                return candidate;
            }
        }
    }

    #[test]
    fn test_bitmap_insert_and_contains() {
        let mut bitmap = PrefixBitmap::default();
        for prefix in [0u8, 63, 64, 127, 128, 255] {
            assert!(bitmap.insert(prefix));
            assert!(!bitmap.insert(prefix));
            assert!(bitmap.contains(prefix));
        }
        assert!(!bitmap.contains(1));
        assert_eq!(bitmap.count(), 6);
    }

    #[test]
    fn test_quorum_met() {
        let keys = distinct_keys(3);
        let registry = registry_of(&[&keys[0], &keys[1], &keys[2]]);
        let proof = vec![keys[0].sign_digest(&digest()), keys[1].sign_digest(&digest())];

        for strategy in [DedupStrategy::PrefixBitmap, DedupStrategy::AddressSet] {
            let result = ThresholdVerifier::new(&registry, 2, strategy)
                .verify(&digest(), &proof)
                .unwrap();
            assert_eq!(result.signers, vec![keys[0].address(), keys[1].address()]);
            assert_eq!(result.strategy, strategy);
        }
    }

    #[test]
    fn test_same_key_twice_is_duplicate_regardless_of_threshold() {
        let keys = distinct_keys(3);
        let registry = registry_of(&[&keys[0], &keys[1], &keys[2]]);
        let sig = keys[0].sign_digest(&digest());

        for strategy in [DedupStrategy::PrefixBitmap, DedupStrategy::AddressSet] {
            for threshold in [1, 2, 3] {
                let result =
                    ThresholdVerifier::new(&registry, threshold, strategy).verify(&digest(), &[sig, sig]);
                assert!(matches!(result, Err(BridgeError::DuplicateSigner)));
            }
        }
    }

    #[test]
    fn test_below_threshold() {
        let keys = distinct_keys(3);
        let registry = registry_of(&[&keys[0], &keys[1], &keys[2]]);
        let result = ThresholdVerifier::new(&registry, 2, DedupStrategy::PrefixBitmap)
            .verify(&digest(), &[keys[0].sign_digest(&digest())]);
        assert!(matches!(
            result,
            Err(BridgeError::ThresholdNotMet { valid: 1, required: 2 })
        ));
    }

    #[test]
    fn test_empty_proof_fails_threshold() {
        let keys = distinct_keys(1);
        let registry = registry_of(&[&keys[0]]);
        let result =
            ThresholdVerifier::new(&registry, 1, DedupStrategy::AddressSet).verify(&digest(), &[]);
        assert!(matches!(result, Err(BridgeError::ThresholdNotMet { valid: 0, .. })));
    }

    #[test]
    fn test_non_member_aborts_even_with_enough_valid_signatures() {
        let keys = distinct_keys(4);
        let registry = registry_of(&[&keys[0], &keys[1], &keys[2]]);
        let proof = vec![
            keys[0].sign_digest(&digest()),
            keys[1].sign_digest(&digest()),
            keys[3].sign_digest(&digest()),
        ];
        let result =
            ThresholdVerifier::new(&registry, 2, DedupStrategy::PrefixBitmap).verify(&digest(), &proof);
        assert!(matches!(result, Err(BridgeError::InvalidSigner)));
    }

    #[test]
    fn test_unrecoverable_signature_is_invalid_signer() {
        let keys = distinct_keys(1);
        let registry = registry_of(&[&keys[0]]);
        let mut raw = *keys[0].sign_digest(&digest()).as_bytes();
        raw[64] = 99;
        let result = ThresholdVerifier::new(&registry, 1, DedupStrategy::PrefixBitmap)
            .verify(&digest(), &[Signature::from_bytes(raw)]);
        assert!(matches!(result, Err(BridgeError::InvalidSigner)));
    }

    #[test]
    fn test_signature_over_other_digest_is_invalid_signer() {
        let keys = distinct_keys(2);
        let registry = registry_of(&[&keys[0], &keys[1]]);
        let other = Digest::from_bytes([0x01; 32]);
        let proof = vec![keys[0].sign_digest(&digest()), keys[1].sign_digest(&other)];
        let result =
            ThresholdVerifier::new(&registry, 2, DedupStrategy::AddressSet).verify(&digest(), &proof);
        assert!(matches!(result, Err(BridgeError::InvalidSigner)));
    }

    #[test]
    fn test_bitmap_falls_back_when_registry_prefixes_collide() {
        let keys = distinct_keys(2);
        let twin = key_with_prefix_of(&keys[0]);
        let registry = registry_of(&[&keys[0], &keys[1], &twin]);
        assert!(!registry.has_distinct_prefixes());

        // Two distinct trusted signers sharing a prefix must both count.
        let proof = vec![keys[0].sign_digest(&digest()), twin.sign_digest(&digest())];
        let verifier = ThresholdVerifier::new(&registry, 2, DedupStrategy::PrefixBitmap);
        assert_eq!(verifier.effective_strategy(), DedupStrategy::AddressSet);

        let result = verifier.verify(&digest(), &proof).unwrap();
        assert_eq!(result.signers.len(), 2);
        assert_eq!(result.strategy, DedupStrategy::AddressSet);
    }

    #[test]
    fn test_strategy_follows_registry_collision_state() {
        let keys = distinct_keys(2);
        let twin = key_with_prefix_of(&keys[0]);
        let mut registry = registry_of(&[&keys[0], &keys[1]]);
        let proof = vec![keys[0].sign_digest(&digest()), keys[1].sign_digest(&digest())];

        registry.add_signers(&[twin.address()]).unwrap();
        for _ in 0..3 {
            let verifier = ThresholdVerifier::new(&registry, 2, DedupStrategy::PrefixBitmap);
            let result = verifier.verify(&digest(), &proof).unwrap();
            assert_eq!(result.strategy, DedupStrategy::AddressSet);
        }

        registry.remove_signers(&[twin.address()]).unwrap();
        let verifier = ThresholdVerifier::new(&registry, 2, DedupStrategy::PrefixBitmap);
        assert_eq!(verifier.effective_strategy(), DedupStrategy::PrefixBitmap);
        assert_eq!(verifier.verify(&digest(), &proof).unwrap().strategy, DedupStrategy::PrefixBitmap);
    }

    #[test]
    fn test_bitmap_flags_outsider_sharing_member_prefix() {
        // With a prefix-distinct registry, an untrusted key that shares a
        // member's prefix is rejected either way; the bitmap just reports it
        // as a duplicate first.
        let keys = distinct_keys(2);
        let registry = registry_of(&[&keys[0], &keys[1]]);
        let outsider = key_with_prefix_of(&keys[0]);
        let proof = vec![keys[0].sign_digest(&digest()), outsider.sign_digest(&digest())];

        let bitmap =
            ThresholdVerifier::new(&registry, 1, DedupStrategy::PrefixBitmap).verify(&digest(), &proof);
        assert!(matches!(bitmap, Err(BridgeError::DuplicateSigner)));

        let set =
            ThresholdVerifier::new(&registry, 1, DedupStrategy::AddressSet).verify(&digest(), &proof);
        assert!(matches!(set, Err(BridgeError::InvalidSigner)));
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(
            serde_json::to_string(&DedupStrategy::PrefixBitmap).unwrap(),
            "\"prefix_bitmap\""
        );
        let parsed: DedupStrategy = serde_json::from_str("\"address_set\"").unwrap();
        assert_eq!(parsed, DedupStrategy::AddressSet);
    }
}
