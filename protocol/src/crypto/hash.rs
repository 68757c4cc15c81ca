//! # Hashing Utilities
//!
//! Keccak-256 and the canonical operation digest.
//!
//! The operation digest is the one value both sides of the bridge must agree
//! on byte-for-byte: attestors sign it off-protocol, and the gateway keys its
//! nonce ledger by it. The preimage is length-prefixed throughout so that no
//! two distinct `(network, asset_type, details)` triples can serialize to the
//! same bytes.
//!
//! ```text
//! keccak256(
//!     DIGEST_DOMAIN_TAG
//!     || u32_be(len(network)) || network
//!     || u32_be(asset_type)
//!     || u32_be(len(details)) || details
//! )
//! ```
//!
//! The dispatch digest a caller signs to authorize an outbound transfer has
//! the same layout under `DISPATCH_DOMAIN_TAG`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest as _, Keccak256};

use crate::bridge::types::{AssetType, NetworkId};
use crate::config::{DIGEST_DOMAIN_TAG, DIGEST_LENGTH, DISPATCH_DOMAIN_TAG};

/// A 32-byte operation digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; DIGEST_LENGTH];
        hex::decode_to_slice(raw, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Keccak-256 of the input.
pub fn keccak256(data: &[u8]) -> [u8; DIGEST_LENGTH] {
    let mut output = [0u8; DIGEST_LENGTH];
    output.copy_from_slice(&Keccak256::digest(data));
    output
}

/// Computes the canonical operation digest for a redeem payload.
///
/// Handlers own their canonicalization, but every reference handler funnels
/// its details through this helper so the network id and asset type are
/// always bound into what the attestors sign.
pub fn operation_digest(network: &NetworkId, asset_type: AssetType, details: &[u8]) -> Digest {
    let digest = tagged_digest(DIGEST_DOMAIN_TAG, network, asset_type, details);
    tracing::debug!(
        network = %network,
        asset_type,
        details_len = details.len(),
        digest = %digest,
        "computed operation digest"
    );
    digest
}

/// Computes the digest a caller signs to authorize a dispatch. The gateway
/// recovers the caller from that signature and consumes the digest, so one
/// signed dispatch runs at most once.
pub fn dispatch_digest(network: &NetworkId, asset_type: AssetType, details: &[u8]) -> Digest {
    tagged_digest(DISPATCH_DOMAIN_TAG, network, asset_type, details)
}

fn tagged_digest(tag: &[u8], network: &NetworkId, asset_type: AssetType, details: &[u8]) -> Digest {
    let mut hasher = Keccak256::new();
    hasher.update(tag);
    update_length_prefixed(&mut hasher, network.as_str().as_bytes());
    hasher.update(asset_type.to_be_bytes());
    update_length_prefixed(&mut hasher, details);

    let mut output = [0u8; DIGEST_LENGTH];
    output.copy_from_slice(&hasher.finalize());
    Digest(output)
}

fn update_length_prefixed(hasher: &mut Keccak256, data: &[u8]) {
    hasher.update((data.len() as u32).to_be_bytes());
    hasher.update(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty_input_vector() {
        // Well-known Keccak-256 of the empty string (not SHA3-256).
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_operation_digest_is_deterministic() {
        let network = NetworkId::new("ledger-b");
        let a = operation_digest(&network, 7, b"payload");
        let b = operation_digest(&network, 7, b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn test_network_is_bound_into_digest() {
        let a = operation_digest(&NetworkId::new("ledger-a"), 1, b"payload");
        let b = operation_digest(&NetworkId::new("ledger-b"), 1, b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn test_asset_type_is_bound_into_digest() {
        let network = NetworkId::new("ledger-a");
        assert_ne!(
            operation_digest(&network, 1, b"payload"),
            operation_digest(&network, 2, b"payload")
        );
    }

    #[test]
    fn test_every_details_byte_matters() {
        let network = NetworkId::new("ledger-a");
        let original = b"transfer 100 to alice".to_vec();
        let base = operation_digest(&network, 1, &original);

        for i in 0..original.len() {
            let mut tampered = original.clone();
            tampered[i] ^= 0x01;
            assert_ne!(operation_digest(&network, 1, &tampered), base, "byte {i}");
        }
    }

    #[test]
    fn test_length_prefix_prevents_boundary_shift() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = operation_digest(&NetworkId::new("ab"), 1, b"c");
        let b = operation_digest(&NetworkId::new("a"), 1, b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_dispatch_digest_is_domain_separated() {
        let network = NetworkId::new("ledger-a");
        assert_ne!(
            dispatch_digest(&network, 1, b"payload"),
            operation_digest(&network, 1, b"payload")
        );
        assert_eq!(
            dispatch_digest(&network, 1, b"payload"),
            dispatch_digest(&network, 1, b"payload")
        );
    }

    #[test]
    fn test_digest_hex_parse_roundtrip() {
        let digest = Digest::from_bytes([0xAB; 32]);
        let parsed: Digest = digest.to_hex().parse().unwrap();
        assert_eq!(parsed, digest);

        let unprefixed: Digest = hex::encode([0xAB; 32]).parse().unwrap();
        assert_eq!(unprefixed, digest);
    }

    #[test]
    fn test_digest_rejects_wrong_length() {
        assert!("0xabcd".parse::<Digest>().is_err());
    }
}
