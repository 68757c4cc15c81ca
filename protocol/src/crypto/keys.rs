//! # Key Management
//!
//! secp256k1 attestor keys and the 20-byte addresses derived from them.
//!
//! The gateway itself never holds a secret key. [`SignerKeypair`] exists for
//! attestor tooling and for tests; the gateway only ever sees [`Address`]es,
//! either from its registry or recovered from a signature.
//!
//! ## Address prefixes
//!
//! The top byte of an address (`Address::prefix`) is load-bearing: the
//! prefix-bitmap duplicate check in the verifier treats two addresses with
//! the same prefix as the same signer. Operators choosing attestor keys
//! should pick keys whose addresses have pairwise-distinct prefixes;
//! [`SignerKeypair::generate_with_distinct_prefixes`] does exactly that.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::hash::{keccak256, Digest};
use super::signatures::Signature;
use crate::config::{ADDRESS_LENGTH, PREFIX_SPACE};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: not a valid secp256k1 scalar")]
    InvalidSecretKey,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// A 20-byte account or attestor address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The null address. Never a valid signer, handler, or batcher.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives the address of a secp256k1 public key: the low 20 bytes of
    /// `keccak256(uncompressed[1..])`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let uncompressed = public_key.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&hash[hash.len() - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Most-significant byte of the address encoding.
    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(raw, &mut bytes)
            .map_err(|e| KeyError::InvalidAddress(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An attestor keypair.
///
/// Intentionally not `Serialize`: exporting a secret key should be a
/// deliberate call to [`SignerKeypair::secret_bytes`], never a side effect
/// of logging or encoding a struct that happens to contain one.
pub struct SignerKeypair {
    secret: SecretKey,
    public: PublicKey,
}

impl SignerKeypair {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut OsRng);
        Self::from_secret(secret)
    }

    /// Reconstructs a keypair from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        Self { secret, public }
    }

    /// Generates `count` keypairs whose addresses have pairwise-distinct
    /// prefixes. At most 256 such keys exist; larger requests are capped.
    pub fn generate_with_distinct_prefixes(count: usize) -> Vec<SignerKeypair> {
        let count = count.min(PREFIX_SPACE);
        let mut taken = HashSet::with_capacity(count);
        let mut keys = Vec::with_capacity(count);
        while keys.len() < count {
            let candidate = Self::generate();
            if taken.insert(candidate.address().prefix()) {
                keys.push(candidate);
            }
        }
        keys
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public)
    }

    /// Exports the secret scalar. Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Produces a detached recoverable signature over a digest.
    pub fn sign_digest(&self, digest: &Digest) -> Signature {
        let message = Message::from_digest(*digest.as_bytes());
        let recoverable = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        Signature::from_recoverable(&recoverable)
    }
}

impl fmt::Debug for SignerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
