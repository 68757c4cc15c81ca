//! # Detached Attestor Signatures
//!
//! Recoverable secp256k1 ECDSA in the 65-byte `r || s || v` layout. The
//! verifier does not receive public keys alongside signatures; it recovers
//! the signer's address from `(digest, signature)` and asks the registry
//! whether that address is trusted.
//!
//! ## Strictness
//!
//! Recovery rejects:
//! - a `v` byte outside `{0, 1, 27, 28}`;
//! - `r`/`s` values that are not valid scalars;
//! - high-`s` signatures. Every ECDSA signature has a twin with `s' = n - s`
//!   that recovers to the same key. Accepting only the low form means one
//!   signer produces exactly one valid encoding per digest.

use std::fmt;
use std::str::FromStr;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, SECP256K1};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::hash::Digest;
use super::keys::Address;
use crate::config::SIGNATURE_LENGTH;

/// Offset added to the recovery id in the Ethereum-style `v` byte.
const LEGACY_V_OFFSET: u8 = 27;

/// Reasons a signature cannot be turned back into a signer address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("invalid recovery byte: {0}")]
    InvalidRecoveryByte(u8),

    #[error("malformed signature encoding")]
    Malformed,

    #[error("non-canonical signature: s is in the upper half of the curve order")]
    HighS,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("invalid signature hex: {0}")]
    InvalidHex(String),
}

/// A detached 65-byte recoverable signature over an operation digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Encodes a libsecp256k1 recoverable signature with `v = 27 + recid`.
    pub fn from_recoverable(signature: &RecoverableSignature) -> Self {
        let (recovery_id, compact) = signature.serialize_compact();
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = LEGACY_V_OFFSET + recovery_id.to_i32() as u8;
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    fn recovery_id(&self) -> Result<RecoveryId, SignatureError> {
        let v = self.0[64];
        let normalized = match v {
            0 | 1 => v,
            27 | 28 => v - LEGACY_V_OFFSET,
            other => return Err(SignatureError::InvalidRecoveryByte(other)),
        };
        RecoveryId::from_i32(normalized as i32).map_err(|_| SignatureError::InvalidRecoveryByte(v))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        hex::decode_to_slice(raw, &mut bytes)
            .map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Recovers the address that produced `signature` over `digest`.
pub fn recover_signer(digest: &Digest, signature: &Signature) -> Result<Address, SignatureError> {
    let recovery_id = signature.recovery_id()?;
    let recoverable = RecoverableSignature::from_compact(&signature.0[..64], recovery_id)
        .map_err(|_| SignatureError::Malformed)?;

    let standard = recoverable.to_standard();
    let mut normalized = standard;
    normalized.normalize_s();
    if normalized != standard {
        return Err(SignatureError::HighS);
    }

    let message = Message::from_digest(*digest.as_bytes());
    let public_key = SECP256K1
        .recover_ecdsa(&message, &recoverable)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(Address::from_public_key(&public_key))
}
