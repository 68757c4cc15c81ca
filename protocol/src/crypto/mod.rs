//! # Cryptographic Primitives for Conduit
//!
//! Everything the authorization core needs to turn "a bag of bytes from a
//! relayer" into "these specific attestors signed this specific operation":
//!
//! - **Keccak-256** for operation digests and address derivation.
//! - **secp256k1 recoverable ECDSA** for attestor signatures. The verifier
//!   never receives public keys; it recovers the signer from the signature
//!   and the digest, then checks the recovered address against the registry.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around the audited
//! `secp256k1` (libsecp256k1 bindings) and `sha3` crates.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{dispatch_digest, keccak256, operation_digest, Digest};
pub use keys::{Address, SignerKeypair};
pub use signatures::{recover_signer, Signature};
