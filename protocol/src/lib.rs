// Copyright (c) 2026 Conduit Contributors. MIT License.
// See LICENSE for details.

//! # Conduit Protocol
//!
//! Authorization and anti-replay core for a permissioned cross-ledger relay.
//! Callers dispatch operations on a source ledger; a fixed set of attestors
//! sign the resulting digest; the destination gateway admits the redemption
//! only with enough distinct trusted signatures, and only once.
//!
//! - **crypto**: Keccak digests, addresses, recoverable secp256k1 signatures.
//! - **bridge**: signer registry, threshold verifier, nonce ledger, handler
//!   directory, custody, and the gateway that ties them together.
//! - **storage**: sled persistence for gateway snapshots.
//! - **config**: protocol constants and the gateway config file.
//!
//! The core decides *whether* an operation is authorized and *whether* it
//! was already consumed. What an operation does is up to its handler.

pub mod bridge;
pub mod config;
pub mod crypto;
pub mod storage;
