//! Batch executor interface.
//!
//! A handler that needs a multi-step payout moves the released funds to the
//! executor's account and hands it an opaque encoded call list. The executor
//! runs every call in order and aborts on the first failure. The calls may
//! spend at most the funded amount; whatever they leave of it is swept to
//! the refund address named in [`BatchFunding`]. Funds the executor's
//! account held before the batch are never touched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::custody::{AssetKey, Custody, CustodyError};
use crate::crypto::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("malformed call list: {0}")]
    Decode(String),

    #[error("call {index} targets the zero address")]
    ZeroTarget { index: usize },

    #[error("call {index} failed: {reason}")]
    CallFailed { index: usize, reason: String },

    #[error("call {index} spends beyond the funded {funded}")]
    ExceedsFunding { index: usize, funded: u128 },

    #[error("refund address must not be zero")]
    ZeroRefund,

    #[error("custody error: {0}")]
    Custody(#[from] CustodyError),
}

/// One forwarded call: move `value` to `target`, attaching `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub target: Address,
    pub value: u128,
    pub payload: Vec<u8>,
}

/// What the executor was funded with for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFunding {
    pub asset: AssetKey,
    pub amount: u128,
    /// Receives the unspent remainder.
    pub refund: Address,
}

pub trait BatchExecutor: Send + Sync {
    /// Account the executor spends from.
    fn address(&self) -> Address;

    /// Runs an encoded call list against `custody`. All or nothing: on
    /// error the gateway discards every change made during the call.
    fn execute(
        &self,
        custody: &mut Custody,
        funding: &BatchFunding,
        calls: &[u8],
    ) -> Result<(), BatchError>;
}

pub fn encode_calls(calls: &[Call]) -> Result<Vec<u8>, BatchError> {
    bincode::serialize(calls).map_err(|e| BatchError::Decode(e.to_string()))
}

pub fn decode_calls(bytes: &[u8]) -> Result<Vec<Call>, BatchError> {
    bincode::deserialize(bytes).map_err(|e| BatchError::Decode(e.to_string()))
}
