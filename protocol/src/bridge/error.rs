//! Error types for the bridge authorization core.
//!
//! Every gateway operation that can fail returns a [`BridgeError`]. None of
//! them are retried internally; the caller decides what to resubmit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::batch::BatchError;
use super::handler::HandlerError;
use super::types::AssetType;
use crate::crypto::{Address, Digest};

/// The four failure families a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input or bad setup. Nothing changed.
    Configuration,
    /// The proof did not authorize the operation. The nonce stays consumed.
    Authorization,
    /// The digest was already consumed. Permanent.
    Replay,
    /// A handler or the batch executor refused the operation. Custody is
    /// rolled back; for redemptions the nonce stays consumed.
    Execution,
}

/// Errors surfaced by the gateway and its sub-components.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An administrative list operation received an empty list.
    #[error("input list is empty")]
    EmptyInput,

    /// A signer, handler, or batcher was the null address.
    #[error("address must not be zero")]
    ZeroAddress,

    /// An address the gateway reserves for itself, such as the custody
    /// vault, was offered as a batcher.
    #[error("address {0} is reserved")]
    ReservedAddress(Address),

    /// Threshold of zero requested.
    #[error("threshold must be at least 1")]
    InvalidThreshold,

    #[error("a handler is already registered for asset type {0}")]
    HandlerAlreadyPresent(AssetType),

    #[error("no handler is registered for asset type {0}")]
    HandlerDoesNotExist(AssetType),

    /// Dispatch or redeem for an asset type with no handler.
    #[error("unsupported asset type {0}")]
    UnsupportedAssetType(AssetType),

    /// A signature could not be recovered, or recovered to an untrusted
    /// address.
    #[error("invalid signer")]
    InvalidSigner,

    #[error("duplicate signer in proof")]
    DuplicateSigner,

    #[error("threshold not met: {valid} valid signatures, {required} required")]
    ThresholdNotMet { valid: usize, required: usize },

    #[error("nonce already used for digest {0}")]
    NonceUsed(Digest),

    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("batch execution error: {0}")]
    Batch(#[from] BatchError),
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::EmptyInput
            | BridgeError::ZeroAddress
            | BridgeError::ReservedAddress(_)
            | BridgeError::InvalidThreshold
            | BridgeError::HandlerAlreadyPresent(_)
            | BridgeError::HandlerDoesNotExist(_)
            | BridgeError::UnsupportedAssetType(_) => ErrorCategory::Configuration,
            BridgeError::InvalidSigner
            | BridgeError::DuplicateSigner
            | BridgeError::ThresholdNotMet { .. } => ErrorCategory::Authorization,
            BridgeError::NonceUsed(_) => ErrorCategory::Replay,
            BridgeError::Handler(_) | BridgeError::Batch(_) => ErrorCategory::Execution,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(BridgeError::EmptyInput.category(), ErrorCategory::Configuration);
        assert_eq!(
            BridgeError::UnsupportedAssetType(3).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            BridgeError::ReservedAddress(Address::ZERO).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(BridgeError::DuplicateSigner.category(), ErrorCategory::Authorization);
        assert_eq!(
            BridgeError::ThresholdNotMet { valid: 1, required: 2 }.category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            BridgeError::NonceUsed(Digest::default()).category(),
            ErrorCategory::Replay
        );
        assert_eq!(
            BridgeError::from(HandlerError::Rejected("nope".into())).category(),
            ErrorCategory::Execution
        );
    }

    #[test]
    fn test_threshold_message_is_informative() {
        let msg = BridgeError::ThresholdNotMet { valid: 1, required: 3 }.to_string();
        assert!(msg.contains('1') && msg.contains('3'));
    }
}
