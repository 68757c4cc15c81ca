//! # Handler Directory
//!
//! Maps each asset type to the handler that implements its lock/release
//! logic. Handlers are stateless strategy objects: they compute the
//! canonical digest for their own details encoding and mutate the gateway's
//! [`Custody`] when invoked, and hold nothing between calls.
//!
//! A mapping is never silently overwritten. Replacing a handler means
//! removing the old entry and adding the new one.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::batch::{BatchError, BatchExecutor};
use super::custody::{Custody, CustodyError};
use super::error::{BridgeError, BridgeResult};
use super::types::{AssetType, NetworkId};
use crate::crypto::{keccak256, Address, Digest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("malformed operation details: {0}")]
    Decode(String),

    /// Details decode but are not the unique encoding of their value.
    #[error("operation details are not canonically encoded")]
    NonCanonical,

    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("batch execution failed: {0}")]
    Batch(#[from] BatchError),
}

/// An asset-type-specific strategy invoked by the gateway.
pub trait AssetHandler: Send + Sync {
    /// Stable kind name, persisted so the node can rebuild the directory.
    fn name(&self) -> &str;

    /// Identity of this handler deployment. Must be non-zero.
    fn address(&self) -> Address {
        handler_address(self.name())
    }

    /// Canonical digest of a redemption. Must be a pure function of its
    /// inputs: attestors compute it offline and the gateway keys its nonce
    /// ledger by it.
    fn operation_hash(
        &self,
        network: &NetworkId,
        asset_type: AssetType,
        details: &[u8],
    ) -> Result<Digest, HandlerError>;

    /// Lock or burn side of a transfer leaving this ledger. `caller` is the
    /// authenticated account; it is the only account a dispatch may debit.
    fn dispatch(&self, caller: Address, custody: &mut Custody, details: &[u8]) -> Result<(), HandlerError>;

    /// Release or mint side of a transfer arriving on this ledger.
    fn redeem(
        &self,
        batcher: &dyn BatchExecutor,
        custody: &mut Custody,
        details: &[u8],
    ) -> Result<(), HandlerError>;
}

/// Deterministic address for a handler kind: low 20 bytes of
/// `keccak256("conduit/handler/" || name)`.
pub fn handler_address(name: &str) -> Address {
    let hash = keccak256(format!("conduit/handler/{name}").as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}

/// Decodes bincode details and rejects any encoding that does not re-encode
/// to the same bytes (trailing data, for one). One value, one digest.
pub fn decode_details<T>(details: &[u8]) -> Result<T, HandlerError>
where
    T: DeserializeOwned + Serialize,
{
    let value: T = bincode::deserialize(details).map_err(|e| HandlerError::Decode(e.to_string()))?;
    let reencoded = bincode::serialize(&value).map_err(|e| HandlerError::Decode(e.to_string()))?;
    if reencoded != details {
        return Err(HandlerError::NonCanonical);
    }
    Ok(value)
}

/// Serializes details the way [`decode_details`] expects them.
pub fn encode_details<T: Serialize>(value: &T) -> Result<Vec<u8>, HandlerError> {
    bincode::serialize(value).map_err(|e| HandlerError::Decode(e.to_string()))
}

#[derive(Default, Clone)]
pub struct HandlerDirectory {
    handlers: BTreeMap<AssetType, Arc<dyn AssetHandler>>,
}

impl HandlerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, asset_type: AssetType, handler: Arc<dyn AssetHandler>) -> BridgeResult<()> {
        if handler.address().is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        if self.handlers.contains_key(&asset_type) {
            return Err(BridgeError::HandlerAlreadyPresent(asset_type));
        }
        self.handlers.insert(asset_type, handler);
        Ok(())
    }

    pub fn remove_handler(&mut self, asset_type: AssetType) -> BridgeResult<Arc<dyn AssetHandler>> {
        self.handlers
            .remove(&asset_type)
            .ok_or(BridgeError::HandlerDoesNotExist(asset_type))
    }

    pub fn resolve(&self, asset_type: AssetType) -> BridgeResult<Arc<dyn AssetHandler>> {
        self.handlers
            .get(&asset_type)
            .cloned()
            .ok_or(BridgeError::UnsupportedAssetType(asset_type))
    }

    pub fn is_supported(&self, asset_type: AssetType) -> bool {
        self.handlers.contains_key(&asset_type)
    }

    /// `(asset type, handler kind)` pairs in ascending asset type order.
    pub fn entries(&self) -> Vec<(AssetType, String)> {
        self.handlers
            .iter()
            .map(|(asset_type, handler)| (*asset_type, handler.name().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}
