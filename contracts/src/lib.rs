//! # Conduit Reference Contracts
//!
//! Asset handlers and a batch executor that plug into the gateway. Their
//! business logic is kept deliberately small; what matters is that each one
//! owns its details encoding and digest, and keeps no state of its own.
//!
//! - **fungible**: lock on dispatch, release from the vault on redeem,
//!   optionally paying out through the batch executor.
//! - **non_fungible**: unique items held by the vault while abroad.
//! - **multi_token**: `(collection, id)` balances, lock/release.
//! - **message**: arbitrary payloads, relayed as gateway events.
//! - **batch_executor**: ordered, all-or-nothing payout calls.
//!
//! ## Details encoding
//!
//! Every details struct is bincode-encoded and must be canonical: the bytes
//! a relayer submits must be exactly what re-encoding the decoded value
//! produces. Redemption details carry the source network and a source-side
//! sequence number so two otherwise identical transfers get distinct
//! digests.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use conduit_protocol::bridge::{decode_details, AssetHandler, AssetType, HandlerError, NetworkId};
use conduit_protocol::crypto::{operation_digest, Digest};

pub mod batch_executor;
pub mod fungible;
pub mod message;
pub mod multi_token;
pub mod non_fungible;

pub use batch_executor::LedgerBatchExecutor;
pub use fungible::FungibleHandler;
pub use message::MessageHandler;
pub use multi_token::MultiTokenHandler;
pub use non_fungible::NonFungibleHandler;

/// Every handler kind this crate can build.
pub const HANDLER_KINDS: [&str; 4] = [
    fungible::KIND,
    non_fungible::KIND,
    multi_token::KIND,
    message::KIND,
];

/// Builds the reference handler registered under `kind`.
pub fn handler_for_kind(kind: &str) -> Option<Arc<dyn AssetHandler>> {
    match kind {
        fungible::KIND => Some(Arc::new(FungibleHandler)),
        non_fungible::KIND => Some(Arc::new(NonFungibleHandler)),
        multi_token::KIND => Some(Arc::new(MultiTokenHandler)),
        message::KIND => Some(Arc::new(MessageHandler)),
        _ => None,
    }
}

/// Digest of canonically encoded redemption details of type `T`.
pub(crate) fn canonical_digest<T>(
    network: &NetworkId,
    asset_type: AssetType,
    details: &[u8],
) -> Result<Digest, HandlerError>
where
    T: DeserializeOwned + Serialize,
{
    decode_details::<T>(details)?;
    Ok(operation_digest(network, asset_type, details))
}

pub(crate) fn ensure(condition: bool, reason: &str) -> Result<(), HandlerError> {
    if condition {
        Ok(())
    } else {
        Err(HandlerError::Rejected(reason.to_string()))
    }
}
