//! # Non-Fungible Handler
//!
//! Unique items. Dispatch moves an item the caller owns into the vault.
//! Redeem hands it to the recipient: an item the vault holds is released,
//! an item with no record is minted as a wrapped item, and an item someone
//! else holds is refused.

use serde::{Deserialize, Serialize};

use conduit_protocol::bridge::{
    decode_details, AssetHandler, AssetKey, AssetType, BatchExecutor, Custody, HandlerError,
    NetworkId,
};
use conduit_protocol::crypto::{Address, Digest};

use crate::{canonical_digest, ensure};

pub const KIND: &str = "non_fungible";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeposit {
    pub collection: String,
    pub item_id: u64,
    pub destination: NetworkId,
    pub recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRedemption {
    pub source: NetworkId,
    pub sequence: u64,
    pub collection: String,
    pub item_id: u64,
    pub recipient: Address,
}

pub fn item_key(collection: &str, item_id: u64) -> AssetKey {
    AssetKey::derive(KIND, &[collection.as_bytes(), &item_id.to_be_bytes()])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NonFungibleHandler;

impl AssetHandler for NonFungibleHandler {
    fn name(&self) -> &str {
        KIND
    }

    fn operation_hash(
        &self,
        network: &NetworkId,
        asset_type: AssetType,
        details: &[u8],
    ) -> Result<Digest, HandlerError> {
        canonical_digest::<ItemRedemption>(network, asset_type, details)
    }

    fn dispatch(&self, caller: Address, custody: &mut Custody, details: &[u8]) -> Result<(), HandlerError> {
        let deposit: ItemDeposit = decode_details(details)?;
        ensure(!deposit.recipient.is_zero(), "recipient must not be zero")?;

        let item = item_key(&deposit.collection, deposit.item_id);
        custody.move_item(item, caller, Custody::vault())?;
        tracing::debug!(caller = %caller, collection = %deposit.collection, item_id = deposit.item_id, "item locked");
        Ok(())
    }

    fn redeem(
        &self,
        _batcher: &dyn BatchExecutor,
        custody: &mut Custody,
        details: &[u8],
    ) -> Result<(), HandlerError> {
        let redemption: ItemRedemption = decode_details(details)?;
        ensure(!redemption.recipient.is_zero(), "recipient must not be zero")?;

        let item = item_key(&redemption.collection, redemption.item_id);
        match custody.owner_of(&item) {
            Some(owner) if owner == Custody::vault() => {
                custody.move_item(item, owner, redemption.recipient)?;
            }
            None => custody.set_owner(item, redemption.recipient),
            Some(_) => {
                return Err(HandlerError::Rejected(format!(
                    "item {} of {} is held outside the vault",
                    redemption.item_id, redemption.collection
                )))
            }
        }
        tracing::debug!(
            collection = %redemption.collection,
            item_id = redemption.item_id,
            recipient = %redemption.recipient,
            "item released"
        );
        Ok(())
    }
}
