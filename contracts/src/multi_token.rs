//! # Multi-Token Handler
//!
//! Semi-fungible balances addressed by `(collection, id)`. Same
//! lock-and-release flow as the fungible handler, without batch payouts.

use serde::{Deserialize, Serialize};

use conduit_protocol::bridge::{
    decode_details, AssetHandler, AssetKey, AssetType, BatchExecutor, Custody, HandlerError,
    NetworkId,
};
use conduit_protocol::crypto::{Address, Digest};

use crate::{canonical_digest, ensure};

pub const KIND: &str = "multi_token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTokenDeposit {
    pub sequence: u64,
    pub collection: String,
    pub id: u64,
    pub amount: u128,
    pub destination: NetworkId,
    pub recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTokenRedemption {
    pub source: NetworkId,
    pub sequence: u64,
    pub collection: String,
    pub id: u64,
    pub amount: u128,
    pub recipient: Address,
}

pub fn balance_key(collection: &str, id: u64) -> AssetKey {
    AssetKey::derive(KIND, &[collection.as_bytes(), &id.to_be_bytes()])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MultiTokenHandler;

impl AssetHandler for MultiTokenHandler {
    fn name(&self) -> &str {
        KIND
    }

    fn operation_hash(
        &self,
        network: &NetworkId,
        asset_type: AssetType,
        details: &[u8],
    ) -> Result<Digest, HandlerError> {
        canonical_digest::<MultiTokenRedemption>(network, asset_type, details)
    }

    fn dispatch(&self, caller: Address, custody: &mut Custody, details: &[u8]) -> Result<(), HandlerError> {
        let deposit: MultiTokenDeposit = decode_details(details)?;
        ensure(deposit.amount > 0, "amount must be non-zero")?;
        ensure(!deposit.recipient.is_zero(), "recipient must not be zero")?;

        let key = balance_key(&deposit.collection, deposit.id);
        custody.transfer(key, caller, Custody::vault(), deposit.amount)?;
        Ok(())
    }

    fn redeem(
        &self,
        _batcher: &dyn BatchExecutor,
        custody: &mut Custody,
        details: &[u8],
    ) -> Result<(), HandlerError> {
        let redemption: MultiTokenRedemption = decode_details(details)?;
        ensure(redemption.amount > 0, "amount must be non-zero")?;
        ensure(!redemption.recipient.is_zero(), "recipient must not be zero")?;

        let key = balance_key(&redemption.collection, redemption.id);
        custody.transfer(key, Custody::vault(), redemption.recipient, redemption.amount)?;
        tracing::debug!(
            collection = %redemption.collection,
            id = redemption.id,
            amount = redemption.amount,
            "multi-token redemption released"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_protocol::bridge::{encode_details, BatchError, BatchFunding};

    struct NoBatcher;

    impl BatchExecutor for NoBatcher {
        fn address(&self) -> Address {
            Address::from_bytes([0xEE; 20])
        }

        fn execute(&self, _: &mut Custody, _: &BatchFunding, _: &[u8]) -> Result<(), BatchError> {
            Ok(())
        }
    }

    #[test]
    fn ids_within_a_collection_are_separate_balances() {
        assert_ne!(balance_key("cards", 1), balance_key("cards", 2));

        let holder = Address::from_bytes([0x42; 20]);
        let mut custody = Custody::new();
        custody.credit(balance_key("cards", 1), holder, 5).unwrap();

        let details = encode_details(&MultiTokenDeposit {
            sequence: 1,
            collection: "cards".into(),
            id: 2,
            amount: 1,
            destination: NetworkId::new("ledger-b"),
            recipient: holder,
        })
        .unwrap();
        assert!(MultiTokenHandler.dispatch(holder, &mut custody, &details).is_err());
    }

    #[test]
    fn lock_then_release() {
        let holder = Address::from_bytes([0x42; 20]);
        let mut custody = Custody::new();
        custody.credit(balance_key("cards", 7), holder, 10).unwrap();

        let deposit = encode_details(&MultiTokenDeposit {
            sequence: 1,
            collection: "cards".into(),
            id: 7,
            amount: 4,
            destination: NetworkId::new("ledger-b"),
            recipient: holder,
        })
        .unwrap();
        // Somebody else cannot lock the holder's balance.
        assert!(MultiTokenHandler
            .dispatch(Address::from_bytes([0x66; 20]), &mut custody, &deposit)
            .is_err());
        MultiTokenHandler.dispatch(holder, &mut custody, &deposit).unwrap();
        assert_eq!(custody.balance_of(&balance_key("cards", 7), &Custody::vault()), 4);

        let redemption = encode_details(&MultiTokenRedemption {
            source: NetworkId::new("ledger-b"),
            sequence: 1,
            collection: "cards".into(),
            id: 7,
            amount: 4,
            recipient: holder,
        })
        .unwrap();
        MultiTokenHandler.redeem(&NoBatcher, &mut custody, &redemption).unwrap();
        assert_eq!(custody.balance_of(&balance_key("cards", 7), &holder), 10);
    }
}
