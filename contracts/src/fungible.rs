//! # Fungible Token Handler
//!
//! Lock-and-release. Dispatch moves `amount` of `token` from the caller into
//! the gateway vault. Redeem releases it from the vault to the recipient,
//! or, when `payout` calls are attached, to the batch executor, which
//! forwards it call by call and refunds the rest to the recipient.

use serde::{Deserialize, Serialize};

use conduit_protocol::bridge::{
    decode_details, encode_calls, AssetHandler, AssetKey, AssetType, BatchExecutor, BatchFunding,
    Call, Custody, HandlerError, NetworkId,
};
use conduit_protocol::crypto::{Address, Digest};

use crate::{canonical_digest, ensure};

pub const KIND: &str = "fungible";

/// Outbound transfer leaving this ledger. The depositor is the
/// authenticated caller; `sequence` keeps otherwise identical deposits
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleDeposit {
    pub sequence: u64,
    pub token: String,
    pub amount: u128,
    pub destination: NetworkId,
    pub recipient: Address,
}

/// Inbound transfer arriving on this ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleRedemption {
    pub source: NetworkId,
    pub sequence: u64,
    pub token: String,
    pub recipient: Address,
    pub amount: u128,
    /// Optional multi-step payout. Empty means pay `recipient` directly.
    pub payout: Vec<Call>,
}

pub fn token_key(token: &str) -> AssetKey {
    AssetKey::derive(KIND, &[token.as_bytes()])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FungibleHandler;

impl AssetHandler for FungibleHandler {
    fn name(&self) -> &str {
        KIND
    }

    fn operation_hash(
        &self,
        network: &NetworkId,
        asset_type: AssetType,
        details: &[u8],
    ) -> Result<Digest, HandlerError> {
        canonical_digest::<FungibleRedemption>(network, asset_type, details)
    }

    fn dispatch(&self, caller: Address, custody: &mut Custody, details: &[u8]) -> Result<(), HandlerError> {
        let deposit: FungibleDeposit = decode_details(details)?;
        ensure(deposit.amount > 0, "amount must be non-zero")?;
        ensure(!deposit.recipient.is_zero(), "recipient must not be zero")?;

        custody.transfer(token_key(&deposit.token), caller, Custody::vault(), deposit.amount)?;
        tracing::debug!(
            caller = %caller,
            token = %deposit.token,
            amount = deposit.amount,
            destination = %deposit.destination,
            "fungible deposit locked"
        );
        Ok(())
    }

    fn redeem(
        &self,
        batcher: &dyn BatchExecutor,
        custody: &mut Custody,
        details: &[u8],
    ) -> Result<(), HandlerError> {
        let redemption: FungibleRedemption = decode_details(details)?;
        ensure(redemption.amount > 0, "amount must be non-zero")?;
        ensure(!redemption.recipient.is_zero(), "recipient must not be zero")?;

        let asset = token_key(&redemption.token);
        if redemption.payout.is_empty() {
            custody.transfer(asset, Custody::vault(), redemption.recipient, redemption.amount)?;
        } else {
            custody.transfer(asset, Custody::vault(), batcher.address(), redemption.amount)?;
            let funding = BatchFunding {
                asset,
                amount: redemption.amount,
                refund: redemption.recipient,
            };
            batcher.execute(custody, &funding, &encode_calls(&redemption.payout)?)?;
        }
        tracing::debug!(
            token = %redemption.token,
            amount = redemption.amount,
            source = %redemption.source,
            sequence = redemption.sequence,
            calls = redemption.payout.len(),
            "fungible redemption released"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_protocol::bridge::{encode_details, BatchError};

    struct NoBatcher;

    impl BatchExecutor for NoBatcher {
        fn address(&self) -> Address {
            Address::from_bytes([0xEE; 20])
        }

        fn execute(&self, _: &mut Custody, _: &BatchFunding, _: &[u8]) -> Result<(), BatchError> {
            Err(BatchError::CallFailed {
                index: 0,
                reason: "unreachable in these tests".into(),
            })
        }
    }

    fn alice() -> Address {
        Address::from_bytes([0xA1; 20])
    }

    fn deposit(amount: u128) -> Vec<u8> {
        encode_details(&FungibleDeposit {
            sequence: 1,
            token: "USDX".into(),
            amount,
            destination: NetworkId::new("ledger-b"),
            recipient: Address::from_bytes([0xB0; 20]),
        })
        .unwrap()
    }

    fn redemption(amount: u128) -> FungibleRedemption {
        FungibleRedemption {
            source: NetworkId::new("ledger-a"),
            sequence: 1,
            token: "USDX".into(),
            recipient: alice(),
            amount,
            payout: vec![],
        }
    }

    #[test]
    fn dispatch_locks_into_vault() {
        let mut custody = Custody::new();
        custody.credit(token_key("USDX"), alice(), 100).unwrap();

        let details = deposit(30);
        FungibleHandler.dispatch(alice(), &mut custody, &details).unwrap();

        assert_eq!(custody.balance_of(&token_key("USDX"), &alice()), 70);
        assert_eq!(custody.balance_of(&token_key("USDX"), &Custody::vault()), 30);
    }

    #[test]
    fn dispatch_debits_only_the_caller() {
        let mut custody = Custody::new();
        custody.credit(token_key("USDX"), alice(), 100).unwrap();
        let mallory = Address::from_bytes([0x66; 20]);

        let err = FungibleHandler
            .dispatch(mallory, &mut custody, &deposit(100))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Custody(_)));
        assert_eq!(custody.balance_of(&token_key("USDX"), &alice()), 100);
    }

    #[test]
    fn zero_amount_rejected() {
        let details = encode_details(&redemption(0)).unwrap();
        let err = FungibleHandler
            .redeem(&NoBatcher, &mut Custody::new(), &details)
            .unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(_)));
    }

    #[test]
    fn redeem_releases_from_vault() {
        let mut custody = Custody::new();
        custody.credit(token_key("USDX"), Custody::vault(), 50).unwrap();
        let details = encode_details(&redemption(20)).unwrap();

        FungibleHandler.redeem(&NoBatcher, &mut custody, &details).unwrap();
        assert_eq!(custody.balance_of(&token_key("USDX"), &alice()), 20);
        assert_eq!(custody.balance_of(&token_key("USDX"), &Custody::vault()), 30);
    }

    #[test]
    fn redeem_beyond_vault_liquidity_fails() {
        let mut custody = Custody::new();
        let details = encode_details(&redemption(1)).unwrap();
        let err = FungibleHandler
            .redeem(&NoBatcher, &mut custody, &details)
            .unwrap_err();
        assert!(matches!(err, HandlerError::Custody(_)));
    }

    #[test]
    fn digest_depends_on_every_field() {
        let network = NetworkId::new("ledger-b");
        let base = FungibleHandler
            .operation_hash(&network, 1, &encode_details(&redemption(5)).unwrap())
            .unwrap();

        let mut other = redemption(5);
        other.sequence = 2;
        let bumped = FungibleHandler
            .operation_hash(&network, 1, &encode_details(&other).unwrap())
            .unwrap();
        assert_ne!(base, bumped);

        let other_type = FungibleHandler
            .operation_hash(&network, 2, &encode_details(&redemption(5)).unwrap())
            .unwrap();
        assert_ne!(base, other_type);
    }
}
