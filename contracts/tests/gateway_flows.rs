//! Integration tests: the reference handlers and batch executor mounted on
//! a real gateway.
//!
//! These cover the paths the protocol crate can't reach on its own: batch
//! payouts through the executor, rollback of a failed batch, signed
//! deposits, and several asset types sharing one authorization gate.

use std::sync::Arc;

use conduit_contracts::fungible::{token_key, FungibleDeposit, FungibleRedemption};
use conduit_contracts::message::InboundMessage;
use conduit_contracts::non_fungible::{item_key, ItemRedemption};
use conduit_contracts::{handler_for_kind, LedgerBatchExecutor};
use conduit_protocol::bridge::{
    encode_details, BatchError, BridgeError, BridgeGateway, Call, Custody, DedupStrategy,
    ErrorCategory, GatewayEvent, MessageDirection, NetworkId,
};
use conduit_protocol::crypto::{dispatch_digest, Address, Signature, SignerKeypair};

const FUNGIBLE: u32 = 1;
const NON_FUNGIBLE: u32 = 2;
const MESSAGE: u32 = 4;

fn batcher_address() -> Address {
    Address::from_bytes([0xBA; 20])
}

fn recipient() -> Address {
    Address::from_bytes([0x5E; 20])
}

/// Gateway on "ledger-b" with three prefix-distinct signers, threshold 2,
/// and the fungible, non-fungible and message handlers mounted.
fn setup() -> (BridgeGateway, Vec<SignerKeypair>) {
    let keys = SignerKeypair::generate_with_distinct_prefixes(3);
    let network = NetworkId::new("ledger-b");
    let batcher = LedgerBatchExecutor::new(batcher_address(), network.clone());
    let mut gw = BridgeGateway::new(network, 2, DedupStrategy::PrefixBitmap, Arc::new(batcher)).unwrap();

    let addresses: Vec<Address> = keys.iter().map(SignerKeypair::address).collect();
    gw.add_signers(&addresses).unwrap();
    for (asset_type, kind) in [(FUNGIBLE, "fungible"), (NON_FUNGIBLE, "non_fungible"), (MESSAGE, "message")] {
        gw.add_handler(asset_type, handler_for_kind(kind).unwrap()).unwrap();
    }
    gw.custody_mut()
        .credit(token_key("USDX"), Custody::vault(), 1_000)
        .unwrap();
    gw.take_events();
    (gw, keys)
}

fn redeem_signed(
    gw: &mut BridgeGateway,
    keys: &[SignerKeypair],
    asset_type: u32,
    details: &[u8],
) -> Result<(), BridgeError> {
    let digest = gw.operation_hash(asset_type, details)?;
    let proof: Vec<Signature> = keys[..2].iter().map(|k| k.sign_digest(&digest)).collect();
    gw.redeem(asset_type, details, &proof).map(|_| ())
}

fn deposit_signed(
    gw: &mut BridgeGateway,
    depositor: &SignerKeypair,
    details: &[u8],
) -> Result<Address, BridgeError> {
    let digest = dispatch_digest(gw.network(), FUNGIBLE, details);
    gw.dispatch_signed(FUNGIBLE, details, &depositor.sign_digest(&digest))
}

fn deposit(sequence: u64, amount: u128) -> Vec<u8> {
    encode_details(&FungibleDeposit {
        sequence,
        token: "USDX".into(),
        amount,
        destination: NetworkId::new("ledger-a"),
        recipient: recipient(),
    })
    .unwrap()
}

fn relayed(events: &[GatewayEvent]) -> Vec<MessageDirection> {
    events
        .iter()
        .filter_map(|event| match event {
            GatewayEvent::MessageRelayed { direction, .. } => Some(*direction),
            _ => None,
        })
        .collect()
}

fn fungible(sequence: u64, amount: u128, payout: Vec<Call>) -> Vec<u8> {
    encode_details(&FungibleRedemption {
        source: NetworkId::new("ledger-a"),
        sequence,
        token: "USDX".into(),
        recipient: recipient(),
        amount,
        payout,
    })
    .unwrap()
}

// ---------------------------------------------------------------------------
// Fungible
// ---------------------------------------------------------------------------

#[test]
fn direct_release_to_recipient() {
    let (mut gw, keys) = setup();
    redeem_signed(&mut gw, &keys, FUNGIBLE, &fungible(1, 250, vec![])).unwrap();

    let custody = gw.custody();
    assert_eq!(custody.balance_of(&token_key("USDX"), &recipient()), 250);
    assert_eq!(custody.balance_of(&token_key("USDX"), &Custody::vault()), 750);
}

#[test]
fn batch_payout_splits_and_refunds() {
    let (mut gw, keys) = setup();
    let merchant = Address::from_bytes([0x3A; 20]);
    let relayer = Address::from_bytes([0x3B; 20]);
    let payout = vec![
        Call {
            target: merchant,
            value: 80,
            payload: b"order-17".to_vec(),
        },
        Call {
            target: relayer,
            value: 5,
            payload: vec![],
        },
    ];
    redeem_signed(&mut gw, &keys, FUNGIBLE, &fungible(2, 100, payout)).unwrap();

    let custody = gw.custody();
    let usdx = token_key("USDX");
    assert_eq!(custody.balance_of(&usdx, &merchant), 80);
    assert_eq!(custody.balance_of(&usdx, &relayer), 5);
    assert_eq!(custody.balance_of(&usdx, &recipient()), 15);
    assert_eq!(custody.balance_of(&usdx, &batcher_address()), 0);
    assert!(custody.messages().is_empty());
    assert_eq!(relayed(&gw.take_events()), vec![MessageDirection::Forwarded]);
}

#[test]
fn batch_payout_never_touches_funds_the_batcher_already_held() {
    let (mut gw, keys) = setup();
    let usdx = token_key("USDX");
    gw.custody_mut().credit(usdx, batcher_address(), 1_000_000).unwrap();

    let payout = vec![Call {
        target: Address::from_bytes([0x3A; 20]),
        value: 1,
        payload: vec![],
    }];
    redeem_signed(&mut gw, &keys, FUNGIBLE, &fungible(4, 1, payout)).unwrap();
    assert_eq!(gw.custody().balance_of(&usdx, &recipient()), 0);
    assert_eq!(gw.custody().balance_of(&usdx, &batcher_address()), 1_000_000);

    let greedy = vec![Call {
        target: Address::from_bytes([0x3A; 20]),
        value: 500_000,
        payload: vec![],
    }];
    let err = redeem_signed(&mut gw, &keys, FUNGIBLE, &fungible(5, 1, greedy)).unwrap_err();
    assert!(matches!(err, BridgeError::Batch(BatchError::ExceedsFunding { index: 0, funded: 1 })));
    assert_eq!(gw.custody().balance_of(&usdx, &batcher_address()), 1_000_000);
}

#[test]
fn vault_cannot_be_made_the_batcher() {
    let (mut gw, _) = setup();
    let vault_batcher = LedgerBatchExecutor::new(Custody::vault(), NetworkId::new("ledger-b"));
    assert!(matches!(
        gw.set_batcher(Arc::new(vault_batcher)),
        Err(BridgeError::ReservedAddress(_))
    ));
    assert_eq!(gw.batcher(), batcher_address());
    assert_eq!(gw.custody().balance_of(&token_key("USDX"), &Custody::vault()), 1_000);
}

#[test]
fn failed_batch_restores_custody_and_burns_digest() {
    let (mut gw, keys) = setup();
    let before = gw.custody().clone();

    let overdrawn = vec![Call {
        target: Address::from_bytes([0x3A; 20]),
        value: 101,
        payload: vec![],
    }];
    let details = fungible(3, 100, overdrawn);
    let err = redeem_signed(&mut gw, &keys, FUNGIBLE, &details).unwrap_err();

    assert!(matches!(err, BridgeError::Batch(BatchError::ExceedsFunding { index: 0, funded: 100 })));
    assert_eq!(err.category(), ErrorCategory::Execution);
    assert_eq!(gw.custody(), &before);

    let digest = gw.operation_hash(FUNGIBLE, &details).unwrap();
    assert!(gw.nonces().is_consumed(&digest));
}

#[test]
fn deposit_round_trip_through_vault() {
    let (mut gw, keys) = setup();
    let depositor = SignerKeypair::generate();
    gw.custody_mut().credit(token_key("USDX"), depositor.address(), 40).unwrap();

    let details = deposit(1, 40);
    assert_eq!(deposit_signed(&mut gw, &depositor, &details).unwrap(), depositor.address());
    assert_eq!(gw.custody().balance_of(&token_key("USDX"), &Custody::vault()), 1_040);
    assert_eq!(gw.custody().balance_of(&token_key("USDX"), &depositor.address()), 0);

    // The same bytes are not valid redemption details.
    assert!(redeem_signed(&mut gw, &keys, FUNGIBLE, &details).is_err());
}

#[test]
fn spoofed_depositor_cannot_lock_a_victims_balance() {
    let (mut gw, _) = setup();
    let victim = SignerKeypair::generate();
    let attacker = SignerKeypair::generate();
    gw.custody_mut().credit(token_key("USDX"), victim.address(), 500).unwrap();

    // Nothing in the details names the victim, so the attacker's own
    // signature only ever reaches the attacker's empty balance.
    let err = deposit_signed(&mut gw, &attacker, &deposit(1, 500)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);
    assert_eq!(gw.custody().balance_of(&token_key("USDX"), &victim.address()), 500);
    assert_eq!(gw.custody().balance_of(&token_key("USDX"), &Custody::vault()), 1_000);
    assert!(gw.take_events().is_empty());
}

// ---------------------------------------------------------------------------
// Shared gate
// ---------------------------------------------------------------------------

#[test]
fn asset_types_share_one_nonce_ledger_but_not_digests() {
    let (mut gw, keys) = setup();

    let item = encode_details(&ItemRedemption {
        source: NetworkId::new("ledger-a"),
        sequence: 1,
        collection: "relics".into(),
        item_id: 9,
        recipient: recipient(),
    })
    .unwrap();
    let message = encode_details(&InboundMessage {
        source: NetworkId::new("ledger-a"),
        sequence: 1,
        sender: Address::from_bytes([0x01; 20]),
        recipient: recipient(),
        payload: b"hello".to_vec(),
    })
    .unwrap();

    redeem_signed(&mut gw, &keys, NON_FUNGIBLE, &item).unwrap();
    redeem_signed(&mut gw, &keys, MESSAGE, &message).unwrap();
    redeem_signed(&mut gw, &keys, FUNGIBLE, &fungible(1, 1, vec![])).unwrap();

    assert_eq!(gw.nonces().len(), 3);
    assert_eq!(gw.custody().owner_of(&item_key("relics", 9)), Some(recipient()));
    assert_eq!(relayed(&gw.take_events()), vec![MessageDirection::Inbound]);
}

#[test]
fn removed_handler_makes_asset_type_unsupported() {
    let (mut gw, keys) = setup();
    gw.remove_handler(MESSAGE).unwrap();

    let message = encode_details(&InboundMessage {
        source: NetworkId::new("ledger-a"),
        sequence: 1,
        sender: Address::from_bytes([0x01; 20]),
        recipient: recipient(),
        payload: vec![],
    })
    .unwrap();
    assert!(matches!(
        redeem_signed(&mut gw, &keys, MESSAGE, &message),
        Err(BridgeError::UnsupportedAssetType(MESSAGE))
    ));
    assert!(gw.nonces().is_empty());
}
