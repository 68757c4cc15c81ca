//! # Custody
//!
//! The gateway's own mutable asset state. Handlers never hold state of their
//! own; for the duration of one dispatch or redeem call they receive
//! `&mut Custody` and manipulate the gateway's balances, ownership records
//! and outbox directly.
//!
//! Assets are identified by an opaque [`AssetKey`] that each handler derives
//! from its own identifiers. The gateway never interprets a key.
//!
//! ## Journal
//!
//! Between [`Custody::begin`] and [`Custody::commit`] every mutation records
//! the value it overwrote. [`Custody::rollback`] replays those records in
//! reverse, so undoing a failed call costs what the call touched rather than
//! the size of the whole ledger.
//!
//! The outbox is transient. The gateway drains it into events after every
//! successful call, so it is empty whenever state is persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::types::NetworkId;
use crate::crypto::{keccak256, Address};

/// The gateway's own account: locked deposits and releasable funds live here.
const VAULT_ADDRESS: Address = Address::from_bytes(*b"CONDUIT-GATEWAY-VLT!");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: u128, requested: u128 },

    #[error("balance overflow")]
    Overflow,

    #[error("item {0} is not owned by {1}")]
    NotOwner(AssetKey, Address),

    #[error("item {0} already has an owner")]
    AlreadyOwned(AssetKey),
}

/// Opaque 32-byte asset identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetKey([u8; 32]);

impl AssetKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// `keccak256(namespace || len(part) || part || ...)` with `u32`
    /// big-endian length prefixes, so `("ab", "c")` and `("a", "bc")` differ.
    pub fn derive(namespace: &str, parts: &[&[u8]]) -> Self {
        let mut buf = Vec::with_capacity(namespace.len() + parts.iter().map(|p| p.len() + 4).sum::<usize>());
        buf.extend_from_slice(namespace.as_bytes());
        for part in parts {
            buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
            buf.extend_from_slice(part);
        }
        Self(keccak256(&buf))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetKey({})", self.to_hex())
    }
}

impl FromStr for AssetKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for AssetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AssetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Leaving this ledger; attestors pick it up from the dispatch event.
    Outbound,
    /// Delivered to this ledger by a redemption.
    Inbound,
    /// Recorded by the batch executor while forwarding a payout call.
    Forwarded,
}

/// One entry in the gateway outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub direction: MessageDirection,
    pub network: NetworkId,
    pub from: Address,
    pub to: Address,
    pub payload: Vec<u8>,
}

/// A value overwritten inside an open journal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
    Balance {
        asset: AssetKey,
        account: Address,
        previous: Option<u128>,
    },
    Owner {
        item: AssetKey,
        previous: Option<Address>,
    },
    Message,
}

/// Balances, unique-item ownership and the message outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custody {
    balances: BTreeMap<AssetKey, BTreeMap<Address, u128>>,
    owners: BTreeMap<AssetKey, Address>,
    outbox: Vec<RelayedMessage>,
    #[serde(skip)]
    journal: Option<Vec<Undo>>,
}

impl Custody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vault() -> Address {
        VAULT_ADDRESS
    }

    /// Opens a journal. Any journal already open is discarded.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Closes the journal, keeping every change made since [`Custody::begin`].
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Closes the journal, undoing every change made since [`Custody::begin`].
    /// Returns the number of changes undone.
    pub fn rollback(&mut self) -> usize {
        let Some(journal) = self.journal.take() else {
            return 0;
        };
        let undone = journal.len();
        for entry in journal.into_iter().rev() {
            match entry {
                Undo::Balance {
                    asset,
                    account,
                    previous,
                } => self.write_balance(asset, account, previous.unwrap_or(0)),
                Undo::Owner { item, previous } => match previous {
                    Some(owner) => {
                        self.owners.insert(item, owner);
                    }
                    None => {
                        self.owners.remove(&item);
                    }
                },
                Undo::Message => {
                    self.outbox.pop();
                }
            }
        }
        undone
    }

    pub fn balance_of(&self, asset: &AssetKey, account: &Address) -> u128 {
        self.balances
            .get(asset)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every account's balance for `asset`.
    pub fn total_of(&self, asset: &AssetKey) -> u128 {
        self.balances
            .get(asset)
            .map(|accounts| accounts.values().fold(0u128, |acc, v| acc.saturating_add(*v)))
            .unwrap_or(0)
    }

    pub fn credit(&mut self, asset: AssetKey, account: Address, amount: u128) -> Result<(), CustodyError> {
        let updated = self
            .balance_of(&asset, &account)
            .checked_add(amount)
            .ok_or(CustodyError::Overflow)?;
        self.set_balance(asset, account, updated);
        Ok(())
    }

    pub fn debit(&mut self, asset: AssetKey, account: Address, amount: u128) -> Result<(), CustodyError> {
        let available = self.balance_of(&asset, &account);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        self.set_balance(asset, account, available - amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        asset: AssetKey,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), CustodyError> {
        if from == to {
            let available = self.balance_of(&asset, &from);
            if available < amount {
                return Err(CustodyError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            }
            return Ok(());
        }
        // Check the credit side first so a failed transfer leaves no trace.
        self.balance_of(&asset, &to)
            .checked_add(amount)
            .ok_or(CustodyError::Overflow)?;
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount)
    }

    pub fn owner_of(&self, item: &AssetKey) -> Option<Address> {
        self.owners.get(item).copied()
    }

    pub fn set_owner(&mut self, item: AssetKey, owner: Address) {
        let previous = self.owners.insert(item, owner);
        self.record(Undo::Owner { item, previous });
    }

    pub fn clear_owner(&mut self, item: &AssetKey) -> Option<Address> {
        let previous = self.owners.remove(item);
        if previous.is_some() {
            self.record(Undo::Owner { item: *item, previous });
        }
        previous
    }

    /// Moves `item` from `from` to `to`, failing unless `from` owns it.
    pub fn move_item(&mut self, item: AssetKey, from: Address, to: Address) -> Result<(), CustodyError> {
        match self.owners.get(&item) {
            Some(owner) if *owner == from => {
                self.set_owner(item, to);
                Ok(())
            }
            _ => Err(CustodyError::NotOwner(item, from)),
        }
    }

    pub fn push_message(&mut self, message: RelayedMessage) {
        self.outbox.push(message);
        self.record(Undo::Message);
    }

    /// Messages queued since the outbox was last drained.
    pub fn messages(&self) -> &[RelayedMessage] {
        &self.outbox
    }

    /// Drains the outbox.
    pub fn take_messages(&mut self) -> Vec<RelayedMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn set_balance(&mut self, asset: AssetKey, account: Address, value: u128) {
        if self.journal.is_some() {
            let previous = self.balances.get(&asset).and_then(|accounts| accounts.get(&account)).copied();
            self.record(Undo::Balance {
                asset,
                account,
                previous,
            });
        }
        self.write_balance(asset, account, value);
    }

    /// Zero balances are not stored.
    fn write_balance(&mut self, asset: AssetKey, account: Address, value: u128) {
        if value == 0 {
            if let Some(accounts) = self.balances.get_mut(&asset) {
                accounts.remove(&account);
                if accounts.is_empty() {
                    self.balances.remove(&asset);
                }
            }
        } else {
            self.balances.entry(asset).or_default().insert(account, value);
        }
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }
}
