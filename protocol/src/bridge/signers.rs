//! # Signer Registry
//!
//! The set of trusted attestor addresses.
//!
//! ## Prefix distinctness
//!
//! The prefix-bitmap duplicate check in [`super::verifier`] identifies a
//! signer by the top byte of its address. That is only sound while no two
//! registered signers share a top byte. Insertion does *not* reject a
//! colliding address (the registry stays a plain set), so distinctness is an
//! operational invariant: operators pick prefix-distinct keys, and the
//! registry reports whether the invariant currently holds so the verifier
//! can refuse to rely on it when it doesn't.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{BridgeError, BridgeResult};
use crate::crypto::Address;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerRegistry {
    signers: BTreeSet<Address>,
    /// Registered signers per address prefix, kept in step with `signers`.
    prefixes: BTreeMap<u8, usize>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted signers without re-announcing
    /// prefix collisions that were already reported when they were added.
    pub fn from_signers(list: &[Address]) -> BridgeResult<Self> {
        if list.iter().any(Address::is_zero) {
            return Err(BridgeError::ZeroAddress);
        }
        let mut registry = Self::new();
        for signer in list {
            registry.insert(*signer);
        }
        if !registry.has_distinct_prefixes() {
            tracing::debug!(
                colliding = ?registry.colliding_prefixes(),
                "restored signer set has colliding prefixes"
            );
        }
        Ok(registry)
    }

    /// Adds every address in `list`. Re-adding a present signer is a no-op.
    ///
    /// The list is validated in full before anything is inserted, so a zero
    /// address anywhere leaves the registry untouched. Returns the addresses
    /// that were actually new.
    pub fn add_signers(&mut self, list: &[Address]) -> BridgeResult<Vec<Address>> {
        if list.is_empty() {
            return Err(BridgeError::EmptyInput);
        }
        if list.iter().any(Address::is_zero) {
            return Err(BridgeError::ZeroAddress);
        }

        let mut added = Vec::new();
        for signer in list {
            if self.signers.contains(signer) {
                continue;
            }
            if self.prefixes.contains_key(&signer.prefix()) {
                tracing::warn!(
                    signer = %signer,
                    prefix = signer.prefix(),
                    "signer prefix collides with an existing signer; prefix-bitmap dedup disabled"
                );
            }
            self.insert(*signer);
            added.push(*signer);
        }
        Ok(added)
    }

    /// Removes every address in `list`. Absent addresses are ignored.
    /// Returns the addresses that were actually removed.
    pub fn remove_signers(&mut self, list: &[Address]) -> BridgeResult<Vec<Address>> {
        if list.is_empty() {
            return Err(BridgeError::EmptyInput);
        }
        let had_collision = !self.has_distinct_prefixes();
        let removed: Vec<Address> = list.iter().filter(|signer| self.remove(signer)).copied().collect();
        if had_collision && self.has_distinct_prefixes() {
            tracing::info!("signer prefixes are distinct again; prefix-bitmap dedup re-enabled");
        }
        Ok(removed)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// All signers in ascending address order.
    pub fn signers(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Whether every registered signer has a unique address prefix. O(1).
    pub fn has_distinct_prefixes(&self) -> bool {
        self.prefixes.len() == self.signers.len()
    }

    /// Prefixes shared by two or more registered signers.
    pub fn colliding_prefixes(&self) -> Vec<u8> {
        self.prefixes
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(prefix, _)| *prefix)
            .collect()
    }

    fn insert(&mut self, signer: Address) -> bool {
        if !self.signers.insert(signer) {
            return false;
        }
        *self.prefixes.entry(signer.prefix()).or_insert(0) += 1;
        true
    }

    fn remove(&mut self, signer: &Address) -> bool {
        if !self.signers.remove(signer) {
            return false;
        }
        if let Some(count) = self.prefixes.get_mut(&signer.prefix()) {
            *count -= 1;
            if *count == 0 {
                self.prefixes.remove(&signer.prefix());
            }
        }
        true
    }
}
