//! # Nonce Ledger
//!
//! The set of consumed operation digests. Monotone: there is deliberately no
//! way to remove an entry, so a digest that has been consumed (successfully
//! or not) can never be presented again.
//!
//! The ledger also remembers which digests were consumed since the host last
//! persisted it, so a save only has to write what is new.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{BridgeError, BridgeResult};
use crate::crypto::Digest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonceLedger {
    /// Digest to consumed-at time in Unix milliseconds.
    consumed: BTreeMap<Digest, i64>,
    /// Consumed but not yet reported persisted.
    unsaved: BTreeSet<Digest>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted `(digest, consumed_at)` entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (Digest, i64)>) -> Self {
        Self {
            consumed: entries.into_iter().collect(),
            unsaved: BTreeSet::new(),
        }
    }

    /// Marks `digest` consumed, or fails if it already was.
    pub fn check_and_consume(&mut self, digest: Digest) -> BridgeResult<()> {
        if self.consumed.contains_key(&digest) {
            tracing::warn!(digest = %digest, "replayed digest rejected");
            return Err(BridgeError::NonceUsed(digest));
        }
        let now = chrono::Utc::now().timestamp_millis();
        self.consumed.insert(digest, now);
        self.unsaved.insert(digest);
        tracing::debug!(digest = %digest, consumed_at = now, "nonce consumed");
        Ok(())
    }

    pub fn is_consumed(&self, digest: &Digest) -> bool {
        self.consumed.contains_key(digest)
    }

    pub fn consumed_at(&self, digest: &Digest) -> Option<i64> {
        self.consumed.get(digest).copied()
    }

    pub fn entries(&self) -> Vec<(Digest, i64)> {
        self.consumed.iter().map(|(d, t)| (*d, *t)).collect()
    }

    /// Entries consumed since the last [`NonceLedger::mark_persisted`].
    pub fn unsaved_entries(&self) -> Vec<(Digest, i64)> {
        self.unsaved
            .iter()
            .filter_map(|d| self.consumed.get(d).map(|t| (*d, *t)))
            .collect()
    }

    /// Records that `entries` reached durable storage.
    pub fn mark_persisted(&mut self, entries: &[(Digest, i64)]) {
        for (digest, _) in entries {
            self.unsaved.remove(digest);
        }
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}
