//! # ConduitDB
//!
//! sled-backed persistence for gateway state. The node writes a
//! [`GatewaySnapshot`] after every state-changing call and reads it back on
//! startup. Every save is one multi-tree transaction: a consumed nonce is
//! never durable without the custody effect of the call that consumed it.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                   | Value                        |
//! |------------|-----------------------|------------------------------|
//! | `nonces`   | digest (32B)          | consumed-at millis (8B BE)   |
//! | `signers`  | address (20B)         | empty                        |
//! | `handlers` | asset type (4B BE)    | handler kind (UTF-8)         |
//! | `custody`  | `"state"`             | `bincode(Custody)`           |
//! | `metadata` | key (UTF-8)           | value (bytes)                |
//!
//! The nonce tree is append-only: saving a snapshot inserts digests it has
//! not seen and never deletes one, so a snapshot may carry only the nonces
//! consumed since the previous save. Signers and handlers are rewritten in
//! full since administrative removals must be reflected.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, Tree};

use crate::bridge::{AssetType, Custody, DedupStrategy, GatewaySnapshot, NetworkId};
use crate::crypto::{Address, Digest};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_NETWORK: &[u8] = b"network_id";
const META_THRESHOLD: &[u8] = b"threshold";
const META_BATCHER: &[u8] = b"batcher";
const META_DEDUP: &[u8] = b"dedup";
const CUSTODY_KEY: &[u8] = b"state";

// ---------------------------------------------------------------------------
// ConduitDB
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConduitDB {
    db: Db,
    nonces: Tree,
    signers: Tree,
    handlers: Tree,
    custody: Tree,
    metadata: Tree,
}

impl ConduitDB {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database, removed on drop.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            nonces: db.open_tree("nonces")?,
            signers: db.open_tree("signers")?,
            handlers: db.open_tree("handlers")?,
            custody: db.open_tree("custody")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    /// Whether a gateway has ever been saved here.
    pub fn is_initialized(&self) -> DbResult<bool> {
        Ok(self.metadata.contains_key(META_NETWORK)?)
    }

    pub fn save_snapshot(&self, snapshot: &GatewaySnapshot) -> DbResult<()> {
        self.save_snapshot_with(snapshot, || Ok(()))
    }

    /// Writes `snapshot` in a single transaction. `precommit` runs after
    /// every write is staged; an error from it aborts the whole save.
    fn save_snapshot_with<F>(&self, snapshot: &GatewaySnapshot, precommit: F) -> DbResult<()>
    where
        F: Fn() -> DbResult<()>,
    {
        let mut signer_batch = Batch::default();
        for existing in self.signers.iter().keys() {
            signer_batch.remove(existing?);
        }
        for signer in &snapshot.signers {
            signer_batch.insert(&signer.as_bytes()[..], &b""[..]);
        }

        let mut handler_batch = Batch::default();
        for existing in self.handlers.iter().keys() {
            handler_batch.remove(existing?);
        }
        for (asset_type, kind) in &snapshot.handlers {
            handler_batch.insert(&asset_type.to_be_bytes()[..], kind.as_bytes());
        }

        let custody_bytes = encode(&snapshot.custody)?;

        let mut meta = Batch::default();
        meta.insert(META_NETWORK, snapshot.network.as_str().as_bytes());
        meta.insert(META_THRESHOLD, &(snapshot.threshold as u64).to_be_bytes()[..]);
        meta.insert(META_BATCHER, &snapshot.batcher.as_bytes()[..]);
        meta.insert(META_DEDUP, encode(&snapshot.dedup)?);

        (&self.nonces, &self.signers, &self.handlers, &self.custody, &self.metadata)
            .transaction(|(nonces, signers, handlers, custody, metadata)| {
                for (digest, consumed_at) in &snapshot.nonces {
                    if nonces.get(digest.as_bytes())?.is_none() {
                        nonces.insert(&digest.as_bytes()[..], &consumed_at.to_be_bytes()[..])?;
                    }
                }
                signers.apply_batch(&signer_batch)?;
                handlers.apply_batch(&handler_batch)?;
                custody.insert(CUSTODY_KEY, custody_bytes.as_slice())?;
                metadata.apply_batch(&meta)?;
                precommit().map_err(ConflictableTransactionError::Abort)?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => DbError::Sled(e),
            })?;

        self.db.flush()?;
        tracing::debug!(
            nonces = self.nonces.len(),
            new_nonces = snapshot.nonces.len(),
            signers = snapshot.signers.len(),
            "gateway snapshot persisted"
        );
        Ok(())
    }

    /// Loads the persisted snapshot, or `None` for a fresh database.
    pub fn load_snapshot(&self) -> DbResult<Option<GatewaySnapshot>> {
        let network = match self.metadata.get(META_NETWORK)? {
            Some(bytes) => NetworkId::new(
                String::from_utf8(bytes.to_vec()).map_err(|e| DbError::Serialization(e.to_string()))?,
            ),
            None => return Ok(None),
        };

        let threshold = self
            .metadata
            .get(META_THRESHOLD)?
            .ok_or_else(|| DbError::NotFound("threshold".into()))?;
        let threshold = u64::from_be_bytes(fixed(&threshold)?) as usize;

        let batcher = self
            .metadata
            .get(META_BATCHER)?
            .ok_or_else(|| DbError::NotFound("batcher".into()))?;
        let batcher = Address::from_bytes(fixed(&batcher)?);

        let dedup: DedupStrategy = match self.metadata.get(META_DEDUP)? {
            Some(bytes) => decode(&bytes)?,
            None => DedupStrategy::default(),
        };

        let mut signers = Vec::with_capacity(self.signers.len());
        for key in self.signers.iter().keys() {
            signers.push(Address::from_bytes(fixed(&key?)?));
        }

        let mut handlers = std::collections::BTreeMap::new();
        for entry in self.handlers.iter() {
            let (key, value) = entry?;
            let asset_type = AssetType::from_be_bytes(fixed(&key)?);
            let kind = String::from_utf8(value.to_vec()).map_err(|e| DbError::Serialization(e.to_string()))?;
            handlers.insert(asset_type, kind);
        }

        let mut nonces = Vec::with_capacity(self.nonces.len());
        for entry in self.nonces.iter() {
            let (key, value) = entry?;
            nonces.push((Digest::from_bytes(fixed(&key)?), i64::from_be_bytes(fixed(&value)?)));
        }

        let custody: Custody = match self.custody.get(CUSTODY_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => Custody::default(),
        };

        Ok(Some(GatewaySnapshot {
            network,
            threshold,
            dedup,
            signers,
            handlers,
            batcher,
            nonces,
            custody,
        }))
    }

    /// Consumed-at time for `digest`, if it was ever consumed.
    pub fn nonce_consumed_at(&self, digest: &Digest) -> DbResult<Option<i64>> {
        match self.nonces.get(digest.as_bytes())? {
            Some(bytes) => Ok(Some(i64::from_be_bytes(fixed(&bytes)?))),
            None => Ok(None),
        }
    }

    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }

    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn fixed<const N: usize>(bytes: &[u8]) -> DbResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("expected {N} bytes, found {}", bytes.len())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
