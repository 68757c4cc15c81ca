//! # Bridge Gateway
//!
//! Owns every piece of bridge state (signer registry, threshold, nonce
//! ledger, handler directory, batcher, custody) and orchestrates the two
//! user-facing operations.
//!
//! ## Redeem ordering
//!
//! ```text
//! resolve handler -> operation_hash -> nonce check-and-consume
//!                 -> threshold verification -> handler.redeem
//! ```
//!
//! The nonce is consumed before the (more expensive) signature check and
//! before any custody mutation, and it is never un-consumed. A proof that
//! fails verification, or a handler that fails afterwards, still burns the
//! digest. Callers resubmit with different details, which yields a new
//! digest.
//!
//! ## Dispatch authorization
//!
//! A handler only ever debits the `caller` the gateway hands it, never an
//! account named inside the details. [`BridgeGateway::dispatch_signed`]
//! derives that caller from a signature over the dispatch digest and
//! consumes the digest, so a signed dispatch cannot be replayed.
//!
//! ## Atomicity
//!
//! Custody journals every mutation while a handler runs and undoes them if
//! the handler (or the batch executor it calls) fails, so a failed dispatch
//! or redeem leaves balances, ownership and outbox exactly as they were.
//! Messages a successful call queued are drained into events right away.
//! Handlers receive `&mut Custody` only, so they cannot reach back into the
//! gateway while a call is in flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::batch::BatchExecutor;
use super::custody::{Custody, RelayedMessage};
use super::error::{BridgeError, BridgeResult};
use super::events::GatewayEvent;
use super::handler::{AssetHandler, HandlerDirectory, HandlerError};
use super::nonce::NonceLedger;
use super::signers::SignerRegistry;
use super::types::{AssetType, NetworkId};
use super::verifier::{DedupStrategy, ThresholdVerifier};
use crate::crypto::{dispatch_digest, recover_signer, Address, Digest, Signature};

/// Serializable view of all gateway state. Handlers and the batcher are
/// referenced by kind name and address; the caller supplies live instances
/// on [`BridgeGateway::restore`].
///
/// `nonces` is either the whole ledger ([`BridgeGateway::snapshot`]) or only
/// the entries not yet persisted ([`BridgeGateway::pending_snapshot`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySnapshot {
    pub network: NetworkId,
    pub threshold: usize,
    pub dedup: DedupStrategy,
    pub signers: Vec<Address>,
    pub handlers: BTreeMap<AssetType, String>,
    pub batcher: Address,
    pub nonces: Vec<(Digest, i64)>,
    pub custody: Custody,
}

pub struct BridgeGateway {
    network: NetworkId,
    threshold: usize,
    dedup: DedupStrategy,
    signers: SignerRegistry,
    nonces: NonceLedger,
    handlers: HandlerDirectory,
    batcher: Arc<dyn BatchExecutor>,
    custody: Custody,
    events: Vec<GatewayEvent>,
}

impl BridgeGateway {
    pub fn new(
        network: NetworkId,
        threshold: usize,
        dedup: DedupStrategy,
        batcher: Arc<dyn BatchExecutor>,
    ) -> BridgeResult<Self> {
        if network.as_str().is_empty() {
            return Err(BridgeError::EmptyInput);
        }
        if threshold == 0 {
            return Err(BridgeError::InvalidThreshold);
        }
        check_batcher(batcher.address())?;
        tracing::info!(network = %network, threshold, ?dedup, "gateway initialized");
        Ok(Self {
            network,
            threshold,
            dedup,
            signers: SignerRegistry::new(),
            nonces: NonceLedger::new(),
            handlers: HandlerDirectory::new(),
            batcher,
            custody: Custody::new(),
            events: Vec::new(),
        })
    }

    /// Rebuilds a gateway from a snapshot. `resolve_handler` maps each
    /// persisted handler kind back to a live handler.
    pub fn restore<F>(
        snapshot: GatewaySnapshot,
        resolve_handler: F,
        batcher: Arc<dyn BatchExecutor>,
    ) -> BridgeResult<Self>
    where
        F: Fn(&str) -> Option<Arc<dyn AssetHandler>>,
    {
        let mut gateway = Self::new(snapshot.network, snapshot.threshold, snapshot.dedup, batcher)?;
        if gateway.batcher.address() != snapshot.batcher {
            tracing::warn!(
                persisted = %snapshot.batcher,
                supplied = %gateway.batcher.address(),
                "restored gateway uses a different batcher than it was saved with"
            );
        }
        gateway.signers = SignerRegistry::from_signers(&snapshot.signers)?;
        for (asset_type, kind) in &snapshot.handlers {
            let handler = resolve_handler(kind).ok_or(BridgeError::UnsupportedAssetType(*asset_type))?;
            gateway.handlers.add_handler(*asset_type, handler)?;
        }
        gateway.nonces = NonceLedger::from_entries(snapshot.nonces);
        gateway.custody = snapshot.custody;
        tracing::info!(
            signers = gateway.signers.len(),
            handlers = gateway.handlers.len(),
            nonces = gateway.nonces.len(),
            "gateway restored"
        );
        Ok(gateway)
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            nonces: self.nonces.entries(),
            ..self.snapshot_without_nonces()
        }
    }

    /// Like [`BridgeGateway::snapshot`], but carries only the nonces consumed
    /// since the last [`BridgeGateway::mark_persisted`].
    pub fn pending_snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            nonces: self.nonces.unsaved_entries(),
            ..self.snapshot_without_nonces()
        }
    }

    /// Records that `snapshot` reached durable storage.
    pub fn mark_persisted(&mut self, snapshot: &GatewaySnapshot) {
        self.nonces.mark_persisted(&snapshot.nonces);
    }

    fn snapshot_without_nonces(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            network: self.network.clone(),
            threshold: self.threshold,
            dedup: self.dedup,
            signers: self.signers.signers(),
            handlers: self.handlers.entries().into_iter().collect(),
            batcher: self.batcher.address(),
            nonces: Vec::new(),
            custody: self.custody.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Runs the handler's lock/burn logic for an outbound transfer on behalf
    /// of `caller`, whose identity the host has already established.
    pub fn dispatch(&mut self, caller: Address, asset_type: AssetType, details: &[u8]) -> BridgeResult<()> {
        if caller.is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        let handler = self.handlers.resolve(asset_type)?;

        let result = self.journaled(|custody| handler.dispatch(caller, custody, details));
        if let Err(e) = result {
            tracing::warn!(asset_type, caller = %caller, handler = handler.name(), error = %e, "dispatch rejected");
            return Err(execution_error(e));
        }

        tracing::info!(asset_type, caller = %caller, handler = handler.name(), bytes = details.len(), "dispatched");
        self.events.push(GatewayEvent::Dispatched {
            asset_type,
            caller,
            details: details.to_vec(),
        });
        self.relay_messages();
        Ok(())
    }

    /// Dispatch authorized by the caller's signature over
    /// [`dispatch_digest`]. The recovered address is the caller. The digest
    /// is consumed before the handler runs and stays consumed if it fails,
    /// so each signed request runs at most once. Returns the caller.
    pub fn dispatch_signed(
        &mut self,
        asset_type: AssetType,
        details: &[u8],
        signature: &Signature,
    ) -> BridgeResult<Address> {
        self.handlers.resolve(asset_type)?;
        let digest = dispatch_digest(&self.network, asset_type, details);
        let caller = recover_signer(&digest, signature).map_err(|e| {
            tracing::warn!(asset_type, error = %e, "dispatch signature recovery failed");
            BridgeError::InvalidSigner
        })?;
        self.nonces.check_and_consume(digest)?;
        self.dispatch(caller, asset_type, details)?;
        Ok(caller)
    }

    /// Admits an inbound transfer if `proof` carries a quorum of distinct
    /// trusted signatures over the handler's digest. Returns the digest.
    pub fn redeem(
        &mut self,
        asset_type: AssetType,
        details: &[u8],
        proof: &[Signature],
    ) -> BridgeResult<Digest> {
        let handler = self.handlers.resolve(asset_type)?;
        let digest = handler
            .operation_hash(&self.network, asset_type, details)
            .map_err(execution_error)?;

        self.nonces.check_and_consume(digest)?;

        let verification = ThresholdVerifier::new(&self.signers, self.threshold, self.dedup)
            .verify(&digest, proof)
            .map_err(|e| {
                tracing::warn!(digest = %digest, error = %e, "proof rejected; digest stays consumed");
                e
            })?;

        let batcher = Arc::clone(&self.batcher);
        let result = self.journaled(|custody| handler.redeem(batcher.as_ref(), custody, details));
        if let Err(e) = result {
            tracing::warn!(digest = %digest, handler = handler.name(), error = %e, "redeem execution failed; digest stays consumed");
            return Err(execution_error(e));
        }

        tracing::info!(
            asset_type,
            digest = %digest,
            signers = verification.signers.len(),
            "redeemed"
        );
        self.events.push(GatewayEvent::Redeemed {
            asset_type,
            digest,
            signers: verification.signers,
        });
        self.relay_messages();
        Ok(digest)
    }

    /// The digest a redemption would be keyed by, without consuming anything.
    pub fn operation_hash(&self, asset_type: AssetType, details: &[u8]) -> BridgeResult<Digest> {
        self.handlers
            .resolve(asset_type)?
            .operation_hash(&self.network, asset_type, details)
            .map_err(execution_error)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub fn set_threshold(&mut self, threshold: usize) -> BridgeResult<()> {
        if threshold == 0 {
            return Err(BridgeError::InvalidThreshold);
        }
        if threshold > self.signers.len() {
            tracing::warn!(
                threshold,
                signers = self.signers.len(),
                "threshold exceeds signer count; redemption is impossible until more signers are added"
            );
        }
        let old = std::mem::replace(&mut self.threshold, threshold);
        tracing::info!(old, new = threshold, "threshold changed");
        self.events.push(GatewayEvent::ThresholdChanged { old, new: threshold });
        Ok(())
    }

    pub fn add_signers(&mut self, list: &[Address]) -> BridgeResult<Vec<Address>> {
        let added = self.signers.add_signers(list)?;
        tracing::info!(added = added.len(), total = self.signers.len(), "signers added");
        if !added.is_empty() {
            self.events.push(GatewayEvent::SignersAdded { signers: added.clone() });
        }
        Ok(added)
    }

    pub fn remove_signers(&mut self, list: &[Address]) -> BridgeResult<Vec<Address>> {
        let removed = self.signers.remove_signers(list)?;
        tracing::info!(removed = removed.len(), total = self.signers.len(), "signers removed");
        if !removed.is_empty() {
            self.events.push(GatewayEvent::SignersRemoved {
                signers: removed.clone(),
            });
        }
        Ok(removed)
    }

    pub fn add_handler(&mut self, asset_type: AssetType, handler: Arc<dyn AssetHandler>) -> BridgeResult<()> {
        let kind = handler.name().to_string();
        let address = handler.address();
        self.handlers.add_handler(asset_type, handler)?;
        tracing::info!(asset_type, kind = %kind, "handler added");
        self.events.push(GatewayEvent::HandlerAdded {
            asset_type,
            kind,
            address,
        });
        Ok(())
    }

    pub fn remove_handler(&mut self, asset_type: AssetType) -> BridgeResult<()> {
        let handler = self.handlers.remove_handler(asset_type)?;
        tracing::info!(asset_type, kind = handler.name(), "handler removed");
        self.events.push(GatewayEvent::HandlerRemoved { asset_type });
        Ok(())
    }

    pub fn set_batcher(&mut self, batcher: Arc<dyn BatchExecutor>) -> BridgeResult<()> {
        let new = batcher.address();
        check_batcher(new)?;
        let old = self.batcher.address();
        self.batcher = batcher;
        tracing::info!(old = %old, new = %new, "batcher changed");
        self.events.push(GatewayEvent::BatcherChanged { old, new });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn dedup(&self) -> DedupStrategy {
        self.dedup
    }

    pub fn signers(&self) -> &SignerRegistry {
        &self.signers
    }

    pub fn nonces(&self) -> &NonceLedger {
        &self.nonces
    }

    pub fn handlers(&self) -> &HandlerDirectory {
        &self.handlers
    }

    pub fn batcher(&self) -> Address {
        self.batcher.address()
    }

    pub fn custody(&self) -> &Custody {
        &self.custody
    }

    /// Direct custody access for the host ledger (seeding balances in local
    /// deployments and tests). Not reachable from handlers.
    pub fn custody_mut(&mut self) -> &mut Custody {
        &mut self.custody
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<GatewayEvent> {
        std::mem::take(&mut self.events)
    }

    /// Runs `f` against custody, undoing its changes if it fails.
    fn journaled<F>(&mut self, f: F) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut Custody) -> Result<(), HandlerError>,
    {
        self.custody.begin();
        match f(&mut self.custody) {
            Ok(()) => {
                self.custody.commit();
                Ok(())
            }
            Err(e) => {
                let undone = self.custody.rollback();
                tracing::debug!(undone, "custody changes rolled back");
                Err(e)
            }
        }
    }

    fn relay_messages(&mut self) {
        for RelayedMessage {
            direction,
            network,
            from,
            to,
            payload,
        } in self.custody.take_messages()
        {
            self.events.push(GatewayEvent::MessageRelayed {
                direction,
                network,
                from,
                to,
                payload,
            });
        }
    }
}

/// Batchers spend from their own account, so it must be neither null nor
/// the vault that backs every locked deposit.
fn check_batcher(address: Address) -> BridgeResult<()> {
    if address.is_zero() {
        return Err(BridgeError::ZeroAddress);
    }
    if address == Custody::vault() {
        return Err(BridgeError::ReservedAddress(address));
    }
    Ok(())
}

fn execution_error(e: HandlerError) -> BridgeError {
    match e {
        HandlerError::Batch(batch) => BridgeError::Batch(batch),
        other => BridgeError::Handler(other),
    }
}
