//! # Message Handler
//!
//! Arbitrary payloads. Dispatch queues an outbound entry from the caller for
//! attestors to pick up; redeem queues the delivered inbound message. The
//! gateway drains both into its event log.

use serde::{Deserialize, Serialize};

use conduit_protocol::bridge::{
    decode_details, AssetHandler, AssetType, BatchExecutor, Custody, HandlerError,
    MessageDirection, NetworkId, RelayedMessage,
};
use conduit_protocol::config::MAX_DETAILS_BYTES;
use conduit_protocol::crypto::{Address, Digest};

use crate::{canonical_digest, ensure};

pub const KIND: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub sequence: u64,
    pub destination: NetworkId,
    pub recipient: Address,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub source: NetworkId,
    pub sequence: u64,
    pub sender: Address,
    pub recipient: Address,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MessageHandler;

impl AssetHandler for MessageHandler {
    fn name(&self) -> &str {
        KIND
    }

    fn operation_hash(
        &self,
        network: &NetworkId,
        asset_type: AssetType,
        details: &[u8],
    ) -> Result<Digest, HandlerError> {
        canonical_digest::<InboundMessage>(network, asset_type, details)
    }

    fn dispatch(&self, caller: Address, custody: &mut Custody, details: &[u8]) -> Result<(), HandlerError> {
        ensure(details.len() <= MAX_DETAILS_BYTES, "message too large")?;
        let message: OutboundMessage = decode_details(details)?;
        ensure(!message.recipient.is_zero(), "recipient must not be zero")?;

        custody.push_message(RelayedMessage {
            direction: MessageDirection::Outbound,
            network: message.destination,
            from: caller,
            to: message.recipient,
            payload: message.payload,
        });
        Ok(())
    }

    fn redeem(
        &self,
        _batcher: &dyn BatchExecutor,
        custody: &mut Custody,
        details: &[u8],
    ) -> Result<(), HandlerError> {
        let message: InboundMessage = decode_details(details)?;
        ensure(!message.recipient.is_zero(), "recipient must not be zero")?;

        tracing::debug!(
            source = %message.source,
            sequence = message.sequence,
            bytes = message.payload.len(),
            "message delivered"
        );
        custody.push_message(RelayedMessage {
            direction: MessageDirection::Inbound,
            network: message.source,
            from: message.sender,
            to: message.recipient,
            payload: message.payload,
        });
        Ok(())
    }
}
