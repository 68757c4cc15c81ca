//! Gateway events.
//!
//! Dispatch events are what attestors watch for. Relayed messages are the
//! drained gateway outbox. The rest record administrative changes. Serialized as internally tagged JSON for the node
//! API (`{"event": "redeemed", ...}`).

use serde::{Deserialize, Serialize};

use super::custody::MessageDirection;
use super::types::{AssetType, NetworkId};
use crate::crypto::{Address, Digest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    Dispatched {
        asset_type: AssetType,
        /// The authenticated account the handler debited.
        caller: Address,
        #[serde(with = "hex_bytes")]
        details: Vec<u8>,
    },
    Redeemed {
        asset_type: AssetType,
        digest: Digest,
        signers: Vec<Address>,
    },
    MessageRelayed {
        direction: MessageDirection,
        network: NetworkId,
        from: Address,
        to: Address,
        #[serde(with = "hex_bytes")]
        payload: Vec<u8>,
    },
    SignersAdded {
        signers: Vec<Address>,
    },
    SignersRemoved {
        signers: Vec<Address>,
    },
    ThresholdChanged {
        old: usize,
        new: usize,
    },
    HandlerAdded {
        asset_type: AssetType,
        kind: String,
        address: Address,
    },
    HandlerRemoved {
        asset_type: AssetType,
    },
    BatcherChanged {
        old: Address,
        new: Address,
    },
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
