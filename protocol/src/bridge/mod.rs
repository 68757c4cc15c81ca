//! # Bridge Authorization Core
//!
//! ```text
//! signers.rs   Signer Registry: trusted attestor addresses
//! verifier.rs  Threshold Verifier: recovery, duplicate rejection, quorum
//! nonce.rs     Nonce Ledger: consumed operation digests
//! handler.rs   Handler Directory and the AssetHandler interface
//! batch.rs     Batch Executor interface and call-list encoding
//! custody.rs   Gateway-owned balances, ownership, outbox, undo journal
//! events.rs    Gateway event log entries
//! gateway.rs   Bridge Gateway: dispatch, redeem, administration
//! ```
//!
//! The gateway exclusively owns every collection above. The verifier and
//! the directory borrow what they need per call; handlers and the batch
//! executor get `&mut Custody` for one call and nothing else.

pub mod batch;
pub mod custody;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handler;
pub mod nonce;
pub mod signers;
pub mod types;
pub mod verifier;

pub use batch::{decode_calls, encode_calls, BatchError, BatchExecutor, BatchFunding, Call};
pub use custody::{AssetKey, Custody, CustodyError, MessageDirection, RelayedMessage};
pub use error::{BridgeError, BridgeResult, ErrorCategory};
pub use events::GatewayEvent;
pub use gateway::{BridgeGateway, GatewaySnapshot};
pub use handler::{decode_details, encode_details, handler_address, AssetHandler, HandlerDirectory, HandlerError};
pub use nonce::NonceLedger;
pub use signers::SignerRegistry;
pub use types::{AssetType, NetworkId};
pub use verifier::{DedupStrategy, PrefixBitmap, ThresholdVerifier, Verification};
