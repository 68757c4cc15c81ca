//! # Protocol Configuration & Constants
//!
//! Every magic number in Conduit lives here, together with the
//! [`GatewayConfig`] a deployment is bootstrapped from.
//!
//! The digest layout constants are part of the wire contract with the
//! off-protocol attestors. Changing any of them after signers are live
//! invalidates every signature they have ever produced for this network.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bridge::types::{AssetType, NetworkId};
use crate::bridge::verifier::DedupStrategy;
use crate::crypto::keys::Address;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the authorization core.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Domain separation tag prepended to every operation digest preimage.
/// Keeps Conduit digests from ever colliding with a digest some other
/// protocol asks the same attestor keys to sign.
pub const DIGEST_DOMAIN_TAG: &[u8] = b"CONDUIT/OPERATION/v1";

/// Domain separation tag for the digest a caller signs to authorize a
/// dispatch. Distinct from [`DIGEST_DOMAIN_TAG`] so an attestor proof can
/// never double as a caller's dispatch authorization, or the reverse.
pub const DISPATCH_DOMAIN_TAG: &[u8] = b"CONDUIT/DISPATCH/v1";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Attestor signatures are recoverable secp256k1 ECDSA.
pub const SIGNING_ALGORITHM: &str = "secp256k1-ecdsa-recoverable";

/// Operation digest length in bytes (Keccak-256 output).
pub const DIGEST_LENGTH: usize = 32;

/// Address length in bytes: the low 20 bytes of the Keccak-256 of the
/// uncompressed public key.
pub const ADDRESS_LENGTH: usize = 20;

/// Detached signature length: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Number of distinct address prefixes the duplicate-detection bitmap can
/// represent. One bit per possible value of the address's top byte.
pub const PREFIX_SPACE: usize = 256;

// ---------------------------------------------------------------------------
// Node Surface Limits
// ---------------------------------------------------------------------------

/// Upper bound on signatures accepted in one proof by the HTTP surface.
/// The core itself enforces no maximum; this only caps request size.
pub const MAX_PROOF_SIGNATURES: usize = PREFIX_SPACE;

/// Upper bound on a details payload accepted by the HTTP surface.
pub const MAX_DETAILS_BYTES: usize = 64 * 1024;

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Gateway Configuration
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`GatewayConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("network id must not be empty")]
    EmptyNetworkId,

    #[error("threshold must be at least 1")]
    ZeroThreshold,

    #[error("signer list contains the zero address")]
    ZeroSigner,

    #[error("batcher address must not be the zero address")]
    ZeroBatcher,
}

/// Bootstrap configuration for one gateway deployment.
///
/// Loaded from a JSON file by the node. Handler entries name a handler
/// *kind*; the node resolves kinds to concrete handler implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Identifier of the ledger this gateway runs on.
    pub network_id: NetworkId,
    /// Minimum number of distinct trusted signatures per redemption.
    pub threshold: u32,
    /// Initial attestor set.
    #[serde(default)]
    pub signers: Vec<Address>,
    /// Duplicate-signature detection strategy.
    #[serde(default)]
    pub dedup: DedupStrategy,
    /// Asset type to handler kind.
    #[serde(default)]
    pub handlers: BTreeMap<AssetType, String>,
    /// Account of the batch executor the gateway forwards payouts through.
    pub batcher: Address,
}

impl GatewayConfig {
    /// Reads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: GatewayConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the structural invariants a gateway cannot start without.
    ///
    /// A threshold above the signer count is accepted: it is legal, it just
    /// makes redemption impossible until more signers are added.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network_id.as_str().is_empty() {
            return Err(ConfigError::EmptyNetworkId);
        }
        if self.threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.signers.iter().any(Address::is_zero) {
            return Err(ConfigError::ZeroSigner);
        }
        if self.batcher.is_zero() {
            return Err(ConfigError::ZeroBatcher);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> GatewayConfig {
        GatewayConfig {
            network_id: NetworkId::new("ledger-a"),
            threshold: 2,
            signers: vec![Address::from_bytes([0x11; 20]), Address::from_bytes([0x22; 20])],
            dedup: DedupStrategy::PrefixBitmap,
            handlers: BTreeMap::from([(1, "fungible".to_string())]),
            batcher: Address::from_bytes([0xBA; 20]),
        }
    }

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(DIGEST_LENGTH, 32);
        assert_eq!(ADDRESS_LENGTH, 20);
        assert_eq!(SIGNATURE_LENGTH, 65);
        assert_eq!(PREFIX_SPACE, 1 << 8);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = sample();
        config.threshold = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroThreshold)));
    }

    #[test]
    fn test_zero_signer_rejected() {
        let mut config = sample();
        config.signers.push(Address::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSigner)));
    }

    #[test]
    fn test_empty_network_rejected() {
        let mut config = sample();
        config.network_id = NetworkId::new("");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyNetworkId)));
    }

    #[test]
    fn test_threshold_above_signer_count_is_allowed() {
        let mut config = sample();
        config.threshold = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string_pretty(&sample()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            GatewayConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
