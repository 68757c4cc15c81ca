//! Small value types shared across the bridge modules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier of an asset family (fungible, non-fungible, ...).
/// The mapping from number to family is a deployment decision.
pub type AssetType = u32;

/// Immutable identifier of the ledger a gateway instance lives on.
///
/// Bound into every operation digest so a proof collected for one
/// deployment can never be replayed against another.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({})", self.0)
    }
}
