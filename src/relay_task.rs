//! The queue wire format.
//!
//! A relay task carries the minimum needed to re-hydrate a transfer on the
//! consumer side: the operation index, the batch signature, the derived
//! origin and the Merkle path. Destination descriptors are re-queried at
//! consume time so metadata changes between scheduling and execution are
//! tolerated.

use serde::{Deserialize, Serialize};

use crate::core::TransferDetails;

/// Serialized as JSON; field names are part of the wire format and stay
/// stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTask {
    #[serde(rename = "OperationIndex")]
    pub operation_index: String,
    /// 65-byte recoverable ECDSA signature, 0x-hex.
    #[serde(rename = "Signature")]
    pub signature: String,
    /// 32-byte replay-protection key, 0x-hex.
    #[serde(rename = "Origin")]
    pub origin: String,
    /// Sibling hashes from leaf to signed root, 0x-hex.
    #[serde(rename = "MerklePath")]
    pub merkle_path: Vec<String>,
    #[serde(rename = "RetriesLeft")]
    pub retries_left: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayTaskError {
    #[error("malformed relay task payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("malformed merkle path entry {0:?}")]
    MalformedPath(String),
}

impl RelayTask {
    pub fn new(details: &TransferDetails, max_retries: u32) -> Self {
        Self {
            operation_index: details.transfer.origin.clone(),
            signature: details.signature.clone(),
            origin: details.origin.clone(),
            merkle_path: details
                .merkle_path
                .iter()
                .map(|hash| format!("0x{}", hex::encode(hash)))
                .collect(),
            retries_left: max_retries,
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("relay task serializes to JSON")
    }

    pub fn unmarshal(payload: &[u8]) -> Result<Self, RelayTaskError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Decodes the path back into raw 32-byte hashes.
    pub fn parse_merkle_path(&self) -> Result<Vec<[u8; 32]>, RelayTaskError> {
        self.merkle_path
            .iter()
            .map(|entry| {
                let stripped = entry.strip_prefix("0x").unwrap_or(entry);
                hex::decode(stripped)
                    .ok()
                    .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
                    .ok_or_else(|| RelayTaskError::MalformedPath(entry.clone()))
            })
            .collect()
    }

    /// A copy with one retry spent. `None` when the budget is exhausted.
    pub fn into_retry(mut self) -> Option<Self> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        Some(self)
    }
}
