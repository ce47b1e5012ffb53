//! Merkle path verification.
//!
//! Paths come from the source chain's `OperationProof` query; the tree is
//! keccak256 over sorted pairs, the layout the destination bridge
//! contracts verify against. The relayer never rebuilds the tree, it only
//! checks that a leaf folds into the signed root.

use alloy_primitives::{B256, keccak256};

/// Hashes a sorted pair of nodes.
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let mut buf = [0u8; 64];
    if a <= b {
        buf[..32].copy_from_slice(a.as_slice());
        buf[32..].copy_from_slice(b.as_slice());
    } else {
        buf[..32].copy_from_slice(b.as_slice());
        buf[32..].copy_from_slice(a.as_slice());
    }
    keccak256(buf)
}

/// Folds `leaf` up through `path` and compares against `root`.
pub fn verify_path(leaf: B256, path: &[[u8; 32]], root: B256) -> bool {
    let mut node = leaf;
    for sibling in path {
        node = hash_pair(&node, &B256::from(*sibling));
    }
    node == root
}
