//! Transfer content hashing and origin derivation.
//!
//! Every transfer reduces to a content hash, the Merkle leaf the source
//! chain signs, and an `origin`, the 32-byte replay-protection key every
//! destination contract consumes. Both are keccak256 over a
//! length-prefixed encoding of the fields the destination commits to, so
//! any change to the transfer's destination-relevant content produces a
//! different origin.

use alloy_primitives::{B256, U256, hex, keccak256};

use crate::proto::rarimocore::Transfer;
use crate::proto::tokenmanager::{BridgeNetworkParams, Collection, CollectionData, Item};

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("transfer has no destination")]
    MissingDestination,
    #[error("invalid hex in {field}: {source}")]
    InvalidHex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),
}

/// The signed leaf content of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferContent {
    pub content_hash: B256,
    pub origin: B256,
}

/// Parses a decimal amount string; empty means 1.
pub fn amount_or_default(raw: &str) -> Result<U256, ContentError> {
    if raw.is_empty() {
        return Ok(U256::from(1));
    }
    U256::from_str_radix(raw, 10).map_err(|_| ContentError::InvalidAmount(raw.to_owned()))
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, ContentError> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(value).map_err(|source| ContentError::InvalidHex { field, source })
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buf.extend_from_slice(field);
}

/// Computes the content hash and origin of a transfer.
pub fn transfer_content(
    collection: &Collection,
    collection_data: &CollectionData,
    item: &Item,
    bridge_params: &BridgeNetworkParams,
    transfer: &Transfer,
) -> Result<TransferContent, ContentError> {
    let to = transfer
        .to
        .as_ref()
        .ok_or(ContentError::MissingDestination)?;

    let receiver = decode_hex("receiver", &transfer.receiver)?;
    let token_address = decode_hex("to.address", &to.address)?;
    let token_id = decode_hex("to.token_id", &to.token_id)?;
    let bundle_data = decode_hex("bundle_data", &transfer.bundle_data)?;
    let bundle_salt = decode_hex("bundle_salt", &transfer.bundle_salt)?;
    let amount = amount_or_default(&transfer.amount)?;

    let uri = item
        .meta
        .as_ref()
        .map(|meta| meta.uri.as_str())
        .unwrap_or_default();

    let mut buf = Vec::new();
    push_field(&mut buf, receiver.as_slice());
    push_field(&mut buf, token_address.as_slice());
    push_field(&mut buf, token_id.as_slice());
    push_field(&mut buf, &amount.to_be_bytes::<32>());
    push_field(&mut buf, bundle_data.as_slice());
    push_field(&mut buf, bundle_salt.as_slice());
    push_field(&mut buf, to.chain.as_bytes());
    push_field(&mut buf, bridge_params.contract.as_bytes());
    push_field(&mut buf, collection.index.as_bytes());
    push_field(&mut buf, uri.as_bytes());
    buf.push(collection_data.token_type as u8);
    buf.push(collection_data.wrapped as u8);
    buf.push(collection_data.decimals as u8);

    let content_hash = keccak256(&buf);

    let mut origin_buf = Vec::with_capacity(transfer.origin.len() + 32);
    origin_buf.extend_from_slice(transfer.origin.as_bytes());
    origin_buf.extend_from_slice(content_hash.as_slice());
    let origin = keccak256(&origin_buf);

    Ok(TransferContent {
        content_hash,
        origin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::rarimocore::OnChainItemIndex;
    use crate::proto::tokenmanager::TokenType;

    fn fixture() -> (Collection, CollectionData, Item, BridgeNetworkParams, Transfer) {
        let collection = Collection {
            index: "col-1".to_owned(),
            meta: None,
            data: vec![],
        };
        let collection_data = CollectionData {
            index: None,
            collection: "col-1".to_owned(),
            token_type: TokenType::Erc721 as i32,
            wrapped: true,
            decimals: 0,
        };
        let item = Item {
            index: "item-1".to_owned(),
            collection: "col-1".to_owned(),
            meta: None,
            on_chain: vec![],
        };
        let bridge_params = BridgeNetworkParams {
            contract: "0x00000000000000000000000000000000000000cc".to_owned(),
        };
        let transfer = Transfer {
            origin: "evt-77".to_owned(),
            tx: String::new(),
            event_id: String::new(),
            receiver: "0x000000000000000000000000000000000000dead".to_owned(),
            amount: String::new(),
            bundle_data: String::new(),
            bundle_salt: String::new(),
            from: None,
            to: Some(OnChainItemIndex {
                chain: "Ethereum".to_owned(),
                address: "0x00000000000000000000000000000000000000aa".to_owned(),
                token_id: "0x01".to_owned(),
            }),
        };
        (collection, collection_data, item, bridge_params, transfer)
    }

    #[test]
    fn deterministic_origin() {
        let (collection, data, item, params, transfer) = fixture();
        let a = transfer_content(&collection, &data, &item, &params, &transfer).expect("content");
        let b = transfer_content(&collection, &data, &item, &params, &transfer).expect("content");
        assert_eq!(a, b);
        assert_ne!(a.content_hash, B256::ZERO);
        assert_ne!(a.origin, a.content_hash);
    }

    #[test]
    fn origin_changes_with_content() {
        let (collection, data, item, params, transfer) = fixture();
        let base = transfer_content(&collection, &data, &item, &params, &transfer).expect("content");

        let mut other = transfer.clone();
        other.receiver = "0x000000000000000000000000000000000000beef".to_owned();
        let changed = transfer_content(&collection, &data, &item, &params, &other).expect("content");
        assert_ne!(base.origin, changed.origin);

        let mut renamed = transfer.clone();
        renamed.origin = "evt-78".to_owned();
        let moved = transfer_content(&collection, &data, &item, &params, &renamed).expect("content");
        assert_eq!(base.content_hash, moved.content_hash);
        assert_ne!(base.origin, moved.origin);
    }

    #[test]
    fn empty_amount_means_one() {
        assert_eq!(amount_or_default("").expect("default"), U256::from(1));
        assert_eq!(amount_or_default("25").expect("parse"), U256::from(25));
        assert!(amount_or_default("0x10").is_err());
        assert!(amount_or_default("not-a-number").is_err());
    }

    #[test]
    fn missing_destination_rejected() {
        let (collection, data, item, params, mut transfer) = fixture();
        transfer.to = None;
        assert!(matches!(
            transfer_content(&collection, &data, &item, &params, &transfer),
            Err(ContentError::MissingDestination)
        ));
    }
}
