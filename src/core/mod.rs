//! Source-chain reads and transfer assembly.
//!
//! The assembler expands a confirmation into enriched per-transfer records:
//! the decoded transfer intent, the destination token descriptors, the
//! batch signature, the derived origin and the Merkle path proving the
//! leaf against the signed root.

pub mod client;
pub mod content;
pub mod merkle;

use std::sync::Arc;

use prost::Message;

use crate::proto::rarimocore::{OpType, Operation, Transfer};
use crate::proto::tokenmanager::{Collection, CollectionData, Item, Params, TokenType};
pub use client::{GrpcSourceChain, SourceChain, SourceChainError};
use content::{ContentError, transfer_content};

/// The assembled work unit: everything a bridger needs to build a
/// withdrawal transaction. Lives in memory during assembly and, in
/// reduced form, inside the queue payload.
#[derive(Debug, Clone)]
pub struct TransferDetails {
    pub transfer: Transfer,
    pub collection: Collection,
    pub collection_data: CollectionData,
    pub item: Item,
    /// 65-byte recoverable ECDSA signature over the root, 0x-hex.
    pub signature: String,
    /// 32-byte replay-protection key, 0x-hex.
    pub origin: String,
    pub merkle_path: Vec<[u8; 32]>,
}

impl TransferDetails {
    pub fn token_type(&self) -> TokenType {
        self.collection_data.token_type()
    }

    /// Destination chain name. Assembly guarantees `to` is present.
    pub fn to_chain(&self) -> &str {
        self.transfer
            .to
            .as_ref()
            .map(|to| to.chain.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Client(#[from] SourceChainError),
    #[error("failed to decode transfer details of operation {index}: {source}")]
    MalformedOperation {
        index: String,
        source: prost::DecodeError,
    },
    #[error("bridge params not found for chain {chain}")]
    BridgeParamsNotFound { chain: String },
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("malformed merkle path entry {entry:?} of operation {index}")]
    MalformedProof { index: String, entry: String },
    #[error("transfer {transfer_id} not found in confirmation {confirmation_id}")]
    TransferNotFound {
        confirmation_id: String,
        transfer_id: String,
    },
}

/// Transfer assembler over a [`SourceChain`].
#[derive(Clone)]
pub struct Core {
    client: Arc<dyn SourceChain>,
}

impl Core {
    pub fn new(client: Arc<dyn SourceChain>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn SourceChain> {
        &self.client
    }

    /// Expands a confirmation into per-transfer details, one per TRANSFER
    /// operation, in `confirmation.indexes` order. Any per-transfer
    /// failure aborts the whole batch; the caller retries the block.
    pub async fn get_transfers(
        &self,
        confirmation_id: &str,
    ) -> Result<Vec<TransferDetails>, CoreError> {
        tracing::info!(merkle_root = confirmation_id, "processing a confirmation");

        let confirmation = self.client.confirmation(confirmation_id).await?;
        let params = self.client.token_params().await?;

        let mut transfers = Vec::new();
        for index in &confirmation.indexes {
            let operation = self.client.operation(index).await?;
            if operation.operation_type() != OpType::Transfer {
                continue;
            }

            let mut details = self
                .transfer_details(&params, &confirmation.signature_ecdsa, &operation)
                .await?;

            let proof = self.client.operation_proof(index).await?;
            details.merkle_path = parse_proof_path(index, &proof)?;

            transfers.push(details);
        }

        Ok(transfers)
    }

    /// Resolves one transfer of a confirmation by its derived origin.
    /// Used by the admin relay-task endpoint.
    pub async fn get_transfer(
        &self,
        confirmation_id: &str,
        transfer_id: &str,
    ) -> Result<TransferDetails, CoreError> {
        let transfers = self.get_transfers(confirmation_id).await?;
        transfers
            .into_iter()
            .find(|transfer| transfer.origin == transfer_id)
            .ok_or_else(|| CoreError::TransferNotFound {
                confirmation_id: confirmation_id.to_owned(),
                transfer_id: transfer_id.to_owned(),
            })
    }

    async fn transfer_details(
        &self,
        params: &Params,
        signature: &str,
        operation: &Operation,
    ) -> Result<TransferDetails, CoreError> {
        let details = operation.details.as_ref().map(|any| any.value.as_slice());
        let transfer = Transfer::decode(details.unwrap_or_default()).map_err(|source| {
            CoreError::MalformedOperation {
                index: operation.index.clone(),
                source,
            }
        })?;
        let to = transfer.to.clone().ok_or(ContentError::MissingDestination)?;

        let item = self
            .client
            .item_by_on_chain_item(&to.chain, &to.address, &to.token_id)
            .await?;
        let collection = self.client.collection(&item.collection).await?;
        let collection_data = self
            .client
            .collection_data(&to.chain, &collection.index)
            .await?;

        let bridge_params = params
            .networks
            .iter()
            .find(|network| network.name == to.chain)
            .and_then(|network| network.bridge_params.as_ref())
            .ok_or_else(|| CoreError::BridgeParamsNotFound {
                chain: to.chain.clone(),
            })?;

        let content = transfer_content(
            &collection,
            &collection_data,
            &item,
            bridge_params,
            &transfer,
        )?;

        Ok(TransferDetails {
            transfer,
            collection,
            collection_data,
            item,
            signature: signature.to_owned(),
            origin: content.origin.to_string(),
            merkle_path: Vec::new(),
        })
    }
}

fn parse_proof_path(index: &str, proof: &[String]) -> Result<Vec<[u8; 32]>, CoreError> {
    proof
        .iter()
        .map(|entry| {
            alloy_primitives::hex::decode(entry)
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
                .ok_or_else(|| CoreError::MalformedProof {
                    index: index.to_owned(),
                    entry: entry.clone(),
                })
        })
        .collect()
}

/// Fixtures shared by assembler, scheduler and consumer tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::proto::rarimocore::{Confirmation, OnChainItemIndex, OpStatus};
    use crate::proto::tokenmanager::{BridgeNetworkParams, Network};
    use client::mock::MockSourceChain;
    use prost::Message as _;

    pub const CONFIRMATION_ROOT: &str = "0xaa01";
    pub const SIGNATURE: &str = "0x11d71b6c6cead1fa1a8b186ac4f6b8a59e9d8fb17b67dc45ebccb012bcfbd0ca2a62b15bd9ccb9a463097da4a2734c8a19ecd62c66a13eb1f56b44d1c74b1ff001";

    pub fn transfer_operation(index: &str, chain: &str, status: OpStatus) -> Operation {
        // The source event id doubles as the operation index.
        let transfer = Transfer {
            origin: index.to_owned(),
            tx: String::new(),
            event_id: String::new(),
            receiver: "0x000000000000000000000000000000000000dead".to_owned(),
            amount: String::new(),
            bundle_data: String::new(),
            bundle_salt: String::new(),
            from: None,
            to: Some(OnChainItemIndex {
                chain: chain.to_owned(),
                address: "0x00000000000000000000000000000000000000aa".to_owned(),
                token_id: "0x01".to_owned(),
            }),
        };
        Operation {
            index: index.to_owned(),
            operation_type: OpType::Transfer as i32,
            details: Some(prost_types::Any {
                type_url: "/rarimo.rarimocore.rarimocore.Transfer".to_owned(),
                value: transfer.encode_to_vec(),
            }),
            status: status as i32,
            creator: String::new(),
        }
    }

    /// A mock chain with one confirmation covering the given TRANSFER
    /// operation indexes, all destined to `chain` with ERC721 descriptors.
    pub fn populated_chain(chain: &str, indexes: &[&str]) -> MockSourceChain {
        let mock = MockSourceChain::default();
        mock.confirmations.lock().expect("lock").insert(
            CONFIRMATION_ROOT.to_owned(),
            Confirmation {
                creator: String::new(),
                root: CONFIRMATION_ROOT.to_owned(),
                indexes: indexes.iter().map(|s| s.to_string()).collect(),
                signature_ecdsa: SIGNATURE.to_owned(),
            },
        );
        *mock.params.lock().expect("lock") = Some(Params {
            networks: vec![Network {
                name: chain.to_owned(),
                bridge_params: Some(BridgeNetworkParams {
                    contract: "0x00000000000000000000000000000000000000cc".to_owned(),
                }),
            }],
        });
        for index in indexes {
            mock.operations.lock().expect("lock").insert(
                index.to_string(),
                transfer_operation(index, chain, OpStatus::Signed),
            );
            mock.proofs.lock().expect("lock").insert(
                index.to_string(),
                vec![format!("0x{}", "ab".repeat(32))],
            );
        }
        mock.items.lock().expect("lock").insert(
            (
                chain.to_owned(),
                "0x00000000000000000000000000000000000000aa".to_owned(),
                "0x01".to_owned(),
            ),
            Item {
                index: "item-1".to_owned(),
                collection: "col-1".to_owned(),
                meta: Some(crate::proto::tokenmanager::ItemMetadata {
                    name: "Token".to_owned(),
                    symbol: "TKN".to_owned(),
                    image_uri: String::new(),
                    image_hash: String::new(),
                    seed: String::new(),
                    uri: "ipfs://x".to_owned(),
                }),
                on_chain: vec![],
            },
        );
        mock.collections.lock().expect("lock").insert(
            "col-1".to_owned(),
            Collection {
                index: "col-1".to_owned(),
                meta: None,
                data: vec![],
            },
        );
        mock.collection_data.lock().expect("lock").insert(
            (chain.to_owned(), "col-1".to_owned()),
            CollectionData {
                index: None,
                collection: "col-1".to_owned(),
                token_type: TokenType::Erc721 as i32,
                wrapped: true,
                decimals: 0,
            },
        );
        mock
    }
}
