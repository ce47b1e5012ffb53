//! Read (and broadcast) access to the source chain.
//!
//! [`SourceChain`] is the seam between the relayer and the chain's gRPC
//! surface: the scheduler, the assembler, the consumers and the home-chain
//! bridger all talk to the chain through it. [`GrpcSourceChain`] is the
//! production implementation over a lazily-connected tonic channel.

use async_trait::async_trait;
use prost::Message;
use tonic::transport::{Channel, Endpoint};

use crate::proto::cosmos;
use crate::proto::rarimocore;
use crate::proto::tokenmanager;

/// Substring of the remote error for a block height the chain has not
/// produced yet. Matching it is how the scheduler tells "wait for the next
/// block" apart from real failures.
pub const INVALID_HEIGHT_MESSAGE: &str = "invalid height";

/// Page size for block transaction queries.
pub const TX_PER_PAGE_LIMIT: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum SourceChainError {
    #[error("source chain rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("failed to decode {entity}: {source}")]
    Decode {
        entity: &'static str,
        source: prost::DecodeError,
    },
    #[error("invalid source chain endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),
}

impl SourceChainError {
    /// True when the error means the queried height is not produced yet.
    pub fn is_height_unavailable(&self) -> bool {
        match self {
            SourceChainError::Rpc(status) => status.message().contains(INVALID_HEIGHT_MESSAGE),
            _ => false,
        }
    }
}

/// Read-only interface to the source chain, plus transaction broadcast for
/// the home-chain bridger.
#[async_trait]
pub trait SourceChain: Send + Sync {
    /// All transactions of the block at `height`, paginated internally.
    async fn get_block_txs(&self, height: u64) -> Result<Vec<cosmos::Tx>, SourceChainError>;

    async fn operation(&self, index: &str) -> Result<rarimocore::Operation, SourceChainError>;

    /// Server-computed Merkle path of the operation's leaf, 0x-hex hashes.
    async fn operation_proof(&self, index: &str) -> Result<Vec<String>, SourceChainError>;

    async fn confirmation(&self, root: &str) -> Result<rarimocore::Confirmation, SourceChainError>;

    async fn token_params(&self) -> Result<tokenmanager::Params, SourceChainError>;

    async fn item_by_on_chain_item(
        &self,
        chain: &str,
        address: &str,
        token_id: &str,
    ) -> Result<tokenmanager::Item, SourceChainError>;

    async fn collection(&self, index: &str) -> Result<tokenmanager::Collection, SourceChainError>;

    async fn collection_data(
        &self,
        chain: &str,
        collection_index: &str,
    ) -> Result<tokenmanager::CollectionData, SourceChainError>;

    async fn account(&self, address: &str) -> Result<cosmos::BaseAccount, SourceChainError>;

    async fn broadcast_tx(&self, tx_bytes: Vec<u8>) -> Result<cosmos::TxResponse, SourceChainError>;
}

/// gRPC implementation of [`SourceChain`].
///
/// The channel connects lazily; per-module clients are cheap clones over it.
#[derive(Debug, Clone)]
pub struct GrpcSourceChain {
    channel: Channel,
}

impl GrpcSourceChain {
    pub fn connect_lazy(grpc_url: &url::Url) -> Result<Self, SourceChainError> {
        let endpoint = Endpoint::from_shared(grpc_url.to_string())?;
        Ok(Self {
            channel: endpoint.connect_lazy(),
        })
    }

    fn rarimocore(&self) -> rarimocore::QueryClient {
        rarimocore::QueryClient::new(self.channel.clone())
    }

    fn tokenmanager(&self) -> tokenmanager::QueryClient {
        tokenmanager::QueryClient::new(self.channel.clone())
    }

    fn tx_service(&self) -> cosmos::TxServiceClient {
        cosmos::TxServiceClient::new(self.channel.clone())
    }

    fn auth(&self) -> cosmos::AuthQueryClient {
        cosmos::AuthQueryClient::new(self.channel.clone())
    }
}

#[async_trait]
impl SourceChain for GrpcSourceChain {
    async fn get_block_txs(&self, height: u64) -> Result<Vec<cosmos::Tx>, SourceChainError> {
        let mut client = self.tx_service();
        let mut txs = Vec::new();
        let mut next_key = Vec::new();
        loop {
            let response = client
                .get_block_with_txs(cosmos::GetBlockWithTxsRequest {
                    height: height as i64,
                    pagination: Some(cosmos::PageRequest {
                        key: next_key,
                        limit: TX_PER_PAGE_LIMIT,
                    }),
                })
                .await?
                .into_inner();
            txs.extend(response.txs);
            next_key = response
                .pagination
                .map(|page| page.next_key)
                .unwrap_or_default();
            if next_key.is_empty() {
                return Ok(txs);
            }
        }
    }

    async fn operation(&self, index: &str) -> Result<rarimocore::Operation, SourceChainError> {
        self.rarimocore()
            .operation(rarimocore::QueryGetOperationRequest {
                index: index.to_owned(),
            })
            .await?
            .into_inner()
            .operation
            .ok_or(SourceChainError::NotFound("operation"))
    }

    async fn operation_proof(&self, index: &str) -> Result<Vec<String>, SourceChainError> {
        Ok(self
            .rarimocore()
            .operation_proof(rarimocore::QueryGetOperationProofRequest {
                index: index.to_owned(),
            })
            .await?
            .into_inner()
            .path)
    }

    async fn confirmation(&self, root: &str) -> Result<rarimocore::Confirmation, SourceChainError> {
        self.rarimocore()
            .confirmation(rarimocore::QueryGetConfirmationRequest {
                root: root.to_owned(),
            })
            .await?
            .into_inner()
            .confirmation
            .ok_or(SourceChainError::NotFound("confirmation"))
    }

    async fn token_params(&self) -> Result<tokenmanager::Params, SourceChainError> {
        self.tokenmanager()
            .params(tokenmanager::QueryParamsRequest {})
            .await?
            .into_inner()
            .params
            .ok_or(SourceChainError::NotFound("token params"))
    }

    async fn item_by_on_chain_item(
        &self,
        chain: &str,
        address: &str,
        token_id: &str,
    ) -> Result<tokenmanager::Item, SourceChainError> {
        self.tokenmanager()
            .item_by_on_chain_item(tokenmanager::QueryGetItemByOnChainItemRequest {
                chain: chain.to_owned(),
                address: address.to_owned(),
                token_id: token_id.to_owned(),
            })
            .await?
            .into_inner()
            .item
            .ok_or(SourceChainError::NotFound("item"))
    }

    async fn collection(&self, index: &str) -> Result<tokenmanager::Collection, SourceChainError> {
        self.tokenmanager()
            .collection(tokenmanager::QueryGetCollectionRequest {
                index: index.to_owned(),
            })
            .await?
            .into_inner()
            .collection
            .ok_or(SourceChainError::NotFound("collection"))
    }

    async fn collection_data(
        &self,
        chain: &str,
        collection_index: &str,
    ) -> Result<tokenmanager::CollectionData, SourceChainError> {
        self.tokenmanager()
            .collection_data_by_collection_for_chain(
                tokenmanager::QueryGetCollectionDataByCollectionForChainRequest {
                    collection_index: collection_index.to_owned(),
                    chain: chain.to_owned(),
                },
            )
            .await?
            .into_inner()
            .data
            .ok_or(SourceChainError::NotFound("collection data"))
    }

    async fn account(&self, address: &str) -> Result<cosmos::BaseAccount, SourceChainError> {
        let any = self
            .auth()
            .account(cosmos::QueryAccountRequest {
                address: address.to_owned(),
            })
            .await?
            .into_inner()
            .account
            .ok_or(SourceChainError::NotFound("account"))?;
        cosmos::BaseAccount::decode(any.value.as_slice()).map_err(|source| {
            SourceChainError::Decode {
                entity: "account",
                source,
            }
        })
    }

    async fn broadcast_tx(
        &self,
        tx_bytes: Vec<u8>,
    ) -> Result<cosmos::TxResponse, SourceChainError> {
        self.tx_service()
            .broadcast_tx(cosmos::BroadcastTxRequest {
                tx_bytes,
                mode: cosmos::BroadcastMode::Block as i32,
            })
            .await?
            .into_inner()
            .tx_response
            .ok_or(SourceChainError::NotFound("tx response"))
    }
}
