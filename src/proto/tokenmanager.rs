//! `rarimo.rarimocore.tokenmanager` module types and query client.

use tonic::codegen::http;
use tonic::transport::Channel;

use super::rarimocore::OnChainItemIndex;

/// Destination token kind. Determines which withdrawal entry point a
/// bridger invokes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum TokenType {
    Native = 0,
    Erc20 = 1,
    Erc721 = 2,
    Erc1155 = 3,
    MetaplexNft = 4,
    MetaplexFt = 5,
    NearFt = 6,
    NearNft = 7,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ItemMetadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(string, tag = "3")]
    pub image_uri: String,
    /// 0x-hex hash of the image payload.
    #[prost(string, tag = "4")]
    pub image_hash: String,
    /// Optional 32-byte token seed, 0x-hex (Solana wrapped tokens).
    #[prost(string, tag = "5")]
    pub seed: String,
    /// Token metadata URI.
    #[prost(string, tag = "6")]
    pub uri: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Item {
    #[prost(string, tag = "1")]
    pub index: String,
    /// Index of the collection the item belongs to.
    #[prost(string, tag = "2")]
    pub collection: String,
    #[prost(message, optional, tag = "3")]
    pub meta: Option<ItemMetadata>,
    #[prost(message, repeated, tag = "4")]
    pub on_chain: Vec<OnChainItemIndex>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CollectionMetadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(string, tag = "3")]
    pub metadata_uri: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CollectionDataIndex {
    #[prost(string, tag = "1")]
    pub chain: String,
    #[prost(string, tag = "2")]
    pub address: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Collection {
    #[prost(string, tag = "1")]
    pub index: String,
    #[prost(message, optional, tag = "2")]
    pub meta: Option<CollectionMetadata>,
    #[prost(message, repeated, tag = "3")]
    pub data: Vec<CollectionDataIndex>,
}

/// Per-destination-chain deployment data of a collection.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CollectionData {
    #[prost(message, optional, tag = "1")]
    pub index: Option<CollectionDataIndex>,
    #[prost(string, tag = "2")]
    pub collection: String,
    #[prost(enumeration = "TokenType", tag = "3")]
    pub token_type: i32,
    #[prost(bool, tag = "4")]
    pub wrapped: bool,
    #[prost(uint32, tag = "5")]
    pub decimals: u32,
}

/// Bridge deployment parameters of one destination network.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BridgeNetworkParams {
    /// Bridge contract address on the network.
    #[prost(string, tag = "1")]
    pub contract: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Network {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub bridge_params: Option<BridgeNetworkParams>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Params {
    #[prost(message, repeated, tag = "1")]
    pub networks: Vec<Network>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryParamsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryParamsResponse {
    #[prost(message, optional, tag = "1")]
    pub params: Option<Params>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetItemByOnChainItemRequest {
    #[prost(string, tag = "1")]
    pub chain: String,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(string, tag = "3")]
    pub token_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetItemByOnChainItemResponse {
    #[prost(message, optional, tag = "1")]
    pub item: Option<Item>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetCollectionRequest {
    #[prost(string, tag = "1")]
    pub index: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetCollectionResponse {
    #[prost(message, optional, tag = "1")]
    pub collection: Option<Collection>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetCollectionDataByCollectionForChainRequest {
    #[prost(string, tag = "1")]
    pub collection_index: String,
    #[prost(string, tag = "2")]
    pub chain: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetCollectionDataByCollectionForChainResponse {
    #[prost(message, optional, tag = "1")]
    pub data: Option<CollectionData>,
}

/// Query client for the `tokenmanager` module.
#[derive(Debug, Clone)]
pub struct QueryClient {
    inner: tonic::client::Grpc<Channel>,
}

impl QueryClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn params(
        &mut self,
        request: QueryParamsRequest,
    ) -> Result<tonic::Response<QueryParamsResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path =
            http::uri::PathAndQuery::from_static("/rarimo.rarimocore.tokenmanager.Query/Params");
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn item_by_on_chain_item(
        &mut self,
        request: QueryGetItemByOnChainItemRequest,
    ) -> Result<tonic::Response<QueryGetItemByOnChainItemResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/rarimo.rarimocore.tokenmanager.Query/ItemByOnChainItem",
        );
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn collection(
        &mut self,
        request: QueryGetCollectionRequest,
    ) -> Result<tonic::Response<QueryGetCollectionResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/rarimo.rarimocore.tokenmanager.Query/Collection",
        );
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn collection_data_by_collection_for_chain(
        &mut self,
        request: QueryGetCollectionDataByCollectionForChainRequest,
    ) -> Result<tonic::Response<QueryGetCollectionDataByCollectionForChainResponse>, tonic::Status>
    {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/rarimo.rarimocore.tokenmanager.Query/CollectionDataByCollectionForChain",
        );
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }
}
