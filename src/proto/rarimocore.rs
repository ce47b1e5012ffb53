//! `rarimo.rarimocore.rarimocore` module types and query client.

use tonic::codegen::http;
use tonic::transport::Channel;

/// Confirmation of a batch of signed operations, keyed by Merkle root.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Confirmation {
    #[prost(string, tag = "1")]
    pub creator: String,
    /// Merkle root over the batch's transfer-content leaves, 0x-hex.
    #[prost(string, tag = "2")]
    pub root: String,
    /// Operation indexes covered by the root, in leaf order.
    #[prost(string, repeated, tag = "3")]
    pub indexes: Vec<String>,
    /// Recoverable 65-byte ECDSA signature over the root, 0x-hex.
    #[prost(string, tag = "4")]
    pub signature_ecdsa: String,
}

/// The on-chain message announcing a new confirmation. The scheduler
/// extracts these from block transactions by type URL.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgCreateConfirmation {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub root: String,
    #[prost(string, repeated, tag = "3")]
    pub indexes: Vec<String>,
    #[prost(string, tag = "4")]
    pub signature_ecdsa: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum OpType {
    Transfer = 0,
    ChangeParties = 1,
    FeeTokenManagement = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum OpStatus {
    Initialized = 0,
    Approved = 1,
    NotApproved = 2,
    Signed = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Operation {
    #[prost(string, tag = "1")]
    pub index: String,
    #[prost(enumeration = "OpType", tag = "2")]
    pub operation_type: i32,
    /// Operation payload; decodes to [`Transfer`] for `OpType::Transfer`.
    #[prost(message, optional, tag = "3")]
    pub details: Option<::prost_types::Any>,
    #[prost(enumeration = "OpStatus", tag = "4")]
    pub status: i32,
    #[prost(string, tag = "5")]
    pub creator: String,
}

/// Destination (or source) token coordinates of a transfer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OnChainItemIndex {
    #[prost(string, tag = "1")]
    pub chain: String,
    /// Token contract address, 0x-hex.
    #[prost(string, tag = "2")]
    pub address: String,
    /// Token id, 0x-hex.
    #[prost(string, tag = "3")]
    pub token_id: String,
}

/// The logical transfer intent carried by a `TRANSFER` operation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transfer {
    /// Opaque id of the source event.
    #[prost(string, tag = "1")]
    pub origin: String,
    #[prost(string, tag = "2")]
    pub tx: String,
    #[prost(string, tag = "3")]
    pub event_id: String,
    /// Receiver address bytes, 0x-hex; decoding is destination-specific.
    #[prost(string, tag = "4")]
    pub receiver: String,
    /// Decimal amount; empty means 1.
    #[prost(string, tag = "5")]
    pub amount: String,
    #[prost(string, tag = "6")]
    pub bundle_data: String,
    #[prost(string, tag = "7")]
    pub bundle_salt: String,
    #[prost(message, optional, tag = "8")]
    pub from: Option<OnChainItemIndex>,
    #[prost(message, optional, tag = "9")]
    pub to: Option<OnChainItemIndex>,
}

/// `rarimo.rarimocore.bridge` withdrawal message: marks `origin` as
/// consumed on the source chain and credits the receiver.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgWithdrawNative {
    #[prost(string, tag = "1")]
    pub creator: String,
    /// 0x-hex 32-byte origin.
    #[prost(string, tag = "2")]
    pub origin: String,
}

pub const MSG_WITHDRAW_NATIVE_TYPE_URL: &str = "/rarimo.rarimocore.bridge.MsgWithdrawNative";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetOperationRequest {
    #[prost(string, tag = "1")]
    pub index: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetOperationResponse {
    #[prost(message, optional, tag = "1")]
    pub operation: Option<Operation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetOperationProofRequest {
    #[prost(string, tag = "1")]
    pub index: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetOperationProofResponse {
    /// Sibling hashes from the leaf to the signed root, 0x-hex.
    #[prost(string, repeated, tag = "1")]
    pub path: Vec<String>,
    #[prost(string, tag = "2")]
    pub signature: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetConfirmationRequest {
    #[prost(string, tag = "1")]
    pub root: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryGetConfirmationResponse {
    #[prost(message, optional, tag = "1")]
    pub confirmation: Option<Confirmation>,
}

/// Query client for the `rarimocore` module.
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

    pub async fn operation(
        &mut self,
        request: QueryGetOperationRequest,
    ) -> Result<tonic::Response<QueryGetOperationResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path =
            http::uri::PathAndQuery::from_static("/rarimo.rarimocore.rarimocore.Query/Operation");
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn operation_proof(
        &mut self,
        request: QueryGetOperationProofRequest,
    ) -> Result<tonic::Response<QueryGetOperationProofResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/rarimo.rarimocore.rarimocore.Query/OperationProof",
        );
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }

    pub async fn confirmation(
        &mut self,
        request: QueryGetConfirmationRequest,
    ) -> Result<tonic::Response<QueryGetConfirmationResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/rarimo.rarimocore.rarimocore.Query/Confirmation",
        );
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }
}
